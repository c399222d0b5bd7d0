use std::time::Duration;

use axum::async_trait;
use reelhouse_shared::{Money, ReelOutcome};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub balance: Money,
    pub key: String,
}

/// Last settled staking parameters and reels of one account on one game.
#[derive(Debug, Clone, PartialEq)]
pub struct Gamestate {
    pub account_id: Uuid,
    pub game_id: String,
    pub bet: u32,
    pub coin_value: Money,
    pub last_outcome: ReelOutcome,
}

/// Everything a settled wager writes, applied as one unit by [`Ledger::commit_wager`].
#[derive(Debug, Clone, PartialEq)]
pub struct WagerSettlement {
    pub account_id: Uuid,
    pub game_id: String,
    pub stake: Money,
    pub payout: Money,
    pub bet: u32,
    pub coin_value: Money,
    pub outcome: ReelOutcome,
}

impl WagerSettlement {
    pub fn gamestate(&self) -> Gamestate {
        Gamestate {
            account_id: self.account_id,
            game_id: self.game_id.clone(),
            bet: self.bet,
            coin_value: self.coin_value,
            last_outcome: self.outcome.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ledger did not answer within {0:?}")]
    Timeout(Duration),
    #[error("settlement task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("stored data is malformed: {0}")]
    Corrupt(String),
    #[error("{0} accounts share one key")]
    AmbiguousKey(usize),
    #[error("account key already in use")]
    DuplicateKey,
    #[error("account {0} does not exist")]
    AccountNotFound(Uuid),
    #[error("balance {balance} does not cover stake {stake}")]
    InsufficientFunds { balance: Money, stake: Money },
}

/// Persistence collaborator for accounts and gamestates.
///
/// `commit_wager` is the only write a wager performs: it debits the stake,
/// credits the payout and stores the gamestate snapshot atomically, refusing
/// the whole unit if the stored balance no longer covers the stake.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// `Ok(None)` for an unknown key, [`LedgerError::AmbiguousKey`] if several rows match.
    async fn find_account_by_key(&self, key: &str) -> Result<Option<Account>, LedgerError>;

    /// Fails with [`LedgerError::DuplicateKey`] if `key` is taken.
    async fn create_account(&self, username: &str, balance: Money, key: &str) -> Result<Account, LedgerError>;

    async fn record_login(&self, account_id: Uuid) -> Result<(), LedgerError>;

    async fn update_balance(&self, account_id: Uuid, balance: Money) -> Result<(), LedgerError>;

    /// Returns the stored gamestate, inserting `default` first if there is none.
    async fn get_or_create_gamestate(
        &self,
        account_id: Uuid,
        game_id: &str,
        default: Gamestate,
    ) -> Result<Gamestate, LedgerError>;

    async fn update_gamestate(&self, gamestate: &Gamestate) -> Result<(), LedgerError>;

    /// Applies the settlement and returns the new balance.
    async fn commit_wager(&self, settlement: &WagerSettlement) -> Result<Money, LedgerError>;

    async fn close(&self) {}
}
