use std::collections::HashMap;

use axum::async_trait;
use chrono::{DateTime, Utc};
use reelhouse_shared::{round_money, Money};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Account, Gamestate, Ledger, LedgerError, WagerSettlement};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    last_login: HashMap<Uuid, DateTime<Utc>>,
    gamestates: HashMap<(Uuid, String), Gamestate>,
}

/// Process-local ledger. Every operation runs under one lock, so a commit is atomic.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn gamestate(&self, account_id: Uuid, game_id: &str) -> Option<Gamestate> {
        let state = self.state.lock().await;
        state.gamestates.get(&(account_id, game_id.to_string())).cloned()
    }

    #[cfg(test)]
    pub async fn last_login(&self, account_id: Uuid) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_login.get(&account_id).copied()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn find_account_by_key(&self, key: &str) -> Result<Option<Account>, LedgerError> {
        let state = self.state.lock().await;
        let matches: Vec<&Account> = state.accounts.values().filter(|a| a.key == key).collect();
        match matches.as_slice() {
            [] => Ok(None),
            [account] => Ok(Some((*account).clone())),
            many => Err(LedgerError::AmbiguousKey(many.len())),
        }
    }

    async fn create_account(&self, username: &str, balance: Money, key: &str) -> Result<Account, LedgerError> {
        let mut state = self.state.lock().await;
        if state.accounts.values().any(|a| a.key == key) {
            return Err(LedgerError::DuplicateKey);
        }
        let account = Account {
            id: Uuid::new_v4(),
            username: username.to_string(),
            balance: round_money(balance),
            key: key.to_string(),
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn record_login(&self, account_id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&account_id) {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        state.last_login.insert(account_id, Utc::now());
        Ok(())
    }

    async fn update_balance(&self, account_id: Uuid, balance: Money) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.balance = round_money(balance);
        Ok(())
    }

    async fn get_or_create_gamestate(
        &self,
        account_id: Uuid,
        game_id: &str,
        default: Gamestate,
    ) -> Result<Gamestate, LedgerError> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&account_id) {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        let gamestate = state
            .gamestates
            .entry((account_id, game_id.to_string()))
            .or_insert(default);
        Ok(gamestate.clone())
    }

    async fn update_gamestate(&self, gamestate: &Gamestate) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&gamestate.account_id) {
            return Err(LedgerError::AccountNotFound(gamestate.account_id));
        }
        state
            .gamestates
            .insert((gamestate.account_id, gamestate.game_id.clone()), gamestate.clone());
        Ok(())
    }

    async fn commit_wager(&self, settlement: &WagerSettlement) -> Result<Money, LedgerError> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&settlement.account_id)
            .ok_or(LedgerError::AccountNotFound(settlement.account_id))?;
        if account.balance < settlement.stake {
            return Err(LedgerError::InsufficientFunds {
                balance: account.balance,
                stake: settlement.stake,
            });
        }
        let new_balance = round_money(account.balance - settlement.stake + settlement.payout);
        account.balance = new_balance;
        state.gamestates.insert(
            (settlement.account_id, settlement.game_id.clone()),
            settlement.gamestate(),
        );
        Ok(new_balance)
    }
}
