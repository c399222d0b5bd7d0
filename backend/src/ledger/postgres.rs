use std::time::Duration;

use axum::async_trait;
use reelhouse_shared::{round_money, Money, ReelOutcome};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{error, info};
use uuid::Uuid;

use super::{Account, Gamestate, Ledger, LedgerError, WagerSettlement};

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    username: String,
    balance: Money,
    key: String,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            balance: row.balance,
            key: row.key,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GamestateRow {
    user_id: Uuid,
    game_id: String,
    reels: String,
    bet: i32,
    coin_value: Money,
}

impl TryFrom<GamestateRow> for Gamestate {
    type Error = LedgerError;

    fn try_from(row: GamestateRow) -> Result<Self, Self::Error> {
        let last_outcome: ReelOutcome = serde_json::from_str(&row.reels)
            .map_err(|e| LedgerError::Corrupt(format!("reels of {}/{}: {}", row.user_id, row.game_id, e)))?;
        let bet = u32::try_from(row.bet)
            .map_err(|_| LedgerError::Corrupt(format!("bet {} of {}/{}", row.bet, row.user_id, row.game_id)))?;
        Ok(Self {
            account_id: row.user_id,
            game_id: row.game_id,
            bet,
            coin_value: row.coin_value,
            last_outcome,
        })
    }
}

fn encode_reels(reels: &ReelOutcome) -> Result<String, LedgerError> {
    serde_json::to_string(reels).map_err(|e| LedgerError::Corrupt(e.to_string()))
}

/// SQLSTATE raised when `statement_timeout` cancels a query.
const QUERY_CANCELED: &str = "57014";

/// `statement_timeout` accepts whole milliseconds up to `i32::MAX`; 0 would disable it.
fn statement_timeout_ms(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1)
}

fn encode_bet(bet: u32) -> Result<i32, LedgerError> {
    i32::try_from(bet).map_err(|_| LedgerError::Corrupt(format!("bet {} exceeds column range", bet)))
}

/// PostgreSQL ledger over the `accounts` and `gamestates` tables.
#[derive(Debug, Clone)]
///
/// A wager commit is bounded by `commit_timeout` inside the database, so a
/// commit that runs out of time is rolled back rather than left in flight.
pub struct PgLedger {
    pool: PgPool,
    commit_timeout: Duration,
}

impl PgLedger {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        commit_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(commit_timeout)
            .connect(database_url)
            .await?;
        info!("Connected to database (max {} connections)", max_connections);
        Ok(Self { pool, commit_timeout })
    }

    fn settle_error(&self, err: sqlx::Error) -> LedgerError {
        match err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
                LedgerError::Timeout(self.commit_timeout)
            }
            sqlx::Error::PoolTimedOut => LedgerError::Timeout(self.commit_timeout),
            other => other.into(),
        }
    }

    async fn settle(&self, settlement: &WagerSettlement) -> Result<Money, LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            statement_timeout_ms(self.commit_timeout)
        ))
        .execute(&mut *tx)
        .await?;

        let balance = sqlx::query_scalar::<_, Money>("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(settlement.account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::AccountNotFound(settlement.account_id))?;

        // Dropping the transaction rolls it back.
        if balance < settlement.stake {
            return Err(LedgerError::InsufficientFunds {
                balance,
                stake: settlement.stake,
            });
        }

        let new_balance = round_money(balance - settlement.stake + settlement.payout);
        sqlx::query("UPDATE accounts SET balance = $1 WHERE id = $2")
            .bind(new_balance)
            .bind(settlement.account_id)
            .execute(&mut *tx)
            .await?;

        Self::upsert_gamestate(&mut tx, &settlement.gamestate()).await?;

        tx.commit().await?;
        Ok(new_balance)
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn upsert_gamestate(
        tx: &mut Transaction<'_, Postgres>,
        gamestate: &Gamestate,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO gamestates (user_id, game_id, reels, bet, coin_value)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, game_id) DO UPDATE
            SET reels = EXCLUDED.reels,
                bet = EXCLUDED.bet,
                coin_value = EXCLUDED.coin_value
            "#,
        )
        .bind(gamestate.account_id)
        .bind(&gamestate.game_id)
        .bind(encode_reels(&gamestate.last_outcome)?)
        .bind(encode_bet(gamestate.bet)?)
        .bind(gamestate.coin_value)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn find_account_by_key(&self, key: &str) -> Result<Option<Account>, LedgerError> {
        let mut rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, username, balance, key
            FROM accounts
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop().map(Account::from)),
            n => {
                error!("{} accounts share one key", n);
                Err(LedgerError::AmbiguousKey(n))
            }
        }
    }

    async fn create_account(&self, username: &str, balance: Money, key: &str) -> Result<Account, LedgerError> {
        let result = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (id, username, balance, key, last_login)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, username, balance, key
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(round_money(balance))
        .bind(key)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(LedgerError::DuplicateKey),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_login(&self, account_id: Uuid) -> Result<(), LedgerError> {
        let result = sqlx::query("UPDATE accounts SET last_login = NOW() WHERE id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        Ok(())
    }

    async fn update_balance(&self, account_id: Uuid, balance: Money) -> Result<(), LedgerError> {
        let result = sqlx::query("UPDATE accounts SET balance = $1 WHERE id = $2")
            .bind(round_money(balance))
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        Ok(())
    }

    async fn get_or_create_gamestate(
        &self,
        account_id: Uuid,
        game_id: &str,
        default: Gamestate,
    ) -> Result<Gamestate, LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO gamestates (user_id, game_id, reels, bet, coin_value)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, game_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(game_id)
        .bind(encode_reels(&default.last_outcome)?)
        .bind(encode_bet(default.bet)?)
        .bind(default.coin_value)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, GamestateRow>(
            r#"
            SELECT user_id, game_id, reels, bet, coin_value
            FROM gamestates
            WHERE user_id = $1 AND game_id = $2
            "#,
        )
        .bind(account_id)
        .bind(game_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Gamestate::try_from(row)
    }

    async fn update_gamestate(&self, gamestate: &Gamestate) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_gamestate(&mut tx, gamestate).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_wager(&self, settlement: &WagerSettlement) -> Result<Money, LedgerError> {
        self.settle(settlement).await.map_err(|e| match e {
            LedgerError::Database(db) => self.settle_error(db),
            other => other,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
