use std::sync::Arc;
use std::time::Duration;

use reelhouse_shared::constants::{GUEST_USERNAME, LOGGED_IN_STATUS};
use reelhouse_shared::shared_slot_game::LoginResponse;
use reelhouse_shared::Money;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::with_timeout;
use crate::error::WagerError;
use crate::ledger::{Account, Ledger, LedgerError};

const KEY_ATTEMPTS: usize = 3;

/// Opaque account key: hex SHA-256 of a random UUID.
pub fn generate_key() -> String {
    hex::encode(Sha256::digest(Uuid::new_v4().as_bytes()))
}

pub struct AccountService {
    ledger: Arc<dyn Ledger>,
    initial_balance: Money,
    ledger_timeout: Duration,
}

impl AccountService {
    pub fn new(ledger: Arc<dyn Ledger>, initial_balance: Money, ledger_timeout: Duration) -> Self {
        Self {
            ledger,
            initial_balance,
            ledger_timeout,
        }
    }

    /// `None` creates a guest account with a fresh key; `Some(key)` resumes the account it names.
    pub async fn login(&self, key: Option<String>) -> Result<LoginResponse, WagerError> {
        let account = match key {
            None => self.create_guest().await?,
            Some(key) => {
                let account = self.resolve(&key).await?;
                with_timeout(self.ledger_timeout, self.ledger.record_login(account.id)).await?;
                info!("Account {} logged in", account.id);
                account
            }
        };

        Ok(LoginResponse {
            status: LOGGED_IN_STATUS.to_string(),
            key: account.key,
            username: account.username,
            balance: account.balance,
        })
    }

    /// Looks an account up by key; unknown keys are [`WagerError::AccountNotFound`].
    pub async fn resolve(&self, key: &str) -> Result<Account, WagerError> {
        with_timeout(self.ledger_timeout, self.ledger.find_account_by_key(key))
            .await?
            .ok_or(WagerError::AccountNotFound)
    }

    async fn create_guest(&self) -> Result<Account, WagerError> {
        for attempt in 1..=KEY_ATTEMPTS {
            let key = generate_key();
            let created = with_timeout(
                self.ledger_timeout,
                self.ledger.create_account(GUEST_USERNAME, self.initial_balance, &key),
            )
            .await;
            match created {
                Ok(account) => {
                    info!("Created guest account {} with balance {}", account.id, account.balance);
                    return Ok(account);
                }
                Err(LedgerError::DuplicateKey) => {
                    warn!("Generated key collided with an existing account (attempt {})", attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::DuplicateKey.into())
    }
}
