use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reelhouse_shared::shared_slot_game::ErrorResponse;
use reelhouse_shared::Money;
use serde_json::json;

use crate::ledger::LedgerError;

/// Every way a login, gamestate or bet request can fail.
#[derive(Debug, thiserror::Error, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum WagerError {
    #[error("no account matches the provided key")]
    AccountNotFound,
    #[error("balance {balance} does not cover stake {stake}")]
    InsufficientFunds { balance: Money, stake: Money },
    #[error("unknown game {0}")]
    UnknownGame(String),
    #[error("invalid bet: {0}")]
    InvalidBet(String),
    #[error("{0} accounts share the provided key")]
    AmbiguousAccount(usize),
    #[strum(serialize = "persistence-error")]
    #[error("ledger failure: {0}")]
    Persistence(LedgerError),
    #[error("malformed request: {0}")]
    BadRequest(String),
}

impl From<LedgerError> for WagerError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { balance, stake } => WagerError::InsufficientFunds { balance, stake },
            LedgerError::AmbiguousKey(count) => WagerError::AmbiguousAccount(count),
            other => WagerError::Persistence(other),
        }
    }
}

impl WagerError {
    /// Stable code clients can branch on.
    pub fn reason(&self) -> &str {
        self.as_ref()
    }

    /// Whether the wager was refused on its merits rather than failed by the system.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WagerError::AccountNotFound
                | WagerError::InsufficientFunds { .. }
                | WagerError::UnknownGame(_)
                | WagerError::InvalidBet(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            WagerError::AccountNotFound | WagerError::UnknownGame(_) => StatusCode::NOT_FOUND,
            WagerError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            WagerError::InvalidBet(_) | WagerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WagerError::AmbiguousAccount(_) | WagerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing text. Internal failures are not described beyond their kind.
    pub fn public_message(&self) -> String {
        match self {
            WagerError::Persistence(_) => "Database error".to_string(),
            WagerError::AmbiguousAccount(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_error_response(&self, request: Option<&str>) -> ErrorResponse {
        ErrorResponse {
            request: request.map(str::to_string),
            reason: self.reason().to_string(),
            message: self.public_message(),
        }
    }
}

impl IntoResponse for WagerError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.public_message(),
            "reason": self.reason(),
        });
        (self.status(), Json(body)).into_response()
    }
}
