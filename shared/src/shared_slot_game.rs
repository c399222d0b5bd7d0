use serde::{Deserialize, Serialize};

use crate::game_definition::{GameDefinition, StakeRule};
use crate::money::Money;
use crate::payout_evaluator::WinningLine;
use crate::reel_spinner::ReelOutcome;

// === Channel messages ===

/// Messages a client sends over the game channel, `{ "event": ..., "data": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    Login(LoginRequest),
    Gamestate(GamestateRequest),
    Bet(BetRequest),
}

impl ClientMessage {
    pub fn event(&self) -> &'static str {
        match self {
            Self::Login(_) => "login",
            Self::Gamestate(_) => "gamestate",
            Self::Bet(_) => "bet",
        }
    }
}

/// Replies carry the event name of the request they answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    Login(LoginResponse),
    Gamestate(GamestateResponse),
    Bet(BetResponse),
    Error(ErrorResponse),
}

// === API Types ===

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRequest {
    /// `null` asks for a new guest account
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub status: String,
    pub key: String,
    pub username: String,
    pub balance: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GamestateRequest {
    pub key: String,
    pub game_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GamestateResponse {
    pub balance: Money,
    pub bet: u32,
    pub coin_value: Money,
    pub reels: ReelOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BetRequest {
    pub key: String,
    pub game_id: String,
    /// coins per line
    pub bet: u32,
    pub coin_value: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BetResponse {
    pub balance: Money,
    pub reels: ReelOutcome,
    pub is_win: bool,
    pub win: Vec<WinningLine>,
    pub stake: Money,
    pub total_win: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// event of the rejected request, when it could be parsed
    pub request: Option<String>,
    pub reason: String,
    pub message: String,
}

/// Public description of a registered game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub id: String,
    pub reels_count: usize,
    pub window_height: usize,
    pub symbols_count: u32,
    pub paylines: usize,
    pub stake: StakeRule,
}

impl From<&GameDefinition> for GameSummary {
    fn from(def: &GameDefinition) -> Self {
        Self {
            id: def.id().to_string(),
            reels_count: def.reels_count(),
            window_height: def.window_height(),
            symbols_count: def.symbols_count(),
            paylines: def.paylines().len(),
            stake: def.stake_rule(),
        }
    }
}
