use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{checked_mul_money, Money};

pub type SymbolId = u32;

/// Run lengths a paytable may reward.
pub const MATCH_COUNTS: [u8; 3] = [3, 4, 5];

#[derive(Debug, thiserror::Error)]
pub enum GameDefinitionError {
    #[error("game id must not be empty")]
    MissingId,
    #[error("{field} must be at least 1")]
    EmptyGeometry { field: &'static str },
    #[error("game defines no paylines")]
    NoPaylines,
    #[error("payline {line} covers {found} reels, expected {expected}")]
    PaylineReels { line: usize, expected: usize, found: usize },
    #[error("payline {line} reel {reel} has {count} active cells, expected exactly 1")]
    PaylineFlags { line: usize, reel: usize, count: usize },
    #[error("payline {line} reel {reel} contains flag {value}, only 0 and 1 are allowed")]
    PaylineFlagValue { line: usize, reel: usize, value: u8 },
    #[error("payline {line} reel {reel} selects row {row} but reels only have {rows} rows")]
    PaylineRowOutOfRange { line: usize, reel: usize, row: usize, rows: usize },
    #[error("paytable references symbol {symbol} outside 1..={symbols_count}")]
    UnknownSymbol { symbol: SymbolId, symbols_count: u32 },
    #[error("paytable entry for symbol {symbol} has match count {count}, expected 3, 4 or 5")]
    MatchCount { symbol: SymbolId, count: u8 },
    #[error("paytable lists match count {count} twice for symbol {symbol}")]
    DuplicateMatchCount { symbol: SymbolId, count: u8 },
    #[error("paytable multiplier for symbol {symbol} x{count} is negative")]
    NegativeMultiplier { symbol: SymbolId, count: u8 },
    #[error("fixed stake factor must be at least 1")]
    StakeFactor,
    #[error("malformed game definition: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How a per-line coin bet turns into the total stake of one spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum StakeRule {
    /// bet x active paylines x coin value
    PerLine,
    /// bet x factor x coin value
    Fixed { factor: u32 },
}

impl Default for StakeRule {
    fn default() -> Self {
        StakeRule::PerLine
    }
}

/// One-hot selection of a single cell per reel, stored as `mask[reel][row]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payline(Vec<Vec<u8>>);

impl Payline {
    pub fn new(mask: Vec<Vec<u8>>) -> Self {
        Self(mask)
    }

    /// A line through the same row on every reel.
    pub fn straight(row: usize, reels: usize, rows: usize) -> Self {
        Self(
            (0..reels)
                .map(|_| (0..rows).map(|r| u8::from(r == row)).collect())
                .collect(),
        )
    }

    pub fn mask(&self) -> &[Vec<u8>] {
        &self.0
    }

    pub fn reels(&self) -> usize {
        self.0.len()
    }

    /// Row selected on `reel`, the first set flag.
    pub fn selected_row(&self, reel: usize) -> Option<usize> {
        self.0.get(reel)?.iter().position(|&flag| flag == 1)
    }

    fn validate(&self, line: usize, reels: usize, rows: usize) -> Result<(), GameDefinitionError> {
        if self.0.len() != reels {
            return Err(GameDefinitionError::PaylineReels {
                line,
                expected: reels,
                found: self.0.len(),
            });
        }
        for (reel, column) in self.0.iter().enumerate() {
            if let Some(&value) = column.iter().find(|&&flag| flag > 1) {
                return Err(GameDefinitionError::PaylineFlagValue { line, reel, value });
            }
            let count = column.iter().filter(|&&flag| flag == 1).count();
            if count != 1 {
                return Err(GameDefinitionError::PaylineFlags { line, reel, count });
            }
            let row = column.iter().position(|&flag| flag == 1).unwrap_or_default();
            if row >= rows {
                return Err(GameDefinitionError::PaylineRowOutOfRange { line, reel, row, rows });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayEntry {
    #[serde(rename = "count")]
    pub match_count: u8,
    pub multiplier: Decimal,
}

pub type Paytable = BTreeMap<SymbolId, Vec<PayEntry>>;

/// Wire/file form of a game, validated into a [`GameDefinition`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGameDefinition {
    pub id: String,
    pub reels_count: usize,
    pub window_height: usize,
    pub symbols_count: u32,
    pub paylines: Vec<Payline>,
    pub paytable: Paytable,
    #[serde(default)]
    pub stake: StakeRule,
}

/// Immutable per-game configuration. Only constructible through validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDefinition {
    id: String,
    reels_count: usize,
    window_height: usize,
    symbols_count: u32,
    paylines: Vec<Payline>,
    paytable: Paytable,
    stake: StakeRule,
}

impl GameDefinition {
    pub fn from_json(json: &str) -> Result<Self, GameDefinitionError> {
        let raw: RawGameDefinition = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn reels_count(&self) -> usize {
        self.reels_count
    }

    pub fn window_height(&self) -> usize {
        self.window_height
    }

    /// Symbols generated per reel: the visible window plus one buffer row on top.
    pub fn rows_per_reel(&self) -> usize {
        self.window_height + 1
    }

    pub fn symbols_count(&self) -> u32 {
        self.symbols_count
    }

    pub fn paylines(&self) -> &[Payline] {
        &self.paylines
    }

    pub fn paytable(&self) -> &Paytable {
        &self.paytable
    }

    pub fn stake_rule(&self) -> StakeRule {
        self.stake
    }

    /// Multiplier for `count` matching `symbol`s, if the paytable rewards it.
    pub fn multiplier(&self, symbol: SymbolId, count: usize) -> Option<Decimal> {
        self.paytable
            .get(&symbol)?
            .iter()
            .find(|entry| usize::from(entry.match_count) == count)
            .map(|entry| entry.multiplier)
    }

    /// Total stake of one spin for `bet` coins per line at `coin_value`.
    ///
    /// `None` when the stake is too large to represent.
    pub fn stake(&self, bet: u32, coin_value: Money) -> Option<Money> {
        let factor = match self.stake {
            StakeRule::PerLine => self.paylines.len() as u32,
            StakeRule::Fixed { factor } => factor,
        };
        checked_mul_money(Decimal::from(u64::from(bet) * u64::from(factor)), coin_value)
    }
}

impl TryFrom<RawGameDefinition> for GameDefinition {
    type Error = GameDefinitionError;

    fn try_from(raw: RawGameDefinition) -> Result<Self, Self::Error> {
        if raw.id.trim().is_empty() {
            return Err(GameDefinitionError::MissingId);
        }
        if raw.reels_count == 0 {
            return Err(GameDefinitionError::EmptyGeometry { field: "reelsCount" });
        }
        if raw.window_height == 0 {
            return Err(GameDefinitionError::EmptyGeometry { field: "windowHeight" });
        }
        if raw.symbols_count == 0 {
            return Err(GameDefinitionError::EmptyGeometry { field: "symbolsCount" });
        }
        if raw.paylines.is_empty() {
            return Err(GameDefinitionError::NoPaylines);
        }
        if let StakeRule::Fixed { factor: 0 } = raw.stake {
            return Err(GameDefinitionError::StakeFactor);
        }

        let rows = raw.window_height + 1;
        for (index, payline) in raw.paylines.iter().enumerate() {
            payline.validate(index + 1, raw.reels_count, rows)?;
        }

        for (&symbol, entries) in &raw.paytable {
            if symbol == 0 || symbol > raw.symbols_count {
                return Err(GameDefinitionError::UnknownSymbol {
                    symbol,
                    symbols_count: raw.symbols_count,
                });
            }
            let mut seen = Vec::with_capacity(entries.len());
            for entry in entries {
                if !MATCH_COUNTS.contains(&entry.match_count) {
                    return Err(GameDefinitionError::MatchCount { symbol, count: entry.match_count });
                }
                if seen.contains(&entry.match_count) {
                    return Err(GameDefinitionError::DuplicateMatchCount {
                        symbol,
                        count: entry.match_count,
                    });
                }
                if entry.multiplier < Decimal::ZERO {
                    return Err(GameDefinitionError::NegativeMultiplier {
                        symbol,
                        count: entry.match_count,
                    });
                }
                seen.push(entry.match_count);
            }
        }

        Ok(Self {
            id: raw.id,
            reels_count: raw.reels_count,
            window_height: raw.window_height,
            symbols_count: raw.symbols_count,
            paylines: raw.paylines,
            paytable: raw.paytable,
            stake: raw.stake,
        })
    }
}
