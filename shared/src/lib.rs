pub mod constants;
pub mod game_definition;
pub mod money;
pub mod payout_evaluator;
pub mod reel_spinner;
pub mod registry;
pub mod shared_slot_game;

pub use game_definition::{GameDefinition, GameDefinitionError, PayEntry, Payline, Paytable, StakeRule, SymbolId};
pub use money::{round_money, Money};
pub use payout_evaluator::{evaluate, total_payout, WinningLine};
pub use reel_spinner::{ReelOutcome, ReelSpinner, SeededSpinner, ThreadRngSpinner};
pub use registry::{GameRegistry, RegistryError};
