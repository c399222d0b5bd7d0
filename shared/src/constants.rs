use rust_decimal::Decimal;

pub const GUEST_USERNAME: &str = "Guest";
pub const LOGGED_IN_STATUS: &str = "logged-in";

/// Balance of a freshly created guest account (10000.00).
pub const INITIAL_BALANCE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 2);

/// Staking parameters of a gamestate created on first access.
pub const DEFAULT_BET: u32 = 10;
pub const DEFAULT_COIN_VALUE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

pub const MIN_BET: u32 = 1;

pub const MAX_MESSAGE_BYTES: usize = 1024;
