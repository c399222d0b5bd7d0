use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reelhouse_shared::constants::INITIAL_BALANCE;
use reelhouse_shared::{round_money, Money};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 5000;
const DEFAULT_STATIC_DIR: &str = "public";

#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct ConfigError {
    name: &'static str,
    value: String,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// `None` runs against the in-process ledger.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub ledger_timeout: Duration,
    pub initial_balance: Money,
    pub static_dir: PathBuf,
    pub games_dir: Option<PathBuf>,
    pub spin_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let initial_balance: Money = parse_or(&var, "INITIAL_BALANCE", INITIAL_BALANCE)?;
        if initial_balance.is_sign_negative() {
            return Err(ConfigError {
                name: "INITIAL_BALANCE",
                value: initial_balance.to_string(),
                reason: "must not be negative".to_string(),
            });
        }

        let bind_addr = match var("BIND_ADDR") {
            Some(value) => parse("BIND_ADDR", &value)?,
            None => parse("BIND_ADDR", DEFAULT_BIND_ADDR)?,
        };

        Ok(Self {
            bind_addr,
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            ledger_timeout: Duration::from_millis(parse_or(&var, "LEDGER_TIMEOUT_MS", DEFAULT_LEDGER_TIMEOUT_MS)?),
            initial_balance: round_money(initial_balance),
            static_dir: var("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()).into(),
            games_dir: var("GAMES_DIR").map(PathBuf::from),
            spin_seed: var("SPIN_SEED").map(|v| parse("SPIN_SEED", &v)).transpose()?,
        })
    }
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(value) => parse(name, &value),
        None => Ok(default),
    }
}
