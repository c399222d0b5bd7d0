use std::sync::Arc;
use std::time::{Duration, Instant};

use reelhouse_shared::constants::{DEFAULT_BET, DEFAULT_COIN_VALUE, MIN_BET};
use reelhouse_shared::shared_slot_game::{BetRequest, BetResponse, GamestateRequest, GamestateResponse};
use reelhouse_shared::{
    evaluate, total_payout, GameDefinition, GameRegistry, Money, ReelOutcome, ReelSpinner, WinningLine,
};
use rust_decimal::Decimal;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};

use super::{with_timeout, AccountLocks};
use crate::error::WagerError;
use crate::ledger::{Account, Gamestate, Ledger, LedgerError, WagerSettlement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum WagerState {
    Validating,
    Spinning,
    Evaluating,
    Settling,
    Done,
    Rejected,
}

/// What one spin produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WagerResult {
    pub outcome: ReelOutcome,
    pub lines: Vec<WinningLine>,
    pub total_payout: Money,
}

/// A settled wager together with the stake taken and the balance left.
#[derive(Debug, Clone, PartialEq)]
pub struct WagerReceipt {
    pub result: WagerResult,
    pub stake: Money,
    pub balance: Money,
}

impl From<WagerReceipt> for BetResponse {
    fn from(receipt: WagerReceipt) -> Self {
        Self {
            balance: receipt.balance,
            is_win: !receipt.result.lines.is_empty(),
            reels: receipt.result.outcome,
            win: receipt.result.lines,
            stake: receipt.stake,
            total_win: receipt.result.total_payout,
        }
    }
}

struct WagerTransaction {
    state: WagerState,
}

impl WagerTransaction {
    fn begin() -> Self {
        debug!("state {}", WagerState::Validating);
        Self {
            state: WagerState::Validating,
        }
    }

    fn advance(&mut self, next: WagerState) {
        debug!("state {} -> {}", self.state, next);
        self.state = next;
    }
}

fn validate_bet(req: &BetRequest, stake: Money) -> Result<(), WagerError> {
    if req.bet < MIN_BET {
        return Err(WagerError::InvalidBet(format!("bet must be at least {}", MIN_BET)));
    }
    if req.coin_value <= Decimal::ZERO {
        return Err(WagerError::InvalidBet("coin value must be positive".to_string()));
    }
    if stake <= Decimal::ZERO {
        return Err(WagerError::InvalidBet("stake rounds to zero".to_string()));
    }
    Ok(())
}

/// Runs wagers and gamestate reads against the ledger.
///
/// Wagers on one account key are serialized from validation through
/// settlement; different accounts never wait on each other.
pub struct WagerService {
    ledger: Arc<dyn Ledger>,
    spinner: Arc<dyn ReelSpinner>,
    games: Arc<GameRegistry>,
    locks: AccountLocks,
    ledger_timeout: Duration,
}

impl WagerService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        spinner: Arc<dyn ReelSpinner>,
        games: Arc<GameRegistry>,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            spinner,
            games,
            locks: AccountLocks::default(),
            ledger_timeout,
        }
    }

    pub fn games(&self) -> &GameRegistry {
        &self.games
    }

    fn game(&self, game_id: &str) -> Result<Arc<GameDefinition>, WagerError> {
        self.games
            .get(game_id)
            .ok_or_else(|| WagerError::UnknownGame(game_id.to_string()))
    }

    async fn resolve(&self, key: &str) -> Result<Account, WagerError> {
        with_timeout(self.ledger_timeout, self.ledger.find_account_by_key(key))
            .await?
            .ok_or(WagerError::AccountNotFound)
    }

    /// Current balance and the last settled state of `game_id`, created on first access.
    pub async fn gamestate(&self, req: &GamestateRequest) -> Result<GamestateResponse, WagerError> {
        let def = self.game(&req.game_id)?;
        let account = self.resolve(&req.key).await?;

        let default = Gamestate {
            account_id: account.id,
            game_id: req.game_id.clone(),
            bet: DEFAULT_BET,
            coin_value: DEFAULT_COIN_VALUE,
            last_outcome: self.spinner.spin(&def),
        };
        let gamestate = with_timeout(
            self.ledger_timeout,
            self.ledger.get_or_create_gamestate(account.id, &req.game_id, default),
        )
        .await?;

        Ok(GamestateResponse {
            balance: account.balance,
            bet: gamestate.bet,
            coin_value: gamestate.coin_value,
            reels: gamestate.last_outcome,
        })
    }

    /// Spins once: validates and debits the stake, evaluates the outcome and
    /// settles stake, payout and gamestate as one ledger commit.
    pub async fn bet(&self, req: &BetRequest) -> Result<WagerReceipt, WagerError> {
        let span = info_span!("wager", game = %req.game_id, account = field::Empty);
        async move {
            let mut tx = WagerTransaction::begin();
            let result = self.run(req, &mut tx).await;
            match &result {
                Ok(receipt) => {
                    tx.advance(WagerState::Done);
                    info!(
                        "stake {} paid {} on {} lines, balance {}",
                        receipt.stake,
                        receipt.result.total_payout,
                        receipt.result.lines.len(),
                        receipt.balance
                    );
                }
                Err(e) if e.is_rejection() => {
                    tx.advance(WagerState::Rejected);
                    info!("wager rejected ({}): {}", e.reason(), e);
                }
                Err(e) => error!("wager failed while {}: {}", tx.state, e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, req: &BetRequest, tx: &mut WagerTransaction) -> Result<WagerReceipt, WagerError> {
        let def = self.game(&req.game_id)?;
        let stake = def
            .stake(req.bet, req.coin_value)
            .ok_or_else(|| WagerError::InvalidBet("stake exceeds the representable range".to_string()))?;
        validate_bet(req, stake)?;

        let guard = tokio::time::timeout(self.ledger_timeout, self.locks.acquire(&req.key))
            .await
            .map_err(|_| LedgerError::Timeout(self.ledger_timeout))?;
        let account = self.resolve(&req.key).await?;
        Span::current().record("account", field::display(account.id));
        if account.balance < stake {
            return Err(WagerError::InsufficientFunds {
                balance: account.balance,
                stake,
            });
        }

        tx.advance(WagerState::Spinning);
        let outcome = self.spinner.spin(&def);

        tx.advance(WagerState::Evaluating);
        let lines = evaluate(&def, &outcome, stake);
        let payout = total_payout(&lines);

        tx.advance(WagerState::Settling);
        let settlement = WagerSettlement {
            account_id: account.id,
            game_id: req.game_id.clone(),
            stake,
            payout,
            bet: req.bet,
            coin_value: req.coin_value,
            outcome: outcome.clone(),
        };

        // The commit runs detached so a dropped caller cannot interrupt it.
        // It keeps the account lock until the ledger has answered, and its
        // answer is the one reported: the ledger bounds its own commit.
        let ledger = self.ledger.clone();
        let started = Instant::now();
        let commit = tokio::spawn(async move {
            let _guard = guard;
            ledger.commit_wager(&settlement).await
        });
        let balance = commit.await.map_err(LedgerError::from)??;
        if started.elapsed() > self.ledger_timeout {
            warn!("settlement for account {} took {:?}", account.id, started.elapsed());
        }

        Ok(WagerReceipt {
            result: WagerResult {
                outcome,
                lines,
                total_payout: payout,
            },
            stake,
            balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use axum::async_trait;
    use reelhouse_shared::SeededSpinner;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Replays queued outcomes, then repeats a losing one.
    #[derive(Default)]
    struct ScriptedSpinner {
        outcomes: Mutex<VecDeque<ReelOutcome>>,
    }

    impl ScriptedSpinner {
        fn with(outcomes: Vec<ReelOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
            }
        }
    }

    impl ReelSpinner for ScriptedSpinner {
        fn spin(&self, _def: &GameDefinition) -> ReelOutcome {
            self.outcomes.lock().unwrap().pop_front().unwrap_or_else(losing_outcome)
        }
    }

    fn losing_outcome() -> ReelOutcome {
        (1..=5).map(|symbol| vec![symbol; 4]).collect()
    }

    fn jackpot_of_sevens() -> ReelOutcome {
        vec![vec![7; 4]; 5]
    }

    enum Fault {
        FailCommit,
        SlowCommit(Duration),
        AmbiguousLookup,
    }

    struct FaultyLedger {
        inner: MemoryLedger,
        fault: Fault,
    }

    #[async_trait]
    impl Ledger for FaultyLedger {
        async fn find_account_by_key(&self, key: &str) -> Result<Option<Account>, LedgerError> {
            match self.fault {
                Fault::AmbiguousLookup => Err(LedgerError::AmbiguousKey(2)),
                _ => self.inner.find_account_by_key(key).await,
            }
        }

        async fn create_account(&self, username: &str, balance: Money, key: &str) -> Result<Account, LedgerError> {
            self.inner.create_account(username, balance, key).await
        }

        async fn record_login(&self, account_id: Uuid) -> Result<(), LedgerError> {
            self.inner.record_login(account_id).await
        }

        async fn update_balance(&self, account_id: Uuid, balance: Money) -> Result<(), LedgerError> {
            self.inner.update_balance(account_id, balance).await
        }

        async fn get_or_create_gamestate(
            &self,
            account_id: Uuid,
            game_id: &str,
            default: Gamestate,
        ) -> Result<Gamestate, LedgerError> {
            self.inner.get_or_create_gamestate(account_id, game_id, default).await
        }

        async fn update_gamestate(&self, gamestate: &Gamestate) -> Result<(), LedgerError> {
            self.inner.update_gamestate(gamestate).await
        }

        async fn commit_wager(&self, settlement: &WagerSettlement) -> Result<Money, LedgerError> {
            match self.fault {
                Fault::FailCommit => Err(LedgerError::Database(sqlx::Error::PoolTimedOut)),
                Fault::SlowCommit(delay) => {
                    tokio::time::sleep(delay).await;
                    self.inner.commit_wager(settlement).await
                }
                Fault::AmbiguousLookup => self.inner.commit_wager(settlement).await,
            }
        }
    }

    fn service(ledger: Arc<dyn Ledger>, spinner: impl ReelSpinner + 'static) -> WagerService {
        let games = Arc::new(GameRegistry::builtin().unwrap());
        WagerService::new(ledger, Arc::new(spinner), games, Duration::from_millis(200))
    }

    fn bet(key: &str, game_id: &str, bet: u32, coin_value: Money) -> BetRequest {
        BetRequest {
            key: key.to_string(),
            game_id: game_id.to_string(),
            bet,
            coin_value,
        }
    }

    async fn balance(ledger: &dyn Ledger, key: &str) -> Money {
        ledger.find_account_by_key(key).await.unwrap().unwrap().balance
    }

    #[tokio::test]
    async fn test_winning_spin_settles_payout() {
        let ledger = Arc::new(MemoryLedger::new());
        let account = ledger.create_account("Guest", dec!(10000.00), "k").await.unwrap();
        let wagers = service(ledger.clone(), ScriptedSpinner::with(vec![jackpot_of_sevens()]));

        // 9 lines x 1 coin x 0.10 = 0.90 stake, each line pays 0.90 x 5.5
        let receipt = wagers.bet(&bet("k", "rock-climber", 1, dec!(0.10))).await.unwrap();
        assert_eq!(receipt.stake, dec!(0.90));
        assert_eq!(receipt.result.lines.len(), 9);
        assert!(receipt.result.lines.iter().all(|l| l.amount == dec!(4.95) && l.match_count == 5));
        assert_eq!(receipt.result.total_payout, dec!(44.55));
        assert_eq!(receipt.balance, dec!(10043.65));
        assert_eq!(balance(ledger.as_ref(), "k").await, dec!(10043.65));

        let stored = ledger.gamestate(account.id, "rock-climber").await.unwrap();
        assert_eq!(stored.last_outcome, jackpot_of_sevens());
        assert_eq!(stored.bet, 1);
        assert_eq!(stored.coin_value, dec!(0.10));

        let response = BetResponse::from(receipt);
        assert!(response.is_win);
        assert_eq!(response.total_win, dec!(44.55));
    }

    #[tokio::test]
    async fn test_losing_spin_only_debits_stake() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.create_account("Guest", dec!(100), "k").await.unwrap();
        let wagers = service(ledger.clone(), ScriptedSpinner::default());

        let receipt = wagers.bet(&bet("k", "egyptian-treasures", 2, dec!(0.25))).await.unwrap();
        assert_eq!(receipt.stake, dec!(10.00));
        assert!(receipt.result.lines.is_empty());
        assert_eq!(receipt.result.total_payout, dec!(0));
        assert_eq!(receipt.balance, dec!(90.00));
        assert!(!BetResponse::from(receipt).is_win);
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_account_untouched() {
        let ledger = Arc::new(MemoryLedger::new());
        let account = ledger.create_account("Guest", dec!(50), "k").await.unwrap();
        let wagers = service(ledger.clone(), ScriptedSpinner::with(vec![jackpot_of_sevens()]));

        // 20 lines x 30 coins x 0.10 = 60
        let err = wagers.bet(&bet("k", "egyptian-treasures", 30, dec!(0.10))).await.unwrap_err();
        match err {
            WagerError::InsufficientFunds { balance, stake } => {
                assert_eq!(balance, dec!(50));
                assert_eq!(stake, dec!(60.00));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(balance(ledger.as_ref(), "k").await, dec!(50));
        assert!(ledger.gamestate(account.id, "egyptian-treasures").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_wagers_cannot_overdraw() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.create_account("Guest", dec!(1.00), "k").await.unwrap();
        let wagers = Arc::new(service(ledger.clone(), ScriptedSpinner::default()));

        let spins: Vec<_> = (0..2)
            .map(|_| {
                let wagers = wagers.clone();
                tokio::spawn(async move { wagers.bet(&bet("k", "rock-climber", 1, dec!(0.10))).await })
            })
            .collect();

        let mut settled = 0;
        let mut rejected = 0;
        for spin in spins {
            match spin.await.unwrap() {
                Ok(_) => settled += 1,
                Err(WagerError::InsufficientFunds { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!((settled, rejected), (1, 1));
        assert_eq!(balance(ledger.as_ref(), "k").await, dec!(0.10));
    }

    #[tokio::test]
    async fn test_rejections_before_spinning() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.create_account("Guest", dec!(100), "k").await.unwrap();
        let wagers = service(ledger.clone(), ScriptedSpinner::default());

        let err = wagers.bet(&bet("missing", "rock-climber", 1, dec!(0.10))).await.unwrap_err();
        assert!(matches!(err, WagerError::AccountNotFound));

        let err = wagers.bet(&bet("k", "lucky-sevens", 1, dec!(0.10))).await.unwrap_err();
        assert!(matches!(err, WagerError::UnknownGame(id) if id == "lucky-sevens"));

        let err = wagers.bet(&bet("k", "rock-climber", 0, dec!(0.10))).await.unwrap_err();
        assert!(matches!(err, WagerError::InvalidBet(_)));

        let err = wagers.bet(&bet("k", "rock-climber", 1, dec!(0))).await.unwrap_err();
        assert!(matches!(err, WagerError::InvalidBet(_)));

        let err = wagers.bet(&bet("k", "rock-climber", 1, dec!(0.0001))).await.unwrap_err();
        assert!(matches!(err, WagerError::InvalidBet(_)));

        assert_eq!(balance(ledger.as_ref(), "k").await, dec!(100));
    }

    #[tokio::test]
    async fn test_failed_commit_changes_nothing() {
        let ledger = Arc::new(FaultyLedger {
            inner: MemoryLedger::new(),
            fault: Fault::FailCommit,
        });
        let account = ledger.create_account("Guest", dec!(100), "k").await.unwrap();
        let wagers = service(ledger.clone(), ScriptedSpinner::with(vec![jackpot_of_sevens()]));

        let err = wagers.bet(&bet("k", "rock-climber", 1, dec!(0.10))).await.unwrap_err();
        assert!(matches!(err, WagerError::Persistence(LedgerError::Database(_))));
        assert_eq!(err.reason(), "persistence-error");
        assert_eq!(balance(ledger.as_ref(), "k").await, dec!(100));
        assert!(ledger.inner.gamestate(account.id, "rock-climber").await.is_none());
    }

    #[tokio::test]
    async fn test_slow_commit_reports_what_it_settled() {
        let ledger = Arc::new(FaultyLedger {
            inner: MemoryLedger::new(),
            fault: Fault::SlowCommit(Duration::from_millis(400)),
        });
        let account = ledger.create_account("Guest", dec!(100), "k").await.unwrap();
        let wagers = service(ledger.clone(), ScriptedSpinner::default());

        // The commit outlives the 200ms deadline but still lands, so it is reported as settled.
        let receipt = wagers.bet(&bet("k", "rock-climber", 1, dec!(0.10))).await.unwrap();
        assert_eq!(receipt.balance, dec!(99.10));
        assert_eq!(balance(ledger.as_ref(), "k").await, receipt.balance);
        let stored = ledger.inner.gamestate(account.id, "rock-climber").await.unwrap();
        assert_eq!(stored.last_outcome, receipt.result.outcome);
    }

    #[tokio::test]
    async fn test_waiting_on_a_held_account_times_out() {
        let ledger = Arc::new(FaultyLedger {
            inner: MemoryLedger::new(),
            fault: Fault::SlowCommit(Duration::from_millis(600)),
        });
        ledger.create_account("Guest", dec!(100), "k").await.unwrap();
        let wagers = Arc::new(service(ledger.clone(), ScriptedSpinner::default()));

        let first = {
            let wagers = wagers.clone();
            tokio::spawn(async move { wagers.bet(&bet("k", "rock-climber", 1, dec!(0.10))).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = wagers.bet(&bet("k", "rock-climber", 1, dec!(0.10))).await.unwrap_err();
        assert!(matches!(err, WagerError::Persistence(LedgerError::Timeout(_))));
        assert_eq!(err.reason(), "persistence-error");

        let receipt = first.await.unwrap().unwrap();
        assert_eq!(receipt.balance, dec!(99.10));
        assert_eq!(balance(ledger.as_ref(), "k").await, dec!(99.10));
    }

    #[tokio::test]
    async fn test_unrepresentable_stake_is_invalid_bet() {
        let ledger = Arc::new(MemoryLedger::new());
        let account = ledger.create_account("Guest", dec!(100), "k").await.unwrap();
        let wagers = service(ledger.clone(), ScriptedSpinner::default());

        let req = bet("k", "egyptian-treasures", u32::MAX, dec!(100000000000000000000));
        let err = wagers.bet(&req).await.unwrap_err();
        assert!(matches!(err, WagerError::InvalidBet(_)));
        assert_eq!(err.reason(), "invalid-bet");
        assert_eq!(balance(ledger.as_ref(), "k").await, dec!(100));
        assert!(ledger.gamestate(account.id, "egyptian-treasures").await.is_none());
    }

    #[tokio::test]
    async fn test_ambiguous_key_is_reported() {
        let ledger = Arc::new(FaultyLedger {
            inner: MemoryLedger::new(),
            fault: Fault::AmbiguousLookup,
        });
        let wagers = service(ledger, ScriptedSpinner::default());
        let err = wagers.bet(&bet("k", "rock-climber", 1, dec!(0.10))).await.unwrap_err();
        assert!(matches!(err, WagerError::AmbiguousAccount(2)));
    }

    #[tokio::test]
    async fn test_gamestate_is_created_once_with_defaults() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.create_account("Guest", dec!(100), "k").await.unwrap();
        let wagers = service(ledger.clone(), SeededSpinner::new(7));
        let req = GamestateRequest {
            key: "k".to_string(),
            game_id: "egyptian-treasures".to_string(),
        };

        let first = wagers.gamestate(&req).await.unwrap();
        assert_eq!(first.balance, dec!(100));
        assert_eq!(first.bet, 10);
        assert_eq!(first.coin_value, dec!(0.10));
        assert_eq!(first.reels.len(), 5);
        assert!(first.reels.iter().all(|reel| reel.len() == 4));

        let second = wagers.gamestate(&req).await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_gamestate_reflects_last_wager() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.create_account("Guest", dec!(100), "k").await.unwrap();
        let wagers = service(ledger.clone(), SeededSpinner::new(99));

        let receipt = wagers.bet(&bet("k", "rock-climber", 3, dec!(0.05))).await.unwrap();
        assert_eq!(receipt.balance, dec!(100) - receipt.stake + receipt.result.total_payout);

        let state = wagers
            .gamestate(&GamestateRequest {
                key: "k".to_string(),
                game_id: "rock-climber".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(state.balance, receipt.balance);
        assert_eq!(state.bet, 3);
        assert_eq!(state.coin_value, dec!(0.05));
        assert_eq!(state.reels, receipt.result.outcome);
    }
}
