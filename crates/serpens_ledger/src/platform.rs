//! # The Platform
//!
//! **Single Owner of the Ledger**
//!
//! [`Platform`] owns the ledger state, the configuration, the clock, the
//! referral-code RNG and the store. Every public operation is either a read
//! of the current state or a [`Command`] run through [`Platform::execute`]:
//!
//! 1. Clone the state
//! 2. Apply the command to the clone
//! 3. On success swap the clone in and append a snapshot to the store
//!
//! ## Failure Modes
//!
//! - Command fails: state untouched, error returned
//! - Store fails: warning logged, store dropped, platform keeps running in
//!   memory (see [`Platform::is_degraded`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut platform = Platform::open("ledger.sflg", LedgerConfig::default())?;
//! platform.sign_up(SignUpRequest::new("alice", "alice@example.com", "pw"))?;
//! platform.login("alice", "pw")?;
//! let deposit_id = platform.deposit(Money::from_whole(100), "receipt-001.png")?;
//! platform.approve_transaction(&deposit_id, TransactionKind::Deposit)?;
//! ```

use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::account::{Account, AccountStatus, ReferralStats, UserId};
use crate::admin::{self, DashboardSummary, OwnedRecord, PlayerSummary};
use crate::catalog::{GameTable, StoreItem};
use crate::clock::{Clock, SystemClock};
use crate::command::{
    AddObstacleShields, AddRevives, Command, CommandContext, EnterTable, Earn, FinishRound,
    Login, Logout, Purchase, RefreshEligibility, RequestWithdrawal, SetUserStatus, Settle,
    SignUp, Spend, SubmitDeposit, UseObstacleShield, UseRevive,
};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;
use crate::referral::{self, ReferrerSummary, WithdrawalStatus};
use crate::session::{SignUpOutcome, SignUpRequest};
use crate::state::LedgerState;
use crate::store::{JournalStore, StateStore};
use crate::transaction::{
    self, Decision, Deposit, Settlement, TransactionKind, TransactionView, Withdrawal,
};

/// The ledger service.
pub struct Platform {
    /// Current committed state.
    state: LedgerState,
    /// Platform constants.
    config: LedgerConfig,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Referral code randomness.
    rng: StdRng,
    /// Durable store. `None` once degraded or when running in memory.
    store: Option<Box<dyn StateStore>>,
    /// Set when a store failure forced in-memory operation.
    degraded: bool,
    /// Snapshots written since the store was last compacted.
    snapshots_since_compact: u64,
}

impl Platform {
    /// Creates an empty in-memory platform.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidConfig` if the config does not validate.
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self {
            state: LedgerState::new(),
            config,
            clock: Arc::new(SystemClock),
            rng: StdRng::from_entropy(),
            store: None,
            degraded: false,
            snapshots_since_compact: 0,
        })
    }

    /// Creates a platform backed by `store`, resuming from its newest snapshot.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidConfig` for a bad config, or the store's
    /// error if the existing state cannot be read.
    pub fn with_store(store: Box<dyn StateStore>, config: LedgerConfig) -> LedgerResult<Self> {
        let mut platform = Self::new(config)?;
        if let Some(state) = store.load()? {
            tracing::info!(
                "resumed ledger from {}: {} users, {} deposits, {} withdrawals",
                store.describe(),
                state.users.len(),
                state.deposits.len(),
                state.withdrawals.len()
            );
            platform.state = state;
        }
        platform.store = Some(store);
        Ok(platform)
    }

    /// Creates an in-memory platform holding `state`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidConfig` if the config does not validate.
    pub fn from_state(state: LedgerState, config: LedgerConfig) -> LedgerResult<Self> {
        let mut platform = Self::new(config)?;
        platform.state = state;
        Ok(platform)
    }

    /// Opens (or creates) a journal file and resumes from it.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` or `LedgerError::CorruptJournal` if the
    /// journal cannot be used.
    pub fn open(path: impl AsRef<Path>, config: LedgerConfig) -> LedgerResult<Self> {
        let store = JournalStore::open(path)?;
        Self::with_store(Box::new(store), config)
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Makes referral codes reproducible.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // ========================================================================
    // Core
    // ========================================================================

    /// Runs a command against a copy of the state and commits it on success.
    ///
    /// # Errors
    ///
    /// Whatever the command returns. The state is unchanged on error.
    pub fn execute<C: Command>(&mut self, command: C) -> LedgerResult<C::Output> {
        let mut next = self.state.clone();
        let mut ctx = CommandContext {
            config: &self.config,
            now: self.clock.now(),
            rng: &mut self.rng,
        };

        match command.apply(&mut next, &mut ctx) {
            Ok(output) => {
                if next != self.state {
                    self.state = next;
                    self.persist(C::NAME);
                }
                tracing::debug!("{} committed", C::NAME);
                Ok(output)
            }
            Err(e) => {
                tracing::debug!("{} rejected: {e}", C::NAME);
                Err(e)
            }
        }
    }

    /// Runs a command whose only failure worth reporting is a business rule;
    /// "nobody logged in" is treated as success.
    fn execute_for_active<C: Command<Output = ()>>(&mut self, command: C) -> LedgerResult<()> {
        match self.execute(command) {
            Err(LedgerError::NoActiveUser) => Ok(()),
            other => other,
        }
    }

    fn persist(&mut self, command: &str) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&self.state) {
            tracing::warn!(
                "{command}: writing to {} failed, continuing in memory: {e}",
                store.describe()
            );
            self.store = None;
            self.degraded = true;
            return;
        }

        self.snapshots_since_compact += 1;
        let threshold = self.config.compact_after_snapshots;
        if threshold == 0 || self.snapshots_since_compact < threshold {
            return;
        }
        if let Err(e) = store.compact() {
            tracing::warn!(
                "{command}: compacting {} failed, continuing in memory: {e}",
                store.describe()
            );
            self.store = None;
            self.degraded = true;
            return;
        }
        self.snapshots_since_compact = 0;
    }

    /// True if a store failure switched the platform to memory-only mode.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// True if committed commands are being written to a store.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Compacts the backing store now instead of waiting for
    /// `compact_after_snapshots` commits.
    ///
    /// # Errors
    ///
    /// Returns the store's error. The in-memory state is unaffected.
    pub fn compact(&mut self) -> LedgerResult<()> {
        if let Some(store) = &self.store {
            store.compact()?;
            self.snapshots_since_compact = 0;
        }
        Ok(())
    }

    /// Current committed state.
    #[must_use]
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Platform constants.
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Logs in by email or username.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidCredentials` on any mismatch or suspension.
    pub fn login(&mut self, identifier: &str, password: &str) -> LedgerResult<UserId> {
        self.execute(Login {
            identifier,
            password,
        })
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::DuplicateEmail` or `LedgerError::DuplicateUsername`.
    pub fn sign_up(&mut self, request: SignUpRequest) -> LedgerResult<SignUpOutcome> {
        let outcome = self.execute(SignUp(request))?;
        tracing::info!("new account {} (referred: {})", outcome.user_id, outcome.referred);
        Ok(outcome)
    }

    /// Ends the session, if any.
    pub fn logout(&mut self) {
        // Logout cannot fail.
        let _ = self.execute(Logout);
    }

    /// The logged-in account.
    #[must_use]
    pub fn current_user(&self) -> Option<&Account> {
        self.state.active_user()
    }

    // ========================================================================
    // Wallet
    // ========================================================================

    /// Debits the active user's balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoActiveUser` or `LedgerError::InsufficientBalance`.
    pub fn spend(&mut self, amount: Money) -> LedgerResult<()> {
        self.execute(Spend(amount))
    }

    /// Credits the active user's balance. Zero amounts and a missing session
    /// are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ArithmeticOverflow` if the balance would overflow.
    pub fn earn(&mut self, amount: Money) -> LedgerResult<()> {
        self.execute_for_active(Earn(amount))
    }

    /// Files a pending deposit and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoActiveUser`, `InvalidAmount` or `MissingProof`.
    pub fn deposit(&mut self, amount: Money, proof: &str) -> LedgerResult<String> {
        self.execute(SubmitDeposit { amount, proof })
    }

    /// Requests a withdrawal and returns its id.
    ///
    /// Refreshes the unlock stamp first, so an account that just became
    /// eligible starts its cooldown even if this request is refused.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoActiveUser`, `InvalidAmount`, `MissingAddress`,
    /// `WithdrawalLocked`, `WithdrawalCoolingDown` or `InsufficientBalance`.
    pub fn withdraw(&mut self, amount: Money, address: &str) -> LedgerResult<String> {
        self.execute(RefreshEligibility)?;
        self.execute(RequestWithdrawal { amount, address })
    }

    /// The active user's deposits and withdrawals, newest first.
    #[must_use]
    pub fn transactions(&self) -> Vec<TransactionView> {
        self.state
            .active_user_id
            .as_deref()
            .map(|id| transaction::transactions_for(&self.state, id))
            .unwrap_or_default()
    }

    // ========================================================================
    // Inventory and Games
    // ========================================================================

    /// Adds revives to the active user.
    ///
    /// # Errors
    ///
    /// Never fails in practice; a missing session is a no-op.
    pub fn add_revives(&mut self, count: u32) -> LedgerResult<()> {
        self.execute_for_active(AddRevives(count))
    }

    /// Consumes one revive and returns how many remain.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoActiveUser` or `LedgerError::InventoryEmpty`.
    pub fn use_revive(&mut self) -> LedgerResult<u32> {
        self.execute(UseRevive)
    }

    /// Adds one obstacle shield to the active user.
    ///
    /// # Errors
    ///
    /// Never fails in practice; a missing session is a no-op.
    pub fn add_obstacle_shield(&mut self) -> LedgerResult<()> {
        self.execute_for_active(AddObstacleShields(1))
    }

    /// Consumes one obstacle shield and returns how many remain.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoActiveUser` or `LedgerError::InventoryEmpty`.
    pub fn use_obstacle_shield(&mut self) -> LedgerResult<u32> {
        self.execute(UseObstacleShield)
    }

    /// Records a finished round.
    ///
    /// # Errors
    ///
    /// Never fails in practice; a missing session is a no-op.
    pub fn record_game_result(&mut self, won: bool) -> LedgerResult<()> {
        self.finish_round(won, Money::ZERO)
    }

    /// Records a finished round and credits its winnings together.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ArithmeticOverflow` if the balance would overflow.
    pub fn finish_round(&mut self, won: bool, winnings: Money) -> LedgerResult<()> {
        self.execute_for_active(FinishRound { won, winnings })
    }

    /// Buys a store item.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoActiveUser`, `ItemNotFound` or `InsufficientBalance`.
    pub fn purchase(&mut self, item_id: &str) -> LedgerResult<StoreItem> {
        self.execute(Purchase(item_id))
    }

    /// Pays a table's bet. Free tables cost nothing.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoActiveUser`, `TableNotFound` or `InsufficientBalance`.
    pub fn enter_table(&mut self, table_id: u32) -> LedgerResult<GameTable> {
        self.execute(EnterTable(table_id))
    }

    /// Purchasable items.
    #[must_use]
    pub fn store_items(&self) -> &[StoreItem] {
        &self.config.store_items
    }

    /// Lobby tables.
    #[must_use]
    pub fn game_tables(&self) -> &[GameTable] {
        &self.config.game_tables
    }

    // ========================================================================
    // Referrals
    // ========================================================================

    /// The active user's referral summary. Empty without a session.
    #[must_use]
    pub fn referral_stats(&self) -> ReferralStats {
        self.current_user()
            .map(Account::referral_stats)
            .unwrap_or_default()
    }

    /// The active user's qualifying referrals. Zero without a session.
    #[must_use]
    pub fn qualifying_referrals_count(&self) -> u32 {
        self.current_user().map_or(0, |u| {
            referral::qualifying_referrals_count(&self.state, &self.config, u)
        })
    }

    /// The active user's withdrawal status, read-only.
    #[must_use]
    pub fn withdrawal_status(&self) -> Option<WithdrawalStatus> {
        let now = self.clock.now();
        self.current_user()
            .map(|u| referral::withdrawal_status(&self.state, &self.config, u, now))
    }

    /// Stamps the active user's unlock time if newly eligible and returns
    /// the resulting status.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoActiveUser` without a session.
    pub fn withdrawal_eligibility(&mut self) -> LedgerResult<WithdrawalStatus> {
        self.execute(RefreshEligibility)
    }

    // ========================================================================
    // Admin
    // ========================================================================

    /// Every account, in signup order.
    #[must_use]
    pub fn all_users(&self) -> &[Account] {
        &self.state.users
    }

    /// Every deposit joined with its owner.
    #[must_use]
    pub fn all_deposits(&self) -> Vec<OwnedRecord<Deposit>> {
        admin::deposits_with_owners(&self.state)
    }

    /// Every withdrawal joined with its owner.
    #[must_use]
    pub fn all_withdrawals(&self) -> Vec<OwnedRecord<Withdrawal>> {
        admin::withdrawals_with_owners(&self.state)
    }

    /// Suspends or reactivates an account. Returns true if it changed.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` for an unknown id.
    pub fn update_user_status(
        &mut self,
        user_id: &str,
        status: AccountStatus,
    ) -> LedgerResult<bool> {
        let changed = self.execute(SetUserStatus { user_id, status })?;
        if changed {
            tracing::info!("account {user_id} is now {status:?}");
        }
        Ok(changed)
    }

    /// Approves a pending deposit or withdrawal.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::TransactionNotFound` for an unknown id.
    pub fn approve_transaction(
        &mut self,
        id: &str,
        kind: TransactionKind,
    ) -> LedgerResult<Settlement> {
        self.settle(id, kind, Decision::Approve)
    }

    /// Rejects a pending deposit or withdrawal.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::TransactionNotFound` for an unknown id.
    pub fn reject_transaction(
        &mut self,
        id: &str,
        kind: TransactionKind,
    ) -> LedgerResult<Settlement> {
        self.settle(id, kind, Decision::Reject)
    }

    fn settle(
        &mut self,
        id: &str,
        kind: TransactionKind,
        decision: Decision,
    ) -> LedgerResult<Settlement> {
        let settlement = self.execute(Settle { kind, id, decision })?;
        match settlement {
            Settlement::Applied(status) => tracing::info!("{kind} {id} {status}"),
            Settlement::AlreadySettled(status) => {
                tracing::debug!("{kind} {id} already {status}, ignoring {decision:?}");
            }
        }
        Ok(settlement)
    }

    /// Dashboard headline numbers.
    #[must_use]
    pub fn dashboard(&self) -> DashboardSummary {
        admin::dashboard(&self.state, &self.config)
    }

    /// Referrers by commission earned.
    #[must_use]
    pub fn top_referrers(&self) -> Vec<ReferrerSummary> {
        referral::top_referrers(&self.state, self.config.leaderboard_size)
    }

    /// Players by balance.
    #[must_use]
    pub fn top_players(&self) -> Vec<PlayerSummary> {
        admin::top_players(&self.state, self.config.leaderboard_size)
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("users", &self.state.users.len())
            .field("active_user_id", &self.state.active_user_id)
            .field("store", &self.store.as_ref().map(|s| s.describe()))
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn platform() -> Platform {
        Platform::new(LedgerConfig::default())
            .unwrap()
            .with_rng_seed(42)
    }

    fn signed_in(platform: &mut Platform, name: &str) -> SignUpOutcome {
        let outcome = platform
            .sign_up(SignUpRequest::new(name, &format!("{name}@x.io"), "pw"))
            .unwrap();
        platform.login(name, "pw").unwrap();
        outcome
    }

    #[test]
    fn test_failed_command_leaves_state() {
        let mut platform = platform();
        signed_in(&mut platform, "alice");
        let before = platform.state().clone();

        assert!(platform.spend(Money::from_whole(6)).is_err());
        assert!(platform.withdraw(Money::ONE, "0xabc").is_err());
        assert!(platform.deposit(Money::ZERO, "p").is_err());
        assert_eq!(platform.state(), &before);
    }

    #[test]
    fn test_void_ops_without_session_are_noops() {
        let mut platform = platform();
        platform.sign_up(SignUpRequest::new("alice", "a@x.io", "pw")).unwrap();
        let before = platform.state().clone();

        assert_eq!(platform.earn(Money::ONE), Ok(()));
        assert_eq!(platform.add_revives(3), Ok(()));
        assert_eq!(platform.add_obstacle_shield(), Ok(()));
        assert_eq!(platform.record_game_result(true), Ok(()));
        assert_eq!(platform.spend(Money::ONE), Err(LedgerError::NoActiveUser));
        assert_eq!(platform.use_revive(), Err(LedgerError::NoActiveUser));
        assert_eq!(platform.state(), &before);
        assert_eq!(platform.referral_stats(), ReferralStats::default());
        assert_eq!(platform.qualifying_referrals_count(), 0);
        assert!(platform.transactions().is_empty());
    }

    #[test]
    fn test_spend_and_earn() {
        let mut platform = platform();
        signed_in(&mut platform, "alice");
        platform.spend(Money::from_whole(2)).unwrap();
        platform.earn(Money::from_cents(150)).unwrap();
        assert_eq!(
            platform.current_user().unwrap().wallet.balance,
            Money::from_cents(450)
        );
    }

    #[test]
    fn test_store_failure_degrades_to_memory() {
        let store = Arc::new(MemoryStore::new());
        let config = LedgerConfig::default();
        let mut platform = Platform::with_store(Box::new(Arc::clone(&store)), config)
            .unwrap()
            .with_rng_seed(1);

        signed_in(&mut platform, "alice");
        assert!(platform.is_persistent());
        let saved = store.save_count();

        store.set_fail_writes(true);
        platform.earn(Money::ONE).unwrap();
        assert!(platform.is_degraded());
        assert!(!platform.is_persistent());

        // Still fully functional in memory.
        platform.earn(Money::ONE).unwrap();
        assert_eq!(
            platform.current_user().unwrap().wallet.balance,
            Money::from_whole(7)
        );
        assert_eq!(store.save_count(), saved);
    }

    #[test]
    fn test_noop_command_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut platform =
            Platform::with_store(Box::new(Arc::clone(&store)), LedgerConfig::default()).unwrap();
        platform.logout();
        platform.earn(Money::ONE).unwrap();
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_compacts_every_configured_snapshots() {
        let store = Arc::new(MemoryStore::new());
        let config = LedgerConfig {
            compact_after_snapshots: 3,
            ..LedgerConfig::default()
        };
        let mut platform = Platform::with_store(Box::new(Arc::clone(&store)), config).unwrap();

        // Sign-up and login are the first two snapshots.
        signed_in(&mut platform, "alice");
        for _ in 0..5 {
            platform.earn(Money::ONE).unwrap();
        }
        assert_eq!(store.save_count(), 7);
        assert_eq!(store.compaction_count(), 2);

        platform.compact().unwrap();
        platform.earn(Money::ONE).unwrap();
        platform.earn(Money::ONE).unwrap();
        assert_eq!(store.compaction_count(), 3);
        assert!(platform.is_persistent());
    }

    #[test]
    fn test_zero_threshold_never_compacts() {
        let store = Arc::new(MemoryStore::new());
        let config = LedgerConfig {
            compact_after_snapshots: 0,
            ..LedgerConfig::default()
        };
        let mut platform = Platform::with_store(Box::new(Arc::clone(&store)), config).unwrap();
        signed_in(&mut platform, "alice");
        for _ in 0..10 {
            platform.earn(Money::ONE).unwrap();
        }
        assert_eq!(store.compaction_count(), 0);
    }

    #[test]
    fn test_withdrawal_status_follows_clock() {
        let start = Utc.with_ymd_and_hms(2024, 9, 1, 10, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let mut platform = platform().with_clock(clock.clone());

        let alice = signed_in(&mut platform, "alice");
        for i in 0..5 {
            let name = format!("friend{i}");
            platform
                .sign_up(
                    SignUpRequest::new(&name, &format!("{name}@x.io"), "pw")
                        .with_referral_code(&alice.referral_code),
                )
                .unwrap();
            platform.login(&name, "pw").unwrap();
            let id = platform.deposit(Money::from_whole(100), "proof").unwrap();
            platform.approve_transaction(&id, TransactionKind::Deposit).unwrap();
        }

        platform.login("alice", "pw").unwrap();
        assert_eq!(
            platform.withdrawal_status(),
            Some(WithdrawalStatus::CoolingDown {
                qualifying: 5,
                unlocks_at: start + Duration::minutes(5),
            })
        );
        clock.advance(Duration::minutes(5));
        assert_eq!(
            platform.withdrawal_status(),
            Some(WithdrawalStatus::Ready { qualifying: 5 })
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LedgerConfig {
            withdrawal_fee_bp: 20_000,
            ..LedgerConfig::default()
        };
        assert!(matches!(
            Platform::new(config),
            Err(LedgerError::InvalidConfig(_))
        ));
    }
}
