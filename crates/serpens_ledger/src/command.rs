//! # Ledger Commands
//!
//! Every mutation of the ledger is a [`Command`]: a value that transforms a
//! [`LedgerState`] in place and either returns an output or fails.
//!
//! The platform applies each command to a scratch clone of the state and
//! swaps the clone in only on success. Commands are therefore free to fail
//! halfway; a failed command never leaves a trace.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;

use crate::account::{AccountStatus, UserId};
use crate::admin::set_user_status;
use crate::catalog::{GameTable, StoreItem};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;
use crate::referral::{refresh_unlock, withdrawal_status, WithdrawalStatus};
use crate::session::{login, logout, sign_up, SignUpOutcome, SignUpRequest};
use crate::state::LedgerState;
use crate::transaction::{
    request_withdrawal, settle, submit_deposit, Decision, Settlement, TransactionKind,
};

/// Everything a command may read besides the state.
pub struct CommandContext<'a> {
    /// Platform constants.
    pub config: &'a LedgerConfig,
    /// Time of execution, read once per command.
    pub now: DateTime<Utc>,
    /// Randomness for referral codes.
    pub rng: &'a mut StdRng,
}

/// A state transform.
pub trait Command {
    /// Value returned on success.
    type Output;

    /// Name used in logs.
    const NAME: &'static str;

    /// Applies the command.
    ///
    /// # Errors
    ///
    /// Any `LedgerError`; the caller discards the modified state.
    fn apply(self, state: &mut LedgerState, ctx: &mut CommandContext<'_>)
        -> LedgerResult<Self::Output>;
}

/// Id of the logged-in account.
fn active_id(state: &LedgerState) -> LedgerResult<UserId> {
    state
        .active_user()
        .map(|u| u.id.clone())
        .ok_or(LedgerError::NoActiveUser)
}

/// Registers an account.
pub struct SignUp(pub SignUpRequest);

impl Command for SignUp {
    type Output = SignUpOutcome;
    const NAME: &'static str = "sign_up";

    fn apply(
        self,
        state: &mut LedgerState,
        ctx: &mut CommandContext<'_>,
    ) -> LedgerResult<SignUpOutcome> {
        sign_up(state, ctx.config, ctx.rng, &self.0, ctx.now)
    }
}

/// Opens a session.
pub struct Login<'a> {
    /// Email or username.
    pub identifier: &'a str,
    /// Password.
    pub password: &'a str,
}

impl Command for Login<'_> {
    type Output = UserId;
    const NAME: &'static str = "login";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<UserId> {
        login(state, self.identifier, self.password)
    }
}

/// Closes the session.
pub struct Logout;

impl Command for Logout {
    type Output = Option<UserId>;
    const NAME: &'static str = "logout";

    fn apply(
        self,
        state: &mut LedgerState,
        _ctx: &mut CommandContext<'_>,
    ) -> LedgerResult<Option<UserId>> {
        Ok(logout(state))
    }
}

/// Debits the active user's balance.
pub struct Spend(pub Money);

impl Command for Spend {
    type Output = ();
    const NAME: &'static str = "spend";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<()> {
        let id = active_id(state)?;
        state.replace_user(&id, |u| u.debit(self.0))
    }
}

/// Credits the active user's balance.
pub struct Earn(pub Money);

impl Command for Earn {
    type Output = ();
    const NAME: &'static str = "earn";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<()> {
        let id = active_id(state)?;
        if self.0.is_zero() {
            return Ok(());
        }
        state.replace_user(&id, |u| u.credit(self.0))
    }
}

/// Files a pending deposit for the active user.
pub struct SubmitDeposit<'a> {
    /// Gross amount.
    pub amount: Money,
    /// Payment proof reference.
    pub proof: &'a str,
}

impl Command for SubmitDeposit<'_> {
    type Output = String;
    const NAME: &'static str = "deposit";

    fn apply(self, state: &mut LedgerState, ctx: &mut CommandContext<'_>) -> LedgerResult<String> {
        let id = active_id(state)?;
        submit_deposit(state, &id, self.amount, self.proof, ctx.now)
    }
}

/// Reserves funds and files a pending withdrawal for the active user.
pub struct RequestWithdrawal<'a> {
    /// Amount paid out, fee excluded.
    pub amount: Money,
    /// Destination address.
    pub address: &'a str,
}

impl Command for RequestWithdrawal<'_> {
    type Output = String;
    const NAME: &'static str = "withdraw";

    fn apply(self, state: &mut LedgerState, ctx: &mut CommandContext<'_>) -> LedgerResult<String> {
        let id = active_id(state)?;
        request_withdrawal(state, ctx.config, &id, self.amount, self.address, ctx.now)
    }
}

/// Stamps the active user's unlock time if newly eligible and reports the
/// resulting withdrawal status.
pub struct RefreshEligibility;

impl Command for RefreshEligibility {
    type Output = WithdrawalStatus;
    const NAME: &'static str = "withdrawal_eligibility";

    fn apply(
        self,
        state: &mut LedgerState,
        ctx: &mut CommandContext<'_>,
    ) -> LedgerResult<WithdrawalStatus> {
        let id = active_id(state)?;
        refresh_unlock(state, ctx.config, &id, ctx.now)?;
        let account = state
            .user(&id)
            .ok_or_else(|| LedgerError::UserNotFound(id.clone()))?;
        Ok(withdrawal_status(state, ctx.config, account, ctx.now))
    }
}

/// Adds revives to the active user.
pub struct AddRevives(pub u32);

impl Command for AddRevives {
    type Output = ();
    const NAME: &'static str = "add_revives";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<()> {
        let id = active_id(state)?;
        state.replace_user(&id, |u| {
            u.add_revives(self.0);
            Ok(())
        })
    }
}

/// Consumes one revive.
pub struct UseRevive;

impl Command for UseRevive {
    type Output = u32;
    const NAME: &'static str = "use_revive";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<u32> {
        let id = active_id(state)?;
        state.replace_user(&id, |u| u.take_revive())
    }
}

/// Adds obstacle shields to the active user.
pub struct AddObstacleShields(pub u32);

impl Command for AddObstacleShields {
    type Output = ();
    const NAME: &'static str = "add_obstacle_shield";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<()> {
        let id = active_id(state)?;
        state.replace_user(&id, |u| {
            u.add_shields(self.0);
            Ok(())
        })
    }
}

/// Consumes one obstacle shield.
pub struct UseObstacleShield;

impl Command for UseObstacleShield {
    type Output = u32;
    const NAME: &'static str = "use_obstacle_shield";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<u32> {
        let id = active_id(state)?;
        state.replace_user(&id, |u| u.take_shield())
    }
}

/// Records a finished round and credits its winnings in one step.
pub struct FinishRound {
    /// Whether the round was won.
    pub won: bool,
    /// Amount won. Zero for a plain stats update.
    pub winnings: Money,
}

impl Command for FinishRound {
    type Output = ();
    const NAME: &'static str = "finish_round";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<()> {
        let id = active_id(state)?;
        state.replace_user(&id, |u| {
            u.stats.record(self.won);
            u.credit(self.winnings)
        })
    }
}

/// Buys a store item for the active user.
pub struct Purchase<'a>(pub &'a str);

impl Command for Purchase<'_> {
    type Output = StoreItem;
    const NAME: &'static str = "purchase";

    fn apply(
        self,
        state: &mut LedgerState,
        ctx: &mut CommandContext<'_>,
    ) -> LedgerResult<StoreItem> {
        let id = active_id(state)?;
        let item = ctx
            .config
            .store_items
            .iter()
            .find(|i| i.id == self.0)
            .cloned()
            .ok_or_else(|| LedgerError::ItemNotFound(self.0.to_string()))?;
        state.replace_user(&id, |u| {
            u.debit(item.price)?;
            u.add_revives(item.revives);
            u.add_shields(item.shields);
            Ok(())
        })?;
        Ok(item)
    }
}

/// Pays the bet to sit at a lobby table.
pub struct EnterTable(pub u32);

impl Command for EnterTable {
    type Output = GameTable;
    const NAME: &'static str = "enter_table";

    fn apply(
        self,
        state: &mut LedgerState,
        ctx: &mut CommandContext<'_>,
    ) -> LedgerResult<GameTable> {
        let id = active_id(state)?;
        let table = ctx
            .config
            .game_tables
            .iter()
            .find(|t| t.id == self.0)
            .cloned()
            .ok_or(LedgerError::TableNotFound(self.0))?;
        if !table.is_free() {
            state.replace_user(&id, |u| u.debit(table.bet))?;
        }
        Ok(table)
    }
}

/// Suspends or reactivates an account.
pub struct SetUserStatus<'a> {
    /// Target account.
    pub user_id: &'a str,
    /// New status.
    pub status: AccountStatus,
}

impl Command for SetUserStatus<'_> {
    type Output = bool;
    const NAME: &'static str = "update_user_status";

    fn apply(self, state: &mut LedgerState, _ctx: &mut CommandContext<'_>) -> LedgerResult<bool> {
        set_user_status(state, self.user_id, self.status)
    }
}

/// Approves or rejects a deposit or withdrawal.
pub struct Settle<'a> {
    /// Record kind.
    pub kind: TransactionKind,
    /// Record id.
    pub id: &'a str,
    /// Verdict.
    pub decision: Decision,
}

impl Command for Settle<'_> {
    type Output = Settlement;
    const NAME: &'static str = "settle_transaction";

    fn apply(
        self,
        state: &mut LedgerState,
        ctx: &mut CommandContext<'_>,
    ) -> LedgerResult<Settlement> {
        settle(state, ctx.config, self.kind, self.id, self.decision, ctx.now)
    }
}
