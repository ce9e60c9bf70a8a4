//! # Transaction Engine
//!
//! Deposits and withdrawals, their fees and the balance side effects of
//! settling them.
//!
//! ## Lifecycle
//!
//! ```text
//!              ┌──> Approved
//!   Pending ───┤
//!              └──> Rejected
//! ```
//!
//! Both terminal states are final. Settling a record that already left
//! Pending is reported as [`Settlement::AlreadySettled`] and changes nothing.
//!
//! ## Money Movement
//!
//! | Event               | Depositor / requester          | Referrer      |
//! |---------------------|--------------------------------|---------------|
//! | deposit submitted   | nothing                        | nothing       |
//! | deposit approved    | +amount − fee, total += amount | +commission   |
//! | deposit rejected    | nothing                        | nothing       |
//! | withdrawal request  | −(amount + fee) reserved       | nothing       |
//! | withdrawal approved | nothing                        | nothing       |
//! | withdrawal rejected | +reserved                      | nothing       |
//!
//! The functions here mutate the state they are given in place and may stop
//! halfway on error. The platform always runs them against a scratch copy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::UserId;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;
use crate::referral::{referrer_of, refresh_unlock, withdrawal_status, WithdrawalStatus};
use crate::state::LedgerState;

/// Settlement state of a deposit or withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Waiting for an admin.
    Pending,
    /// Accepted. Final.
    Approved,
    /// Declined. Final.
    Rejected,
}

impl TransactionStatus {
    /// Returns true while the record can still be settled.
    #[inline]
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        })
    }
}

/// Deposit or withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money coming in.
    Deposit,
    /// Money going out.
    Withdrawal,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
        })
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" | "withdraw" => Ok(Self::Withdrawal),
            other => Err(LedgerError::TransactionNotFound(format!(
                "unknown transaction type: {other}"
            ))),
        }
    }
}

/// Admin verdict on a pending record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Move to Approved.
    Approve,
    /// Move to Rejected.
    Reject,
}

impl Decision {
    const fn target(self) -> TransactionStatus {
        match self {
            Self::Approve => TransactionStatus::Approved,
            Self::Reject => TransactionStatus::Rejected,
        }
    }
}

/// Outcome of an approve/reject call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "camelCase")]
pub enum Settlement {
    /// The record moved to this status and its side effects were applied.
    Applied(TransactionStatus),
    /// The record was already final. Nothing changed.
    AlreadySettled(TransactionStatus),
}

impl Settlement {
    /// Returns true if this call changed the ledger.
    #[inline]
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Fields shared by deposits and withdrawals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    /// Record id (`DEP000003`, `WTH000007`).
    pub id: String,
    /// Owning account.
    pub user_id: UserId,
    /// Requested amount, fees excluded.
    pub amount: Money,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Current state.
    pub status: TransactionStatus,
    /// When the record left Pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl TransactionMeta {
    fn new(id: String, user_id: &str, amount: Money, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            amount,
            submitted_at: now,
            status: TransactionStatus::Pending,
            settled_at: None,
        }
    }

    /// Moves a pending record to its final state. Final records are left alone.
    pub fn settle(&mut self, decision: Decision, now: DateTime<Utc>) -> Settlement {
        if !self.status.is_pending() {
            return Settlement::AlreadySettled(self.status);
        }
        self.status = decision.target();
        self.settled_at = Some(now);
        Settlement::Applied(self.status)
    }

    /// Shorthand for `settle(Decision::Approve, now)`.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Settlement {
        self.settle(Decision::Approve, now)
    }

    /// Shorthand for `settle(Decision::Reject, now)`.
    pub fn reject(&mut self, now: DateTime<Utc>) -> Settlement {
        self.settle(Decision::Reject, now)
    }
}

/// A deposit request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    /// Shared fields.
    #[serde(flatten)]
    pub meta: TransactionMeta,
    /// Opaque reference to the uploaded payment proof.
    pub proof: String,
}

/// A withdrawal request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    /// Shared fields.
    #[serde(flatten)]
    pub meta: TransactionMeta,
    /// Amount plus fee, debited at request time and refunded on rejection.
    pub reserved: Money,
    /// Destination wallet address.
    pub address: String,
}

impl Withdrawal {
    /// Fee part of the reservation.
    #[must_use]
    pub fn fee(&self) -> Money {
        self.reserved.checked_sub(self.meta.amount).unwrap_or(Money::ZERO)
    }
}

/// Either kind of record, for listings that mix both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transaction {
    /// A deposit.
    Deposit(Deposit),
    /// A withdrawal.
    Withdrawal(Withdrawal),
}

impl Transaction {
    /// Shared fields.
    #[must_use]
    pub const fn meta(&self) -> &TransactionMeta {
        match self {
            Self::Deposit(d) => &d.meta,
            Self::Withdrawal(w) => &w.meta,
        }
    }

    /// Which kind this is.
    #[must_use]
    pub const fn kind(&self) -> TransactionKind {
        match self {
            Self::Deposit(_) => TransactionKind::Deposit,
            Self::Withdrawal(_) => TransactionKind::Withdrawal,
        }
    }

    /// Record id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.meta().id
    }

    /// Current state.
    #[must_use]
    pub const fn status(&self) -> TransactionStatus {
        self.meta().status
    }
}

/// One row of a user's transaction history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    /// Deposit or withdrawal.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Record id.
    pub id: String,
    /// Requested amount.
    pub amount: Money,
    /// Submission time.
    pub date: DateTime<Utc>,
    /// Current state.
    pub status: TransactionStatus,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        let meta = tx.meta();
        Self {
            kind: tx.kind(),
            id: tx.id().to_string(),
            amount: meta.amount,
            date: meta.submitted_at,
            status: tx.status(),
        }
    }
}

/// Creates a pending deposit and returns its id.
///
/// # Errors
///
/// - `LedgerError::InvalidAmount` for a zero amount
/// - `LedgerError::MissingProof` for a blank proof reference
/// - `LedgerError::UserNotFound` for an unknown user
pub fn submit_deposit(
    state: &mut LedgerState,
    user_id: &str,
    amount: Money,
    proof: &str,
    now: DateTime<Utc>,
) -> LedgerResult<String> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount(amount));
    }
    if proof.trim().is_empty() {
        return Err(LedgerError::MissingProof);
    }
    if state.user(user_id).is_none() {
        return Err(LedgerError::UserNotFound(user_id.to_string()));
    }

    let id = state.next_id("DEP");
    state.deposits.push(Deposit {
        meta: TransactionMeta::new(id.clone(), user_id, amount, now),
        proof: proof.to_string(),
    });
    Ok(id)
}

/// Reserves `amount` plus the withdrawal fee and creates a pending withdrawal.
///
/// # Errors
///
/// - `LedgerError::InvalidAmount` for a zero amount
/// - `LedgerError::MissingAddress` for a blank address
/// - `LedgerError::WithdrawalLocked` / `WithdrawalCoolingDown` if not yet permitted
/// - `LedgerError::InsufficientBalance` if the balance cannot cover amount plus fee
pub fn request_withdrawal(
    state: &mut LedgerState,
    config: &LedgerConfig,
    user_id: &str,
    amount: Money,
    address: &str,
    now: DateTime<Utc>,
) -> LedgerResult<String> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount(amount));
    }
    if address.trim().is_empty() {
        return Err(LedgerError::MissingAddress);
    }
    let account = state
        .user(user_id)
        .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))?;

    match withdrawal_status(state, config, account, now) {
        WithdrawalStatus::Locked {
            qualifying,
            required,
        } => return Err(LedgerError::WithdrawalLocked { qualifying, required }),
        WithdrawalStatus::CoolingDown { unlocks_at, .. } => {
            return Err(LedgerError::WithdrawalCoolingDown {
                unlocks_at: unlocks_at.to_rfc3339(),
            })
        }
        WithdrawalStatus::Ready { .. } => {}
    }

    let reserved = amount.with_surcharge_bp(config.withdrawal_fee_bp)?;
    state.replace_user(user_id, |u| u.debit(reserved))?;

    let id = state.next_id("WTH");
    state.withdrawals.push(Withdrawal {
        meta: TransactionMeta::new(id.clone(), user_id, amount, now),
        reserved,
        address: address.trim().to_string(),
    });
    Ok(id)
}

/// Approves or rejects a record of either kind.
///
/// # Errors
///
/// Returns `LedgerError::TransactionNotFound` for an unknown id, or the
/// error of the underlying balance update.
pub fn settle(
    state: &mut LedgerState,
    config: &LedgerConfig,
    kind: TransactionKind,
    id: &str,
    decision: Decision,
    now: DateTime<Utc>,
) -> LedgerResult<Settlement> {
    match (kind, decision) {
        (TransactionKind::Deposit, Decision::Approve) => approve_deposit(state, config, id, now),
        (TransactionKind::Deposit, Decision::Reject) => reject_deposit(state, id, now),
        (TransactionKind::Withdrawal, Decision::Approve) => approve_withdrawal(state, id, now),
        (TransactionKind::Withdrawal, Decision::Reject) => reject_withdrawal(state, id, now),
    }
}

/// Approves a deposit: credits the net amount, grows the deposit total,
/// pays the referrer and refreshes the referrer's withdrawal unlock.
///
/// # Errors
///
/// Returns `LedgerError::TransactionNotFound`, `UserNotFound` or
/// `ArithmeticOverflow`.
pub fn approve_deposit(
    state: &mut LedgerState,
    config: &LedgerConfig,
    id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<Settlement> {
    let meta = state.deposit_mut(id)?.meta.clone();
    if !meta.status.is_pending() {
        return Ok(Settlement::AlreadySettled(meta.status));
    }

    let fee = meta.amount.mul_bp(config.deposit_fee_bp);
    let net = meta.amount.safe_sub(fee)?;
    state.replace_user(&meta.user_id, |u| u.book_deposit(meta.amount, net))?;

    let depositor = state
        .user(&meta.user_id)
        .ok_or_else(|| LedgerError::UserNotFound(meta.user_id.clone()))?;
    let username = depositor.username.clone();
    if let Some(referrer_id) = referrer_of(state, depositor).map(|r| r.id.clone()) {
        let commission = meta.amount.mul_bp(config.referral_commission_bp);
        state.replace_user(&referrer_id, |r| r.pay_commission(&username, commission))?;
        refresh_unlock(state, config, &referrer_id, now)?;
        tracing::debug!("paid {commission} commission to {referrer_id} for {id}");
    }

    Ok(state.deposit_mut(id)?.meta.approve(now))
}

/// Rejects a deposit. No money moves.
///
/// # Errors
///
/// Returns `LedgerError::TransactionNotFound` for an unknown id.
pub fn reject_deposit(
    state: &mut LedgerState,
    id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<Settlement> {
    Ok(state.deposit_mut(id)?.meta.reject(now))
}

/// Approves a withdrawal. The funds were already reserved at request time.
///
/// # Errors
///
/// Returns `LedgerError::TransactionNotFound` for an unknown id.
pub fn approve_withdrawal(
    state: &mut LedgerState,
    id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<Settlement> {
    Ok(state.withdrawal_mut(id)?.meta.approve(now))
}

/// Rejects a withdrawal and refunds exactly what was reserved.
///
/// # Errors
///
/// Returns `LedgerError::TransactionNotFound`, `UserNotFound` or
/// `ArithmeticOverflow`.
pub fn reject_withdrawal(
    state: &mut LedgerState,
    id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<Settlement> {
    let withdrawal = state.withdrawal_mut(id)?;
    let settlement = withdrawal.meta.reject(now);
    if settlement.is_applied() {
        let (user_id, reserved) = (withdrawal.meta.user_id.clone(), withdrawal.reserved);
        state.replace_user(&user_id, |u| u.credit(reserved))?;
    }
    Ok(settlement)
}

/// All records, deposits first, each in submission order.
#[must_use]
pub fn all_transactions(state: &LedgerState) -> Vec<Transaction> {
    state
        .deposits
        .iter()
        .cloned()
        .map(Transaction::Deposit)
        .chain(state.withdrawals.iter().cloned().map(Transaction::Withdrawal))
        .collect()
}

/// A user's deposits and withdrawals, newest first.
#[must_use]
pub fn transactions_for(state: &LedgerState, user_id: &str) -> Vec<TransactionView> {
    let mut rows: Vec<TransactionView> = all_transactions(state)
        .iter()
        .filter(|tx| tx.meta().user_id == user_id)
        .map(TransactionView::from)
        .collect();
    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| id_sequence(&b.id).cmp(&id_sequence(&a.id)))
    });
    rows
}

/// Numeric part of an id. Deposits and withdrawals share one sequence, so
/// this orders records of both kinds by submission.
fn id_sequence(id: &str) -> u64 {
    id.trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .unwrap_or(0)
}

/// Fees the platform has kept: the deposit fee on every approved deposit
/// plus the withdrawal fee on every approved withdrawal.
#[must_use]
pub fn retained_fees(state: &LedgerState, config: &LedgerConfig) -> Money {
    let deposit_fees: Money = state
        .deposits
        .iter()
        .filter(|d| d.meta.status == TransactionStatus::Approved)
        .map(|d| d.meta.amount.mul_bp(config.deposit_fee_bp))
        .sum();
    let withdrawal_fees: Money = state
        .withdrawals
        .iter()
        .filter(|w| w.meta.status == TransactionStatus::Approved)
        .map(Withdrawal::fee)
        .sum();
    deposit_fees.checked_add(withdrawal_fees).unwrap_or(Money::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::tests::account;
    use crate::referral::record_referral;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap()
    }

    fn whole(n: u64) -> Money {
        Money::from_whole(n)
    }

    /// "ref" referred "payer"; "ref" holds five qualifying referrals
    /// unlocked an hour before `t0`.
    fn ready_referrer(balance: Money) -> LedgerState {
        let mut state = LedgerState::new();
        let mut referrer = account("USR0", "ref", balance);
        referrer.withdrawal_unlock_time = Some(t0() - Duration::hours(1));
        state.users.push(referrer);
        for i in 0..5 {
            let name = format!("friend{i}");
            let mut friend = account(&format!("USR{}", i + 1), &name, Money::ZERO);
            friend.referred_by = Some("REFCODE".to_string());
            friend.wallet.total_deposits = whole(100);
            state.users.push(friend);
            record_referral(&mut state, "REFCODE", &name, t0()).unwrap();
        }
        state
    }

    #[test]
    fn test_submit_deposit_validation() {
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", Money::ZERO));
        assert_eq!(
            submit_deposit(&mut state, "USR1", Money::ZERO, "proof.png", t0()),
            Err(LedgerError::InvalidAmount(Money::ZERO))
        );
        assert_eq!(
            submit_deposit(&mut state, "USR1", whole(10), "  ", t0()),
            Err(LedgerError::MissingProof)
        );
        assert!(state.deposits.is_empty());
    }

    #[test]
    fn test_deposit_pending_until_approved() {
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", whole(5)));
        let id = submit_deposit(&mut state, "USR1", whole(100), "proof.png", t0()).unwrap();

        let alice = state.user("USR1").unwrap();
        assert_eq!(alice.wallet.balance, whole(5));
        assert_eq!(alice.wallet.total_deposits, Money::ZERO);
        assert_eq!(state.deposit(&id).unwrap().meta.status, TransactionStatus::Pending);
    }

    #[test]
    fn test_approve_deposit_credits_net_and_pays_referrer() {
        let config = LedgerConfig::default();
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", whole(5)));
        let mut bob = account("USR2", "bob", whole(5));
        bob.referred_by = Some("ALICECODE".to_string());
        state.users.push(bob);
        record_referral(&mut state, "ALICECODE", "bob", t0()).unwrap();

        let id = submit_deposit(&mut state, "USR2", whole(100), "proof.png", t0()).unwrap();
        let outcome = approve_deposit(&mut state, &config, &id, t0()).unwrap();
        assert_eq!(outcome, Settlement::Applied(TransactionStatus::Approved));

        let bob = state.user("USR2").unwrap();
        assert_eq!(bob.wallet.balance, whole(104));
        assert_eq!(bob.wallet.total_deposits, whole(100));

        let alice = state.user("USR1").unwrap();
        assert_eq!(alice.wallet.balance, whole(6));
        assert_eq!(alice.referrals[0].earnings, whole(1));
        assert_eq!(alice.referrals[0].status, crate::account::ReferralStatus::Active);
    }

    #[test]
    fn test_approve_twice_is_noop() {
        let config = LedgerConfig::default();
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", Money::ZERO));
        let id = submit_deposit(&mut state, "USR1", whole(50), "p", t0()).unwrap();

        approve_deposit(&mut state, &config, &id, t0()).unwrap();
        let after_first = state.clone();
        let outcome = approve_deposit(&mut state, &config, &id, t0()).unwrap();

        assert_eq!(outcome, Settlement::AlreadySettled(TransactionStatus::Approved));
        assert_eq!(state, after_first);
    }

    #[test]
    fn test_reject_deposit_moves_no_money() {
        let config = LedgerConfig::default();
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", whole(5)));
        let id = submit_deposit(&mut state, "USR1", whole(50), "p", t0()).unwrap();

        let kind = TransactionKind::Deposit;
        let outcome = settle(&mut state, &config, kind, &id, Decision::Reject, t0()).unwrap();
        assert_eq!(outcome, Settlement::Applied(TransactionStatus::Rejected));
        assert_eq!(state.user("USR1").unwrap().wallet.balance, whole(5));

        // A rejected deposit cannot be approved later.
        let outcome = approve_deposit(&mut state, &config, &id, t0()).unwrap();
        assert_eq!(outcome, Settlement::AlreadySettled(TransactionStatus::Rejected));
        assert_eq!(state.user("USR1").unwrap().wallet.total_deposits, Money::ZERO);
    }

    #[test]
    fn test_settle_unknown_id() {
        let config = LedgerConfig::default();
        let mut state = LedgerState::new();
        let result = settle(
            &mut state,
            &config,
            TransactionKind::Withdrawal,
            "WTH999999",
            Decision::Approve,
            t0(),
        );
        assert_eq!(result, Err(LedgerError::TransactionNotFound("WTH999999".to_string())));
    }

    #[test]
    fn test_withdraw_reserves_fee_and_reject_refunds() {
        let config = LedgerConfig::default();
        let mut state = ready_referrer(whole(103));

        let id =
            request_withdrawal(&mut state, &config, "USR0", whole(100), "0xabc", t0()).unwrap();
        assert_eq!(state.user("USR0").unwrap().wallet.balance, Money::ZERO);
        assert_eq!(state.withdrawal(&id).unwrap().reserved, whole(103));

        reject_withdrawal(&mut state, &id, t0()).unwrap();
        assert_eq!(state.user("USR0").unwrap().wallet.balance, whole(103));

        // Second rejection must not refund again.
        let outcome = reject_withdrawal(&mut state, &id, t0()).unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(state.user("USR0").unwrap().wallet.balance, whole(103));
    }

    #[test]
    fn test_withdraw_insufficient_for_fee() {
        let config = LedgerConfig::default();
        let mut state = ready_referrer(whole(102));
        let before = state.clone();

        let result = request_withdrawal(&mut state, &config, "USR0", whole(100), "0xabc", t0());
        assert_eq!(
            result,
            Err(LedgerError::InsufficientBalance {
                required: whole(103),
                available: whole(102),
            })
        );
        assert_eq!(state.user("USR0"), before.user("USR0"));
        assert!(state.withdrawals.is_empty());
    }

    #[test]
    fn test_withdraw_locked_without_referrals() {
        let config = LedgerConfig::default();
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", whole(500)));
        let result = request_withdrawal(&mut state, &config, "USR1", whole(10), "0xabc", t0());
        assert_eq!(result, Err(LedgerError::WithdrawalLocked { qualifying: 0, required: 5 }));
    }

    #[test]
    fn test_withdraw_during_cooldown() {
        let config = LedgerConfig::default();
        let mut state = ready_referrer(whole(500));
        let unlocked = t0() - Duration::minutes(2);
        state.users[0].withdrawal_unlock_time = Some(unlocked);

        let result = request_withdrawal(&mut state, &config, "USR0", whole(10), "0xabc", t0());
        assert_eq!(
            result,
            Err(LedgerError::WithdrawalCoolingDown {
                unlocks_at: (unlocked + Duration::minutes(5)).to_rfc3339(),
            })
        );
    }

    #[test]
    fn test_approve_withdrawal_keeps_balance() {
        let config = LedgerConfig::default();
        let mut state = ready_referrer(whole(206));
        let id =
            request_withdrawal(&mut state, &config, "USR0", whole(100), "0xabc", t0()).unwrap();
        approve_withdrawal(&mut state, &id, t0()).unwrap();
        assert_eq!(state.user("USR0").unwrap().wallet.balance, whole(103));
        assert_eq!(retained_fees(&state, &config), whole(3));
    }

    #[test]
    fn test_transactions_newest_first() {
        let config = LedgerConfig::default();
        let mut state = ready_referrer(whole(500));
        submit_deposit(&mut state, "USR0", whole(10), "p", t0()).unwrap();
        let later = t0() + Duration::seconds(5);
        request_withdrawal(&mut state, &config, "USR0", whole(20), "0xabc", later).unwrap();
        submit_deposit(&mut state, "USR0", whole(30), "p", t0() + Duration::seconds(5)).unwrap();

        let rows = transactions_for(&state, "USR0");
        let amounts: Vec<Money> = rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![whole(30), whole(20), whole(10)]);
        assert_eq!(rows[1].kind, TransactionKind::Withdrawal);
        assert!(transactions_for(&state, "USR1").is_empty());
    }

    #[test]
    fn test_all_transactions_deposits_first() {
        let config = LedgerConfig::default();
        let mut state = ready_referrer(whole(500));
        let withdrawal =
            request_withdrawal(&mut state, &config, "USR0", whole(20), "0xabc", t0()).unwrap();
        let deposit = submit_deposit(&mut state, "USR0", whole(10), "p", t0()).unwrap();
        approve_deposit(&mut state, &config, &deposit, t0()).unwrap();

        let all = all_transactions(&state);
        let deposit_at = all.iter().position(|tx| tx.id() == deposit).unwrap();
        let withdrawal_at = all.iter().position(|tx| tx.id() == withdrawal).unwrap();
        assert!(deposit_at < withdrawal_at);
        assert_eq!(all[deposit_at].status(), TransactionStatus::Approved);
        assert_eq!(all[withdrawal_at].status(), TransactionStatus::Pending);
        assert_eq!(all[withdrawal_at].kind(), TransactionKind::Withdrawal);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Deposit".parse::<TransactionKind>(), Ok(TransactionKind::Deposit));
        assert_eq!("withdrawal".parse::<TransactionKind>(), Ok(TransactionKind::Withdrawal));
        assert!("refund".parse::<TransactionKind>().is_err());
    }
}
