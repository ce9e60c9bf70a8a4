//! # Admin Operations
//!
//! Back-office reads and the account status switch. Settling deposits and
//! withdrawals goes through [`crate::transaction::settle`].

use serde::Serialize;

use crate::account::{Account, AccountStatus};
use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::money::Money;
use crate::state::LedgerState;
use crate::transaction::{retained_fees, Deposit, Withdrawal};

/// Headline numbers for the admin dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// Registered accounts.
    pub total_users: usize,
    /// Accounts currently suspended.
    pub suspended_users: usize,
    /// Deposits awaiting a decision.
    pub pending_deposits: usize,
    /// Withdrawals awaiting a decision.
    pub pending_withdrawals: usize,
    /// Fees retained on approved deposits and withdrawals.
    pub revenue: Money,
}

/// Leaderboard row for players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    /// Account id.
    pub user_id: String,
    /// Username.
    pub username: String,
    /// Current balance.
    pub balance: Money,
    /// Rounds won.
    pub wins: u32,
    /// Win percentage.
    pub win_rate: u32,
}

/// A deposit or withdrawal joined with its owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedRecord<T> {
    /// The record itself.
    #[serde(flatten)]
    pub record: T,
    /// Owner's username, if the account still resolves.
    pub username: Option<String>,
    /// Owner's email, if the account still resolves.
    pub email: Option<String>,
}

impl<T: Clone> OwnedRecord<T> {
    fn join(record: &T, owner: Option<&Account>) -> Self {
        Self {
            record: record.clone(),
            username: owner.map(|u| u.username.clone()),
            email: owner.map(|u| u.email.clone()),
        }
    }
}

/// Suspends or reactivates an account.
///
/// Suspending the logged-in account ends its session. Returns true if the
/// status actually changed.
///
/// # Errors
///
/// Returns `LedgerError::UserNotFound` for an unknown id.
pub fn set_user_status(
    state: &mut LedgerState,
    user_id: &str,
    status: AccountStatus,
) -> LedgerResult<bool> {
    let changed = state.replace_user(user_id, |u| {
        let changed = u.status != status;
        u.status = status;
        Ok(changed)
    })?;
    if status == AccountStatus::Suspended && state.active_user_id.as_deref() == Some(user_id) {
        state.active_user_id = None;
        tracing::info!("session of suspended account {user_id} closed");
    }
    Ok(changed)
}

/// Computes the dashboard headline numbers.
#[must_use]
pub fn dashboard(state: &LedgerState, config: &LedgerConfig) -> DashboardSummary {
    DashboardSummary {
        total_users: state.users.len(),
        suspended_users: state.users.iter().filter(|u| !u.is_active()).count(),
        pending_deposits: state
            .deposits
            .iter()
            .filter(|d| d.meta.status.is_pending())
            .count(),
        pending_withdrawals: state
            .withdrawals
            .iter()
            .filter(|w| w.meta.status.is_pending())
            .count(),
        revenue: retained_fees(state, config),
    }
}

/// Players ordered by balance, richest first. Ties go to the better win rate.
#[must_use]
pub fn top_players(state: &LedgerState, limit: usize) -> Vec<PlayerSummary> {
    let mut rows: Vec<PlayerSummary> = state
        .users
        .iter()
        .map(|u| PlayerSummary {
            user_id: u.id.clone(),
            username: u.username.clone(),
            balance: u.wallet.balance,
            wins: u.stats.wins,
            win_rate: u.stats.win_rate,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| b.win_rate.cmp(&a.win_rate))
    });
    rows.truncate(limit);
    rows
}

/// Every deposit with its owner, in submission order.
#[must_use]
pub fn deposits_with_owners(state: &LedgerState) -> Vec<OwnedRecord<Deposit>> {
    state
        .deposits
        .iter()
        .map(|d| OwnedRecord::join(d, state.user(&d.meta.user_id)))
        .collect()
}

/// Every withdrawal with its owner, in submission order.
#[must_use]
pub fn withdrawals_with_owners(state: &LedgerState) -> Vec<OwnedRecord<Withdrawal>> {
    state
        .withdrawals
        .iter()
        .map(|w| OwnedRecord::join(w, state.user(&w.meta.user_id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::tests::account;
    use crate::error::LedgerError;
    use crate::transaction::{approve_deposit, reject_deposit, submit_deposit};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_suspend_active_user_ends_session() {
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", Money::ZERO));
        state.active_user_id = Some("USR1".to_string());

        assert!(set_user_status(&mut state, "USR1", AccountStatus::Suspended).unwrap());
        assert!(state.active_user_id.is_none());
        assert!(!set_user_status(&mut state, "USR1", AccountStatus::Suspended).unwrap());
        assert!(set_user_status(&mut state, "USR1", AccountStatus::Active).unwrap());
        assert!(state.user("USR1").unwrap().is_active());
    }

    #[test]
    fn test_suspend_other_user_keeps_session() {
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", Money::ZERO));
        state.users.push(account("USR2", "bob", Money::ZERO));
        state.active_user_id = Some("USR1".to_string());

        set_user_status(&mut state, "USR2", AccountStatus::Suspended).unwrap();
        assert_eq!(state.active_user_id.as_deref(), Some("USR1"));
        assert_eq!(
            set_user_status(&mut state, "USR9", AccountStatus::Active),
            Err(LedgerError::UserNotFound("USR9".to_string()))
        );
    }

    #[test]
    fn test_dashboard_counts_and_revenue() {
        let config = LedgerConfig::default();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", Money::ZERO));
        state.users.push(account("USR2", "bob", Money::ZERO));
        state.users[1].status = AccountStatus::Suspended;

        let approved =
            submit_deposit(&mut state, "USR1", Money::from_whole(200), "p", now).unwrap();
        let rejected =
            submit_deposit(&mut state, "USR1", Money::from_whole(50), "p", now).unwrap();
        submit_deposit(&mut state, "USR2", Money::from_whole(70), "p", now).unwrap();
        approve_deposit(&mut state, &config, &approved, now).unwrap();
        reject_deposit(&mut state, &rejected, now).unwrap();

        let summary = dashboard(&state, &config);
        assert_eq!(summary.total_users, 2);
        assert_eq!(summary.suspended_users, 1);
        assert_eq!(summary.pending_deposits, 1);
        assert_eq!(summary.pending_withdrawals, 0);
        assert_eq!(summary.revenue, Money::from_whole(2));
    }

    #[test]
    fn test_top_players_by_balance() {
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", Money::from_whole(5)));
        state.users.push(account("USR2", "bob", Money::from_whole(50)));
        state.users.push(account("USR3", "carol", Money::from_whole(20)));

        let names: Vec<String> = top_players(&state, 2).into_iter().map(|p| p.username).collect();
        assert_eq!(names, vec!["bob".to_string(), "carol".to_string()]);
    }

    #[test]
    fn test_listings_join_owner() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut state = LedgerState::new();
        state.users.push(account("USR1", "alice", Money::ZERO));
        submit_deposit(&mut state, "USR1", Money::from_whole(10), "p", now).unwrap();

        let rows = deposits_with_owners(&state);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username.as_deref(), Some("alice"));
        assert_eq!(rows[0].email.as_deref(), Some("alice@example.com"));
        assert!(withdrawals_with_owners(&state).is_empty());
    }
}
