//! # Referral Engine
//!
//! Tracks who referred whom and decides when a referrer may withdraw.
//!
//! ## Rules
//!
//! ```text
//! signup with code ──> referrer.referrals += {username, Inactive, 0}
//! deposit approved ──> referrer += commission, record -> Active
//!                  └─> qualifying(referrer) >= required ? stamp unlock (once)
//! withdraw         ──> qualifying >= required AND now >= unlock + cooldown
//! ```
//!
//! Qualifying counts are recomputed from the referred accounts' deposit
//! totals on every call; nothing is cached.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::account::{Account, ReferralRecord, ReferralStatus};
use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::money::Money;
use crate::state::LedgerState;

/// Where an account stands on the way to its first withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum WithdrawalStatus {
    /// Not enough qualifying referrals.
    Locked {
        /// Current qualifying referrals.
        qualifying: u32,
        /// Needed to unlock.
        required: u32,
    },
    /// Eligible, waiting out the cooldown.
    CoolingDown {
        /// Current qualifying referrals.
        qualifying: u32,
        /// First moment a withdrawal is permitted.
        unlocks_at: DateTime<Utc>,
    },
    /// Withdrawals permitted.
    Ready {
        /// Current qualifying referrals.
        qualifying: u32,
    },
}

impl WithdrawalStatus {
    /// Returns true if a withdrawal may be requested now.
    #[inline]
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Returns true if the referral requirement is met, cooldown or not.
    #[inline]
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        !matches!(self, Self::Locked { .. })
    }
}

/// Leaderboard row for the admin referral page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerSummary {
    /// Referrer account id.
    pub user_id: String,
    /// Referrer username.
    pub username: String,
    /// Referred users.
    pub total_referred: usize,
    /// Commission earned.
    pub total_earnings: Money,
}

/// Attaches a freshly signed-up user to the owner of `referrer_code`.
///
/// Unknown codes are ignored. A username that already appears in some
/// referral list is never recorded twice. Returns true if a record was added.
///
/// # Errors
///
/// Only propagates record replacement failures.
pub fn record_referral(
    state: &mut LedgerState,
    referrer_code: &str,
    new_username: &str,
    now: DateTime<Utc>,
) -> LedgerResult<bool> {
    let Some(referrer_id) = state
        .user_by_referral_code(referrer_code)
        .filter(|r| r.username != new_username)
        .map(|r| r.id.clone())
    else {
        tracing::debug!("referral code {referrer_code:?} matched nobody");
        return Ok(false);
    };

    let already_referred = state
        .users
        .iter()
        .any(|u| u.referrals.iter().any(|r| r.username == new_username));
    if already_referred {
        return Ok(false);
    }

    let record = ReferralRecord {
        id: state.next_id("REF"),
        username: new_username.to_string(),
        joined_at: now,
        status: ReferralStatus::Inactive,
        earnings: Money::ZERO,
    };
    state.replace_user(&referrer_id, |referrer| {
        referrer.referrals.push(record);
        Ok(())
    })?;
    Ok(true)
}

/// The account that referred `account`, if its code still resolves.
#[must_use]
pub fn referrer_of<'a>(state: &'a LedgerState, account: &Account) -> Option<&'a Account> {
    account
        .referred_by
        .as_deref()
        .and_then(|code| state.user_by_referral_code(code))
}

/// Counts referred users whose approved deposits reach the threshold.
#[must_use]
pub fn qualifying_referrals_count(
    state: &LedgerState,
    config: &LedgerConfig,
    referrer: &Account,
) -> u32 {
    let count = referrer
        .referrals
        .iter()
        .filter_map(|r| state.user_by_username(&r.username))
        .filter(|u| u.wallet.total_deposits >= config.qualifying_deposit_threshold)
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Evaluates withdrawal permission without changing anything.
///
/// An eligible account that was never stamped is treated as unlocking now.
#[must_use]
pub fn withdrawal_status(
    state: &LedgerState,
    config: &LedgerConfig,
    account: &Account,
    now: DateTime<Utc>,
) -> WithdrawalStatus {
    let qualifying = qualifying_referrals_count(state, config, account);
    if qualifying < config.required_qualifying_referrals {
        return WithdrawalStatus::Locked {
            qualifying,
            required: config.required_qualifying_referrals,
        };
    }

    let unlocked_at = account.withdrawal_unlock_time.unwrap_or(now);
    let unlocks_at = unlocked_at + config.unlock_cooldown();
    if now >= unlocks_at {
        WithdrawalStatus::Ready { qualifying }
    } else {
        WithdrawalStatus::CoolingDown {
            qualifying,
            unlocks_at,
        }
    }
}

/// Stamps the unlock time of `user_id` if it has just become eligible.
///
/// Returns true if this call set the stamp. Existing stamps are never
/// moved or cleared.
///
/// # Errors
///
/// Returns `LedgerError::UserNotFound` for an unknown id.
pub fn refresh_unlock(
    state: &mut LedgerState,
    config: &LedgerConfig,
    user_id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<bool> {
    let eligible = match state.user(user_id) {
        Some(account) => {
            qualifying_referrals_count(state, config, account)
                >= config.required_qualifying_referrals
        }
        None => false,
    };
    let stamped = state.replace_user(user_id, |account| {
        Ok(eligible && account.stamp_unlock(now))
    })?;
    if stamped {
        tracing::info!("withdrawals unlocked for {user_id}");
    }
    Ok(stamped)
}

/// Referrers ordered by commission earned, highest first.
#[must_use]
pub fn top_referrers(state: &LedgerState, limit: usize) -> Vec<ReferrerSummary> {
    let mut rows: Vec<ReferrerSummary> = state
        .users
        .iter()
        .filter(|u| !u.referrals.is_empty())
        .map(|u| {
            let stats = u.referral_stats();
            ReferrerSummary {
                user_id: u.id.clone(),
                username: u.username.clone(),
                total_referred: stats.total_referrals,
                total_earnings: stats.total_earnings,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_earnings
            .cmp(&a.total_earnings)
            .then_with(|| b.total_referred.cmp(&a.total_referred))
    });
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::tests::account;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    /// Referrer "ref" with `n` referred users, each with the given deposit total.
    fn ledger_with_referrals(totals: &[u64]) -> LedgerState {
        let mut state = LedgerState::new();
        state.users.push(account("USR0", "ref", Money::ZERO));
        for (i, total) in totals.iter().enumerate() {
            let name = format!("friend{i}");
            let mut friend = account(&format!("USR{}", i + 1), &name, Money::ZERO);
            friend.referred_by = Some("REFCODE".to_string());
            friend.wallet.total_deposits = Money::from_whole(*total);
            state.users.push(friend);
            record_referral(&mut state, "REFCODE", &name, t0()).unwrap();
        }
        state
    }

    #[test]
    fn test_record_referral_unknown_code_is_noop() {
        let mut state = LedgerState::new();
        state.users.push(account("USR0", "ref", Money::ZERO));
        let before = state.clone();
        assert!(!record_referral(&mut state, "NOPE", "bob", t0()).unwrap());
        assert_eq!(state, before);
    }

    #[test]
    fn test_record_referral_appends_inactive() {
        let state = ledger_with_referrals(&[0]);
        let referrer = state.user("USR0").unwrap();
        assert_eq!(referrer.referrals.len(), 1);
        let record = &referrer.referrals[0];
        assert_eq!(record.username, "friend0");
        assert_eq!(record.status, ReferralStatus::Inactive);
        assert_eq!(record.earnings, Money::ZERO);
        assert_eq!(record.joined_at, t0());
    }

    #[test]
    fn test_record_referral_once_per_user() {
        let mut state = ledger_with_referrals(&[0]);
        assert!(!record_referral(&mut state, "REFCODE", "friend0", t0()).unwrap());
        assert_eq!(state.user("USR0").unwrap().referrals.len(), 1);
    }

    #[test]
    fn test_qualifying_threshold_is_inclusive() {
        let state = ledger_with_referrals(&[100, 99, 250, 0]);
        let config = LedgerConfig::default();
        let referrer = state.user("USR0").unwrap();
        assert_eq!(qualifying_referrals_count(&state, &config, referrer), 2);
    }

    #[test]
    fn test_four_qualifying_is_locked() {
        let state = ledger_with_referrals(&[100, 100, 100, 100]);
        let config = LedgerConfig::default();
        let referrer = state.user("USR0").unwrap();
        assert_eq!(
            withdrawal_status(&state, &config, referrer, t0()),
            WithdrawalStatus::Locked { qualifying: 4, required: 5 }
        );
    }

    #[test]
    fn test_cooldown_then_ready() {
        let mut state = ledger_with_referrals(&[100; 5]);
        let config = LedgerConfig::default();

        assert!(refresh_unlock(&mut state, &config, "USR0", t0()).unwrap());
        let referrer = state.user("USR0").unwrap().clone();

        let early = withdrawal_status(&state, &config, &referrer, t0() + Duration::minutes(4));
        assert_eq!(
            early,
            WithdrawalStatus::CoolingDown {
                qualifying: 5,
                unlocks_at: t0() + Duration::minutes(5),
            }
        );
        assert!(early.is_eligible());
        assert!(!early.is_ready());

        let later = withdrawal_status(&state, &config, &referrer, t0() + Duration::minutes(5));
        assert!(later.is_ready());
    }

    #[test]
    fn test_refresh_unlock_stamps_once() {
        let mut state = ledger_with_referrals(&[100; 5]);
        let config = LedgerConfig::default();
        assert!(refresh_unlock(&mut state, &config, "USR0", t0()).unwrap());
        assert!(!refresh_unlock(&mut state, &config, "USR0", t0() + Duration::hours(1)).unwrap());
        assert_eq!(state.user("USR0").unwrap().withdrawal_unlock_time, Some(t0()));
    }

    #[test]
    fn test_refresh_unlock_not_eligible() {
        let mut state = ledger_with_referrals(&[100; 4]);
        let config = LedgerConfig::default();
        assert!(!refresh_unlock(&mut state, &config, "USR0", t0()).unwrap());
        assert!(state.user("USR0").unwrap().withdrawal_unlock_time.is_none());
    }

    #[test]
    fn test_top_referrers_order() {
        let mut state = ledger_with_referrals(&[0, 0]);
        state.users.push(account("USR9", "other", Money::ZERO));
        state.users[3].referral_code = "OTHERCODE".to_string();
        let mut newcomer = account("USR10", "newbie", Money::ZERO);
        newcomer.referred_by = Some("OTHERCODE".to_string());
        state.users.push(newcomer);
        record_referral(&mut state, "OTHERCODE", "newbie", t0()).unwrap();
        state
            .replace_user("USR9", |u| u.pay_commission("newbie", Money::from_whole(3)))
            .unwrap();

        let rows = top_referrers(&state, 10);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].username, "other");
        assert_eq!(rows[0].total_earnings, Money::from_whole(3));
        assert_eq!(rows[1].total_referred, 2);
        assert_eq!(top_referrers(&state, 1).len(), 1);
    }
}
