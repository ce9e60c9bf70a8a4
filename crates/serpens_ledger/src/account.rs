//! # Account Model
//!
//! One [`Account`] per registered player: identity, wallet, power-up
//! inventory, the referral list it owns and game stats.
//!
//! Methods here are pure record transforms. They are applied to a detached
//! copy of the record (see [`LedgerState::replace_user`]) so a failing
//! transform never leaves a half-updated account behind.
//!
//! [`LedgerState::replace_user`]: crate::state::LedgerState::replace_user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;

/// Account identifier (`USR000001`).
pub type UserId = String;

/// Whether the account may log in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Normal account.
    Active,
    /// Blocked by an admin. Login is refused, data is kept.
    Suspended,
}

/// Money held by an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Spendable balance.
    pub balance: Money,
    /// Sum of all approved deposits, fee included. Only ever grows.
    pub total_deposits: Money,
}

/// Consumable power-ups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    /// Revives left.
    pub revive_count: u32,
    /// Obstacle shields left.
    pub obstacle_shield_count: u32,
}

/// Whether a referred user has produced commission yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferralStatus {
    /// Has at least one approved deposit.
    Active,
    /// Signed up, nothing approved yet.
    Inactive,
}

/// A referred user, as seen from the referrer's account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRecord {
    /// Relationship id (`REF000001`).
    pub id: String,
    /// Username of the referred account.
    pub username: String,
    /// Signup time of the referred account.
    pub joined_at: DateTime<Utc>,
    /// Active once the referred user has an approved deposit.
    pub status: ReferralStatus,
    /// Commission earned from this referral so far.
    pub earnings: Money,
}

/// Game statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Finished rounds.
    pub rounds_played: u32,
    /// Rounds won.
    pub wins: u32,
    /// `round(wins / rounds_played × 100)`, 0 before the first round.
    pub win_rate: u32,
}

impl Stats {
    /// Records one finished round and refreshes the win rate.
    pub fn record(&mut self, won: bool) {
        self.rounds_played = self.rounds_played.saturating_add(1);
        if won {
            self.wins = self.wins.saturating_add(1);
        }
        self.win_rate = win_rate(self.wins, self.rounds_played);
    }
}

/// Percentage of rounds won, rounded half up.
#[must_use]
pub fn win_rate(wins: u32, rounds: u32) -> u32 {
    if rounds == 0 {
        return 0;
    }
    let rate = (u64::from(wins) * 200 + u64::from(rounds)) / (u64::from(rounds) * 2);
    u32::try_from(rate).unwrap_or(u32::MAX)
}

/// Referral summary for the referrals page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    /// Referred users.
    pub total_referrals: usize,
    /// Referred users with an approved deposit.
    pub active_referrals: usize,
    /// Commission earned across all referrals.
    pub total_earnings: Money,
}

/// A registered player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique id.
    pub id: UserId,
    /// Unique display name.
    pub username: String,
    /// Unique email.
    pub email: String,
    /// Stored as entered. Credential hardening is outside the ledger core.
    pub password: String,
    /// Code other players enter at signup to become this account's referrals.
    pub referral_code: String,
    /// Login gate.
    pub status: AccountStatus,
    /// Balance and deposit total.
    pub wallet: Wallet,
    /// Power-ups.
    pub inventory: Inventory,
    /// Players this account referred, in signup order.
    pub referrals: Vec<ReferralRecord>,
    /// Game statistics.
    pub stats: Stats,
    /// Referral code used at signup. Never changes.
    pub referred_by: Option<String>,
    /// First moment this account became withdrawal-eligible. Never cleared.
    pub withdrawal_unlock_time: Option<DateTime<Utc>>,
    /// Signup time.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Returns true if the account may log in.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Adds to the balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ArithmeticOverflow` if the balance would overflow.
    pub fn credit(&mut self, amount: Money) -> LedgerResult<()> {
        self.wallet.balance = self.wallet.balance.safe_add(amount)?;
        Ok(())
    }

    /// Removes from the balance, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InsufficientBalance` if the balance is below `amount`.
    pub fn debit(&mut self, amount: Money) -> LedgerResult<()> {
        self.wallet.balance =
            self.wallet
                .balance
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientBalance {
                    required: amount,
                    available: self.wallet.balance,
                })?;
        Ok(())
    }

    /// Books an approved deposit: credits the net amount and grows the
    /// deposit total by the gross amount.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ArithmeticOverflow` on overflow; nothing changes.
    pub fn book_deposit(&mut self, gross: Money, net: Money) -> LedgerResult<()> {
        let balance = self.wallet.balance.safe_add(net)?;
        let total_deposits = self.wallet.total_deposits.safe_add(gross)?;
        self.wallet = Wallet {
            balance,
            total_deposits,
        };
        Ok(())
    }

    /// Adds revives.
    pub fn add_revives(&mut self, count: u32) {
        self.inventory.revive_count = self.inventory.revive_count.saturating_add(count);
    }

    /// Adds obstacle shields.
    pub fn add_shields(&mut self, count: u32) {
        self.inventory.obstacle_shield_count =
            self.inventory.obstacle_shield_count.saturating_add(count);
    }

    /// Consumes one revive and returns how many are left.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InventoryEmpty` if there is none.
    pub fn take_revive(&mut self) -> LedgerResult<u32> {
        if self.inventory.revive_count == 0 {
            return Err(LedgerError::InventoryEmpty("revives"));
        }
        self.inventory.revive_count -= 1;
        Ok(self.inventory.revive_count)
    }

    /// Consumes one obstacle shield and returns how many are left.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InventoryEmpty` if there is none.
    pub fn take_shield(&mut self) -> LedgerResult<u32> {
        if self.inventory.obstacle_shield_count == 0 {
            return Err(LedgerError::InventoryEmpty("obstacle shields"));
        }
        self.inventory.obstacle_shield_count -= 1;
        Ok(self.inventory.obstacle_shield_count)
    }

    /// Stamps the withdrawal unlock time if it was never set.
    ///
    /// Returns true if this call set it.
    pub fn stamp_unlock(&mut self, now: DateTime<Utc>) -> bool {
        if self.withdrawal_unlock_time.is_some() {
            return false;
        }
        self.withdrawal_unlock_time = Some(now);
        true
    }

    /// Pays a commission for `referred_username` into this account.
    ///
    /// The matching referral record turns Active and accumulates the
    /// commission. The balance is credited even if no record matches.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::ArithmeticOverflow` on overflow; nothing changes.
    pub fn pay_commission(
        &mut self,
        referred_username: &str,
        commission: Money,
    ) -> LedgerResult<()> {
        let balance = self.wallet.balance.safe_add(commission)?;
        let mut referrals = self.referrals.clone();
        if let Some(record) = referrals.iter_mut().find(|r| r.username == referred_username) {
            record.status = ReferralStatus::Active;
            record.earnings = record.earnings.safe_add(commission)?;
        }
        self.wallet.balance = balance;
        self.referrals = referrals;
        Ok(())
    }

    /// Summarizes the referral list.
    #[must_use]
    pub fn referral_stats(&self) -> ReferralStats {
        ReferralStats {
            total_referrals: self.referrals.len(),
            active_referrals: self
                .referrals
                .iter()
                .filter(|r| r.status == ReferralStatus::Active)
                .count(),
            total_earnings: self.referrals.iter().map(|r| r.earnings).sum(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn account(id: &str, username: &str, balance: Money) -> Account {
        Account {
            id: id.to_string(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "secret".to_string(),
            referral_code: format!("{}CODE", username.to_uppercase()),
            status: AccountStatus::Active,
            wallet: Wallet {
                balance,
                total_deposits: Money::ZERO,
            },
            inventory: Inventory::default(),
            referrals: Vec::new(),
            stats: Stats::default(),
            referred_by: None,
            withdrawal_unlock_time: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_debit_insufficient_leaves_balance() {
        let mut acc = account("USR1", "alice", Money::from_whole(10));
        let result = acc.debit(Money::from_whole(11));
        assert_eq!(
            result,
            Err(LedgerError::InsufficientBalance {
                required: Money::from_whole(11),
                available: Money::from_whole(10),
            })
        );
        assert_eq!(acc.wallet.balance, Money::from_whole(10));
    }

    #[test]
    fn test_debit_exact_balance() {
        let mut acc = account("USR1", "alice", Money::from_whole(10));
        acc.debit(Money::from_whole(10)).unwrap();
        assert!(acc.wallet.balance.is_zero());
    }

    #[test]
    fn test_win_rate_rounding() {
        assert_eq!(win_rate(0, 0), 0);
        assert_eq!(win_rate(1, 3), 33);
        assert_eq!(win_rate(2, 3), 67);
        assert_eq!(win_rate(1, 2), 50);
        assert_eq!(win_rate(1, 8), 13); // 12.5 rounds up
    }

    #[test]
    fn test_stats_record() {
        let mut stats = Stats::default();
        stats.record(true);
        stats.record(false);
        stats.record(false);
        assert_eq!(stats, Stats { rounds_played: 3, wins: 1, win_rate: 33 });
    }

    #[test]
    fn test_take_revive() {
        let mut acc = account("USR1", "alice", Money::ZERO);
        assert_eq!(acc.take_revive(), Err(LedgerError::InventoryEmpty("revives")));
        acc.add_revives(2);
        assert_eq!(acc.take_revive(), Ok(1));
        assert_eq!(acc.take_revive(), Ok(0));
        assert!(acc.take_revive().is_err());
    }

    #[test]
    fn test_stamp_unlock_is_idempotent() {
        let mut acc = account("USR1", "alice", Money::ZERO);
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert!(acc.stamp_unlock(first));
        assert!(!acc.stamp_unlock(later));
        assert_eq!(acc.withdrawal_unlock_time, Some(first));
    }

    #[test]
    fn test_pay_commission_activates_record() {
        let mut acc = account("USR1", "alice", Money::ZERO);
        acc.referrals.push(ReferralRecord {
            id: "REF1".to_string(),
            username: "bob".to_string(),
            joined_at: acc.created_at,
            status: ReferralStatus::Inactive,
            earnings: Money::ZERO,
        });
        acc.pay_commission("bob", Money::ONE).unwrap();
        acc.pay_commission("bob", Money::ONE).unwrap();

        assert_eq!(acc.wallet.balance, Money::from_whole(2));
        let stats = acc.referral_stats();
        assert_eq!(stats.total_referrals, 1);
        assert_eq!(stats.active_referrals, 1);
        assert_eq!(stats.total_earnings, Money::from_whole(2));
    }
}
