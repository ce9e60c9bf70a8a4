//! # Ledger State
//!
//! The whole application state in one serializable value: accounts,
//! deposits, withdrawals, the active session and the id sequence.
//!
//! Commands never touch the live state. The platform clones it, runs the
//! command against the clone and swaps the clone in only if the command
//! succeeded, so every multi-record update is all-or-nothing.

use serde::{Deserialize, Serialize};

use crate::account::{Account, UserId};
use crate::error::{LedgerError, LedgerResult};
use crate::transaction::{Deposit, Withdrawal};

/// Current snapshot layout version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full ledger snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    /// Snapshot layout version.
    pub schema_version: u32,
    /// Registered accounts, in signup order.
    pub users: Vec<Account>,
    /// Deposit requests, in submission order.
    pub deposits: Vec<Deposit>,
    /// Withdrawal requests, in submission order.
    pub withdrawals: Vec<Withdrawal>,
    /// Logged-in account, if any.
    pub active_user_id: Option<UserId>,
    /// Last id number handed out.
    pub sequence: u64,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerState {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            users: Vec::new(),
            deposits: Vec::new(),
            withdrawals: Vec::new(),
            active_user_id: None,
            sequence: 0,
        }
    }

    /// Hands out the next id with the given prefix (`DEP000042`).
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}{:06}", self.sequence)
    }

    /// Looks up an account by id.
    #[must_use]
    pub fn user(&self, id: &str) -> Option<&Account> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Looks up an account by username.
    #[must_use]
    pub fn user_by_username(&self, username: &str) -> Option<&Account> {
        self.users.iter().find(|u| u.username == username)
    }

    /// Looks up an account by email.
    #[must_use]
    pub fn user_by_email(&self, email: &str) -> Option<&Account> {
        self.users.iter().find(|u| u.email == email)
    }

    /// Looks up an account by its referral code.
    #[must_use]
    pub fn user_by_referral_code(&self, code: &str) -> Option<&Account> {
        self.users.iter().find(|u| u.referral_code == code)
    }

    /// The logged-in account, if any.
    #[must_use]
    pub fn active_user(&self) -> Option<&Account> {
        self.active_user_id.as_deref().and_then(|id| self.user(id))
    }

    /// Replaces one account with a transformed copy of itself.
    ///
    /// The transform runs on a detached clone; the stored record is only
    /// overwritten if it returns `Ok`. No other account is touched.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` for an unknown id, or whatever the
    /// transform returns.
    pub fn replace_user<T>(
        &mut self,
        id: &str,
        transform: impl FnOnce(&mut Account) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let slot = self
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| LedgerError::UserNotFound(id.to_string()))?;

        let mut updated = slot.clone();
        let output = transform(&mut updated)?;
        *slot = updated;
        Ok(output)
    }

    /// Looks up a deposit by id.
    #[must_use]
    pub fn deposit(&self, id: &str) -> Option<&Deposit> {
        self.deposits.iter().find(|d| d.meta.id == id)
    }

    /// Looks up a withdrawal by id.
    #[must_use]
    pub fn withdrawal(&self, id: &str) -> Option<&Withdrawal> {
        self.withdrawals.iter().find(|w| w.meta.id == id)
    }

    pub(crate) fn deposit_mut(&mut self, id: &str) -> LedgerResult<&mut Deposit> {
        self.deposits
            .iter_mut()
            .find(|d| d.meta.id == id)
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))
    }

    pub(crate) fn withdrawal_mut(&mut self, id: &str) -> LedgerResult<&mut Withdrawal> {
        self.withdrawals
            .iter_mut()
            .find(|w| w.meta.id == id)
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))
    }
}
