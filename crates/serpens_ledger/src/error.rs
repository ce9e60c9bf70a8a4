//! # Ledger Error Types
//!
//! All errors that can occur in the ledger core.
//!
//! Validation and business-rule failures are ordinary values: a failed
//! command leaves the ledger exactly as it was. Storage failures are only
//! surfaced by the store itself; the platform logs them and keeps running
//! in memory.

use thiserror::Error;

use crate::money::Money;

/// Errors that can occur in the ledger core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount must be strictly positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(Money),

    /// Deposit submitted without a proof reference.
    #[error("deposit proof is missing")]
    MissingProof,

    /// Withdrawal submitted without a destination address.
    #[error("withdrawal destination address is missing")]
    MissingAddress,

    /// Balance cannot cover the requested debit.
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        /// Amount the operation needs to debit.
        required: Money,
        /// Balance at the time of the request.
        available: Money,
    },

    /// Not enough qualifying referrals to withdraw.
    #[error("withdrawals locked: {qualifying} of {required} qualifying referrals")]
    WithdrawalLocked {
        /// Current qualifying referral count.
        qualifying: u32,
        /// Count needed to unlock withdrawals.
        required: u32,
    },

    /// Withdrawals are unlocked but the cooldown has not elapsed yet.
    #[error("withdrawals unlock at {unlocks_at}")]
    WithdrawalCoolingDown {
        /// Moment the cooldown ends (RFC 3339).
        unlocks_at: String,
    },

    /// Email already registered.
    #[error("an account with this email already exists")]
    DuplicateEmail,

    /// Username already registered.
    #[error("username is already taken")]
    DuplicateUsername,

    /// Login rejected. Wrong credentials and suspended accounts look the same.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Operation needs a logged-in user.
    #[error("no active user session")]
    NoActiveUser,

    /// User id not present in the ledger.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Deposit or withdrawal id not present in the ledger.
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    /// Tried to consume an inventory item the user does not hold.
    #[error("no {0} left in inventory")]
    InventoryEmpty(&'static str),

    /// Store catalog has no such item.
    #[error("store item not found: {0}")]
    ItemNotFound(String),

    /// Lobby has no such table.
    #[error("game table not found: {0}")]
    TableNotFound(u32),

    /// Arithmetic overflow in a money calculation.
    #[error("arithmetic overflow in ledger calculation")]
    ArithmeticOverflow,

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Journal could not be read or written.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Journal contents are not a ledger we understand.
    #[error("corrupt ledger journal: {0}")]
    CorruptJournal(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
