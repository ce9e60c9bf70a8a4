//! # Serpens Fortuna Ledger
//!
//! Wallet, referral and transaction engine for the Serpens Fortuna snake
//! game platform.
//!
//! ## Design Principles
//!
//! 1. **Zero floating point** - Balances and fees are [`Money`] (u64, 6 decimals)
//! 2. **All-or-nothing commands** - Every mutation runs on a cloned snapshot
//! 3. **Funds reserved at request time** - A withdrawal debits amount plus fee immediately
//! 4. **External configuration** - Fees, thresholds and catalogs load from TOML
//!
//! ## Money Flow
//!
//! ```text
//! deposit ──> Pending ──approve──> depositor +99%, totalDeposits +100%
//!                                  referrer  +1%, maybe unlock withdrawals
//! withdraw ─> balance −103% ──> Pending ──reject──> balance +103%
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use serpens_ledger::{LedgerConfig, Money, Platform, SignUpRequest, TransactionKind};
//!
//! let mut platform = Platform::open("data/ledger.sflg", LedgerConfig::load("ledger.toml")?)?;
//! let alice = platform.sign_up(SignUpRequest::new("alice", "alice@example.com", "pw"))?;
//! platform.login("alice", "pw")?;
//!
//! let id = platform.deposit(Money::from_whole(100), "receipt.png")?;
//! platform.approve_transaction(&id, TransactionKind::Deposit)?;
//! assert_eq!(platform.current_user().unwrap().wallet.balance, Money::from_whole(104));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod account;
pub mod admin;
pub mod catalog;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod money;
pub mod platform;
pub mod referral;
pub mod session;
pub mod state;
pub mod store;
pub mod transaction;

pub use account::{Account, AccountStatus, Inventory, ReferralRecord, ReferralStats, Stats, Wallet};
pub use admin::{DashboardSummary, OwnedRecord, PlayerSummary};
pub use catalog::{GameTable, StoreItem};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, CommandContext};
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use money::Money;
pub use platform::Platform;
pub use referral::{ReferrerSummary, WithdrawalStatus};
pub use session::{SignUpOutcome, SignUpRequest};
pub use state::LedgerState;
pub use store::{JournalReport, JournalStore, MemoryStore, StateStore};
pub use transaction::{
    Decision, Deposit, Settlement, Transaction, TransactionKind, TransactionStatus,
    TransactionView, Withdrawal,
};
