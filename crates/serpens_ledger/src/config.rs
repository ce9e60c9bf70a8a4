//! # Platform Configuration
//!
//! Every constant the ledger uses (bonus, fees, thresholds, cooldown, store
//! and lobby catalogs) lives in [`LedgerConfig`]. The defaults reproduce the
//! live platform; a TOML file can override any subset of fields.
//!
//! ```toml
//! signup_bonus = "5.00"
//! deposit_fee_bp = 100
//! withdrawal_fee_bp = 300
//! unlock_cooldown_secs = 300
//! compact_after_snapshots = 64
//!
//! [[store_items]]
//! id = "single-revive"
//! name = "Single Revive"
//! price = "20"
//! revives = 1
//! ```

use std::collections::HashSet;
use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::catalog::{default_game_tables, default_store_items, GameTable, StoreItem};
use crate::error::{LedgerError, LedgerResult};
use crate::money::{Money, BASIS_POINTS};

/// Longest accepted unlock cooldown (about a century).
const MAX_COOLDOWN_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Platform constants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Balance granted to every new account.
    pub signup_bonus: Money,
    /// Platform fee withheld from each approved deposit, in basis points.
    pub deposit_fee_bp: u32,
    /// Share of each approved deposit paid to the depositor's referrer, in basis points.
    pub referral_commission_bp: u32,
    /// Fee reserved on top of each withdrawal request, in basis points.
    pub withdrawal_fee_bp: u32,
    /// Cumulative approved deposits that make a referred user qualifying.
    pub qualifying_deposit_threshold: Money,
    /// Qualifying referrals needed to unlock withdrawals.
    pub required_qualifying_referrals: u32,
    /// Seconds between unlock and the first permitted withdrawal.
    pub unlock_cooldown_secs: u64,
    /// Random characters appended to the username in referral codes.
    pub referral_code_suffix_len: usize,
    /// Entries returned by the leaderboards.
    pub leaderboard_size: usize,
    /// Committed snapshots between automatic journal compactions. Zero turns
    /// automatic compaction off.
    pub compact_after_snapshots: u64,
    /// Item store catalog.
    pub store_items: Vec<StoreItem>,
    /// Lobby tables.
    pub game_tables: Vec<GameTable>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            signup_bonus: Money::from_whole(5),
            deposit_fee_bp: 100,
            referral_commission_bp: 100,
            withdrawal_fee_bp: 300,
            qualifying_deposit_threshold: Money::from_whole(100),
            required_qualifying_referrals: 5,
            unlock_cooldown_secs: 300,
            referral_code_suffix_len: 4,
            leaderboard_size: 10,
            compact_after_snapshots: 64,
            store_items: default_store_items(),
            game_tables: default_game_tables(),
        }
    }
}

impl LedgerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidConfig` on syntax errors, unknown keys or
    /// out-of-range values.
    pub fn from_toml_str(source: &str) -> LedgerResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| LedgerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidConfig` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges and catalog uniqueness.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> LedgerResult<()> {
        for (name, bp) in [
            ("deposit_fee_bp", self.deposit_fee_bp),
            ("referral_commission_bp", self.referral_commission_bp),
            ("withdrawal_fee_bp", self.withdrawal_fee_bp),
        ] {
            if bp > BASIS_POINTS {
                return Err(LedgerError::InvalidConfig(format!(
                    "{name} must be at most {BASIS_POINTS}, got {bp}"
                )));
            }
        }
        if self.required_qualifying_referrals == 0 {
            return Err(LedgerError::InvalidConfig(
                "required_qualifying_referrals must be at least 1".to_string(),
            ));
        }
        if self.referral_code_suffix_len == 0 {
            return Err(LedgerError::InvalidConfig(
                "referral_code_suffix_len must be at least 1".to_string(),
            ));
        }
        if self.unlock_cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(LedgerError::InvalidConfig(format!(
                "unlock_cooldown_secs must be at most {MAX_COOLDOWN_SECS}"
            )));
        }

        let mut item_ids = HashSet::new();
        for item in &self.store_items {
            if !item_ids.insert(item.id.as_str()) {
                return Err(LedgerError::InvalidConfig(format!(
                    "duplicate store item id: {}",
                    item.id
                )));
            }
        }
        let mut table_ids = HashSet::new();
        for table in &self.game_tables {
            if !table_ids.insert(table.id) {
                return Err(LedgerError::InvalidConfig(format!(
                    "duplicate game table id: {}",
                    table.id
                )));
            }
            if table.min_food_value > table.max_food_value {
                return Err(LedgerError::InvalidConfig(format!(
                    "game table {} has min_food_value above max_food_value",
                    table.id
                )));
            }
        }
        Ok(())
    }

    /// Unlock cooldown as a duration.
    #[must_use]
    pub fn unlock_cooldown(&self) -> Duration {
        let secs = self.unlock_cooldown_secs.min(MAX_COOLDOWN_SECS);
        Duration::seconds(i64::try_from(secs).unwrap_or_default())
    }
}
