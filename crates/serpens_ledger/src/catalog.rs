//! # Store and Lobby Catalogs
//!
//! Purchasable power-ups and betting tables. Both are plain config data;
//! buying an item or sitting at a table is a ledger command that debits the
//! price and applies the grant in one step.

use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A purchasable store item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreItem {
    /// Stable identifier (`"single-revive"`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price debited from the balance.
    pub price: Money,
    /// Revives granted.
    #[serde(default)]
    pub revives: u32,
    /// Obstacle shields granted.
    #[serde(default)]
    pub shields: u32,
}

/// A betting table in the lobby.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameTable {
    /// Table number.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Entry bet. Zero means a free table.
    pub bet: Money,
    /// Smallest value a food pellet can be worth.
    pub min_food_value: Money,
    /// Largest value a food pellet can be worth.
    pub max_food_value: Money,
}

impl GameTable {
    /// Free tables never touch the wallet.
    #[inline]
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.bet.is_zero()
    }
}

fn item(id: &str, name: &str, price: u64, revives: u32, shields: u32) -> StoreItem {
    StoreItem {
        id: id.to_string(),
        name: name.to_string(),
        price: Money::from_whole(price),
        revives,
        shields,
    }
}

fn table(id: u32, name: &str, bet: u64, min_food_micros: u64, max_food_micros: u64) -> GameTable {
    GameTable {
        id,
        name: name.to_string(),
        bet: Money::from_whole(bet),
        min_food_value: Money::from_micros(min_food_micros),
        max_food_value: Money::from_micros(max_food_micros),
    }
}

/// The live store catalog.
#[must_use]
pub fn default_store_items() -> Vec<StoreItem> {
    vec![
        item("single-revive", "Single Revive", 20, 1, 0),
        item("double-revive", "Double Revive", 35, 2, 0),
        item("triple-revive", "Triple Revive", 50, 3, 0),
        // The shield bundle ships with a spare revive.
        item("obstacle-shield", "Obstacle Shield", 99, 1, 1),
    ]
}

/// The live lobby.
#[must_use]
pub fn default_game_tables() -> Vec<GameTable> {
    vec![
        table(1, "Training Ground", 0, 400, 800),
        table(2, "Bronze League", 10, 60_000, 100_000),
        table(3, "Silver League", 50, 100_000, 500_000),
        table(4, "Gold League", 100, 300_000, 1_000_000),
        table(5, "Platinum Arena", 250, 330_000, 1_000_000),
        table(6, "Diamond Arena", 500, 1_000_000, 2_500_000),
        table(7, "Master's Challenge", 1000, 5_000_000, 15_000_000),
    ]
}
