use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a tradable item on the Guild Wars 2 trading post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl ItemId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ItemId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
}

/// One day (or hour) of trading post statistics for a single item.
///
/// Rows are keyed by `(item, timestamp)` and never change once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub item: ItemId,
    pub timestamp: DateTime<Utc>,
    pub buy_delisted: i64,
    pub buy_listed: i64,
    pub buy_price_avg: f64,
    pub buy_price_max: i64,
    pub buy_price_min: i64,
    pub buy_price_stdev: f64,
    pub buy_quantity_avg: f64,
    pub buy_quantity_max: i64,
    pub buy_quantity_min: i64,
    pub buy_quantity_stdev: f64,
    pub buy_sold: i64,
    pub buy_value: i64,
    pub count: i64,
    pub sell_delisted: i64,
    pub sell_listed: i64,
    pub sell_price_avg: f64,
    pub sell_price_max: i64,
    pub sell_price_min: i64,
    pub sell_price_stdev: f64,
    pub sell_quantity_avg: f64,
    pub sell_quantity_max: i64,
    pub sell_quantity_min: i64,
    pub sell_quantity_stdev: f64,
    pub sell_sold: i64,
    pub sell_value: i64,
}

impl HistoryPoint {
    /// A point with every statistic zeroed. Decoders and tests fill in what they know.
    pub fn empty(item: ItemId, timestamp: DateTime<Utc>) -> Self {
        Self {
            item,
            timestamp,
            buy_delisted: 0,
            buy_listed: 0,
            buy_price_avg: 0.0,
            buy_price_max: 0,
            buy_price_min: 0,
            buy_price_stdev: 0.0,
            buy_quantity_avg: 0.0,
            buy_quantity_max: 0,
            buy_quantity_min: 0,
            buy_quantity_stdev: 0.0,
            buy_sold: 0,
            buy_value: 0,
            count: 0,
            sell_delisted: 0,
            sell_listed: 0,
            sell_price_avg: 0.0,
            sell_price_max: 0,
            sell_price_min: 0,
            sell_price_stdev: 0.0,
            sell_quantity_avg: 0.0,
            sell_quantity_max: 0,
            sell_quantity_min: 0,
            sell_quantity_stdev: 0.0,
            sell_sold: 0,
            sell_value: 0,
        }
    }
}

/// Latest timestamp among `points`, if any.
pub fn latest_timestamp<'a, I>(points: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a HistoryPoint>,
{
    points.into_iter().map(|p| p.timestamp).max()
}
