//! Wire shapes of the Datawars JSON responses.
//!
//! Every statistic is optional on the wire; absent or `null` decodes to zero.
//! `itemID` and `date` are required.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use model::{HistoryPoint, Item, ItemId};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryRecord {
    #[serde(rename = "itemID")]
    item_id: i64,
    #[serde(deserialize_with = "utc_date")]
    date: DateTime<Utc>,
    #[serde(default, deserialize_with = "int_or_zero")]
    buy_delisted: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    buy_listed: i64,
    #[serde(default, deserialize_with = "float_or_zero")]
    buy_price_avg: f64,
    #[serde(default, deserialize_with = "int_or_zero")]
    buy_price_max: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    buy_price_min: i64,
    #[serde(default, deserialize_with = "float_or_zero")]
    buy_price_stdev: f64,
    #[serde(default, deserialize_with = "float_or_zero")]
    buy_quantity_avg: f64,
    #[serde(default, deserialize_with = "int_or_zero")]
    buy_quantity_max: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    buy_quantity_min: i64,
    #[serde(default, deserialize_with = "float_or_zero")]
    buy_quantity_stdev: f64,
    #[serde(default, deserialize_with = "int_or_zero")]
    buy_sold: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    buy_value: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    count: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    sell_delisted: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    sell_listed: i64,
    #[serde(default, deserialize_with = "float_or_zero")]
    sell_price_avg: f64,
    #[serde(default, deserialize_with = "int_or_zero")]
    sell_price_max: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    sell_price_min: i64,
    #[serde(default, deserialize_with = "float_or_zero")]
    sell_price_stdev: f64,
    #[serde(default, deserialize_with = "float_or_zero")]
    sell_quantity_avg: f64,
    #[serde(default, deserialize_with = "int_or_zero")]
    sell_quantity_max: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    sell_quantity_min: i64,
    #[serde(default, deserialize_with = "float_or_zero")]
    sell_quantity_stdev: f64,
    #[serde(default, deserialize_with = "int_or_zero")]
    sell_sold: i64,
    #[serde(default, deserialize_with = "int_or_zero")]
    sell_value: i64,
}

impl From<HistoryRecord> for HistoryPoint {
    fn from(r: HistoryRecord) -> Self {
        HistoryPoint {
            item: ItemId(r.item_id),
            timestamp: r.date,
            buy_delisted: r.buy_delisted,
            buy_listed: r.buy_listed,
            buy_price_avg: r.buy_price_avg,
            buy_price_max: r.buy_price_max,
            buy_price_min: r.buy_price_min,
            buy_price_stdev: r.buy_price_stdev,
            buy_quantity_avg: r.buy_quantity_avg,
            buy_quantity_max: r.buy_quantity_max,
            buy_quantity_min: r.buy_quantity_min,
            buy_quantity_stdev: r.buy_quantity_stdev,
            buy_sold: r.buy_sold,
            buy_value: r.buy_value,
            count: r.count,
            sell_delisted: r.sell_delisted,
            sell_listed: r.sell_listed,
            sell_price_avg: r.sell_price_avg,
            sell_price_max: r.sell_price_max,
            sell_price_min: r.sell_price_min,
            sell_price_stdev: r.sell_price_stdev,
            sell_quantity_avg: r.sell_quantity_avg,
            sell_quantity_max: r.sell_quantity_max,
            sell_quantity_min: r.sell_quantity_min,
            sell_quantity_stdev: r.sell_quantity_stdev,
            sell_sold: r.sell_sold,
            sell_value: r.sell_value,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemRecord {
    id: i64,
    #[serde(default)]
    name: String,
}

impl From<ItemRecord> for Item {
    fn from(r: ItemRecord) -> Self {
        Item {
            id: ItemId(r.id),
            name: r.name,
        }
    }
}

fn int_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    // Some aggregates arrive as floats (`12.0`).
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(|v| v.round() as i64).unwrap_or_default())
}

fn float_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

// Whole seconds only: rows are keyed by UNIX seconds in the store.
fn utc_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let parsed = match DateTime::parse_from_rfc3339(&raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|err| serde::de::Error::custom(format!("invalid date `{raw}`: {err}")))?,
    };
    Ok(parsed.trunc_subsecs(0))
}
