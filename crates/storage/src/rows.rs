use chrono::{DateTime, TimeZone, Utc};
use model::{HistoryPoint, Item, ItemId};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;

use crate::StoreError;

pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// A value that can be written as one row of a table by [`crate::Store::insert_many`].
pub trait TableRow: Send + Sync {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    /// Binds one value per entry of `COLUMNS`, in the same order.
    fn bind<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q>;
}

pub(crate) fn insert_statement(table: &str, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

pub(crate) const HISTORY_COLUMNS: &[&str] = &[
    "id",
    "buy_delisted",
    "buy_listed",
    "buy_price_avg",
    "buy_price_max",
    "buy_price_min",
    "buy_price_stdev",
    "buy_quantity_avg",
    "buy_quantity_max",
    "buy_quantity_min",
    "buy_quantity_stdev",
    "buy_sold",
    "buy_value",
    "count",
    "sell_delisted",
    "sell_listed",
    "sell_price_avg",
    "sell_price_max",
    "sell_price_min",
    "sell_price_stdev",
    "sell_quantity_avg",
    "sell_quantity_max",
    "sell_quantity_min",
    "sell_quantity_stdev",
    "sell_sold",
    "sell_value",
    "utc_timestamp",
];

impl TableRow for HistoryPoint {
    const TABLE: &'static str = "daily_history";
    const COLUMNS: &'static [&'static str] = HISTORY_COLUMNS;

    fn bind<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(self.item.get())
            .bind(self.buy_delisted)
            .bind(self.buy_listed)
            .bind(self.buy_price_avg)
            .bind(self.buy_price_max)
            .bind(self.buy_price_min)
            .bind(self.buy_price_stdev)
            .bind(self.buy_quantity_avg)
            .bind(self.buy_quantity_max)
            .bind(self.buy_quantity_min)
            .bind(self.buy_quantity_stdev)
            .bind(self.buy_sold)
            .bind(self.buy_value)
            .bind(self.count)
            .bind(self.sell_delisted)
            .bind(self.sell_listed)
            .bind(self.sell_price_avg)
            .bind(self.sell_price_max)
            .bind(self.sell_price_min)
            .bind(self.sell_price_stdev)
            .bind(self.sell_quantity_avg)
            .bind(self.sell_quantity_max)
            .bind(self.sell_quantity_min)
            .bind(self.sell_quantity_stdev)
            .bind(self.sell_sold)
            .bind(self.sell_value)
            .bind(self.timestamp.timestamp())
    }
}

impl TableRow for Item {
    const TABLE: &'static str = "items";
    const COLUMNS: &'static [&'static str] = &["id", "name"];

    fn bind<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query.bind(self.id.get()).bind(self.name.as_str())
    }
}

pub(crate) fn timestamp_from_secs(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(StoreError::InvalidTimestamp(secs))
}

pub(crate) fn history_from_row(row: &SqliteRow) -> Result<HistoryPoint, StoreError> {
    Ok(HistoryPoint {
        item: ItemId(row.try_get("id")?),
        timestamp: timestamp_from_secs(row.try_get("utc_timestamp")?)?,
        buy_delisted: row.try_get("buy_delisted")?,
        buy_listed: row.try_get("buy_listed")?,
        buy_price_avg: row.try_get("buy_price_avg")?,
        buy_price_max: row.try_get("buy_price_max")?,
        buy_price_min: row.try_get("buy_price_min")?,
        buy_price_stdev: row.try_get("buy_price_stdev")?,
        buy_quantity_avg: row.try_get("buy_quantity_avg")?,
        buy_quantity_max: row.try_get("buy_quantity_max")?,
        buy_quantity_min: row.try_get("buy_quantity_min")?,
        buy_quantity_stdev: row.try_get("buy_quantity_stdev")?,
        buy_sold: row.try_get("buy_sold")?,
        buy_value: row.try_get("buy_value")?,
        count: row.try_get("count")?,
        sell_delisted: row.try_get("sell_delisted")?,
        sell_listed: row.try_get("sell_listed")?,
        sell_price_avg: row.try_get("sell_price_avg")?,
        sell_price_max: row.try_get("sell_price_max")?,
        sell_price_min: row.try_get("sell_price_min")?,
        sell_price_stdev: row.try_get("sell_price_stdev")?,
        sell_quantity_avg: row.try_get("sell_quantity_avg")?,
        sell_quantity_max: row.try_get("sell_quantity_max")?,
        sell_quantity_min: row.try_get("sell_quantity_min")?,
        sell_quantity_stdev: row.try_get("sell_quantity_stdev")?,
        sell_sold: row.try_get("sell_sold")?,
        sell_value: row.try_get("sell_value")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_statement_lists_every_column() {
        assert_eq!(
            insert_statement("items", &["id", "name"]),
            "INSERT INTO items (id, name) VALUES (?, ?)"
        );
        let sql = insert_statement(HistoryPoint::TABLE, HistoryPoint::COLUMNS);
        assert_eq!(sql.matches('?').count(), 27);
    }
}
