use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use model::{HistoryPoint, Item, ItemId};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};

mod location;
mod rows;

pub use location::DbLocation;
pub use rows::{SqliteQuery, TableRow};

use rows::{history_from_row, insert_statement, timestamp_from_secs, HISTORY_COLUMNS};

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

// Stays well under SQLite's bound-parameter limit.
const MAX_IDS_PER_QUERY: usize = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid database location: {0}")]
    InvalidLocation(String),

    #[error("cannot insert rows without columns into {table}")]
    EmptyRowShape { table: &'static str },

    #[error("row already present in {table}")]
    DuplicateRow { table: &'static str },

    #[error("stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("sqlite: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Tables that can be probed with [`Store::has_any_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Items,
    DailyHistory,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Items => "items",
            Table::DailyHistory => "daily_history",
        }
    }
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let location = DbLocation::parse(url)?;
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to `sqlite::memory:` opens its own database, so keep exactly one alive.
        let pool = if location.is_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every pooled connection. Callers own the session and must call this on all exit paths.
    pub async fn close(self) {
        self.pool.close().await;
        debug!("sqlite pool closed");
    }

    pub async fn has_any_rows(&self, table: Table) -> Result<bool, StoreError> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} LIMIT 1)", table.as_str());
        let (present,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(present != 0)
    }

    /// Latest stored timestamp for `item`, or `None` when the item has never been synchronized.
    pub async fn max_timestamp(&self, item: ItemId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let (secs,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(utc_timestamp) FROM daily_history WHERE id = ?1")
                .bind(item.get())
                .fetch_one(&self.pool)
                .await?;
        secs.map(timestamp_from_secs).transpose()
    }

    /// Latest stored timestamp per item. Items without rows are absent from the map.
    pub async fn max_timestamps(
        &self,
        items: &[ItemId],
    ) -> Result<HashMap<ItemId, DateTime<Utc>>, StoreError> {
        let mut latest = HashMap::with_capacity(items.len());
        for slice in items.chunks(MAX_IDS_PER_QUERY) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id, MAX(utc_timestamp) FROM daily_history WHERE id IN (");
            let mut ids = builder.separated(", ");
            for item in slice {
                ids.push_bind(item.get());
            }
            ids.push_unseparated(") GROUP BY id");

            let rows: Vec<(i64, i64)> = builder.build_query_as().fetch_all(&self.pool).await?;
            for (id, secs) in rows {
                latest.insert(ItemId(id), timestamp_from_secs(secs)?);
            }
        }
        Ok(latest)
    }

    /// Inserts `rows` in a single transaction and returns how many were written.
    ///
    /// Empty input is a no-op. Any failure, including a duplicate key, rolls the
    /// whole call back.
    pub async fn insert_many<R: TableRow>(&self, rows: &[R]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            debug!(table = R::TABLE, "nothing to insert");
            return Ok(0);
        }
        if R::COLUMNS.is_empty() {
            return Err(StoreError::EmptyRowShape { table: R::TABLE });
        }

        let sql = insert_statement(R::TABLE, R::COLUMNS);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for row in rows {
            let result = row
                .bind(sqlx::query(&sql))
                .execute(&mut *tx)
                .await
                .map_err(|err| classify_insert_error(err, R::TABLE))?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        debug!(table = R::TABLE, rows = inserted, "rows inserted");
        Ok(inserted)
    }

    pub async fn insert_history(&self, points: &[HistoryPoint]) -> Result<u64, StoreError> {
        self.insert_many(points).await
    }

    pub async fn insert_items(&self, items: &[Item]) -> Result<u64, StoreError> {
        self.insert_many(items).await
    }

    pub async fn history(&self, item: ItemId) -> Result<Vec<HistoryPoint>, StoreError> {
        let sql = format!(
            "SELECT {} FROM daily_history WHERE id = ?1 ORDER BY utc_timestamp ASC",
            HISTORY_COLUMNS.join(", ")
        );
        let rows = sqlx::query(&sql)
            .bind(item.get())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(history_from_row).collect()
    }

    /// History for several items, grouped by item and ordered by timestamp.
    pub async fn history_many(
        &self,
        items: &[ItemId],
    ) -> Result<HashMap<ItemId, Vec<HistoryPoint>>, StoreError> {
        let mut grouped: HashMap<ItemId, Vec<HistoryPoint>> = HashMap::new();
        for slice in items.chunks(MAX_IDS_PER_QUERY) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {} FROM daily_history WHERE id IN (",
                HISTORY_COLUMNS.join(", ")
            ));
            let mut ids = builder.separated(", ");
            for item in slice {
                ids.push_bind(item.get());
            }
            ids.push_unseparated(") ORDER BY id ASC, utc_timestamp ASC");

            for row in builder.build().fetch_all(&self.pool).await? {
                let point = history_from_row(&row)?;
                grouped.entry(point.item).or_default().push(point);
            }
        }
        Ok(grouped)
    }

    pub async fn item_name(&self, item: ItemId) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM items WHERE id = ?1")
            .bind(item.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(name,)| name))
    }

    pub async fn item_ids(&self) -> Result<Vec<ItemId>, StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM items ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| ItemId(id)).collect())
    }

    pub async fn insert_run(&self, run_id: &str, item_count: usize) -> Result<(), StoreError> {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT OR REPLACE INTO sync_runs (run_id, started_at_ms, host, item_count) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(host)
        .bind(item_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn finish_run(
        &self,
        run_id: &str,
        rows_inserted: u64,
        success: bool,
    ) -> Result<(), StoreError> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "UPDATE sync_runs SET finished_at_ms = ?2, rows_inserted = ?3, success = ?4 WHERE run_id = ?1",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(rows_inserted as i64)
        .bind(success)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_incident(
        &self,
        run_id: &str,
        severity: &str,
        kind: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO incidents (run_id, ts_ms, severity, kind, message) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(severity)
        .bind(kind)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub async fn init_sqlite(url: &str) -> Result<Store, StoreError> {
    DbLocation::parse(url)?
        .ensure_parent_dir()
        .map_err(|err| StoreError::InvalidLocation(err.to_string()))?;
    let store = Store::connect(url).await?;
    info!(path = url, "sqlite initialized");
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}

fn classify_insert_error(err: sqlx::Error, table: &'static str) -> StoreError {
    let unique = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if unique {
        StoreError::DuplicateRow { table }
    } else {
        StoreError::Sqlx(err)
    }
}
