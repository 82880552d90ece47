use std::collections::{HashMap, HashSet};

use chrono::{DateTime, SubsecRound, Utc};
use model::{HistoryPoint, ItemId};
use storage::Store;
use tracing::debug;

use crate::SyncError;

/// Writes downloaded history into the store, one transaction per call.
pub struct MergeWriter<'a> {
    store: &'a Store,
}

impl<'a> MergeWriter<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Inserts `entries` without filtering. Used when the request window was already item specific.
    pub async fn write(&self, entries: Vec<HistoryPoint>) -> Result<u64, SyncError> {
        let entries = distinct(to_store_precision(entries));
        self.store
            .insert_history(&entries)
            .await
            .map_err(SyncError::StoreWriteFailure)
    }

    /// Inserts only entries strictly newer than their own item's local freshness.
    pub async fn write_filtered(
        &self,
        entries: Vec<HistoryPoint>,
        freshness: &HashMap<ItemId, DateTime<Utc>>,
    ) -> Result<u64, SyncError> {
        let fetched = entries.len();
        let fresh = filter_new(to_store_precision(entries), freshness);
        debug!(fetched, kept = fresh.len(), "filtered chunk download");
        self.write(fresh).await
    }
}

/// Keeps entries newer than `freshness[item]`. Entries of items not in `freshness` are dropped.
pub fn filter_new(
    entries: Vec<HistoryPoint>,
    freshness: &HashMap<ItemId, DateTime<Utc>>,
) -> Vec<HistoryPoint> {
    entries
        .into_iter()
        .filter(|entry| match freshness.get(&entry.item) {
            Some(latest) => entry.timestamp > *latest,
            None => {
                debug!(item = %entry.item, "dropping record for item outside the chunk");
                false
            }
        })
        .collect()
}

// The store keys rows by whole seconds, so freshness comparisons must too.
fn to_store_precision(mut entries: Vec<HistoryPoint>) -> Vec<HistoryPoint> {
    for entry in &mut entries {
        entry.timestamp = entry.timestamp.trunc_subsecs(0);
    }
    entries
}

// One row per (item, timestamp), even if the payload repeats a record.
fn distinct(entries: Vec<HistoryPoint>) -> Vec<HistoryPoint> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|entry| seen.insert((entry.item, entry.timestamp)))
        .collect()
}
