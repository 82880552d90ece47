use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use datawars::{FetchWindow, HistorySource};
use model::{latest_timestamp, ItemId};
use storage::Store;
use tracing::{debug, error};

use crate::{Clock, SyncError};

/// Local freshness of one item: the newest stored timestamp, if any.
pub type Freshness = (ItemId, Option<DateTime<Utc>>);

pub struct FreshnessResolver<'a> {
    store: &'a Store,
    source: &'a dyn HistorySource,
    reference_item: ItemId,
    clock: &'a Clock,
}

impl<'a> FreshnessResolver<'a> {
    pub fn new(
        store: &'a Store,
        source: &'a dyn HistorySource,
        reference_item: ItemId,
        clock: &'a Clock,
    ) -> Self {
        Self {
            store,
            source,
            reference_item,
            clock,
        }
    }

    pub async fn local_freshness(&self, item: ItemId) -> Result<Option<DateTime<Utc>>, SyncError> {
        let latest = self
            .store
            .max_timestamp(item)
            .await
            .map_err(SyncError::StoreReadFailure)?;
        match latest {
            Some(ts) => debug!(item = %item, latest = %ts, "local history found"),
            None => debug!(item = %item, "no local history"),
        }
        Ok(latest)
    }

    /// Freshness for each distinct id, in first-seen order.
    pub async fn local_freshness_batch(&self, items: &[ItemId]) -> Result<Vec<Freshness>, SyncError> {
        let mut seen = HashSet::with_capacity(items.len());
        let distinct: Vec<ItemId> = items.iter().copied().filter(|id| seen.insert(*id)).collect();

        let latest = self
            .store
            .max_timestamps(&distinct)
            .await
            .map_err(SyncError::StoreReadFailure)?;
        Ok(distinct
            .into_iter()
            .map(|id| (id, latest.get(&id).copied()))
            .collect())
    }

    /// Newest timestamp the remote source has for the reference item, looking back from yesterday.
    pub async fn remote_freshness(&self) -> Result<DateTime<Utc>, SyncError> {
        let yesterday = start_of_day((self.clock)() - Duration::days(1));
        let points = self
            .source
            .fetch_history(&[self.reference_item], FetchWindow::starting(yesterday))
            .await?;

        let latest = latest_timestamp(points.iter().filter(|p| p.item == self.reference_item));
        match latest {
            Some(ts) => {
                debug!(reference = %self.reference_item, latest = %ts, "remote freshness");
                Ok(ts)
            }
            None => {
                error!(
                    reference = %self.reference_item,
                    "remote returned no recent history, cannot determine remote freshness"
                );
                Err(SyncError::RemoteEmptyResult {
                    what: format!("recent history of reference item {}", self.reference_item),
                })
            }
        }
    }
}

pub(crate) fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// First instant of the day after `ts`: where an incremental download starts.
pub fn fetch_start_after(ts: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(ts + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fetch_starts_at_midnight_of_next_day() {
        let late = Utc.with_ymd_and_hms(2024, 5, 5, 23, 30, 0).unwrap();
        assert_eq!(
            fetch_start_after(late),
            Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap()
        );

        let midnight = Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap();
        assert_eq!(
            fetch_start_after(midnight),
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
        );
    }
}
