use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use datawars::{FetchWindow, HistorySource};
use model::{HistoryPoint, Item, ItemId};
use storage::{Store, Table};
use tracing::{debug, info, warn};

use crate::freshness::{fetch_start_after, FreshnessResolver};
use crate::merge::MergeWriter;
use crate::planner::{plan, Chunk};
use crate::report::{BatchReport, PopulateOutcome, SyncOutcome, UnitKind, UnitReport};
use crate::{Clock, SyncConfig, SyncError};

/// Local, append-only mirror of remote daily history.
///
/// Work is strictly sequential: the remote source admits one request at a
/// time, so fanning out would only queue behind its rate limiter.
pub struct HistoryCache {
    store: Store,
    source: Arc<dyn HistorySource>,
    config: SyncConfig,
    clock: Clock,
}

impl HistoryCache {
    pub fn new(store: Store, source: Arc<dyn HistorySource>, config: SyncConfig) -> Self {
        Self {
            store,
            source,
            config,
            clock: crate::system_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Hands the store back so the caller can close it.
    pub fn into_store(self) -> Store {
        self.store
    }

    fn resolver(&self) -> FreshnessResolver<'_> {
        FreshnessResolver::new(
            &self.store,
            self.source.as_ref(),
            self.config.reference_item,
            &self.clock,
        )
    }

    pub async fn local_freshness(&self, item: ItemId) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.resolver().local_freshness(item).await
    }

    pub async fn remote_freshness(&self) -> Result<DateTime<Utc>, SyncError> {
        self.resolver().remote_freshness().await
    }

    /// Downloads and stores whatever daily history `item` is missing.
    ///
    /// With no local rows the whole history is requested. Otherwise the remote
    /// watermark decides whether anything is requested at all. `force_full`
    /// requests the whole history regardless and keeps only rows newer than
    /// what is already stored.
    pub async fn sync_one(&self, item: ItemId, force_full: bool) -> Result<SyncOutcome, SyncError> {
        let resolver = self.resolver();
        let local = resolver.local_freshness(item).await?;

        let window = match local {
            _ if force_full => {
                debug!(item = %item, local = ?local, "forced full history download");
                FetchWindow::full()
            }
            None => {
                debug!(item = %item, "downloading full history");
                FetchWindow::full()
            }
            Some(local) => {
                let remote = resolver.remote_freshness().await?;
                if local >= remote {
                    debug!(item = %item, local = %local, remote = %remote, "history up to date, skipping");
                    return Ok(SyncOutcome::UpToDate);
                }
                let start = fetch_start_after(local);
                debug!(
                    item = %item,
                    local = %local,
                    remote = %remote,
                    start = %start,
                    "history out of date, downloading partial history"
                );
                FetchWindow::starting(start)
            }
        };

        let points = match self.source.fetch_history(&[item], window).await {
            Ok(points) => points,
            Err(err) => {
                warn!(item = %item, error = %err, "history download failed, store untouched");
                return Err(err.into());
            }
        };
        let points: Vec<HistoryPoint> = points.into_iter().filter(|p| p.item == item).collect();

        let writer = MergeWriter::new(&self.store);
        let rows = match local {
            Some(latest) => {
                writer
                    .write_filtered(points, &HashMap::from([(item, latest)]))
                    .await?
            }
            None => writer.write(points).await?,
        };
        info!(item = %item, rows, full = window.is_full(), "history synchronized");
        Ok(SyncOutcome::Downloaded {
            rows,
            full: window.is_full(),
        })
    }

    /// Synchronizes many items: full downloads one by one for items never seen
    /// before, then shared requests of up to `chunk_size` items for the rest.
    ///
    /// Returns `Err` only if local freshness could not be read. Every other
    /// failure is recorded in the report, and units that succeeded stay
    /// committed.
    pub async fn sync_many(
        &self,
        items: &[ItemId],
        chunk_size: usize,
    ) -> Result<BatchReport, SyncError> {
        let resolver = self.resolver();
        let freshness = resolver.local_freshness_batch(items).await?;
        let plan = plan(&freshness, chunk_size);
        let mut report = BatchReport::default();

        if !plan.full_downloads.is_empty() {
            debug!(
                count = plan.full_downloads.len(),
                "items missing locally, downloading full history individually"
            );
        }
        for item in plan.full_downloads {
            let result = self.sync_one(item, false).await;
            report.units.push(UnitReport {
                kind: UnitKind::FullDownload,
                items: vec![item],
                result,
            });
        }

        if plan.chunks.is_empty() {
            return Ok(report);
        }

        let remote = match resolver.remote_freshness().await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(error = %err, "remote freshness unknown, skipping incremental sync");
                report.unattempted = plan.chunks.iter().flat_map(Chunk::items).collect();
                report.probe_failure = Some(err);
                return Ok(report);
            }
        };

        for chunk in &plan.chunks {
            let result = self.sync_chunk(chunk, remote).await;
            if let Err(err) = &result {
                warn!(items = ?chunk.items(), error = %err, "chunk failed");
            }
            report.units.push(UnitReport {
                kind: UnitKind::Chunk,
                items: chunk.items(),
                result,
            });
        }

        info!(
            items = report.item_count(),
            rows = report.rows_inserted(),
            success = report.is_success(),
            "batch synchronized"
        );
        Ok(report)
    }

    async fn sync_chunk(
        &self,
        chunk: &Chunk,
        remote: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let watermark = chunk.watermark();
        if watermark >= remote {
            debug!(items = chunk.len(), watermark = %watermark, "chunk up to date, skipping");
            return Ok(SyncOutcome::UpToDate);
        }

        let start = fetch_start_after(watermark);
        debug!(
            items = chunk.len(),
            watermark = %watermark,
            remote = %remote,
            start = %start,
            "chunk out of date, downloading partial history"
        );
        let points = self
            .source
            .fetch_history(&chunk.items(), FetchWindow::starting(start))
            .await?;

        let rows = MergeWriter::new(&self.store)
            .write_filtered(points, &chunk.freshness())
            .await?;
        Ok(SyncOutcome::Downloaded { rows, full: false })
    }

    /// Stored history of `item`, oldest first, or `None` if nothing is stored.
    pub async fn history(&self, item: ItemId) -> Result<Option<Vec<HistoryPoint>>, SyncError> {
        if self.config.auto_sync {
            if let Err(err) = self.sync_one(item, false).await {
                warn!(item = %item, error = %err, "auto sync failed, serving cached history");
            }
        }

        let points = self
            .store
            .history(item)
            .await
            .map_err(SyncError::StoreReadFailure)?;
        if points.is_empty() {
            debug!(item = %item, "no history stored");
            return Ok(None);
        }
        Ok(Some(points))
    }

    /// Stored history grouped by item. Items without rows are absent.
    pub async fn history_batch(
        &self,
        items: &[ItemId],
    ) -> Result<HashMap<ItemId, Vec<HistoryPoint>>, SyncError> {
        if self.config.auto_sync {
            match self.sync_many(items, self.config.chunk_size).await {
                Ok(report) if !report.is_success() => {
                    warn!(
                        failures = report.failures().count(),
                        "auto sync incomplete, serving cached history"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "auto sync failed, serving cached history"),
            }
        }

        self.store
            .history_many(items)
            .await
            .map_err(SyncError::StoreReadFailure)
    }

    /// Loads the item catalog once. Later calls return `AlreadyPopulated` without a request.
    pub async fn populate_items(&self) -> Result<PopulateOutcome, SyncError> {
        let populated = self
            .store
            .has_any_rows(Table::Items)
            .await
            .map_err(SyncError::StoreReadFailure)?;
        if populated {
            debug!("item table already populated");
            return Ok(PopulateOutcome::AlreadyPopulated);
        }

        let items = self.source.fetch_items().await?;
        if items.is_empty() {
            return Err(SyncError::RemoteEmptyResult {
                what: "item catalog".into(),
            });
        }

        let mut seen = HashSet::with_capacity(items.len());
        let items: Vec<Item> = items.into_iter().filter(|i| seen.insert(i.id)).collect();
        let rows = self
            .store
            .insert_items(&items)
            .await
            .map_err(SyncError::StoreWriteFailure)?;
        info!(rows, "item table populated");
        Ok(PopulateOutcome::Inserted { rows })
    }
}
