use admin_ipc::PassSummary;
use anyhow::Result;
use chrono::Utc;
use metrics::MetricsHandle;
use model::ItemId;
use storage::Store;
use syncer::{BatchReport, HistoryCache};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Items a pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watchlist {
    Items(Vec<ItemId>),
    /// Every id in the local item catalog, read at the start of each pass.
    AllItems,
}

impl Watchlist {
    async fn resolve(&self, store: &Store) -> Result<Vec<ItemId>> {
        match self {
            Watchlist::Items(items) => Ok(items.clone()),
            Watchlist::AllItems => Ok(store.item_ids().await?),
        }
    }
}

/// Runs one `sync_many` pass and records it in `sync_runs`, `incidents` and the metrics.
///
/// Sync failures are reported through the summary. `Err` means the pass could
/// not start: the watchlist or the `sync_runs` row could not be read or written.
pub async fn run_pass(
    cache: &HistoryCache,
    metrics: &MetricsHandle,
    watchlist: &Watchlist,
) -> Result<PassSummary> {
    let store = cache.store();
    let pass_id = Uuid::new_v4().to_string();
    let items = watchlist.resolve(store).await?;
    store.insert_run(&pass_id, items.len()).await?;
    info!(pass_id = %pass_id, items = items.len(), "sync pass started");

    let (success, rows, failed_units) =
        match cache.sync_many(&items, cache.config().chunk_size).await {
            Ok(report) => {
                let failed = record_failures(store, metrics, &pass_id, &report).await;
                (report.is_success(), report.rows_inserted(), failed)
            }
            Err(err) => {
                error!(pass_id = %pass_id, error = %err, "sync pass aborted before any download");
                log_incident(store, &pass_id, "error", err.kind(), &err.to_string()).await;
                (false, 0, 1)
            }
        };

    if let Err(err) = store.finish_run(&pass_id, rows, success).await {
        warn!(pass_id = %pass_id, error = ?err, "failed to record pass result");
    }
    let finished_at = Utc::now();
    metrics.record_pass(success, rows, finished_at.timestamp());

    if success {
        info!(pass_id = %pass_id, rows, "sync pass finished");
    } else {
        warn!(pass_id = %pass_id, rows, failed_units, "sync pass finished with failures");
    }

    Ok(PassSummary {
        finished_at_ms: finished_at.timestamp_millis(),
        success,
        items: items.len(),
        rows_inserted: rows,
        failed_units,
    })
}

/// [`run_pass`] for the scheduling loop: a pass that cannot start is logged,
/// counted as failed and summarized, never returned as an error.
pub async fn run_scheduled_pass(
    cache: &HistoryCache,
    metrics: &MetricsHandle,
    watchlist: &Watchlist,
) -> PassSummary {
    match run_pass(cache, metrics, watchlist).await {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = ?err, "sync pass could not start");
            let finished_at = Utc::now();
            metrics.record_pass(false, 0, finished_at.timestamp());
            PassSummary {
                finished_at_ms: finished_at.timestamp_millis(),
                success: false,
                items: 0,
                rows_inserted: 0,
                failed_units: 1,
            }
        }
    }
}

async fn record_failures(
    store: &Store,
    metrics: &MetricsHandle,
    pass_id: &str,
    report: &BatchReport,
) -> usize {
    let mut failed = 0;
    for (unit, err) in report.failures() {
        failed += 1;
        metrics.record_failed_unit(unit.kind.as_str());
        let message = format!("{} unit {:?} failed: {err}", unit.kind.as_str(), unit.items);
        log_incident(store, pass_id, "warning", err.kind(), &message).await;
    }
    if let Some(err) = &report.probe_failure {
        failed += 1;
        metrics.record_failed_unit("probe");
        let message = format!(
            "remote freshness probe failed, {} items not attempted: {err}",
            report.unattempted.len()
        );
        log_incident(store, pass_id, "error", err.kind(), &message).await;
    }
    failed
}

async fn log_incident(store: &Store, pass_id: &str, severity: &str, kind: &str, message: &str) {
    if let Err(err) = store.log_incident(pass_id, severity, kind, message).await {
        warn!(error = ?err, kind, "failed to record incident");
    }
}
