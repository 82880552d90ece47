use std::{
    net::SocketAddr,
    num::NonZeroU32,
    sync::{Arc, Mutex},
    time::Duration,
};

use admin_ipc::{
    run_server, AdminRequest, AdminResponse, AdminStatus, PassSummary, DEFAULT_SOCKET_PATH,
};
use anyhow::{anyhow, bail};
use clap::Parser;
use datawars::{DatawarsClient, DatawarsConfig, DATAWARS_V1_URL, DATAWARS_V2_URL};
use metrics::MetricsHandle;
use model::ItemId;
use storage::{init_sqlite, Store};
use syncer::{HistoryCache, PopulateOutcome, SyncConfig, DEFAULT_CHUNK_SIZE};
use tokio::{signal, task, time};
use tracing::{error, info, warn, Level};
use uuid::Uuid;

mod gate;
mod pass;

use gate::SyncGate;
use pass::{run_pass, run_scheduled_pass, Watchlist};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "SQLITE_PATH", default_value = "sqlite://tpsync.db")]
    sqlite_path: String,

    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    admin_socket: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9109")]
    metrics_addr: SocketAddr,

    /// Comma separated item ids to keep in sync.
    #[arg(long, env = "TPSYNC_ITEMS", value_delimiter = ',')]
    items: Vec<i64>,

    /// Sync every item in the catalog instead of `--items`.
    #[arg(long, conflicts_with = "items")]
    all_items: bool,

    #[arg(long, env = "TPSYNC_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, env = "TPSYNC_INTERVAL_SECS", default_value_t = 3600)]
    interval_secs: u64,

    #[arg(long, default_value_t = syncer::GLOB_OF_ECTOPLASM.get())]
    reference_item: i64,

    #[arg(long, env = "DATAWARS_V1_URL", default_value = DATAWARS_V1_URL)]
    v1_url: String,

    #[arg(long, env = "DATAWARS_V2_URL", default_value = DATAWARS_V2_URL)]
    v2_url: String,

    #[arg(long, default_value = "1")]
    requests_per_second: NonZeroU32,

    #[arg(long, default_value_t = 5)]
    request_timeout_secs: u64,

    /// Run a single pass and exit.
    #[arg(long)]
    once: bool,
}

impl Args {
    fn watchlist(&self) -> anyhow::Result<Watchlist> {
        if self.all_items {
            return Ok(Watchlist::AllItems);
        }
        if self.items.is_empty() {
            bail!("nothing to sync: pass `--items` or `--all-items`");
        }
        Ok(Watchlist::Items(
            self.items.iter().copied().map(ItemId).collect(),
        ))
    }

    fn datawars_config(&self) -> DatawarsConfig {
        DatawarsConfig {
            v1_base_url: self.v1_url.clone(),
            v2_base_url: self.v2_url.clone(),
            requests_per_second: self.requests_per_second,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..DatawarsConfig::default()
        }
    }

    fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            chunk_size: self.chunk_size,
            reference_item: ItemId(self.reference_item),
            auto_sync: false,
        }
    }
}

fn log_startup(args: &Args, run_id: &str) {
    info!(path = %args.sqlite_path, "sqlite path configured");
    info!(v2 = %args.v2_url, rps = args.requests_per_second.get(), "datawars source configured");
    info!(
        items = args.items.len(),
        all_items = args.all_items,
        chunk_size = args.chunk_size,
        "watchlist configured"
    );
    if !args.once {
        info!(socket = %args.admin_socket, "admin socket bind planned");
        info!(addr = %args.metrics_addr, "metrics bind planned");
    }
    info!(%run_id, "run initialized");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let watchlist = args.watchlist()?;
    let run_id = Uuid::new_v4().to_string();
    log_startup(&args, &run_id);

    let store = init_sqlite(&args.sqlite_path).await?;
    let result = run(&args, &run_id, &store, watchlist).await;
    store.close().await;
    if let Err(err) = &result {
        error!(error = ?err, %run_id, "tpsyncd stopped with error");
    }
    result
}

async fn run(args: &Args, run_id: &str, store: &Store, watchlist: Watchlist) -> anyhow::Result<()> {
    let source = Arc::new(DatawarsClient::new(args.datawars_config())?);
    let cache = HistoryCache::new(store.clone(), source, args.sync_config());

    match cache.populate_items().await {
        Ok(PopulateOutcome::Inserted { rows }) => info!(rows, "item catalog loaded"),
        Ok(PopulateOutcome::AlreadyPopulated) => {}
        Err(err) if watchlist == Watchlist::AllItems => {
            return Err(anyhow::Error::new(err).context("item catalog is required for --all-items"));
        }
        Err(err) => warn!(error = %err, "item catalog unavailable, continuing with --items"),
    }

    let metrics = MetricsHandle::new()?;

    if args.once {
        let summary = run_pass(&cache, &metrics, &watchlist).await?;
        if !summary.success {
            bail!(
                "sync pass failed: {} failed units, {} rows inserted",
                summary.failed_units,
                summary.rows_inserted
            );
        }
        return Ok(());
    }

    let gate = SyncGate::new();
    let last_pass: Arc<Mutex<Option<PassSummary>>> = Arc::new(Mutex::new(None));

    spawn_admin_server(
        &args.admin_socket,
        run_id.to_string(),
        gate.clone(),
        last_pass.clone(),
    );

    let metrics_task = metrics.clone();
    let metrics_addr = args.metrics_addr;
    task::spawn(async move {
        if let Err(err) = metrics_task.serve(metrics_addr).await {
            error!(error = ?err, "metrics server error");
        }
    });

    if let Err(err) = store
        .log_incident(run_id, "info", "ready", "tpsyncd booted and ready")
        .await
    {
        warn!(error = ?err, "failed to record ready incident");
    }
    info!(run_id = %run_id, interval_secs = args.interval_secs, "ready");

    let mut ticker = time::interval(Duration::from_secs(args.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = gate.sync_requested() => info!("sync requested over admin socket"),
            res = signal::ctrl_c() => {
                if let Err(err) = res {
                    warn!(error = ?err, "failed to listen for shutdown signal");
                }
                info!(run_id = %run_id, "shutting down");
                return Ok(());
            }
        }

        let Some(_pass) = gate.try_begin_pass() else {
            info!("sync paused, skipping pass");
            continue;
        };

        let summary = run_scheduled_pass(&cache, &metrics, &watchlist).await;
        match last_pass.lock() {
            Ok(mut guard) => *guard = Some(summary),
            Err(_) => warn!("last pass summary lock poisoned"),
        }
    }
}

fn spawn_admin_server(
    socket_path: &str,
    run_id: String,
    gate: SyncGate,
    last_pass: Arc<Mutex<Option<PassSummary>>>,
) {
    let socket_path = socket_path.to_string();
    task::spawn(async move {
        let handler = move |req: AdminRequest| -> anyhow::Result<AdminResponse> {
            match req {
                AdminRequest::Status => {
                    let last_pass = last_pass
                        .lock()
                        .map_err(|_| anyhow!("last pass summary lock poisoned"))?
                        .clone();
                    Ok(AdminResponse::Status(AdminStatus {
                        run_id: run_id.clone(),
                        sync_state: gate.status().as_str().to_string(),
                        last_pass,
                    }))
                }
                AdminRequest::Pause => {
                    gate.pause();
                    Ok(AdminResponse::Ack)
                }
                AdminRequest::Resume => {
                    gate.resume();
                    Ok(AdminResponse::Ack)
                }
                AdminRequest::SyncNow => {
                    gate.request_sync()?;
                    Ok(AdminResponse::Ack)
                }
            }
        };
        if let Err(err) = run_server(&socket_path, handler).await {
            error!(error = ?err, "admin ipc server failed");
        }
    });
}
