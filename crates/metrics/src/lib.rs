use anyhow::Result;
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Counters describing history sync passes, exported in the Prometheus text format.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    passes: IntCounterVec,
    rows_inserted: IntCounter,
    failed_units: IntCounterVec,
    last_success: IntGauge,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let passes = IntCounterVec::new(
            Opts::new("tpsync_passes_total", "Sync passes by outcome"),
            &["outcome"],
        )?;
        let rows_inserted = IntCounter::new(
            "tpsync_rows_inserted_total",
            "History rows committed to the local store",
        )?;
        let failed_units = IntCounterVec::new(
            Opts::new(
                "tpsync_failed_units_total",
                "Failed sync units by kind (full, chunk, probe)",
            ),
            &["kind"],
        )?;
        let last_success = IntGauge::new(
            "tpsync_last_success_timestamp_seconds",
            "Unix time of the last pass without failures",
        )?;

        registry.register(Box::new(passes.clone()))?;
        registry.register(Box::new(rows_inserted.clone()))?;
        registry.register(Box::new(failed_units.clone()))?;
        registry.register(Box::new(last_success.clone()))?;

        Ok(Self {
            registry,
            passes,
            rows_inserted,
            failed_units,
            last_success,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Records a finished pass. `finished_at` is a unix timestamp in seconds.
    pub fn record_pass(&self, success: bool, rows: u64, finished_at: i64) {
        let outcome = if success { "success" } else { "failure" };
        self.passes.with_label_values(&[outcome]).inc();
        self.rows_inserted.inc_by(rows);
        if success {
            self.last_success.set(finished_at);
        }
    }

    pub fn record_failed_unit(&self, kind: &str) {
        self.failed_units.with_label_values(&[kind]).inc();
    }

    pub fn render(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let make_svc = make_service_fn(move |_| {
            let metrics = self.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, hyper::Error>(metrics.respond()) }
                }))
            }
        });

        let server = Server::try_bind(&addr)?.serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }

    fn respond(&self) -> Response<Body> {
        match self.render() {
            Ok(buffer) => {
                let mut response = Response::new(Body::from(buffer));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
                response
            }
            Err(err) => {
                warn!(error = ?err, "failed to encode metrics");
                let mut response = Response::new(Body::from("metrics encoding failed"));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(metrics: &MetricsHandle) -> String {
        String::from_utf8(metrics.render().unwrap()).unwrap()
    }

    #[test]
    fn passes_are_counted_by_outcome() {
        let metrics = MetricsHandle::new().unwrap();
        metrics.record_pass(true, 12, 1_715_000_000);
        metrics.record_pass(false, 3, 1_715_003_600);
        metrics.record_failed_unit("chunk");

        let text = render(&metrics);
        assert!(text.contains(r#"tpsync_passes_total{outcome="success"} 1"#));
        assert!(text.contains(r#"tpsync_passes_total{outcome="failure"} 1"#));
        assert!(text.contains("tpsync_rows_inserted_total 15"));
        assert!(text.contains(r#"tpsync_failed_units_total{kind="chunk"} 1"#));
        assert!(text.contains("tpsync_last_success_timestamp_seconds 1715000000"));
    }

    #[test]
    fn failed_pass_keeps_previous_success_time() {
        let metrics = MetricsHandle::new().unwrap();
        metrics.record_pass(true, 0, 100);
        metrics.record_pass(false, 0, 200);

        assert!(render(&metrics).contains("tpsync_last_success_timestamp_seconds 100"));
    }
}
