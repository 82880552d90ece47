//! Client for the Datawars2 Guild Wars 2 trading post API.
//!
//! Every request waits on a shared rate limiter, carries a per-attempt
//! deadline and is retried on transient failures.

use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use model::{HistoryPoint, Item, ItemId};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

mod config;
mod error;
mod record;
mod url;

pub use config::{DatawarsConfig, DATAWARS_V1_URL, DATAWARS_V2_URL};
pub use error::SourceError;
pub use url::{history_url, items_url, Endpoint, FetchWindow, DATE_FORMAT};

use record::{HistoryRecord, ItemRecord};

/// Where history and the item catalog come from.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Daily history for `items` within `window`, in the order the source returns it.
    ///
    /// Items without data in the window are simply missing from the result.
    async fn fetch_history(
        &self,
        items: &[ItemId],
        window: FetchWindow,
    ) -> Result<Vec<HistoryPoint>, SourceError>;

    /// The full item catalog.
    async fn fetch_items(&self) -> Result<Vec<Item>, SourceError>;
}

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct DatawarsClient {
    http: Client,
    config: DatawarsConfig,
    rate_limiter: Arc<DirectLimiter>,
}

impl DatawarsClient {
    pub fn new(config: DatawarsConfig) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| SourceError::Client(err.to_string()))?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            config.requests_per_second,
        )));
        Ok(Self {
            http,
            config,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &DatawarsConfig {
        &self.config
    }

    pub async fn daily_history(
        &self,
        items: &[ItemId],
        window: FetchWindow,
    ) -> Result<Vec<HistoryPoint>, SourceError> {
        self.history(Endpoint::HistoryDaily, items, window).await
    }

    pub async fn fetch_hourly_history(
        &self,
        items: &[ItemId],
        window: FetchWindow,
    ) -> Result<Vec<HistoryPoint>, SourceError> {
        self.history(Endpoint::HistoryHourly, items, window).await
    }

    pub async fn items(&self) -> Result<Vec<Item>, SourceError> {
        let url = items_url(&self.config)?;
        let records: Vec<ItemRecord> = self.get_json(url).await?;
        Ok(records.into_iter().map(Item::from).collect())
    }

    async fn history(
        &self,
        endpoint: Endpoint,
        items: &[ItemId],
        window: FetchWindow,
    ) -> Result<Vec<HistoryPoint>, SourceError> {
        let url = history_url(&self.config, endpoint, items, window)?;
        let records: Vec<HistoryRecord> = self.get_json(url).await?;
        debug!(
            items = items.len(),
            records = records.len(),
            "history records received"
        );
        Ok(records.into_iter().map(HistoryPoint::from).collect())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.get_once(&url).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(url = %url, attempt, error = %err, "datawars request failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, SourceError> {
        self.rate_limiter.until_ready().await;
        debug!("GET {}", url);

        let response = self
            .http
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| SourceError::from_reqwest(url.as_str(), err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SourceError::from_reqwest(url.as_str(), err))?;
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| SourceError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl HistorySource for DatawarsClient {
    async fn fetch_history(
        &self,
        items: &[ItemId],
        window: FetchWindow,
    ) -> Result<Vec<HistoryPoint>, SourceError> {
        self.daily_history(items, window).await
    }

    async fn fetch_items(&self) -> Result<Vec<Item>, SourceError> {
        self.items().await
    }
}
