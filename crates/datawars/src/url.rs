use chrono::{DateTime, Utc};
use model::ItemId;
use reqwest::Url;

use crate::{DatawarsConfig, SourceError};

// 2020-03-01T13:00:00Z
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    HistoryDaily,
    HistoryHourly,
    Items,
}

impl Endpoint {
    pub fn url(self, config: &DatawarsConfig) -> String {
        let (base, path) = match self {
            Endpoint::HistoryDaily => (&config.v2_base_url, "history/json"),
            Endpoint::HistoryHourly => (&config.v2_base_url, "history/hourly/json"),
            Endpoint::Items => (&config.v1_base_url, "items/json"),
        };
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

/// Optional date bounds of a history request. No start means full history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl FetchWindow {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn starting(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none()
    }
}

pub fn history_url(
    config: &DatawarsConfig,
    endpoint: Endpoint,
    items: &[ItemId],
    window: FetchWindow,
) -> Result<Url, SourceError> {
    if items.is_empty() {
        return Err(SourceError::InvalidRequest(
            "history request needs at least one item id".into(),
        ));
    }

    let ids = items
        .iter()
        .map(ItemId::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let mut params = vec![("itemID", ids)];
    if let Some(start) = window.start {
        params.push(("start", start.format(DATE_FORMAT).to_string()));
    }
    if let Some(end) = window.end {
        params.push(("end", end.format(DATE_FORMAT).to_string()));
    }

    parse(&endpoint.url(config), &params)
}

pub fn items_url(config: &DatawarsConfig) -> Result<Url, SourceError> {
    parse(&Endpoint::Items.url(config), &[])
}

fn parse(base: &str, params: &[(&str, String)]) -> Result<Url, SourceError> {
    let result = if params.is_empty() {
        Url::parse(base)
    } else {
        Url::parse_with_params(base, params)
    };
    result.map_err(|err| SourceError::InvalidRequest(format!("bad url {base}: {err}")))
}
