#![allow(dead_code)]

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use datawars::{FetchWindow, HistorySource, SourceError};
use model::{HistoryPoint, Item, ItemId};
use storage::Store;
use syncer::{fixed_clock, HistoryCache, SyncConfig, GLOB_OF_ECTOPLASM};

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap()
}

/// Noon the day after the newest remote row.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 7, 12, 0, 0).unwrap()
}

pub fn points(item: i64, days: RangeInclusive<u32>) -> Vec<HistoryPoint> {
    days.map(|d| {
        let mut point = HistoryPoint::empty(ItemId(item), day(d));
        point.sell_price_min = item * 100 + i64::from(d);
        point
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    History {
        items: Vec<ItemId>,
        window: FetchWindow,
    },
    Items,
}

/// In-memory remote that records every request and can be told to fail for chosen items.
pub struct FakeSource {
    history: Mutex<Vec<HistoryPoint>>,
    items: Mutex<Vec<Item>>,
    failing: Mutex<HashSet<ItemId>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeSource {
    /// Remote with the reference item traded on May 1st through 6th.
    pub fn new() -> Arc<Self> {
        Self::with_reference_days(1..=6)
    }

    pub fn with_reference_days(days: RangeInclusive<u32>) -> Arc<Self> {
        Arc::new(Self {
            history: Mutex::new(points(GLOB_OF_ECTOPLASM.get(), days)),
            items: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn add_history(&self, item: i64, days: RangeInclusive<u32>) {
        self.history.lock().unwrap().extend(points(item, days));
    }

    pub fn add_points(&self, points: Vec<HistoryPoint>) {
        self.history.lock().unwrap().extend(points);
    }

    pub fn set_items(&self, items: Vec<Item>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn fail(&self, item: i64) {
        self.failing.lock().unwrap().insert(ItemId(item));
    }

    pub fn recover(&self, item: i64) {
        self.failing.lock().unwrap().remove(&ItemId(item));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// History requests that were not the reference item probe.
    pub fn downloads(&self) -> Vec<(Vec<ItemId>, FetchWindow)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::History { items, window } if items != vec![GLOB_OF_ECTOPLASM] => {
                    Some((items, window))
                }
                _ => None,
            })
            .collect()
    }

    pub fn probes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::History { items, .. } if items == &vec![GLOB_OF_ECTOPLASM]))
            .count()
    }
}

#[async_trait]
impl HistorySource for FakeSource {
    async fn fetch_history(
        &self,
        items: &[ItemId],
        window: FetchWindow,
    ) -> Result<Vec<HistoryPoint>, SourceError> {
        self.calls.lock().unwrap().push(Call::History {
            items: items.to_vec(),
            window,
        });

        let failing = self.failing.lock().unwrap();
        if items.iter().any(|item| failing.contains(item)) {
            return Err(SourceError::Status {
                url: "fake://history".into(),
                status: 503,
                body: "unavailable".into(),
            });
        }

        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|p| items.contains(&p.item))
            .filter(|p| window.start.map_or(true, |start| p.timestamp >= start))
            .filter(|p| window.end.map_or(true, |end| p.timestamp < end))
            .cloned()
            .collect())
    }

    async fn fetch_items(&self) -> Result<Vec<Item>, SourceError> {
        self.calls.lock().unwrap().push(Call::Items);
        Ok(self.items.lock().unwrap().clone())
    }
}

pub async fn memory_store() -> Store {
    Store::connect("sqlite::memory:").await.unwrap()
}

pub async fn cache_with(source: &Arc<FakeSource>, config: SyncConfig) -> HistoryCache {
    HistoryCache::new(memory_store().await, source.clone(), config).with_clock(fixed_clock(now()))
}

pub async fn cache(source: &Arc<FakeSource>) -> HistoryCache {
    cache_with(source, SyncConfig::default()).await
}

pub async fn stored_days(cache: &HistoryCache, item: i64) -> Vec<DateTime<Utc>> {
    cache
        .store()
        .history(ItemId(item))
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.timestamp)
        .collect()
}

pub fn days(range: RangeInclusive<u32>) -> Vec<DateTime<Utc>> {
    range.map(day).collect()
}
