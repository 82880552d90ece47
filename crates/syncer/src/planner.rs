use std::collections::HashMap;

use chrono::{DateTime, Utc};
use model::ItemId;

use crate::freshness::Freshness;

/// Items that already have local history, synchronized with one shared request.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    members: Vec<(ItemId, DateTime<Utc>)>,
    watermark: DateTime<Utc>,
}

impl Chunk {
    fn new(members: Vec<(ItemId, DateTime<Utc>)>) -> Option<Self> {
        let watermark = members.iter().map(|(_, ts)| *ts).min()?;
        Some(Self { members, watermark })
    }

    pub fn items(&self) -> Vec<ItemId> {
        self.members.iter().map(|(id, _)| *id).collect()
    }

    /// Oldest local freshness among the members. Fetching from the day after
    /// it covers every member's gap.
    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    pub fn freshness(&self) -> HashMap<ItemId, DateTime<Utc>> {
        self.members.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncPlan {
    /// Items with no local rows. Each gets its own unbounded request.
    pub full_downloads: Vec<ItemId>,
    pub chunks: Vec<Chunk>,
}

/// Routes items without history to full downloads and groups the rest, in
/// order, into chunks of at most `chunk_size`.
pub fn plan(freshness: &[Freshness], chunk_size: usize) -> SyncPlan {
    let chunk_size = chunk_size.max(1);
    let mut full_downloads = Vec::new();
    let mut known = Vec::new();
    for (item, latest) in freshness {
        match latest {
            Some(ts) => known.push((*item, *ts)),
            None => full_downloads.push(*item),
        }
    }

    let chunks = known
        .chunks(chunk_size)
        .filter_map(|members| Chunk::new(members.to_vec()))
        .collect();

    SyncPlan {
        full_downloads,
        chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn items_without_history_never_join_a_chunk() {
        let freshness = vec![
            (ItemId(1), Some(day(5))),
            (ItemId(2), None),
            (ItemId(3), Some(day(2))),
            (ItemId(4), None),
        ];
        let plan = plan(&freshness, 20);

        assert_eq!(plan.full_downloads, vec![ItemId(2), ItemId(4)]);
        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(plan.chunks[0].items(), vec![ItemId(1), ItemId(3)]);
        assert_eq!(plan.chunks[0].watermark(), day(2));
    }

    #[test]
    fn chunks_preserve_order_and_respect_size() {
        let freshness: Vec<_> = (1..=5).map(|d| (ItemId(d as i64), Some(day(d)))).collect();
        let plan = plan(&freshness, 2);

        let groups: Vec<_> = plan.chunks.iter().map(Chunk::items).collect();
        assert_eq!(
            groups,
            vec![
                vec![ItemId(1), ItemId(2)],
                vec![ItemId(3), ItemId(4)],
                vec![ItemId(5)],
            ]
        );
        let watermarks: Vec<_> = plan.chunks.iter().map(Chunk::watermark).collect();
        assert_eq!(watermarks, vec![day(1), day(3), day(5)]);
        assert!(plan.full_downloads.is_empty());
    }

    #[test]
    fn zero_chunk_size_is_treated_as_one() {
        let freshness = vec![(ItemId(1), Some(day(1))), (ItemId(2), Some(day(2)))];
        assert_eq!(plan(&freshness, 0).chunks.len(), 2);
    }

    #[test]
    fn all_missing_yields_no_chunks() {
        let freshness = vec![(ItemId(1), None), (ItemId(2), None)];
        let plan = plan(&freshness, 3);
        assert!(plan.chunks.is_empty());
        assert_eq!(plan.full_downloads.len(), 2);
    }
}
