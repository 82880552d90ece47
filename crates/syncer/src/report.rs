use model::ItemId;

use crate::SyncError;

/// Result of a unit of synchronization that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local data already matches the remote watermark. No history was requested.
    UpToDate,
    /// History was downloaded and `rows` new rows were committed.
    Downloaded { rows: u64, full: bool },
}

impl SyncOutcome {
    pub fn rows_inserted(&self) -> u64 {
        match self {
            SyncOutcome::UpToDate => 0,
            SyncOutcome::Downloaded { rows, .. } => *rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateOutcome {
    AlreadyPopulated,
    Inserted { rows: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    FullDownload,
    Chunk,
}

impl UnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::FullDownload => "full",
            UnitKind::Chunk => "chunk",
        }
    }
}

#[derive(Debug)]
pub struct UnitReport {
    pub kind: UnitKind,
    pub items: Vec<ItemId>,
    pub result: Result<SyncOutcome, SyncError>,
}

/// Per-unit account of a `sync_many` call. Units that succeeded stay committed
/// even when others failed.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub units: Vec<UnitReport>,
    /// Set when the remote watermark could not be determined; chunked items were then not attempted.
    pub probe_failure: Option<SyncError>,
    pub unattempted: Vec<ItemId>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.probe_failure.is_none() && self.units.iter().all(|unit| unit.result.is_ok())
    }

    pub fn rows_inserted(&self) -> u64 {
        self.units
            .iter()
            .filter_map(|unit| unit.result.as_ref().ok())
            .map(SyncOutcome::rows_inserted)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&UnitReport, &SyncError)> + '_ {
        self.units
            .iter()
            .filter_map(|unit| unit.result.as_ref().err().map(|err| (unit, err)))
    }

    pub fn item_count(&self) -> usize {
        self.units.iter().map(|unit| unit.items.len()).sum::<usize>() + self.unattempted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_failed_unit_fails_the_batch_but_rows_still_count() {
        let report = BatchReport {
            units: vec![
                UnitReport {
                    kind: UnitKind::Chunk,
                    items: vec![ItemId(1), ItemId(2)],
                    result: Ok(SyncOutcome::Downloaded {
                        rows: 4,
                        full: false,
                    }),
                },
                UnitReport {
                    kind: UnitKind::Chunk,
                    items: vec![ItemId(3)],
                    result: Err(SyncError::RemoteEmptyResult {
                        what: "test".into(),
                    }),
                },
            ],
            ..BatchReport::default()
        };

        assert!(!report.is_success());
        assert_eq!(report.rows_inserted(), 4);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.item_count(), 3);
    }

    #[test]
    fn empty_batch_is_successful() {
        assert!(BatchReport::default().is_success());
    }
}
