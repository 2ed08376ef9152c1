//! Published store — the read side of the refresh pipeline.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::info;

use roster_core::Record;

use crate::sort::SortSpec;

/// The complete result of one successful refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Monotonic publication counter; 0 before the first publish.
    pub version: u64,
    /// Unix timestamp (seconds) of publication; 0 before the first publish.
    pub refreshed_at: u64,
    /// host → record.
    pub records: BTreeMap<String, Record>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered for presentation.
    pub fn sorted(&self, spec: &SortSpec) -> Vec<(&str, &Record)> {
        spec.sort(&self.records)
    }
}

/// Process-wide published store, shared between the refresher and readers.
///
/// `Clone` hands out another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct InstanceStore {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the published set wholesale and return the new version.
    pub fn publish(&self, records: BTreeMap<String, Record>) -> u64 {
        let count = records.len();
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let version = current.version + 1;
        *current = Arc::new(Snapshot {
            version,
            refreshed_at: epoch_secs(),
            records,
        });
        drop(current);

        info!(version, instances = count, "published instance snapshot");
        version
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
