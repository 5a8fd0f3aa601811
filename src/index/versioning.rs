//! In-memory versioning cache backing optimistic concurrency.
//!
//! One cell per `(index, id)` pair holds the current document version and
//! the timestamp of its last update. The cache is write-through in memory
//! only; cold lookups fall back to a point query on the index (owned by the
//! write pipeline, not by this cache).

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A version cell: `(current version ≥ 1, last update timestamp)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCell {
    pub version: i64,
    pub timestamp: i64,
}

impl VersionCell {
    fn new(version: i64) -> Self {
        Self {
            version,
            timestamp: now_ticks(),
        }
    }
}

fn now_ticks() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Concurrent map of version cells with per-key compare-and-swap.
#[derive(Default)]
pub struct VersionCache {
    cells: DashMap<(String, String), VersionCell>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(index: &str, id: &str) -> (String, String) {
        (index.to_lowercase(), id.to_string())
    }

    pub fn get(&self, index: &str, id: &str) -> Option<VersionCell> {
        self.cells.get(&Self::key(index, id)).map(|cell| *cell)
    }

    /// Insert a fresh cell. Returns `false` when the key is already present.
    pub fn add(&self, index: &str, id: &str, version: i64) -> bool {
        match self.cells.entry(Self::key(index, id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(VersionCell::new(version));
                true
            }
        }
    }

    /// Atomic compare-and-swap: succeeds only when the stored cell still
    /// equals `expected`. The key's map shard stays locked for the whole
    /// exchange, so exactly one of two racing updates wins.
    pub fn update(&self, index: &str, id: &str, expected: VersionCell, new_version: i64) -> bool {
        match self.cells.get_mut(&Self::key(index, id)) {
            Some(mut cell) if *cell == expected => {
                *cell = VersionCell::new(new_version);
                true
            }
            _ => false,
        }
    }

    pub fn delete(&self, index: &str, id: &str) {
        self.cells.remove(&Self::key(index, id));
    }

    /// Drop every cell belonging to an index (index delete / delete-all).
    pub fn clear_index(&self, index: &str) {
        let index = index.to_lowercase();
        self.cells.retain(|(cell_index, _), _| *cell_index != index);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
