//! Base and result value storage ([C5]/[C8]): flat maps from packed
//! cell key to cell value.

use rustc_hash::FxHashMap;

/// Read-only facts loaded from a cube's `[NUMERIC]` section, keyed by
/// packed cell key.
#[derive(Debug, Clone, Default)]
pub struct BaseStorage {
    cells: FxHashMap<u64, f64>,
}

impl BaseStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: u64, value: f64) {
        self.cells.insert(key, value);
    }

    #[must_use]
    pub fn get(&self, key: u64) -> Option<f64> {
        self.cells.get(&key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.cells.iter().map(|(&k, &v)| (k, v))
    }
}

/// Transient, per-query output of the aggregation processor, keyed by
/// packed target cell key.
#[derive(Debug, Clone, Default)]
pub struct ResultStorage {
    cells: FxHashMap<u64, f64>,
}

impl ResultStorage {
    /// Pre-sizes the underlying map to `capacity` entries, matching the
    /// engine's preallocate-to-worst-case-size memory policy.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn add(&mut self, key: u64, contribution: f64) {
        *self.cells.entry(key).or_insert(0.0) += contribution;
    }

    #[must_use]
    pub fn get(&self, key: u64) -> Option<f64> {
        self.cells.get(&key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
