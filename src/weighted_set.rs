//! Weighted Set ([C4]): a Ranged Set plus a sparse range-start to weight
//! map, used to represent an element's weighted base-descendant expansion.

use crate::error::{Error, Result};
use crate::key::ElementId;
use crate::ranged_set::RangedSet;
use std::collections::BTreeMap;

/// A `RangedSet` where each range carries an optional weight (default 1).
///
/// `fastAdd`-built sets are intentionally *not* merged eagerly: duplicate
/// ids accumulate weight, and ranges are only canonicalized once
/// `consolidate` runs. This mirrors the construction/consolidation split
/// used while folding a dimension hierarchy's weighted base expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedSet {
    ranges: BTreeMap<ElementId, ElementId>,
    weights: BTreeMap<ElementId, f64>,
    size: usize,
}

impl WeightedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A set containing a single element with weight 1.
    #[must_use]
    pub fn singleton(id: ElementId) -> Self {
        let mut set = Self::new();
        set.ranges.insert(id, id);
        set.size = 1;
        set
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn empty(&self) -> bool {
        self.size == 0
    }

    #[must_use]
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    fn range_weight(&self, range_start: ElementId) -> f64 {
        self.weights.get(&range_start).copied().unwrap_or(1.0)
    }

    /// The weight of a member id, looked up via the range containing it.
    pub fn weight(&self, id: ElementId) -> Result<f64> {
        self.ranges
            .range(..=id)
            .next_back()
            .filter(|(_, &hi)| hi >= id)
            .map(|(&lo, _)| self.range_weight(lo))
            .ok_or_else(|| Error::Internal(format!("element id {id} out of range")))
    }

    /// Adds `id` with `weight`, for unsorted incremental construction.
    /// A duplicate id sums its weight with the existing one; if the sum
    /// reverts to exactly 1, the sparse weight entry is dropped.
    pub fn fast_add(&mut self, id: ElementId, weight: f64) {
        if self.ranges.contains_key(&id) {
            let combined = self.weights.get(&id).copied().unwrap_or(1.0) + weight;
            if combined == 1.0 {
                self.weights.remove(&id);
            } else {
                self.weights.insert(id, combined);
            }
        } else {
            self.ranges.insert(id, id);
            if weight != 1.0 {
                self.weights.insert(id, weight);
            }
            self.size += 1;
        }
    }

    /// Appends a single id, assuming input arrives in ascending order.
    /// Extends the last range in place if it is adjacent and carries an
    /// equal weight.
    pub fn push_sorted(&mut self, id: ElementId, weight: f64) {
        self.push_sorted_range(id, id, weight);
    }

    /// Appends a range `[lo, hi]`, assuming input arrives in ascending,
    /// non-overlapping order.
    pub fn push_sorted_range(&mut self, lo: ElementId, hi: ElementId, weight: f64) {
        assert!(lo <= hi, "empty ranges are forbidden");

        if let Some((&last_lo, &last_hi)) = self.ranges.iter().next_back() {
            if last_hi + 1 == lo && self.range_weight(last_lo) == weight {
                self.ranges.remove(&last_lo);
                self.ranges.insert(last_lo, hi);
                self.size += (hi - lo) as usize + 1;
                return;
            }
        }

        self.ranges.insert(lo, hi);
        if weight != 1.0 {
            self.weights.insert(lo, weight);
        }
        self.size += (hi - lo) as usize + 1;
    }

    /// Merges adjacent ranges that carry the same effective weight.
    /// Run once after a sequence of `fast_add` calls.
    pub fn consolidate(&mut self) {
        let mut merged: BTreeMap<ElementId, ElementId> = BTreeMap::new();
        let mut merged_weights: BTreeMap<ElementId, f64> = BTreeMap::new();

        let mut iter = self.ranges.iter();
        let Some((&first_lo, &first_hi)) = iter.next() else {
            return;
        };

        let mut cur_lo = first_lo;
        let mut cur_hi = first_hi;
        let mut cur_w = self.range_weight(first_lo);

        for (&lo, &hi) in iter {
            let w = self.range_weight(lo);
            if lo == cur_hi + 1 && w == cur_w {
                cur_hi = hi;
            } else {
                merged.insert(cur_lo, cur_hi);
                if cur_w != 1.0 {
                    merged_weights.insert(cur_lo, cur_w);
                }
                cur_lo = lo;
                cur_hi = hi;
                cur_w = w;
            }
        }
        merged.insert(cur_lo, cur_hi);
        if cur_w != 1.0 {
            merged_weights.insert(cur_lo, cur_w);
        }

        self.ranges = merged;
        self.weights = merged_weights;
    }

    /// Iterates the disjoint `(lo, hi, weight)` ranges in ascending order.
    pub fn ranges(&self) -> impl Iterator<Item = (ElementId, ElementId, f64)> + '_ {
        self.ranges
            .iter()
            .map(move |(&lo, &hi)| (lo, hi, self.range_weight(lo)))
    }

    /// Iterates every `(id, weight)` member pair in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (ElementId, f64)> + '_ {
        self.ranges()
            .flat_map(|(lo, hi, w)| (lo..=hi).map(move |id| (id, w)))
    }

    /// Flattens the member ids into a plain [`RangedSet`], discarding
    /// weights.
    #[must_use]
    pub fn to_ranged_set(&self) -> RangedSet {
        let mut set = RangedSet::new();
        for (lo, hi, _) in self.ranges() {
            set.insert_range(lo, hi);
        }
        set
    }
}
