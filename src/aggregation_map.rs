//! AggregationMap ([C6]): compact run-length-encoded source-id to
//! target-sequence table, built once per query per dimension.

use crate::error::{Error, Result};
use crate::key::ElementId;
use crate::weighted_set::WeightedSet;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct TargetSequence {
    offset: usize,
    len: usize,
}

#[derive(Debug, Clone)]
enum SourceIndex {
    /// Run-starts: `(source_range_begin, sequence_index)`, ascending,
    /// append-only while a run's index doesn't change from the previous.
    Sparse(Vec<(ElementId, usize)>),
    /// `source - min_base -> sequence_index`, one entry per source id.
    Dense(Vec<usize>),
}

/// Maps every base ("source") element of a dimension to the weighted set
/// of target elements it contributes to, in a compacted run-length form.
#[derive(Debug, Clone)]
pub struct AggregationMap {
    // Build-phase scratch: source -> (target -> weight), ascending by source.
    base_to_parent: BTreeMap<ElementId, BTreeMap<ElementId, f64>>,
    min_base: Option<ElementId>,
    max_base: Option<ElementId>,

    target_id_buffer: Vec<ElementId>,
    weight_buffer: Vec<f64>,
    distribution_map: Vec<TargetSequence>,
    index: SourceIndex,
}

impl Default for AggregationMap {
    fn default() -> Self {
        Self {
            base_to_parent: BTreeMap::new(),
            min_base: None,
            max_base: None,
            target_id_buffer: Vec::new(),
            weight_buffer: Vec::new(),
            distribution_map: Vec::new(),
            index: SourceIndex::Sparse(Vec::new()),
        }
    }
}

impl AggregationMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build phase: records that `target`'s base expansion includes every
    /// `(base_id, weight)` of `base_weights`. Called once per target
    /// element of the dimension being aggregated.
    pub fn build_base_to_parent_map(&mut self, target: ElementId, base_weights: &WeightedSet) {
        for (base_id, weight) in base_weights.iter() {
            self.base_to_parent
                .entry(base_id)
                .or_default()
                .insert(target, weight);
            self.min_base = Some(self.min_base.map_or(base_id, |m| m.min(base_id)));
            self.max_base = Some(self.max_base.map_or(base_id, |m| m.max(base_id)));
        }
    }

    /// Compact phase: run once after every target has been folded in by
    /// [`Self::build_base_to_parent_map`]. Encodes each unique source's
    /// target list into the flat buffers.
    pub fn compact_source_to_target(&mut self) {
        self.target_id_buffer.clear();
        self.weight_buffer.clear();
        self.distribution_map.clear();
        self.index = SourceIndex::Sparse(Vec::new());

        let sources: Vec<ElementId> = self.base_to_parent.keys().copied().collect();
        for (i, &source) in sources.iter().enumerate() {
            let targets = &self.base_to_parent[&source];
            let target_ids: Vec<ElementId> = targets.keys().copied().collect();
            let target_weights: Vec<f64> = targets.values().copied().collect();
            let next_source = sources.get(i + 1).copied().unwrap_or(source + 1);
            self.store_distribution_sequence(source, next_source, &target_ids, &target_weights);
        }
    }

    /// Dedup-encodes one source's target sequence into the compact form.
    ///
    /// The original engine also searched for an identical previously
    /// stored sequence to reuse its index, but that search ran behind a
    /// permanently-disabled condition; every sequence always ends up
    /// freshly appended. This implementation always appends, matching
    /// the code path actually taken.
    fn store_distribution_sequence(
        &mut self,
        source: ElementId,
        next_source: ElementId,
        target_ids: &[ElementId],
        target_weights: &[f64],
    ) {
        let offset = self.target_id_buffer.len();
        let has_non_default_weight = target_weights.iter().any(|&w| w != 1.0);

        if has_non_default_weight {
            if self.weight_buffer.len() < offset {
                self.weight_buffer.resize(offset, 1.0);
            }
            self.weight_buffer.extend_from_slice(target_weights);
        }
        self.target_id_buffer.extend_from_slice(target_ids);

        let seq_index = self.distribution_map.len();
        self.distribution_map.push(TargetSequence {
            offset,
            len: target_ids.len(),
        });

        let (min_base, max_base) = (
            self.min_base.expect("source present implies bounds set"),
            self.max_base.expect("source present implies bounds set"),
        );

        match &mut self.index {
            SourceIndex::Sparse(runs) => {
                if runs.last().is_none_or(|&(_, idx)| idx != seq_index) {
                    runs.push((source, seq_index));
                }
                let sparse_bytes = runs.len() * std::mem::size_of::<(ElementId, usize)>();
                let dense_len = (max_base - min_base) as usize + 1;
                let dense_bytes = dense_len * std::mem::size_of::<usize>();
                if sparse_bytes > dense_bytes {
                    let mut dense = vec![0usize; dense_len];
                    let mut iter = runs.iter().peekable();
                    while let Some(&(run_start, idx)) = iter.next() {
                        let run_end = iter
                            .peek()
                            .map_or(max_base + 1, |&&(next_start, _)| next_start);
                        for s in run_start..run_end {
                            dense[(s - min_base) as usize] = idx;
                        }
                    }
                    self.index = SourceIndex::Dense(dense);
                }
            }
            SourceIndex::Dense(dense) => {
                let fill_end = (max_base + 1).min(next_source);
                for s in source..fill_end {
                    dense[(s - min_base) as usize] = seq_index;
                }
            }
        }
    }

    /// Looks up the target sequence for `source_id`. Fails if the id is
    /// outside `[min_base, max_base]`.
    pub fn get_targets(&self, source_id: ElementId) -> Result<TargetReader<'_>> {
        let (min_base, max_base) = match (self.min_base, self.max_base) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => {
                return Err(Error::Internal(
                    "AggregationMap::get_targets: map is empty".into(),
                ))
            }
        };
        if source_id < min_base || source_id > max_base {
            return Err(Error::Internal(
                "AggregationMap::get_targets: sourceId out of range".into(),
            ));
        }

        let seq_index = match &self.index {
            SourceIndex::Dense(dense) => dense[(source_id - min_base) as usize],
            SourceIndex::Sparse(runs) => {
                let pos = runs.partition_point(|&(start, _)| start <= source_id);
                runs[pos - 1].1
            }
        };
        let seq = self.distribution_map[seq_index];
        let ids = &self.target_id_buffer[seq.offset..seq.offset + seq.len];
        let weights = if self.weight_buffer.len() > seq.offset {
            let end = (seq.offset + seq.len).min(self.weight_buffer.len());
            Some(&self.weight_buffer[seq.offset..end])
        } else {
            None
        };
        Ok(TargetReader::new(ids, weights))
    }
}

/// Forward reader over one source's target ids and weights.
#[derive(Debug, Clone)]
pub struct TargetReader<'a> {
    ids: &'a [ElementId],
    weights: Option<&'a [f64]>,
    pos: usize,
}

impl<'a> TargetReader<'a> {
    fn new(ids: &'a [ElementId], weights: Option<&'a [f64]>) -> Self {
        Self { ids, weights, pos: 0 }
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }

    #[must_use]
    pub fn end(&self) -> bool {
        self.pos >= self.ids.len()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn current(&self) -> ElementId {
        self.ids[self.pos]
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weights
            .and_then(|w| w.get(self.pos))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }
}

impl Iterator for TargetReader<'_> {
    type Item = (ElementId, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.end() {
            return None;
        }
        let item = (self.current(), self.weight());
        self.advance();
        Some(item)
    }
}
