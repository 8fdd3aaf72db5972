//! AggregationProcessor ([C7]): folds base cells into a requested
//! target area's consolidated cells.

use crate::aggregation_map::{AggregationMap, TargetReader};
use crate::area::Area;
use crate::dimension::Dimension;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::key::{ElementId, KeyCodec};
use crate::ranged_set::RangedSet;
use crate::storage::{BaseStorage, ResultStorage};

/// Default gate for the target-based optimization: below this target
/// size (and when the expanded source area is no bigger than the base
/// storage itself), it is cheaper to probe the base storage directly
/// than to scan it. Inherited as a tunable, not a hard-coded constant.
pub const DEFAULT_TARGET_BASED_THRESHOLD: usize = 60;

/// Which reduction folds base contributions into a target cell. Only
/// [`AggregationKind::Sum`] is implemented; the others are named for
/// surface completeness but rejected at setup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

/// Drives a single query's base-to-target aggregation.
pub struct AggregationProcessor {
    dim_count: usize,
    parent_maps: Vec<AggregationMap>,
    src_area: Area,
    target: Area,
    kind: AggregationKind,
    target_based_threshold: usize,
    single_base_cell: bool,
}

impl AggregationProcessor {
    /// Setup phase: expands every target element of every dimension into
    /// its weighted base set, folding the result into a per-dimension
    /// [`AggregationMap`] and the combined source area.
    pub fn new(target: Area, dims: &[Dimension], kind: AggregationKind) -> Result<Self> {
        if kind != AggregationKind::Sum {
            return Err(Error::Internal(format!(
                "aggregation kind {kind:?} is not implemented"
            )));
        }

        let dim_count = target.dim_count();
        assert_eq!(dim_count, dims.len());

        let mut parent_maps = Vec::with_capacity(dim_count);
        let mut src_area = Area::empty(dim_count);

        for (d, dim) in dims.iter().enumerate() {
            let mut map = AggregationMap::new();
            let mut src_ids = RangedSet::new();

            let target_ids = target
                .dim(d)
                .ok_or_else(|| Error::InvalidCoordinates(format!("dimension {d} has no members set")))?;
            for target_id in target_ids {
                let base_weights = dim.expand_base(target_id)?;
                for (base_id, _) in base_weights.iter() {
                    src_ids.insert(base_id);
                }
                map.build_base_to_parent_map(target_id, &base_weights);
            }
            map.compact_source_to_target();

            src_area.set_dim(d, src_ids);
            parent_maps.push(map);
        }

        let single_base_cell = target.size() == 1
            && target.path_iter().next().is_some_and(|path| {
                path.iter()
                    .zip(dims)
                    .all(|(&id, dim)| dim.lookup_by_id(id).is_some_and(Element::is_base))
            });

        Ok(Self {
            dim_count,
            parent_maps,
            src_area,
            target,
            kind,
            target_based_threshold: DEFAULT_TARGET_BASED_THRESHOLD,
            single_base_cell,
        })
    }

    #[must_use]
    pub fn with_target_based_threshold(mut self, threshold: usize) -> Self {
        self.target_based_threshold = threshold;
        self
    }

    #[must_use]
    pub fn kind(&self) -> AggregationKind {
        self.kind
    }

    #[must_use]
    pub fn source_area(&self) -> &Area {
        &self.src_area
    }

    /// Runs the hot loop, returning the fully populated result storage.
    ///
    /// A target area of exactly one base cell never enters the loop: the
    /// caller is expected to read such cells directly from base storage
    /// instead (see [`crate::result`]).
    pub fn aggregate(&self, base_storage: &BaseStorage, codec: &KeyCodec) -> Result<ResultStorage> {
        if self.single_base_cell {
            return Ok(ResultStorage::with_capacity(0));
        }

        let mut result = ResultStorage::with_capacity(self.target.size());

        let use_target_based =
            self.target.size() <= self.target_based_threshold && self.src_area.size() <= base_storage.len();

        if use_target_based {
            log::debug!("using target-based aggregation (target.size()={})", self.target.size());
            for path in self.src_area.path_iter() {
                let key = codec.encode(&path);
                if let Some(value) = base_storage.get(key) {
                    self.aggregate_cell(&path, value, codec, &mut result)?;
                }
            }
        } else {
            log::debug!("using source-based aggregation (base_storage.len()={})", base_storage.len());
            for (key, value) in base_storage.iter() {
                let path = codec.decode(key);
                if self.is_in_source_area(&path) {
                    self.aggregate_cell(&path, value, codec, &mut result)?;
                }
            }
        }

        Ok(result)
    }

    fn is_in_source_area(&self, path: &[ElementId]) -> bool {
        path.iter()
            .enumerate()
            .all(|(d, &id)| self.src_area.dim(d).is_some_and(|set| set.contains(id)))
    }

    /// Scatters one base cell's value into every target combination it
    /// contributes to.
    fn aggregate_cell(
        &self,
        key: &[ElementId],
        value: f64,
        codec: &KeyCodec,
        result: &mut ResultStorage,
    ) -> Result<()> {
        let (mut parent_key, mut readers, multi_dims, fixed_weight) = self.init_parent_key(key)?;

        loop {
            let mut weight = fixed_weight;
            for &d in &multi_dims {
                weight *= readers[d].weight();
            }
            let target_key = codec.encode(&parent_key);
            result.add(target_key, weight * value);

            if !Self::next_parent_key(&mut parent_key, &mut readers, &multi_dims) {
                break;
            }
        }
        Ok(())
    }

    /// Builds the initial target combination for `key`, and the list of
    /// dimensions with more than one target ("multi-dims"), folding every
    /// single-target dimension's weight into `fixed_weight`.
    fn init_parent_key(
        &self,
        key: &[ElementId],
    ) -> Result<(Vec<ElementId>, Vec<TargetReader<'_>>, Vec<usize>, f64)> {
        let mut parent_key = vec![0; self.dim_count];
        let mut readers = Vec::with_capacity(self.dim_count);
        let mut multi_dims = Vec::new();
        let mut fixed_weight = 1.0;

        for d in 0..self.dim_count {
            let reader = self.parent_maps[d].get_targets(key[d])?;
            parent_key[d] = reader.current();
            if reader.size() == 1 {
                fixed_weight *= reader.weight();
            } else {
                multi_dims.push(d);
            }
            readers.push(reader);
        }

        Ok((parent_key, readers, multi_dims, fixed_weight))
    }

    /// Advances the last multi-dim's reader; on overflow, resets it and
    /// carries to the previous multi-dim. Returns `false` once every
    /// combination has been produced.
    fn next_parent_key(
        parent_key: &mut [ElementId],
        readers: &mut [TargetReader<'_>],
        multi_dims: &[usize],
    ) -> bool {
        if multi_dims.is_empty() {
            return false;
        }

        let mut idx = multi_dims.len() as isize - 1;
        while idx >= 0 {
            let d = multi_dims[idx as usize];
            let reader = &mut readers[d];
            reader.advance();
            if reader.end() {
                reader.reset();
                parent_key[d] = reader.current();
                idx -= 1;
            } else {
                parent_key[d] = reader.current();
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::RawElement;
    use crate::element::ElementKind;
    use crate::key::KeyCodec;
    use test_log::test;

    fn base(id: ElementId, name: &str, pos: u32, parents: Vec<ElementId>) -> RawElement {
        RawElement {
            id,
            name: name.to_owned(),
            position: pos,
            kind: ElementKind::Base,
            parents,
            children: vec![],
        }
    }

    fn consolidated(
        id: ElementId,
        name: &str,
        pos: u32,
        parents: Vec<ElementId>,
        children: Vec<(ElementId, f64)>,
    ) -> RawElement {
        RawElement {
            id,
            name: name.to_owned(),
            position: pos,
            kind: ElementKind::Consolidated,
            parents,
            children,
        }
    }

    /// Two dimensions: `d0` has base b0, b1 and consolidated c0(b0:1, b1:1);
    /// `d1` has base x0, x1. Matches the two-dimensional worked example.
    fn two_dims() -> (Dimension, Dimension, KeyCodec) {
        let d0 = Dimension::build(
            1,
            "d0",
            vec![
                base(0, "b0", 0, vec![2]),
                base(1, "b1", 1, vec![2]),
                consolidated(2, "c0", 2, vec![], vec![(0, 1.0), (1, 1.0)]),
            ],
        )
        .unwrap();
        let d1 = Dimension::build(
            2,
            "d1",
            vec![base(0, "x0", 0, vec![]), base(1, "x1", 1, vec![])],
        )
        .unwrap();
        let codec = KeyCodec::new(&[2, 1]).unwrap();
        (d0, d1, codec)
    }

    fn fill(storage: &mut BaseStorage, codec: &KeyCodec, rows: &[([ElementId; 2], f64)]) {
        for &(tuple, value) in rows {
            storage.insert(codec.encode(&tuple), value);
        }
    }

    #[test]
    fn consolidated_cell_sums_weighted_base_contributions() {
        let (d0, d1, codec) = two_dims();
        let mut base_storage = BaseStorage::new();
        fill(
            &mut base_storage,
            &codec,
            &[([0, 0], 10.0), ([1, 0], 20.0)],
        );

        let target = Area::from_path(&[2, 0]);
        let processor = AggregationProcessor::new(target, &[d0, d1], AggregationKind::Sum).unwrap();
        let result = processor.aggregate(&base_storage, &codec).unwrap();

        let key = codec.encode(&[2, 0]);
        assert_eq!(result.get(key), Some(30.0));
    }

    #[test]
    fn target_with_no_base_contributors_yields_no_entry() {
        let (d0, d1, codec) = two_dims();
        let base_storage = BaseStorage::new();

        let target = Area::from_path(&[2, 0]);
        let processor = AggregationProcessor::new(target, &[d0, d1], AggregationKind::Sum).unwrap();
        let result = processor.aggregate(&base_storage, &codec).unwrap();

        assert!(result.is_empty());
    }

    #[test]
    fn single_base_cell_target_short_circuits_without_aggregation() {
        let (d0, d1, codec) = two_dims();
        let mut base_storage = BaseStorage::new();
        fill(&mut base_storage, &codec, &[([0, 0], 10.0)]);

        let target = Area::from_path(&[0, 0]);
        let processor = AggregationProcessor::new(target, &[d0, d1], AggregationKind::Sum).unwrap();
        let result = processor.aggregate(&base_storage, &codec).unwrap();

        assert!(result.is_empty());
    }

    #[test]
    fn unimplemented_kind_is_rejected_at_setup() {
        let (d0, d1, _codec) = two_dims();
        let target = Area::from_path(&[2, 0]);
        let err = AggregationProcessor::new(target, &[d0, d1], AggregationKind::Avg).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
