//! Area ([C3]/[C5]): a per-dimension subset of element ids, representing
//! either a query's requested cells or a set of base cells to scan.

use crate::error::{Error, Result};
use crate::key::{ElementId, ALL_ELEMENTS};
use crate::ranged_set::RangedSet;

/// A rectangular region of a cube: one [`RangedSet`] per dimension.
///
/// A missing dimension (`None`) means "not yet constrained" and makes
/// [`Area::size`] report `0`; every dimension must be set before the area
/// is usable for iteration.
#[derive(Debug, Clone)]
pub struct Area {
    dims: Vec<Option<RangedSet>>,
}

impl Area {
    /// An area of `dim_count` dimensions, all unconstrained.
    #[must_use]
    pub fn empty(dim_count: usize) -> Self {
        Self {
            dims: vec![None; dim_count],
        }
    }

    /// A single-path area: one element id per dimension.
    #[must_use]
    pub fn from_path(path: &[ElementId]) -> Self {
        Self {
            dims: path
                .iter()
                .map(|&id| {
                    let mut set = RangedSet::new();
                    set.insert(id);
                    Some(set)
                })
                .collect(),
        }
    }

    /// Builds an area from a per-dimension list of ids. A dimension whose
    /// list is exactly `[ALL_ELEMENTS]` is resolved against `dim_max_ids`
    /// (inclusive maximum element id of that dimension) to mean "every
    /// element of this dimension".
    pub fn from_id_lists(lists: &[Vec<ElementId>], dim_max_ids: &[ElementId]) -> Result<Self> {
        if lists.len() != dim_max_ids.len() {
            return Err(Error::InvalidCoordinates(format!(
                "expected {} dimensions, got {}",
                dim_max_ids.len(),
                lists.len()
            )));
        }

        let mut dims = Vec::with_capacity(lists.len());
        for (list, &max_id) in lists.iter().zip(dim_max_ids) {
            let mut set = RangedSet::new();
            if list == &[ALL_ELEMENTS] {
                set.insert_range(0, max_id);
            } else {
                for &id in list {
                    set.insert(id);
                }
            }
            dims.push(Some(set));
        }
        Ok(Self { dims })
    }

    #[must_use]
    pub fn dim_count(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn dim(&self, d: usize) -> Option<&RangedSet> {
        self.dims[d].as_ref()
    }

    pub fn set_dim(&mut self, d: usize, set: RangedSet) {
        self.dims[d] = Some(set);
    }

    /// The product of per-dimension cardinalities, or `0` if any
    /// dimension is unconstrained.
    #[must_use]
    pub fn size(&self) -> usize {
        self.dims
            .iter()
            .map(|d| d.as_ref().map_or(0, RangedSet::size))
            .try_fold(1usize, |acc, n| {
                if n == 0 {
                    None
                } else {
                    acc.checked_mul(n)
                }
            })
            .unwrap_or(0)
    }

    /// Intersects each dimension's set independently. This avoids the
    /// pairwise-tuple `O(n*m)` scan of enumerating and comparing whole
    /// paths: since the two areas are both axis-aligned boxes, the
    /// intersection is itself a box whose per-dimension set is the
    /// per-dimension intersection.
    #[must_use]
    pub fn intersect(&self, other: &Area) -> Option<Area> {
        if self.dim_count() != other.dim_count() {
            return None;
        }
        let mut dims = Vec::with_capacity(self.dim_count());
        for (a, b) in self.dims.iter().zip(&other.dims) {
            let (a, b) = (a.as_ref()?, b.as_ref()?);
            let mut result = RangedSet::new();
            for id in a {
                if b.contains(id) {
                    result.insert(id);
                }
            }
            if result.empty() {
                return None;
            }
            dims.push(Some(result));
        }
        Some(Area { dims })
    }

    /// Iterator over this area's paths, last dimension varying fastest.
    #[must_use]
    pub fn path_iter(&self) -> PathIterator {
        let ranges: Vec<Vec<ElementId>> = self
            .dims
            .iter()
            .map(|d| d.as_ref().map(|s| s.iter().collect()).unwrap_or_default())
            .collect();
        let exhausted = ranges.iter().any(Vec::is_empty);
        let cursor = vec![0usize; ranges.len()];
        PathIterator {
            ranges,
            cursor,
            exhausted,
        }
    }

    /// Iterator over dimension `d`'s member elements.
    pub fn elem_iter(&self, d: usize) -> impl Iterator<Item = ElementId> + '_ {
        self.dims[d].iter().flat_map(RangedSet::iter)
    }

    /// Finds `path` within the area's bounds; `None` if any coordinate is
    /// outside its dimension's set.
    #[must_use]
    pub fn find(&self, path: &[ElementId]) -> Option<Vec<ElementId>> {
        if path.len() != self.dims.len() {
            return None;
        }
        for (&id, dim) in path.iter().zip(&self.dims) {
            if !dim.as_ref().is_some_and(|set| set.contains(id)) {
                return None;
            }
        }
        Some(path.to_vec())
    }
}

/// Odometer-style Cartesian product iterator over an [`Area`]'s paths.
pub struct PathIterator {
    ranges: Vec<Vec<ElementId>>,
    cursor: Vec<usize>,
    exhausted: bool,
}

impl Iterator for PathIterator {
    type Item = Vec<ElementId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.ranges.is_empty() {
            if self.exhausted {
                return None;
            }
            self.exhausted = true;
            return Some(Vec::new());
        }

        let path: Vec<ElementId> = self
            .cursor
            .iter()
            .zip(&self.ranges)
            .map(|(&i, r)| r[i])
            .collect();

        // Advance the odometer from the last dimension (fastest-varying).
        let mut d = self.cursor.len();
        loop {
            if d == 0 {
                self.exhausted = true;
                break;
            }
            d -= 1;
            self.cursor[d] += 1;
            if self.cursor[d] < self.ranges[d].len() {
                break;
            }
            self.cursor[d] = 0;
            if d == 0 {
                self.exhausted = true;
                break;
            }
        }

        Some(path)
    }
}
