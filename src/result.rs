//! Result Assembly ([C8]): reads answers for a single cell, an area, or
//! a list of paths, routing each path to base or result storage.

use crate::area::Area;
use crate::dimension::Dimension;
use crate::key::{ElementId, KeyCodec};
use crate::storage::{BaseStorage, ResultStorage};

/// The outcome of resolving one cell path: a value, or an explicit
/// "not found" distinct from a zero value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellAnswer {
    Found(f64),
    NotFound,
}

impl CellAnswer {
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }
}

fn is_base_path(path: &[ElementId], dims: &[Dimension]) -> bool {
    path.iter()
        .zip(dims)
        .all(|(&id, dim)| dim.lookup_by_id(id).is_some_and(crate::element::Element::is_base))
}

/// Resolves a single path: base storage if every coordinate is a base
/// element in its dimension, result storage otherwise.
#[must_use]
pub fn lookup_path(
    path: &[ElementId],
    dims: &[Dimension],
    codec: &KeyCodec,
    base_storage: &BaseStorage,
    result_storage: &ResultStorage,
) -> CellAnswer {
    let key = codec.encode(path);
    let value = if is_base_path(path, dims) {
        base_storage.get(key)
    } else {
        result_storage.get(key)
    };
    value.map_or(CellAnswer::NotFound, CellAnswer::Found)
}

/// Resolves every path of an area, in the area's own iteration order.
pub fn lookup_area(
    area: &Area,
    dims: &[Dimension],
    codec: &KeyCodec,
    base_storage: &BaseStorage,
    result_storage: &ResultStorage,
) -> Vec<(Vec<ElementId>, CellAnswer)> {
    area.path_iter()
        .map(|path| {
            let answer = lookup_path(&path, dims, codec, base_storage, result_storage);
            (path, answer)
        })
        .collect()
}

/// Resolves a caller-supplied list of paths, preserving order.
pub fn lookup_paths(
    paths: &[Vec<ElementId>],
    dims: &[Dimension],
    codec: &KeyCodec,
    base_storage: &BaseStorage,
    result_storage: &ResultStorage,
) -> Vec<CellAnswer> {
    paths
        .iter()
        .map(|path| lookup_path(path, dims, codec, base_storage, result_storage))
        .collect()
}
