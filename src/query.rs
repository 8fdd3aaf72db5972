//! Query glue: wires a cube's dimensions and storage through the
//! [`crate::aggregation_processor::AggregationProcessor`] and
//! [`crate::result`] to answer a set of requested paths or an area.
//!
//! This is the one seam `tool.rs` and `server.rs` both call through, so
//! the pipe protocol and the interactive shell always see identical
//! answers for identical requests.

use crate::aggregation_processor::{AggregationKind, AggregationProcessor};
use crate::area::Area;
use crate::cube::Cube;
use crate::error::Result;
use crate::key::ElementId;
use crate::result::{self, CellAnswer};
use crate::storage::ResultStorage;

/// Answers a caller-supplied list of cell paths against `cube`, in order.
pub fn answer_paths(cube: &Cube, paths: &[Vec<ElementId>]) -> Result<Vec<CellAnswer>> {
    for path in paths {
        if path.len() != cube.dim_count() {
            return Err(crate::error::Error::InvalidCoordinates(format!(
                "path has {} coordinates, expected {}",
                path.len(),
                cube.dim_count()
            )));
        }
    }

    let dims = cube_dims(cube);
    let result_storage = aggregate_for_paths(cube, paths)?;

    Ok(result::lookup_paths(paths, &dims, cube.codec(), cube.storage(), &result_storage))
}

/// Answers every path of an area built from `id_lists` (one list per
/// dimension, with `ALL_ELEMENTS` resolved against the cube's dimensions).
pub fn answer_area(cube: &Cube, id_lists: &[Vec<ElementId>]) -> Result<Vec<(Vec<ElementId>, CellAnswer)>> {
    let max_ids: Vec<ElementId> = cube
        .dimensions()
        .iter()
        .map(|d| d.elements().map(|e| e.id).max().unwrap_or(0))
        .collect();
    let area = Area::from_id_lists(id_lists, &max_ids)?;

    let dims = cube_dims(cube);
    let result_storage = aggregate_for_area(cube, area.clone())?;

    Ok(result::lookup_area(&area, &dims, cube.codec(), cube.storage(), &result_storage))
}

fn cube_dims(cube: &Cube) -> Vec<crate::dimension::Dimension> {
    // `result::lookup_*` and `AggregationProcessor::new` want `&[Dimension]`;
    // cloned once per query (cheap: a handful of elements) rather than
    // threading `Arc<Dimension>` through those modules.
    cube.dimensions().iter().map(|d| d.as_ref().clone()).collect()
}

fn aggregate_for_paths(cube: &Cube, paths: &[Vec<ElementId>]) -> Result<ResultStorage> {
    let dim_count = cube.dim_count();
    let mut area = Area::empty(dim_count);
    for d in 0..dim_count {
        let mut set = crate::ranged_set::RangedSet::new();
        for path in paths {
            set.insert(path[d]);
        }
        area.set_dim(d, set);
    }
    aggregate_for_area(cube, area)
}

fn aggregate_for_area(cube: &Cube, area: Area) -> Result<ResultStorage> {
    let dims: Vec<_> = cube.dimensions().iter().map(|d| d.as_ref().clone()).collect();
    let processor = AggregationProcessor::new(area, &dims, AggregationKind::Sum)?;
    processor.aggregate(cube.storage(), cube.codec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{Dimension, RawElement};
    use crate::element::ElementKind;
    use crate::key::KeyCodec;
    use std::sync::Arc;
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

    fn worked_example_cube() -> Cube {
        let d0 = Arc::new(
            Dimension::build(
                1,
                "d0",
                vec![
                    base(0, "b0", 0, vec![2]),
                    base(1, "b1", 1, vec![2]),
                    consolidated(2, "c0", 2, vec![], vec![(0, 1.0), (1, 2.0)]),
                ],
            )
            .unwrap(),
        );
        let d1 = Arc::new(
            Dimension::build(2, "d1", vec![base(0, "x0", 0, vec![]), base(1, "x1", 1, vec![])]).unwrap(),
        );
        let codec = KeyCodec::new(&[2, 1]).unwrap();

        let facts = vec![
            (vec![0, 0], 10.0),
            (vec![0, 1], 20.0),
            (vec![1, 0], 3.0),
            (vec![1, 1], 4.0),
        ];
        let cube = Cube::build(1, "sales", vec![d0, d1], facts).unwrap();
        assert_eq!(cube.codec().dim_count(), codec.dim_count());
        cube
    }

    #[test]
    fn answer_paths_reads_base_cells_directly() {
        let cube = worked_example_cube();
        let answers = answer_paths(&cube, &[vec![0, 0]]).unwrap();
        assert_eq!(answers, vec![CellAnswer::Found(10.0)]);
    }

    #[test]
    fn answer_paths_aggregates_consolidated_cells() {
        let cube = worked_example_cube();
        // c0,x0 = 1*b0.x0 + 2*b1.x0 = 1*10 + 2*3 = 16
        let answers = answer_paths(&cube, &[vec![2, 0]]).unwrap();
        assert_eq!(answers, vec![CellAnswer::Found(16.0)]);
    }

    #[test]
    fn answer_paths_rejects_wrong_arity() {
        let cube = worked_example_cube();
        let err = answer_paths(&cube, &[vec![0]]).unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidCoordinates(_)));
    }

    #[test]
    fn answer_area_covers_every_requested_combination() {
        let cube = worked_example_cube();
        let answers = answer_area(&cube, &[vec![0, 1], vec![0, 1]]).unwrap();
        assert_eq!(answers.len(), 4);
        let found: Vec<f64> = answers.iter().map(|(_, a)| a.value().unwrap()).collect();
        assert_eq!(found, vec![10.0, 20.0, 3.0, 4.0]);
    }
}
