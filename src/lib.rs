//! An in-memory, read-only OLAP aggregation engine for multidimensional
//! numeric cubes.
//!
//! Given a cube of base (leaf) numeric values indexed by a tuple of
//! dimension element identifiers, and a query naming a subset of cells —
//! some of which are *consolidated* roll-ups defined by weighted
//! parent/child hierarchies — this crate computes each requested cell's
//! value by summing weighted contributions from the underlying base
//! cells.
//!
//! ##### About
//!
//! The query path has four moving parts: the [`dimension`] hierarchy
//! model, which resolves any element to its weighted base descendants;
//! the [`aggregation_map`], a compact run-length-encoded source-to-target
//! expansion table built once per query per dimension; the bit-packed
//! [`key`] scheme and hash-indexed [`storage`]; and the
//! [`aggregation_processor`], which iterates the relevant base cells and
//! scatters weighted contributions into a result map.
//!
//! Dimensions and cubes are loaded once at startup by [`database`] and
//! are immutable for the life of the process; every query allocates its
//! own transient [`area::Area`], [`aggregation_map::AggregationMap`]s,
//! and [`storage::ResultStorage`], released when the query returns.
//!
//! # Example usage
//!
//! ```
//! use aggcube::cube::Cube;
//! use aggcube::dimension::{Dimension, RawElement};
//! use aggcube::element::ElementKind;
//! use aggcube::query;
//! use std::sync::Arc;
//!
//! // D0 = { b0, b1, c0 -> (b0: 1.0, b1: 2.0) }, D1 = { x0, x1 }
//! let d0 = Arc::new(Dimension::build(1, "d0", vec![
//!     RawElement { id: 0, name: "b0".into(), position: 0, kind: ElementKind::Base, parents: vec![2], children: vec![] },
//!     RawElement { id: 1, name: "b1".into(), position: 1, kind: ElementKind::Base, parents: vec![2], children: vec![] },
//!     RawElement { id: 2, name: "c0".into(), position: 2, kind: ElementKind::Consolidated, parents: vec![], children: vec![(0, 1.0), (1, 2.0)] },
//! ]).unwrap());
//! let d1 = Arc::new(Dimension::build(2, "d1", vec![
//!     RawElement { id: 0, name: "x0".into(), position: 0, kind: ElementKind::Base, parents: vec![], children: vec![] },
//!     RawElement { id: 1, name: "x1".into(), position: 1, kind: ElementKind::Base, parents: vec![], children: vec![] },
//! ]).unwrap());
//!
//! let facts = vec![
//!     (vec![0, 0], 10.0), (vec![0, 1], 20.0),
//!     (vec![1, 0], 3.0), (vec![1, 1], 4.0),
//! ];
//! let cube = Cube::build(1, "sales", vec![d0, d1], facts)?;
//!
//! // c0,x0 = 1*10 + 2*3 = 16
//! let answers = query::answer_paths(&cube, &[vec![2, 0]])?;
//! assert_eq!(answers[0].value(), Some(16.0));
//! #
//! # Ok::<(), aggcube::error::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod aggregation_map;
pub mod aggregation_processor;
pub mod area;
pub mod config;
pub mod cube;
pub mod database;
pub mod dimension;
pub mod element;
pub mod environment;
pub mod error;
pub mod key;
pub mod query;
pub mod ranged_set;
pub mod result;
pub mod storage;
pub mod weighted_set;

pub use {
    config::Config,
    cube::Cube,
    environment::Environment,
    error::{Error, Result},
    key::ElementId,
    result::CellAnswer,
};
