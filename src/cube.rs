//! Cube: an ordered list of dimensions, a name, and its base-value storage.

use crate::dimension::Dimension;
use crate::error::{Error, Result};
use crate::key::{ElementId, KeyCodec};
use crate::storage::BaseStorage;
use std::sync::Arc;

/// A cube: a fixed-order tuple of shared dimensions plus the facts
/// stored against them. Immutable after [`Cube::build`].
#[derive(Debug)]
pub struct Cube {
    id: ElementId,
    name: String,
    dimensions: Vec<Arc<Dimension>>,
    codec: KeyCodec,
    storage: BaseStorage,
}

impl Cube {
    /// Computes the shared key codec from each dimension's maximum
    /// element id, then loads `facts`, skipping any tuple that resolves
    /// to a consolidated element (logged, not fatal) and failing on
    /// arity mismatch (fatal: malformed input file).
    pub fn build(
        id: ElementId,
        name: impl Into<String>,
        dimensions: Vec<Arc<Dimension>>,
        facts: Vec<(Vec<ElementId>, f64)>,
    ) -> Result<Self> {
        let max_ids: Vec<ElementId> = dimensions
            .iter()
            .map(|dim| dim.elements().map(|e| e.id).max().unwrap_or(0))
            .collect();
        let codec = KeyCodec::new(&max_ids)?;

        let mut storage = BaseStorage::new();
        for (tuple, value) in facts {
            if tuple.len() != dimensions.len() {
                return Err(Error::CorruptFile(format!(
                    "fact tuple has {} coordinates, expected {}",
                    tuple.len(),
                    dimensions.len()
                )));
            }

            let is_consolidated = tuple.iter().zip(&dimensions).any(|(&id, dim)| {
                dim.lookup_by_id(id)
                    .is_none_or(crate::element::Element::is_consolidated)
            });
            if is_consolidated {
                log::debug!("skipping fact tuple {tuple:?}: resolves to a consolidated element");
                continue;
            }

            storage.insert(codec.encode(&tuple), value);
        }

        Ok(Self {
            id,
            name: name.into(),
            dimensions,
            codec,
            storage,
        })
    }

    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dimensions(&self) -> &[Arc<Dimension>] {
        &self.dimensions
    }

    #[must_use]
    pub fn dim_count(&self) -> usize {
        self.dimensions.len()
    }

    #[must_use]
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    #[must_use]
    pub fn storage(&self) -> &BaseStorage {
        &self.storage
    }
}
