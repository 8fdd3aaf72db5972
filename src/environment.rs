//! Environment: the explicit, threaded analogue of the source's process
//! singleton. Owns the loaded dimensions and cubes for one database.

use crate::cube::Cube;
use crate::dimension::Dimension;
use std::sync::Arc;

/// Everything loaded from one database directory. Constructed once at
/// startup and shared read-only via `Arc` by the CLI and pipe server —
/// never a global or a `OnceLock` singleton.
#[derive(Debug, Default)]
pub struct Environment {
    dimensions: Vec<Arc<Dimension>>,
    cubes: Vec<Arc<Cube>>,
}

impl Environment {
    #[must_use]
    pub fn new(dimensions: Vec<Arc<Dimension>>, cubes: Vec<Arc<Cube>>) -> Self {
        Self { dimensions, cubes }
    }

    #[must_use]
    pub fn dimensions(&self) -> &[Arc<Dimension>] {
        &self.dimensions
    }

    #[must_use]
    pub fn cubes(&self) -> &[Arc<Cube>] {
        &self.cubes
    }

    pub fn dimension_by_name(&self, name: &str) -> Option<&Arc<Dimension>> {
        self.dimensions
            .iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }

    pub fn cube_by_name(&self, name: &str) -> Option<&Arc<Cube>> {
        self.cubes.iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn cube_by_id(&self, id: crate::key::ElementId) -> Option<&Arc<Cube>> {
        self.cubes.iter().find(|c| c.id() == id)
    }

    pub fn dimension_by_id(&self, id: crate::key::ElementId) -> Option<&Arc<Dimension>> {
        self.dimensions.iter().find(|d| d.id() == id)
    }
}
