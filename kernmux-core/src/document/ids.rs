//! Cell ID generation

use uuid::Uuid;

use super::model::{CellId, CellKind};

/// Produces IDs for the cells of a default document.
///
/// `position` is the cell's index in the default template.
pub trait CellIdGenerator: Send + Sync {
    fn cell_id(&self, kind: CellKind, position: usize) -> CellId;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidCellIds;

impl CellIdGenerator for UuidCellIds {
    fn cell_id(&self, _kind: CellKind, _position: usize) -> CellId {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic IDs derived from a seed: `{seed}-{kind}-{position}`
#[derive(Debug, Clone)]
pub struct SeededCellIds {
    seed: String,
}

impl SeededCellIds {
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into() }
    }
}

impl CellIdGenerator for SeededCellIds {
    fn cell_id(&self, kind: CellKind, position: usize) -> CellId {
        format!("{}-{}-{}", self.seed, kind.as_str(), position)
    }
}
