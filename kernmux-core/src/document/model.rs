//! Notebook document model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type DocumentId = Uuid;
pub type CellId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Markdown,
    Code,
}

impl CellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Code => "code",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub kind: CellKind,
    #[serde(default)]
    pub source: String,
}

impl Cell {
    pub fn new(id: impl Into<CellId>, kind: CellKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
        }
    }
}

/// A notebook: an ordered worksheet of cell IDs plus the cells themselves.
///
/// The ID is assigned at construction and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    #[serde(default)]
    worksheet: Vec<CellId>,
    #[serde(default)]
    cells: HashMap<CellId, Cell>,
}

impl Document {
    /// An empty document with a fresh ID
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            worksheet: Vec::new(),
            cells: HashMap::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Cell IDs in worksheet order
    pub fn worksheet(&self) -> &[CellId] {
        &self.worksheet
    }

    pub fn cell(&self, id: &str) -> Option<&Cell> {
        self.cells.get(id)
    }

    /// Cells in worksheet order
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.worksheet.iter().filter_map(|id| self.cells.get(id))
    }

    pub fn len(&self) -> usize {
        self.worksheet.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worksheet.is_empty()
    }

    /// Append a cell to the worksheet.
    ///
    /// No-op when a cell with the same ID is already present; returns whether
    /// the cell was inserted.
    pub fn insert_cell(&mut self, cell: Cell) -> bool {
        if self.cells.contains_key(&cell.id) {
            return false;
        }
        self.worksheet.push(cell.id.clone());
        self.cells.insert(cell.id.clone(), cell);
        true
    }

    /// First worksheet entry with no backing cell, if any
    pub(crate) fn first_dangling_cell(&self) -> Option<&CellId> {
        self.worksheet.iter().find(|id| !self.cells.contains_key(*id))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_documents_get_distinct_ids() {
        assert_ne!(Document::new().id(), Document::new().id());
    }

    #[test]
    fn insert_cell_appends_in_order() {
        let mut doc = Document::new();
        assert!(doc.insert_cell(Cell::new("a", CellKind::Markdown, "# hi")));
        assert!(doc.insert_cell(Cell::new("b", CellKind::Code, "")));

        assert_eq!(doc.worksheet(), ["a".to_string(), "b".to_string()]);
        let kinds: Vec<_> = doc.cells().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![CellKind::Markdown, CellKind::Code]);
    }

    #[test]
    fn insert_existing_id_is_noop() {
        let mut doc = Document::new();
        doc.insert_cell(Cell::new("a", CellKind::Code, "1"));

        assert!(!doc.insert_cell(Cell::new("a", CellKind::Markdown, "changed")));
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.cell("a").unwrap().source, "1");
    }

    #[test]
    fn dangling_worksheet_entry_is_detected() {
        let doc: Document = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "worksheet": ["x"],
            "cells": {}
        }))
        .unwrap();
        assert_eq!(doc.first_dangling_cell().map(String::as_str), Some("x"));
    }
}
