//! DocumentBinding: default construction or load-by-path

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ids::{CellIdGenerator, UuidCellIds};
use super::model::{Cell, CellKind, Document};
use super::store::DocumentStore;
use crate::error::DocumentError;

/// Placeholder content of the default document's markdown cell
pub const DEFAULT_MARKDOWN: &str = "# Untitled notebook\n\nDouble-click to edit this cell.";

/// A session's document, fixed for the life of the session
pub type DocumentHandle = Arc<Document>;

/// Where a new session's document comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "path", rename_all = "snake_case")]
pub enum DocumentSource {
    /// A fresh default document
    #[default]
    Blank,
    /// Load from the document store
    Path(PathBuf),
}

/// Builds the document for a new session
#[derive(Clone)]
pub struct DocumentBinding {
    store: Arc<dyn DocumentStore>,
    ids: Arc<dyn CellIdGenerator>,
}

impl DocumentBinding {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_ids(store, Arc::new(UuidCellIds))
    }

    pub fn with_ids(store: Arc<dyn DocumentStore>, ids: Arc<dyn CellIdGenerator>) -> Self {
        Self { store, ids }
    }

    /// Produce the document for `source`
    pub async fn bind(&self, source: &DocumentSource) -> Result<DocumentHandle, DocumentError> {
        let document = match source {
            DocumentSource::Blank => self.default_document(),
            DocumentSource::Path(path) => self.store.load(path).await?,
        };
        Ok(Arc::new(document))
    }

    /// A new document with the default cells
    pub fn default_document(&self) -> Document {
        let mut document = Document::new();
        self.populate_default(&mut document);
        document
    }

    /// Append the markdown placeholder cell then an empty code cell.
    ///
    /// Cells whose generated ID already exists are skipped, so repeating this
    /// with a deterministic generator changes nothing.
    pub fn populate_default(&self, document: &mut Document) {
        let template = [
            (CellKind::Markdown, DEFAULT_MARKDOWN),
            (CellKind::Code, ""),
        ];
        for (position, (kind, source)) in template.into_iter().enumerate() {
            let id = self.ids.cell_id(kind, position);
            document.insert_cell(Cell::new(id, kind, source));
        }
    }
}
