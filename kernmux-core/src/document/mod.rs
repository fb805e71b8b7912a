//! Document binding
//!
//! A session owns exactly one notebook document: either a fresh default one
//! or one loaded from a [`DocumentStore`].

pub mod binding;
pub mod ids;
pub mod model;
pub mod store;

pub use binding::{DEFAULT_MARKDOWN, DocumentBinding, DocumentHandle, DocumentSource};
pub use ids::{CellIdGenerator, SeededCellIds, UuidCellIds};
pub use model::{Cell, CellId, CellKind, Document, DocumentId};
pub use store::{DocumentStore, FsDocumentStore, MemoryDocumentStore};
