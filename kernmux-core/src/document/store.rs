//! Document storage capability

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::model::Document;
use crate::error::DocumentError;

/// Loads documents by path
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Document, DocumentError>;
}

/// JSON documents stored as files under a root directory
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative document path under the root
    fn resolve(&self, path: &Path) -> Result<PathBuf, DocumentError> {
        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || path.as_os_str().is_empty() {
            return Err(DocumentError::InvalidPath(path.to_path_buf()));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn load(&self, path: &Path) -> Result<Document, DocumentError> {
        let full = self.resolve(path)?;

        let contents = match tokio::fs::read_to_string(&full).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocumentError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(DocumentError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let document: Document =
            serde_json::from_str(&contents).map_err(|source| DocumentError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(cell_id) = document.first_dangling_cell() {
            return Err(DocumentError::Inconsistent {
                path: path.to_path_buf(),
                cell_id: cell_id.clone(),
            });
        }

        tracing::debug!(
            path = %path.display(),
            document_id = %document.id(),
            cells = document.len(),
            "Loaded document"
        );
        Ok(document)
    }
}

/// Documents held in memory, keyed by path
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<PathBuf, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: impl Into<PathBuf>, document: Document) {
        self.documents.write().await.insert(path.into(), document);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self, path: &Path) -> Result<Document, DocumentError> {
        self.documents
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(path.to_path_buf()))
    }
}
