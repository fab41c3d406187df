//! Document stores: live buffers keyed by URI, projected snapshots keyed by
//! file path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

use super::Document;

/// Thread-safe storage for documents the host currently has open.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<Url, Arc<Document>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    /// Open or replace a document with the given source text.
    pub fn open(&self, uri: Url, text: String, version: i32) -> Arc<Document> {
        let doc = Arc::new(Document::live(text, version));
        self.documents.insert(uri, Arc::clone(&doc));
        doc
    }

    pub fn close(&self, uri: &Url) {
        self.documents.remove(uri);
    }

    pub fn get(&self, uri: &Url) -> Option<Arc<Document>> {
        self.documents.get(uri).map(|r| Arc::clone(&r))
    }

    /// Look up an open document by its on-disk path.
    pub fn get_by_path(&self, path: &Path) -> Option<Arc<Document>> {
        let uri = Url::from_file_path(path).ok()?;
        self.get(&uri)
    }
}

/// Path-keyed cache of projected documents.
///
/// Each file is read at most once per process; concurrent lookups of the same
/// path share a single load. Failed loads are not cached, so a file that
/// appears later can still be picked up. Entries are never evicted —
/// projected documents are small and live for the process.
#[derive(Debug, Default)]
pub struct ProjectedCache {
    entries: DashMap<PathBuf, Arc<OnceCell<Arc<Document>>>>,
}

impl ProjectedCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Load the document at `path`, reusing a cached snapshot if present.
    ///
    /// Returns `None` when the file cannot be read (degrades to "no preview"
    /// at the caller) or when `cancel` fires first.
    pub async fn load(&self, path: &Path, cancel: &CancellationToken) -> Option<Arc<Document>> {
        let cell = self
            .entries
            .entry(path.to_path_buf())
            .or_default()
            .clone();

        let load = cell.get_or_try_init(|| async {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => Ok(Arc::new(Document::projected(text, path.to_path_buf()))),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to load referenced file");
                    Err(())
                }
            }
        });

        tokio::select! {
            _ = cancel.cancelled() => None,
            loaded = load => loaded.ok().map(Arc::clone),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
