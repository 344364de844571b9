//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the capability interface to whatever
//! holds the documents: enumerate, read, write, resolve. This crate never
//! creates or deletes documents, it only rewrites existing ones.
//!
//! Paths are vault-relative and always use `/` as the separator.
//! Modification times are opaque `i64` values (milliseconds since the
//! epoch for [`fs::FsStore`]); only equality between them is meaningful.

pub mod fs;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// A document known to the store, as returned by [`DocumentStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    pub path: String,
    pub mtime: i64,
}

/// Text of a document together with the mtime it was read at.
#[derive(Debug, Clone)]
pub struct StoredText {
    pub text: String,
    pub mtime: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Note,
    Folder,
}

/// Abstract document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list`](DocumentStore::list) | Enumerate every document with its mtime |
/// | [`read`](DocumentStore::read) | Read UTF-8 text plus mtime |
/// | [`write`](DocumentStore::write) | Replace the text of an existing document atomically |
/// | [`resolve`](DocumentStore::resolve) | Existence and kind check for a path |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self) -> Result<Vec<DocumentEntry>>;

    async fn read(&self, path: &str) -> Result<StoredText>;

    /// Replace the document's text. Writing to a path that does not exist
    /// is an error.
    async fn write(&self, path: &str, text: &str) -> Result<()>;

    async fn resolve(&self, path: &str) -> Result<Option<EntryKind>>;
}

/// Normalize a path coming from outside (score files, CLI) to the store's
/// `/`-separated relative form.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trimmed = unified.trim().trim_start_matches("./").trim_matches('/');
    trimmed.to_string()
}
