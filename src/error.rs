//! Error taxonomy for document processing.
//!
//! Only [`LinkerError::UpstreamDataMissing`] aborts a command. The other
//! variants are recovered per document: logged, counted, and the document
//! is left untouched.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkerError {
    /// The document has no boundary marker and cannot be fingerprinted or annotated.
    #[error("no boundary marker in {path}")]
    MissingBoundary { path: String },

    /// A scored candidate points at a document that no longer resolves.
    #[error("link target does not resolve: {target} ({reason})")]
    UnresolvableTarget { target: String, reason: String },

    /// The frontmatter block exists but its YAML does not parse.
    #[error("malformed frontmatter in {path}: {reason}")]
    MalformedFrontmatter { path: String, reason: String },

    /// Reading or writing a single document failed.
    #[error("store I/O failed for {path}: {source}")]
    StoreIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The scoring data file is absent or cannot be understood.
    #[error(
        "scoring data unavailable at {path}: {reason}. \
         Run the scoring step first or point [scoring].scores_file at its output."
    )]
    UpstreamDataMissing { path: String, reason: String },
}

impl LinkerError {
    pub fn store_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::StoreIo {
            path: path.into(),
            source,
        }
    }

    pub fn upstream(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamDataMissing {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
