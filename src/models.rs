//! Core data types shared by the passes.

use serde::{Deserialize, Serialize};

/// A scored link candidate from the scoring data, relative to one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Vault-relative path of the target document.
    pub target: String,
    /// Relevance score assigned by the scorer (primary rank key).
    pub score: f64,
    /// Raw embedding similarity (secondary rank key).
    #[serde(default)]
    pub similarity: f64,
}

/// How `annotate` treats the fingerprint ledger the scorer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScoringMode {
    /// Mark every document for re-scoring.
    Force,
    /// Record only new and changed fingerprints.
    Smart,
    /// Leave the ledger untouched.
    Skip,
}

/// Outcome of one pass over one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocOutcome {
    /// New text to persist. Only written when it differs from the input.
    Rewrite(String),
    Unchanged,
    SkippedNoBoundary,
    SkippedNoCandidates,
}
