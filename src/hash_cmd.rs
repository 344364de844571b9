//! `vlink fingerprint` and `vlink boundary`.

use std::fmt;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::batch::{run_pass, BatchReport, DocumentPass, RunOptions};
use crate::config::Config;
use crate::fingerprint::{fingerprint, insert_boundary};
use crate::ledger::{Ledger, LedgerSession, LedgerStats};
use crate::models::DocOutcome;
use crate::store::{DocumentEntry, DocumentStore};

/// Records the fingerprint of every trackable document. Never rewrites
/// documents.
pub struct FingerprintPass {
    boundary: String,
    session: Mutex<LedgerSession>,
}

impl FingerprintPass {
    pub fn new(boundary: &str, session: LedgerSession) -> Self {
        Self {
            boundary: boundary.to_string(),
            session: Mutex::new(session),
        }
    }

    pub fn into_session(self) -> Result<LedgerSession> {
        self.session
            .into_inner()
            .map_err(|_| anyhow!("ledger lock poisoned"))
    }
}

#[async_trait]
impl DocumentPass for FingerprintPass {
    fn name(&self) -> &str {
        "fingerprint"
    }

    async fn apply(&self, doc: &DocumentEntry, text: &str) -> Result<DocOutcome> {
        let Some(hash) = fingerprint(text, &self.boundary) else {
            return Ok(DocOutcome::SkippedNoBoundary);
        };
        let status = self
            .session
            .lock()
            .map_err(|_| anyhow!("ledger lock poisoned"))?
            .record(&doc.path, &hash, doc.mtime);
        tracing::debug!(path = %doc.path, ?status, "fingerprinted");
        Ok(DocOutcome::Unchanged)
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintSummary {
    pub report: BatchReport,
    pub ledger: LedgerStats,
}

impl fmt::Display for FingerprintSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.report, self.ledger)
    }
}

/// Recompute fingerprints and update the ledger. `force` marks every
/// document for re-scoring.
pub async fn run_fingerprint(
    config: &Config,
    store: &dyn DocumentStore,
    opts: &RunOptions,
    force: bool,
) -> Result<FingerprintSummary> {
    let ledger = Ledger::load(&config.fingerprints_path()).await?;
    let pass = FingerprintPass::new(&config.markers.boundary, LedgerSession::new(ledger, force));
    let report = run_pass(config, store, opts, &pass).await?;

    let present = report.full_coverage(&opts.scope);
    let ledger = pass
        .into_session()?
        .finish(&config.markers.boundary, present.as_ref(), opts.dry_run)
        .await?;
    Ok(FingerprintSummary { report, ledger })
}

pub struct BoundaryPass {
    boundary: String,
}

impl BoundaryPass {
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: boundary.to_string(),
        }
    }
}

#[async_trait]
impl DocumentPass for BoundaryPass {
    fn name(&self) -> &str {
        "boundary"
    }

    async fn apply(&self, _doc: &DocumentEntry, text: &str) -> Result<DocOutcome> {
        Ok(DocOutcome::Rewrite(insert_boundary(text, &self.boundary)))
    }
}

/// Insert a boundary marker into every document in scope that lacks one.
pub async fn run_add_boundaries(
    config: &Config,
    store: &dyn DocumentStore,
    opts: &RunOptions,
) -> Result<BatchReport> {
    let pass = BoundaryPass::new(&config.markers.boundary);
    run_pass(config, store, opts, &pass).await
}
