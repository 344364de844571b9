//! `vlink ids`: give every document a stable identifier.
//!
//! Placeholder identifiers are replaced. Genuine identifiers shared by
//! several documents are reported, never changed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::batch::{run_pass, BatchReport, DocumentPass, RunOptions};
use crate::config::Config;
use crate::error::LinkerError;
use crate::identity::{ensure_identifier, IdentityChange};
use crate::models::DocOutcome;
use crate::store::{DocumentEntry, DocumentStore};

pub struct IdentityPass {
    field: String,
    owners: Mutex<BTreeMap<String, BTreeSet<String>>>,
    assigned: AtomicU64,
    degraded: AtomicU64,
    malformed: AtomicU64,
}

impl IdentityPass {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            owners: Mutex::new(BTreeMap::new()),
            assigned: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        }
    }

    /// Identifiers carried by more than one document, with their paths.
    pub fn duplicates(&self) -> Result<Vec<(String, Vec<String>)>> {
        let owners = self.owners.lock().map_err(|_| anyhow!("identifier map lock poisoned"))?;
        Ok(owners
            .iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(id, paths)| (id.clone(), paths.iter().cloned().collect()))
            .collect())
    }

    fn claim(&self, id: &str, path: &str) -> Result<()> {
        self.owners
            .lock()
            .map_err(|_| anyhow!("identifier map lock poisoned"))?
            .entry(id.to_lowercase())
            .or_default()
            .insert(path.to_string());
        Ok(())
    }
}

#[async_trait]
impl DocumentPass for IdentityPass {
    fn name(&self) -> &str {
        "ids"
    }

    async fn apply(&self, doc: &DocumentEntry, text: &str) -> Result<DocOutcome> {
        let result = ensure_identifier(text, &self.field);
        if let Some(reason) = &result.malformed {
            self.malformed.fetch_add(1, Ordering::Relaxed);
            let err = LinkerError::MalformedFrontmatter {
                path: doc.path.clone(),
                reason: reason.clone(),
            };
            tracing::warn!(path = %doc.path, "{}; patching {} textually", err, self.field);
        }

        match &result.change {
            IdentityChange::Kept(id) => {
                self.claim(id, &doc.path)?;
                Ok(DocOutcome::Unchanged)
            }
            IdentityChange::Assigned { previous, id } => {
                self.assigned.fetch_add(1, Ordering::Relaxed);
                if id.degraded {
                    self.degraded.fetch_add(1, Ordering::Relaxed);
                }
                tracing::info!(path = %doc.path, previous = ?previous, id = %id.value, "assigned identifier");
                self.claim(&id.value, &doc.path)?;
                Ok(DocOutcome::Rewrite(result.text))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdsSummary {
    pub report: BatchReport,
    pub assigned: u64,
    pub degraded: u64,
    pub malformed: u64,
    pub duplicates: Vec<(String, Vec<String>)>,
}

impl fmt::Display for IdsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\nidentifiers assigned: {}\ndegraded identifiers: {}\nmalformed frontmatter: {}\nduplicate identifiers: {}",
            self.report,
            self.assigned,
            self.degraded,
            self.malformed,
            self.duplicates.len()
        )?;
        for (id, paths) in &self.duplicates {
            write!(f, "\n  {}: {}", id, paths.join(", "))?;
        }
        Ok(())
    }
}

/// Ensure every document in scope carries a genuine identifier.
pub async fn run_ids(
    config: &Config,
    store: &dyn DocumentStore,
    opts: &RunOptions,
) -> Result<IdsSummary> {
    let pass = IdentityPass::new(&config.identity.field);
    let report = run_pass(config, store, opts, &pass).await?;
    let duplicates = pass.duplicates()?;
    for (id, paths) in &duplicates {
        tracing::warn!(id = %id, paths = ?paths, "identifier shared by several documents");
    }
    Ok(IdsSummary {
        assigned: pass.assigned.load(Ordering::Relaxed),
        degraded: pass.degraded.load(Ordering::Relaxed),
        malformed: pass.malformed.load(Ordering::Relaxed),
        duplicates,
        report,
    })
}
