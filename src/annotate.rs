//! `vlink annotate` and `vlink clean`.
//!
//! Annotate loads the scorer's output, then for each document in scope:
//! fingerprints the tracked body into the ledger, renders the links and
//! tags blocks, and splices them in after the boundary marker. Clean
//! removes every machine-owned block and leaves user text alone, unless
//! asked to clear the whole annotation zone.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::batch::{run_pass, BatchReport, DocumentPass, RunOptions};
use crate::config::Config;
use crate::error::LinkerError;
use crate::fingerprint;
use crate::ledger::{Ledger, LedgerSession, LedgerStats};
use crate::models::{Candidate, DocOutcome, ScoringMode};
use crate::scores::{load_scores, ScoreData};
use crate::sections::{render_links, render_tags, SectionEditor, SectionKind};
use crate::store::{DocumentEntry, DocumentStore, EntryKind};

pub struct AnnotatePass<'a> {
    config: &'a Config,
    store: &'a dyn DocumentStore,
    editor: SectionEditor,
    scores: &'a ScoreData,
    ledger: Option<Mutex<LedgerSession>>,
    resolved: Mutex<HashMap<String, bool>>,
}

impl<'a> AnnotatePass<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a dyn DocumentStore,
        scores: &'a ScoreData,
        ledger: Option<LedgerSession>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            store,
            editor: SectionEditor::from_config(config)?,
            scores,
            ledger: ledger.map(Mutex::new),
            resolved: Mutex::new(HashMap::new()),
        })
    }

    /// Whether `target` currently resolves to a note. Results are memoized
    /// for the lifetime of the pass. A lookup error (a path outside the
    /// vault, an unreadable entry) only drops this candidate.
    async fn resolves(&self, target: &str) -> Result<bool> {
        if let Some(known) = self.lock_resolved()?.get(target) {
            return Ok(*known);
        }
        let lookup = self.store.resolve(target).await;
        let ok = matches!(lookup, Ok(Some(EntryKind::Note)));
        if !ok {
            let reason = match lookup {
                Ok(Some(_)) => "not a note".to_string(),
                Ok(None) => "not found".to_string(),
                Err(e) => e.to_string(),
            };
            let dropped = LinkerError::UnresolvableTarget {
                target: target.to_string(),
                reason,
            };
            tracing::debug!("dropping candidate: {}", dropped);
        }
        self.lock_resolved()?.insert(target.to_string(), ok);
        Ok(ok)
    }

    fn lock_resolved(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, bool>>> {
        self.resolved
            .lock()
            .map_err(|_| anyhow!("resolve cache lock poisoned"))
    }

    async fn resolvable_targets(&self, source: &str, candidates: &[Candidate]) -> Result<HashSet<String>> {
        let mut ok = HashSet::new();
        let min_score = self.config.links.min_score;
        for candidate in candidates.iter().filter(|c| c.score >= min_score) {
            if candidate.target == source || ok.contains(&candidate.target) {
                continue;
            }
            if self.resolves(&candidate.target).await? {
                ok.insert(candidate.target.clone());
            }
        }
        Ok(ok)
    }

    fn record_fingerprint(&self, doc: &DocumentEntry, text: &str) -> Result<()> {
        let Some(ledger) = &self.ledger else {
            return Ok(());
        };
        if let Some(hash) = fingerprint::fingerprint(text, self.editor.boundary()) {
            ledger
                .lock()
                .map_err(|_| anyhow!("ledger lock poisoned"))?
                .record(&doc.path, &hash, doc.mtime);
        }
        Ok(())
    }

    pub fn into_ledger(self) -> Result<Option<LedgerSession>> {
        self.ledger
            .map(|m| m.into_inner().map_err(|_| anyhow!("ledger lock poisoned")))
            .transpose()
    }
}

#[async_trait]
impl DocumentPass for AnnotatePass<'_> {
    fn name(&self) -> &str {
        "annotate"
    }

    async fn apply(&self, doc: &DocumentEntry, text: &str) -> Result<DocOutcome> {
        let boundary = self.editor.boundary();
        let working = if self.editor.split(text).is_some() {
            text.to_string()
        } else if self.config.batch.insert_missing_boundary {
            fingerprint::insert_boundary(text, boundary)
        } else {
            return Ok(DocOutcome::SkippedNoBoundary);
        };

        self.record_fingerprint(doc, &working)?;

        let candidates = self.scores.candidates_for(&doc.path);
        let resolvable = self.resolvable_targets(&doc.path, candidates).await?;
        let links = &self.config.links;
        let links_block = render_links(
            self.editor.markers(SectionKind::Links),
            candidates,
            links.min_score,
            links.max_links,
            |c| resolvable.contains(&c.target),
        );

        let tags = &self.config.tags;
        let tags_block = if tags.enabled {
            render_tags(
                self.editor.markers(SectionKind::Tags),
                self.scores.tags_for(&doc.path),
                tags.max_tags,
            )
        } else {
            String::new()
        };

        let nothing_to_add = links_block.is_empty() && tags_block.is_empty();
        let updated = self.editor.apply(
            &working,
            &[(SectionKind::Links, links_block), (SectionKind::Tags, tags_block)],
        );
        if nothing_to_add && updated == text {
            return Ok(DocOutcome::SkippedNoCandidates);
        }
        Ok(DocOutcome::Rewrite(updated))
    }
}

/// Result of `vlink annotate`.
#[derive(Debug, Clone)]
pub struct AnnotateSummary {
    pub report: BatchReport,
    pub ledger: Option<LedgerStats>,
}

impl fmt::Display for AnnotateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report)?;
        if let Some(stats) = &self.ledger {
            write!(f, "\n{}", stats)?;
        }
        Ok(())
    }
}

/// Run the annotation step. Fails before touching any document when the
/// scoring data is missing or unreadable.
pub async fn run_annotate(
    config: &Config,
    store: &dyn DocumentStore,
    opts: &RunOptions,
    mode: ScoringMode,
) -> Result<AnnotateSummary> {
    let scores = load_scores(&config.scores_path()).await?;

    let ledger = match mode {
        ScoringMode::Skip => None,
        ScoringMode::Force | ScoringMode::Smart => {
            let ledger = Ledger::load(&config.fingerprints_path()).await?;
            Some(LedgerSession::new(ledger, mode == ScoringMode::Force))
        }
    };

    let pass = AnnotatePass::new(config, store, &scores, ledger)?;
    let report = run_pass(config, store, opts, &pass).await?;

    let ledger = match pass.into_ledger()? {
        Some(session) => {
            let present = report.full_coverage(&opts.scope);
            Some(
                session
                    .finish(&config.markers.boundary, present.as_ref(), opts.dry_run)
                    .await?,
            )
        }
        None => None,
    };

    Ok(AnnotateSummary { report, ledger })
}

pub struct CleanPass {
    editor: SectionEditor,
    all_after_boundary: bool,
}

impl CleanPass {
    /// With `all_after_boundary`, everything after the marker goes, user
    /// text included. Otherwise only machine-owned sections are removed.
    pub fn new(config: &Config, all_after_boundary: bool) -> Result<Self> {
        Ok(Self {
            editor: SectionEditor::from_config(config)?,
            all_after_boundary,
        })
    }
}

#[async_trait]
impl DocumentPass for CleanPass {
    fn name(&self) -> &str {
        "clean"
    }

    async fn apply(&self, doc: &DocumentEntry, text: &str) -> Result<DocOutcome> {
        let Some(split) = self.editor.split(text) else {
            return Ok(DocOutcome::SkippedNoBoundary);
        };
        if !self.all_after_boundary {
            return Ok(DocOutcome::Rewrite(self.editor.clear(text)));
        }
        let dropped = split.after.trim();
        if !dropped.is_empty() {
            let preview: String = dropped.chars().take(80).collect();
            tracing::info!(
                path = %doc.path,
                lines = dropped.lines().count(),
                preview = %preview,
                "clearing annotation zone"
            );
        }
        Ok(DocOutcome::Rewrite(self.editor.truncate(text)))
    }
}

/// Remove machine-owned sections in scope, or with `all_after_boundary`
/// the whole annotation zone.
pub async fn run_clean(
    config: &Config,
    store: &dyn DocumentStore,
    opts: &RunOptions,
    all_after_boundary: bool,
) -> Result<BatchReport> {
    let pass = CleanPass::new(config, all_after_boundary)?;
    run_pass(config, store, opts, &pass).await
}
