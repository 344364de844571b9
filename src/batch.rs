//! Batched traversal of the vault.
//!
//! [`BatchOrchestrator`] enumerates documents, keeps those in [`Scope`]
//! and not excluded by the [`PathMatcher`], and runs a [`DocumentPass`]
//! over them in fixed-size batches. Documents within a batch run
//! concurrently; batches run one after another. Cancellation is checked
//! between batches only, so an in-flight write always completes.
//!
//! A document is written back only when the pass produced different text
//! and the run is not a dry run. The cache entry of a written document is
//! invalidated immediately after the write.

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::cache::ContentCache;
use crate::config::Config;
use crate::error::LinkerError;
use crate::exclude::PathMatcher;
use crate::models::DocOutcome;
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::store::{normalize_path, DocumentEntry, DocumentStore};

/// Folder prefixes a run is restricted to. No folders means everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    folders: Vec<String>,
}

impl Scope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn folders<S: AsRef<str>>(folders: &[S]) -> Self {
        let folders = folders
            .iter()
            .map(|f| normalize_path(f.as_ref()))
            .filter(|f| !f.is_empty())
            .collect();
        Self { folders }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.folders.is_empty()
    }

    /// A path is in scope if it equals a folder or lies under one.
    pub fn contains(&self, path: &str) -> bool {
        self.is_unrestricted()
            || self.folders.iter().any(|folder| {
                path == folder
                    || path
                        .strip_prefix(folder.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
    }
}

/// Options every command shares.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scope: Scope,
    pub dry_run: bool,
    pub progress: ProgressMode,
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            scope: Scope::all(),
            dry_run: false,
            progress: ProgressMode::Off,
            cancel: CancellationToken::new(),
        }
    }
}

/// Build an orchestrator from `config` and `opts` and run `pass` with it.
pub async fn run_pass(
    config: &Config,
    store: &dyn DocumentStore,
    opts: &RunOptions,
    pass: &dyn DocumentPass,
) -> Result<BatchReport> {
    let cache = ContentCache::new(config.batch.cache_capacity);
    let matcher = PathMatcher::from_config(&config.exclude)?;
    let reporter = opts.progress.reporter();
    BatchOrchestrator::new(store, &cache, &matcher, reporter.as_ref())
        .batch_size(config.batch.size)
        .dry_run(opts.dry_run)
        .cancel_token(opts.cancel.clone())
        .run(pass, &opts.scope)
        .await
}

/// One unit of per-document work.
#[async_trait]
pub trait DocumentPass: Send + Sync {
    /// Short name used in progress output and logs.
    fn name(&self) -> &str;

    async fn apply(&self, doc: &DocumentEntry, text: &str) -> Result<DocOutcome>;
}

/// Counts aggregated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub examined: u64,
    pub modified: u64,
    pub unchanged: u64,
    pub skipped_no_boundary: u64,
    pub skipped_no_candidates: u64,
    pub failed: u64,
    pub excluded: u64,
    pub cancelled: bool,
    /// Every in-scope, non-excluded path, whether or not it was reached.
    pub documents: Vec<String>,
}

impl BatchReport {
    /// Every document path, when the run covered the whole vault and was
    /// not cancelled. Used to prune ledger entries for vanished documents.
    pub fn full_coverage(&self, scope: &Scope) -> Option<HashSet<String>> {
        if scope.is_unrestricted() && !self.cancelled {
            Some(self.documents.iter().cloned().collect())
        } else {
            None
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "examined: {}\nmodified: {}\nunchanged: {}\nskipped (no boundary): {}\nskipped (no candidates): {}\nfailed: {}\nexcluded: {}",
            self.examined,
            self.modified,
            self.unchanged,
            self.skipped_no_boundary,
            self.skipped_no_candidates,
            self.failed,
            self.excluded
        )?;
        if self.cancelled {
            write!(f, "\ncancelled: true")?;
        }
        Ok(())
    }
}

enum Handled {
    Modified,
    Unchanged,
    NoBoundary,
    NoCandidates,
    Failed,
}

pub struct BatchOrchestrator<'a> {
    store: &'a dyn DocumentStore,
    cache: &'a ContentCache,
    matcher: &'a PathMatcher,
    progress: &'a dyn ProgressReporter,
    batch_size: usize,
    dry_run: bool,
    cancel: CancellationToken,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        cache: &'a ContentCache,
        matcher: &'a PathMatcher,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            store,
            cache,
            matcher,
            progress,
            batch_size: 20,
            dry_run: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Documents in scope and not excluded, plus how many were excluded.
    pub async fn select(&self, scope: &Scope) -> Result<(Vec<DocumentEntry>, u64)> {
        let mut excluded = 0;
        let mut selected = Vec::new();
        for entry in self.store.list().await? {
            if !scope.contains(&entry.path) {
                continue;
            }
            if self.matcher.is_excluded(&entry.path) {
                excluded += 1;
                continue;
            }
            selected.push(entry);
        }
        Ok((selected, excluded))
    }

    /// Run `pass` over every selected document.
    pub async fn run(&self, pass: &dyn DocumentPass, scope: &Scope) -> Result<BatchReport> {
        self.progress.report(ProgressEvent::Discovering {
            pass: pass.name().to_string(),
        });

        let (docs, excluded) = self.select(scope).await?;
        let total = docs.len() as u64;
        let mut report = BatchReport {
            excluded,
            documents: docs.iter().map(|d| d.path.clone()).collect(),
            ..Default::default()
        };
        tracing::info!(pass = pass.name(), total, excluded, "starting pass");

        for batch in docs.chunks(self.batch_size) {
            if self.cancel.is_cancelled() {
                tracing::warn!(pass = pass.name(), done = report.examined, total, "pass cancelled");
                report.cancelled = true;
                break;
            }

            let results = join_all(batch.iter().map(|doc| self.handle(pass, doc))).await;
            for handled in results {
                report.examined += 1;
                match handled {
                    Handled::Modified => report.modified += 1,
                    Handled::Unchanged => report.unchanged += 1,
                    Handled::NoBoundary => report.skipped_no_boundary += 1,
                    Handled::NoCandidates => report.skipped_no_candidates += 1,
                    Handled::Failed => report.failed += 1,
                }
            }

            self.progress.report(ProgressEvent::Processing {
                pass: pass.name().to_string(),
                n: report.examined,
                total,
            });
        }

        Ok(report)
    }

    async fn handle(&self, pass: &dyn DocumentPass, doc: &DocumentEntry) -> Handled {
        match self.process(pass, doc).await {
            Ok(handled) => handled,
            Err(e) => {
                tracing::warn!(pass = pass.name(), path = %doc.path, error = %format!("{:#}", e), "document failed");
                Handled::Failed
            }
        }
    }

    async fn process(&self, pass: &dyn DocumentPass, doc: &DocumentEntry) -> Result<Handled> {
        let text = self.cache.get(self.store, &doc.path, doc.mtime).await?;
        let handled = match pass.apply(doc, &text).await? {
            DocOutcome::Rewrite(new_text) if new_text != text => {
                if !self.dry_run {
                    let written = self.store.write(&doc.path, &new_text).await;
                    self.cache.invalidate(&doc.path);
                    written?;
                }
                tracing::debug!(pass = pass.name(), path = %doc.path, dry_run = self.dry_run, "rewrote document");
                Handled::Modified
            }
            DocOutcome::Rewrite(_) | DocOutcome::Unchanged => Handled::Unchanged,
            DocOutcome::SkippedNoBoundary => {
                let reason = LinkerError::MissingBoundary {
                    path: doc.path.clone(),
                };
                tracing::debug!(pass = pass.name(), "{}", reason);
                Handled::NoBoundary
            }
            DocOutcome::SkippedNoCandidates => Handled::NoCandidates,
        };
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::store::memory::MemoryStore;

    /// Appends a line to every document, fails on `bad.md`, and can cancel
    /// the run once it has seen a given path.
    struct AppendPass {
        cancel_after: Option<(String, CancellationToken)>,
    }

    #[async_trait]
    impl DocumentPass for AppendPass {
        fn name(&self) -> &str {
            "append"
        }

        async fn apply(&self, doc: &DocumentEntry, text: &str) -> Result<DocOutcome> {
            if let Some((path, token)) = &self.cancel_after {
                if &doc.path == path {
                    token.cancel();
                }
            }
            if doc.path.ends_with("bad.md") {
                anyhow::bail!("boom");
            }
            if text.contains("done") {
                return Ok(DocOutcome::Unchanged);
            }
            if !text.contains("<!-- HASH_BOUNDARY -->") {
                return Ok(DocOutcome::SkippedNoBoundary);
            }
            Ok(DocOutcome::Rewrite(format!("{}done\n", text)))
        }
    }

    fn plain() -> AppendPass {
        AppendPass { cancel_after: None }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("Notes/a.md", "a\n<!-- HASH_BOUNDARY -->\n");
        store.insert("Notes/b.md", "b\n<!-- HASH_BOUNDARY -->\n");
        store.insert("Notes/plain.md", "no marker\n");
        store.insert("Notes/bad.md", "x\n<!-- HASH_BOUNDARY -->\n");
        store.insert("Scripts/s.md", "s\n<!-- HASH_BOUNDARY -->\n");
        store.insert("Other/c.md", "c\n<!-- HASH_BOUNDARY -->\n");
        store
    }

    #[test]
    fn scope_rules() {
        let scope = Scope::folders(&["Notes/", "Projects/Alpha"]);
        assert!(scope.contains("Notes/a.md"));
        assert!(scope.contains("Projects/Alpha/x.md"));
        assert!(scope.contains("Notes"));
        assert!(!scope.contains("NotesExtra/a.md"));
        assert!(!scope.contains("Projects/Alphabet/x.md"));
        assert!(Scope::all().contains("anything.md"));
        assert!(Scope::folders(&[""]).is_unrestricted());
    }

    #[tokio::test]
    async fn run_counts_and_writes() {
        let store = store();
        let cache = ContentCache::new(100);
        let matcher = PathMatcher::new(&["Scripts".to_string()], &[]).unwrap();
        let orchestrator =
            BatchOrchestrator::new(&store, &cache, &matcher, &NoProgress).batch_size(2);

        let report = orchestrator.run(&plain(), &Scope::all()).await.unwrap();
        assert_eq!(report.examined, 5);
        assert_eq!(report.modified, 3);
        assert_eq!(report.skipped_no_boundary, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.excluded, 1);
        assert!(!report.cancelled);
        assert_eq!(store.text_of("Scripts/s.md").unwrap(), "s\n<!-- HASH_BOUNDARY -->\n");
        assert!(store.text_of("Notes/a.md").unwrap().ends_with("done\n"));
        assert_eq!(store.text_of("Notes/bad.md").unwrap(), "x\n<!-- HASH_BOUNDARY -->\n");

        // Second run: nothing left to change, nothing written.
        let again = orchestrator.run(&plain(), &Scope::all()).await.unwrap();
        assert_eq!(again.modified, 0);
        assert_eq!(again.unchanged, 3);
        assert_eq!(store.write_count("Notes/a.md"), 1);
    }

    #[tokio::test]
    async fn dry_run_never_writes() {
        let store = store();
        let cache = ContentCache::new(100);
        let matcher = PathMatcher::new(&[], &[]).unwrap();
        let orchestrator = BatchOrchestrator::new(&store, &cache, &matcher, &NoProgress).dry_run(true);

        let report = orchestrator.run(&plain(), &Scope::folders(&["Notes"])).await.unwrap();
        assert_eq!(report.examined, 4);
        assert_eq!(report.modified, 2);
        assert_eq!(store.write_count("Notes/a.md"), 0);
        assert_eq!(report.documents.len(), 4);
    }

    #[tokio::test]
    async fn cancellation_stops_between_batches() {
        let store = store();
        let cache = ContentCache::new(100);
        let matcher = PathMatcher::new(&[], &[]).unwrap();
        let token = CancellationToken::new();
        let orchestrator = BatchOrchestrator::new(&store, &cache, &matcher, &NoProgress)
            .batch_size(2)
            .cancel_token(token.clone());

        // Listing is sorted, so the first batch is Notes/a.md and Notes/b.md.
        let pass = AppendPass {
            cancel_after: Some(("Notes/a.md".to_string(), token)),
        };
        let report = orchestrator.run(&pass, &Scope::folders(&["Notes"])).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.examined, 2);
        assert_eq!(report.modified, 2);
        assert!(store.text_of("Notes/plain.md").is_some());
        assert_eq!(store.write_count("Notes/bad.md"), 0);
    }

    #[tokio::test]
    async fn cache_is_invalidated_after_write() {
        let store = store();
        let cache = ContentCache::new(100);
        let matcher = PathMatcher::new(&[], &[]).unwrap();
        let orchestrator = BatchOrchestrator::new(&store, &cache, &matcher, &NoProgress);

        orchestrator.run(&plain(), &Scope::folders(&["Other"])).await.unwrap();
        assert!(cache.lookup("Other/c.md", store.mtime_of("Other/c.md").unwrap()).is_none());
    }
}
