//! The fingerprint ledger shared with the scoring collaborator.
//!
//! A JSON file mapping each document path to the fingerprint of its
//! tracked body. This crate writes it; the scorer reads it to decide which
//! documents need re-scoring.
//!
//! ```json
//! {
//!   "_metadata": { "generated_at": "...", "boundary_marker": "<!-- HASH_BOUNDARY -->",
//!                  "force_rescore": false, "total_files": 2 },
//!   "files": { "Notes/a.md": { "hash": "9f86...", "mtime": 1700000000000, "updated_at": "..." } }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub boundary_marker: String,
    #[serde(default)]
    pub force_rescore: bool,
    #[serde(default)]
    pub total_files: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub hash: String,
    /// Mtime of the document as read when `hash` was taken. An annotation
    /// rewrite in the same run only touches the annotation zone, so it
    /// bumps the file's mtime without changing `hash`; compare hashes, not
    /// mtimes, to decide whether a note needs re-scoring.
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(rename = "_metadata", default)]
    metadata: LedgerMetadata,
    #[serde(default)]
    files: BTreeMap<String, LedgerEntry>,
}

/// How a fingerprint compares with the ledger's stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintStatus {
    New,
    Changed,
    Unchanged,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    file: LedgerFile,
    dirty: bool,
}

impl Ledger {
    /// An empty ledger that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: LedgerFile::default(),
            dirty: false,
        }
    }

    /// Load the ledger at `path`. A missing file is an empty ledger.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty(path));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read ledger {}", path.display()))
            }
        };
        let file: LedgerFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse ledger {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, path: &str) -> Option<&LedgerEntry> {
        self.file.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.file.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.files.is_empty()
    }

    pub fn metadata(&self) -> &LedgerMetadata {
        &self.file.metadata
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn status(&self, path: &str, hash: &str) -> FingerprintStatus {
        match self.file.files.get(path) {
            None => FingerprintStatus::New,
            Some(entry) if entry.hash == hash => FingerprintStatus::Unchanged,
            Some(_) => FingerprintStatus::Changed,
        }
    }

    /// Record `hash` for `path`. Unchanged entries are left as they are
    /// unless `force` is set, which rewrites every entry.
    pub fn record(&mut self, path: &str, hash: &str, mtime: i64, force: bool) -> FingerprintStatus {
        let status = self.status(path, hash);
        if status != FingerprintStatus::Unchanged || force {
            self.file.files.insert(
                path.to_string(),
                LedgerEntry {
                    hash: hash.to_string(),
                    mtime,
                    updated_at: Utc::now().to_rfc3339(),
                },
            );
            self.dirty = true;
        }
        status
    }

    pub fn set_force_rescore(&mut self, force: bool) {
        if self.file.metadata.force_rescore != force {
            self.file.metadata.force_rescore = force;
            self.dirty = true;
        }
    }

    /// Drop entries whose paths are not in `present`. Returns how many.
    pub fn prune(&mut self, present: &HashSet<String>) -> usize {
        let before = self.file.files.len();
        self.file.files.retain(|path, _| present.contains(path));
        let removed = before - self.file.files.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Write the ledger atomically: a temp file next to it, then a rename.
    pub async fn save(&mut self, boundary_marker: &str) -> Result<()> {
        self.file.metadata.generated_at = Some(Utc::now().to_rfc3339());
        self.file.metadata.boundary_marker = boundary_marker.to_string();
        self.file.metadata.total_files = self.file.files.len();

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}

/// Fingerprint status tallies for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub new: u64,
    pub changed: u64,
    pub unchanged: u64,
    pub pruned: u64,
}

impl LedgerStats {
    fn count(&mut self, status: FingerprintStatus) {
        match status {
            FingerprintStatus::New => self.new += 1,
            FingerprintStatus::Changed => self.changed += 1,
            FingerprintStatus::Unchanged => self.unchanged += 1,
        }
    }
}

/// A ledger being updated by a running pass. Passes share it behind a
/// mutex; each document records at most once.
#[derive(Debug)]
pub struct LedgerSession {
    ledger: Ledger,
    stats: LedgerStats,
    force: bool,
}

impl LedgerSession {
    pub fn new(ledger: Ledger, force: bool) -> Self {
        Self {
            ledger,
            stats: LedgerStats::default(),
            force,
        }
    }

    pub fn record(&mut self, path: &str, hash: &str, mtime: i64) -> FingerprintStatus {
        let status = self.ledger.record(path, hash, mtime, self.force);
        self.stats.count(status);
        status
    }

    /// Finish the run: set the rescore flag, prune vanished entries when
    /// the whole vault was covered, and save unless `dry_run`.
    pub async fn finish(
        mut self,
        boundary_marker: &str,
        present: Option<&HashSet<String>>,
        dry_run: bool,
    ) -> Result<LedgerStats> {
        self.ledger.set_force_rescore(self.force);
        if let Some(present) = present {
            self.stats.pruned = self.ledger.prune(present) as u64;
        }
        if !dry_run && self.ledger.is_dirty() {
            self.ledger.save(boundary_marker).await?;
            tracing::info!(path = %self.ledger.path().display(), entries = self.ledger.len(), "saved fingerprint ledger");
        }
        Ok(self.stats)
    }
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fingerprints new: {}\nfingerprints changed: {}\nfingerprints unchanged: {}\nfingerprints pruned: {}",
            self.new, self.changed, self.unchanged, self.pruned
        )
    }
}
