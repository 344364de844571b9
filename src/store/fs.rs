//! Filesystem-backed [`DocumentStore`].
//!
//! Walks the vault root with `walkdir`, filters relative paths through
//! include/exclude glob sets, and writes atomically by renaming a sibling
//! temp file over the target.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use super::{DocumentEntry, DocumentStore, EntryKind, StoredText};
use crate::config::VaultConfig;
use crate::error::LinkerError;

pub struct FsStore {
    root: PathBuf,
    include_set: GlobSet,
    exclude_set: GlobSet,
    follow_symlinks: bool,
}

impl FsStore {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let root = config.root.clone();
        if !root.is_dir() {
            bail!("Vault root does not exist: {}", root.display());
        }

        let include_set = build_globset(&config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/.obsidian/**".to_string(),
            "**/.trash/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)?;

        Ok(Self {
            root,
            include_set,
            exclude_set,
            follow_symlinks: config.follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("Refusing path outside the vault: {}", relative);
        }
        Ok(self.root.join(rel))
    }
}

fn mtime_millis(modified: std::io::Result<SystemTime>) -> i64 {
    modified
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn list(&self) -> Result<Vec<DocumentEntry>> {
        let mut entries = Vec::new();

        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude_set.is_match(&rel_str) {
                continue;
            }
            if !self.include_set.is_match(&rel_str) {
                continue;
            }

            let mtime = mtime_millis(entry.metadata()?.modified());
            entries.push(DocumentEntry {
                path: rel_str,
                mtime,
            });
        }

        // Sort for deterministic ordering
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<StoredText> {
        let full = self.full_path(path)?;
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|e| LinkerError::store_io(path, e))?;
        let text = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| LinkerError::store_io(path, e))?;
        Ok(StoredText {
            text,
            mtime: mtime_millis(metadata.modified()),
        })
    }

    async fn write(&self, path: &str, text: &str) -> Result<()> {
        let full = self.full_path(path)?;
        if !tokio::fs::try_exists(&full)
            .await
            .map_err(|e| LinkerError::store_io(path, e))?
        {
            bail!("Refusing to create new document: {}", path);
        }

        let file_name = full
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = full.with_file_name(format!(".{}.vlink-tmp", file_name));

        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| LinkerError::store_io(path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &full).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(LinkerError::store_io(path, e).into());
        }
        Ok(())
    }

    async fn resolve(&self, path: &str) -> Result<Option<EntryKind>> {
        let full = self.full_path(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => return Ok(Some(EntryKind::Folder)),
            Ok(meta) if meta.is_file() => return Ok(Some(EntryKind::Note)),
            _ => {}
        }
        // Link targets are often written without the extension.
        if full.extension().is_none() {
            let with_ext = full.with_extension("md");
            if let Ok(meta) = tokio::fs::metadata(&with_ext).await {
                if meta.is_file() {
                    return Ok(Some(EntryKind::Note));
                }
            }
        }
        Ok(None)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
