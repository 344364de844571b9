//! In-memory [`DocumentStore`] for tests and embedding callers.
//!
//! Every insert or write bumps a global counter used as the mtime, so a
//! rewrite is always observable as a new mtime.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{DocumentEntry, DocumentStore, EntryKind, StoredText};

struct StoredDoc {
    text: String,
    mtime: i64,
}

pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, StoredDoc>>,
    reads: RwLock<HashMap<String, usize>>,
    writes: RwLock<HashMap<String, usize>>,
    clock: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            reads: RwLock::new(HashMap::new()),
            writes: RwLock::new(HashMap::new()),
            clock: AtomicI64::new(1),
        }
    }

    /// Insert or replace a document outside of the [`DocumentStore`] API.
    pub fn insert(&self, path: &str, text: &str) {
        let mtime = self.tick();
        if let Ok(mut docs) = self.docs.write() {
            docs.insert(
                path.to_string(),
                StoredDoc {
                    text: text.to_string(),
                    mtime,
                },
            );
        }
    }

    pub fn text_of(&self, path: &str) -> Option<String> {
        self.docs.read().ok()?.get(path).map(|d| d.text.clone())
    }

    pub fn mtime_of(&self, path: &str) -> Option<i64> {
        self.docs.read().ok()?.get(path).map(|d| d.mtime)
    }

    pub fn read_count(&self, path: &str) -> usize {
        self.reads
            .read()
            .ok()
            .and_then(|r| r.get(path).copied())
            .unwrap_or(0)
    }

    pub fn write_count(&self, path: &str) -> usize {
        self.writes
            .read()
            .ok()
            .and_then(|w| w.get(path).copied())
            .unwrap_or(0)
    }

    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    fn bump(counter: &RwLock<HashMap<String, usize>>, path: &str) {
        if let Ok(mut map) = counter.write() {
            *map.entry(path.to_string()).or_insert(0) += 1;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(&self) -> Result<Vec<DocumentEntry>> {
        let docs = self.docs.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(docs
            .iter()
            .map(|(path, doc)| DocumentEntry {
                path: path.clone(),
                mtime: doc.mtime,
            })
            .collect())
    }

    async fn read(&self, path: &str) -> Result<StoredText> {
        Self::bump(&self.reads, path);
        let docs = self.docs.read().map_err(|_| anyhow!("store lock poisoned"))?;
        let doc = docs
            .get(path)
            .ok_or_else(|| anyhow!("document not found: {}", path))?;
        Ok(StoredText {
            text: doc.text.clone(),
            mtime: doc.mtime,
        })
    }

    async fn write(&self, path: &str, text: &str) -> Result<()> {
        let mtime = self.tick();
        {
            let mut docs = self.docs.write().map_err(|_| anyhow!("store lock poisoned"))?;
            let Some(doc) = docs.get_mut(path) else {
                bail!("Refusing to create new document: {}", path);
            };
            doc.text = text.to_string();
            doc.mtime = mtime;
        }
        Self::bump(&self.writes, path);
        Ok(())
    }

    async fn resolve(&self, path: &str) -> Result<Option<EntryKind>> {
        let docs = self.docs.read().map_err(|_| anyhow!("store lock poisoned"))?;
        if docs.contains_key(path) || docs.contains_key(&format!("{}.md", path)) {
            return Ok(Some(EntryKind::Note));
        }
        let prefix = format!("{}/", path.trim_end_matches('/'));
        if docs.keys().any(|k| k.starts_with(&prefix)) {
            return Ok(Some(EntryKind::Folder));
        }
        Ok(None)
    }
}
