//! Mtime-keyed document text cache.
//!
//! An entry is valid only while its stored mtime equals the document's
//! current mtime. Once more than `capacity` paths are cached, the oldest
//! inserted entry is dropped. This is insertion order, not recency: the
//! cache is an optimization and every caller tolerates a miss.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;

use crate::store::DocumentStore;

struct CacheEntry {
    text: String,
    mtime: i64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

/// Explicitly owned content cache shared by the passes of one run.
pub struct ContentCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ContentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Return the text of `path` as of `current_mtime`, reading through to
    /// the store on a miss or a stale entry.
    pub async fn get(
        &self,
        store: &dyn DocumentStore,
        path: &str,
        current_mtime: i64,
    ) -> Result<String> {
        if let Some(text) = self.lookup(path, current_mtime) {
            return Ok(text);
        }
        let stored = store.read(path).await?;
        self.insert(path, stored.text.clone(), stored.mtime);
        Ok(stored.text)
    }

    /// Cached text if the entry is present and its mtime matches.
    pub fn lookup(&self, path: &str, current_mtime: i64) -> Option<String> {
        let inner = self.inner.lock().ok()?;
        inner
            .entries
            .get(path)
            .filter(|entry| entry.mtime == current_mtime)
            .map(|entry| entry.text.clone())
    }

    pub fn insert(&self, path: &str, text: String, mtime: i64) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner
            .entries
            .insert(path.to_string(), CacheEntry { text, mtime })
            .is_some()
        {
            inner.order.retain(|p| p != path);
        }
        inner.order.push_back(path.to_string());

        while inner.entries.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drop the entry for `path`. Must be called after every write to it.
    pub fn invalidate(&self, path: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.entries.remove(path).is_some() {
                inner.order.retain(|p| p != path);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
