//! In-process [`DocumentStore`].
//!
//! Holds every document in one ordered map behind a mutex. A commit applies
//! its operations to a staged copy of the touched documents and publishes
//! them only when every operation succeeded, so readers never observe half a
//! batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;

use super::{
    CommitReceipt, DocPath, Document, DocumentStore, Query, Snapshot, StoreError, WriteBatch,
    WriteKind, MAX_BATCH_OPS,
};

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<DocPath, Document>>,
    commits: AtomicUsize,
    last_stamp_ms: AtomicI64,
    fail_next: Mutex<Option<String>>,
    max_batch_ops: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects batches above `max` operations
    pub fn with_max_batch_ops(max: usize) -> Self {
        Self {
            max_batch_ops: Some(max),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DocPath, Document>> {
        // A poisoned map is still structurally valid: commits publish atomically.
        self.docs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write a document directly, bypassing batches
    pub fn raw_put(&self, path: DocPath, data: Document) {
        self.lock().insert(path, data);
    }

    pub fn raw_delete(&self, path: &DocPath) -> Option<Document> {
        self.lock().remove(path)
    }

    /// Ids of every document in `collection`, in id order
    pub fn ids_in(&self, collection: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|path| path.collection() == collection)
            .map(|path| path.id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Successful non-empty commits so far
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Make the next commit fail with [`StoreError::Unavailable`] without applying anything
    pub fn fail_next_commit(&self, reason: impl Into<String>) {
        let mut slot = self
            .fail_next
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(reason.into());
    }

    /// Commit timestamp in epoch millis, strictly increasing across commits
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_stamp_ms.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self.last_stamp_ms.compare_exchange(
                prev,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &DocPath) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.lock().get(path).map(|data| Snapshot {
            path: path.clone(),
            data: data.clone(),
        }))
    }

    fn query(&self, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        let docs = self.lock();
        let candidates = docs
            .iter()
            .filter(|(path, _)| path.collection() == query.collection)
            .map(|(path, data)| Snapshot {
                path: path.clone(),
                data: data.clone(),
            });
        Ok(query.apply(candidates, |snap| &snap.data))
    }

    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        let max = self.max_batch_ops();
        if batch.len() > max {
            return Err(StoreError::BatchTooLarge {
                ops: batch.len(),
                max,
            });
        }
        if batch.is_empty() {
            return Ok(CommitReceipt::empty());
        }

        let injected = self
            .fail_next
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reason) = injected {
            return Err(StoreError::Unavailable(reason));
        }

        let mut docs = self.lock();
        let now_ms = self.next_stamp();
        // None in the overlay marks a staged delete
        let mut staged: HashMap<DocPath, Option<Document>> = HashMap::new();
        let ops = batch.len();

        for op in batch.into_ops() {
            let current = match staged.get(&op.path) {
                Some(doc) => doc.clone(),
                None => docs.get(&op.path).cloned(),
            };
            let mut data = op.data;
            for field in &op.stamps {
                data.insert((*field).to_string(), Value::from(now_ms));
            }

            let next = match op.kind {
                WriteKind::Set => Some(data),
                WriteKind::Merge => {
                    let mut merged = current.unwrap_or_default();
                    merged.extend(data);
                    Some(merged)
                }
                WriteKind::Update => match current {
                    Some(mut existing) => {
                        existing.extend(data);
                        Some(existing)
                    }
                    None => return Err(StoreError::NotFound(op.path.to_string())),
                },
                WriteKind::Delete => None,
            };
            staged.insert(op.path, next);
        }

        for (path, doc) in staged {
            match doc {
                Some(data) => {
                    docs.insert(path, data);
                }
                None => {
                    docs.remove(&path);
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);

        Ok(CommitReceipt {
            ops,
            commit_time_ms: now_ms,
        })
    }

    fn max_batch_ops(&self) -> usize {
        self.max_batch_ops.unwrap_or(MAX_BATCH_OPS)
    }
}
