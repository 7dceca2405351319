//! Document store seam.
//!
//! [`DocumentStore`] is the only way the consistency layer touches storage:
//! point reads, filtered/ordered/limited queries over one collection, and
//! atomic multi-document batches. Implementations are passed down explicitly
//! ([`memory::MemoryStore`] for tests and embedding, [`postgres::PgDocumentStore`]
//! for a real database).
//!
//! Calls block the caller until the round trip completes. Under the `may`
//! runtime that parks the coroutine rather than the worker thread.

use std::fmt;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub mod batch;
pub mod memory;
pub mod paths;
pub mod postgres;
pub mod query;

pub use batch::{CommitReceipt, WriteBatch, WriteKind, WriteOp};
pub use query::{Direction, Filter, FilterOp, Query};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Hard per-batch operation ceiling of the stores this crate targets
pub const MAX_BATCH_OPS: usize = 500;

/// A stored document: a JSON object
pub type Document = Map<String, Value>;

/// Address of one document: the collection path it lives in plus its id
///
/// Sub-collections nest under a document: `tickets/t1/serviceItems` is the
/// collection holding `t1`'s service items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    collection: String,
    id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the sub-collection `name` under this document
    pub fn sub_collection(&self, name: &str) -> String {
        format!("{}/{}/{}", self.collection, self.id, name)
    }

    /// Document `id` in the sub-collection `name` under this document
    pub fn child(&self, name: &str, id: impl Into<String>) -> DocPath {
        DocPath::new(self.sub_collection(name), id)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Documents whose id lives outside their body
pub trait Keyed {
    fn set_id(&mut self, id: String);
}

/// A document as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: DocPath,
    pub data: Document,
}

impl Snapshot {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Decode the body into `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| StoreError::Codec(format!("{}: {e}", self.path)))
    }

    /// Decode the body into `T` and attach the document id
    pub fn decode_keyed<T: DeserializeOwned + Keyed>(&self) -> Result<T, StoreError> {
        let mut value: T = self.decode()?;
        value.set_id(self.path.id().to_string());
        Ok(value)
    }
}

/// Serialize `value` into a document body
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Codec(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(StoreError::Codec(e.to_string())),
    }
}

/// Store error type
#[derive(Debug)]
pub enum StoreError {
    /// Error from the Postgres backend
    Postgres(postgres::PgError),
    /// An `update` targeted a document that does not exist; nothing was applied
    NotFound(String),
    /// Batch exceeds the store's per-batch operation ceiling; nothing was applied
    BatchTooLarge { ops: usize, max: usize },
    /// Document body could not be encoded or decoded
    Codec(String),
    /// Store unreachable or refused the request
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Postgres(e) => write!(f, "{e}"),
            StoreError::NotFound(path) => write!(f, "Document not found: {path}"),
            StoreError::BatchTooLarge { ops, max } => {
                write!(f, "Batch has {ops} operations, the store accepts at most {max}")
            }
            StoreError::Codec(msg) => write!(f, "Document codec error: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<postgres::PgError> for StoreError {
    fn from(err: postgres::PgError) -> Self {
        StoreError::Postgres(err)
    }
}

/// Storage operations the consistency layer needs
pub trait DocumentStore {
    /// Point read
    fn get(&self, path: &DocPath) -> Result<Option<Snapshot>, StoreError>;

    /// Documents of one collection matching `query`
    fn query(&self, query: &Query) -> Result<Vec<Snapshot>, StoreError>;

    /// Apply every operation of `batch` or none of them
    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError>;

    /// Largest batch [`DocumentStore::commit`] accepts
    fn max_batch_ops(&self) -> usize {
        MAX_BATCH_OPS
    }
}

/// Commit `batch` with logging, metrics and a tracing span around the store call
///
/// Every writer in this crate goes through here. An empty batch is not sent.
pub fn commit_batch(
    store: &dyn DocumentStore,
    batch: WriteBatch,
    label: &str,
) -> Result<CommitReceipt, StoreError> {
    let ops = batch.len();
    if ops == 0 {
        return Ok(CommitReceipt::empty());
    }

    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::commit_batch_span(label, ops).entered();

    let start = Instant::now();
    let result = store.commit(batch);
    let elapsed = start.elapsed();

    match &result {
        Ok(receipt) => {
            log::debug!("{label}: committed {ops} operation(s) in {elapsed:?}");
            #[cfg(feature = "metrics")]
            METRICS.record_commit(receipt.ops, elapsed);
            #[cfg(not(feature = "metrics"))]
            let _ = receipt;
        }
        Err(e) => {
            log::warn!("{label}: batch of {ops} operation(s) failed: {e}");
            #[cfg(feature = "metrics")]
            METRICS.record_commit_failure();
        }
    }

    result
}
