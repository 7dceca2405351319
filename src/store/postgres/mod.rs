//! [`DocumentStore`] over a single Postgres JSONB table.
//!
//! Every document lives in `salonbook_documents(collection, id, data)`; a
//! batch commits inside one transaction and stamped fields take the
//! database's clock at that transaction.

use may_postgres::types::ToSql;
use serde_json::Value;

use super::{
    CommitReceipt, DocPath, DocumentStore, Query, Snapshot, StoreError, WriteBatch,
    WriteKind,
};

pub mod connection;
pub mod executor;
pub mod sql;
pub mod transaction;

pub use connection::{connect, validate_connection_string};
pub use executor::{PgConnection, PgError, PgExecutor};
pub use transaction::Transaction;

/// Postgres-backed document store
///
/// Holds one session; give each coroutine its own store.
pub struct PgDocumentStore {
    connection: PgConnection,
    max_batch_ops: usize,
}

impl PgDocumentStore {
    pub fn new(connection: PgConnection) -> Self {
        Self {
            connection,
            max_batch_ops: super::MAX_BATCH_OPS,
        }
    }

    /// Dial `url` and make sure the document table exists
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let store = Self::new(PgConnection::new(connect(url)?));
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.connection.execute(sql::CREATE_TABLE, &[])?;
        Ok(())
    }

    pub fn connection(&self) -> &PgConnection {
        &self.connection
    }

    fn apply(&self, tx: &Transaction, batch: WriteBatch, now_ms: i64) -> Result<usize, StoreError> {
        let mut applied = 0;
        for op in batch.into_ops() {
            let collection = op.path.collection().to_string();
            let id = op.path.id().to_string();
            let mut data = op.data;
            for field in &op.stamps {
                data.insert((*field).to_string(), Value::from(now_ms));
            }
            let body = sql::jsonb(&data);
            let params: [&dyn ToSql; 3] = [&collection, &id, &body];

            match op.kind {
                WriteKind::Set => {
                    tx.execute(sql::UPSERT_REPLACE, &params)?;
                }
                WriteKind::Merge => {
                    tx.execute(sql::UPSERT_MERGE, &params)?;
                }
                WriteKind::Update => {
                    if tx.execute(sql::UPDATE_MERGE, &params)? == 0 {
                        return Err(StoreError::NotFound(op.path.to_string()));
                    }
                }
                WriteKind::Delete => {
                    tx.execute(sql::DELETE_ONE, &params[..2])?;
                }
            }
            applied += 1;
        }
        Ok(applied)
    }
}

fn object(path: DocPath, value: Value) -> Result<Snapshot, StoreError> {
    match value {
        Value::Object(data) => Ok(Snapshot { path, data }),
        other => Err(StoreError::Codec(format!(
            "{path}: stored body is not an object: {other}"
        ))),
    }
}

impl DocumentStore for PgDocumentStore {
    fn get(&self, path: &DocPath) -> Result<Option<Snapshot>, StoreError> {
        let collection = path.collection().to_string();
        let id = path.id().to_string();
        let rows = self
            .connection
            .query_all(sql::SELECT_ONE, &[&collection, &id])?;
        match rows.first() {
            Some(row) => {
                let data: Value = row
                    .try_get(0)
                    .map_err(|e| PgError::Parse(format!("{path}: {e}")))?;
                object(path.clone(), data).map(Some)
            }
            None => Ok(None),
        }
    }

    fn query(&self, query: &Query) -> Result<Vec<Snapshot>, StoreError> {
        let (statement, params) = sql::select(query);
        let rows = self.connection.query_all(&statement, &sql::bind(&params))?;
        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get(0)
                    .map_err(|e| PgError::Parse(format!("{}: {e}", query.collection)))?;
                let data: Value = row
                    .try_get(1)
                    .map_err(|e| PgError::Parse(format!("{}/{id}: {e}", query.collection)))?;
                object(DocPath::new(query.collection.clone(), id), data)
            })
            .collect()
    }

    fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        if batch.len() > self.max_batch_ops {
            return Err(StoreError::BatchTooLarge {
                ops: batch.len(),
                max: self.max_batch_ops,
            });
        }
        if batch.is_empty() {
            return Ok(CommitReceipt::empty());
        }

        let tx = self.connection.begin()?;
        let now_ms: i64 = tx
            .query_one(sql::SERVER_TIME_MS, &[])?
            .try_get(0)
            .map_err(|e| PgError::Parse(format!("server time: {e}")))?;

        match self.apply(&tx, batch, now_ms) {
            Ok(ops) => {
                tx.commit()?;
                Ok(CommitReceipt {
                    ops,
                    commit_time_ms: now_ms,
                })
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    log::warn!("rollback after failed batch also failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    fn max_batch_ops(&self) -> usize {
        self.max_batch_ops
    }
}
