//! One Postgres transaction per write batch.

use may_postgres::types::ToSql;
use may_postgres::{Client, Row};

use super::executor::{timed, PgError, PgExecutor};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// An open transaction
///
/// Consumed by [`Transaction::commit`] or [`Transaction::rollback`]. Dropping
/// an open transaction rolls it back so the session is never left inside a
/// half-applied batch.
pub struct Transaction {
    client: Client,
    closed: bool,
}

impl Transaction {
    pub(crate) fn begin(client: Client) -> Result<Self, PgError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("begin").entered();

        client.execute("BEGIN", &[])?;
        Ok(Self {
            client,
            closed: false,
        })
    }

    pub fn commit(mut self) -> Result<(), PgError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("commit").entered();

        self.finish("COMMIT")
    }

    pub fn rollback(mut self) -> Result<(), PgError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::transaction_span("rollback").entered();

        self.finish("ROLLBACK")
    }

    fn finish(&mut self, statement: &str) -> Result<(), PgError> {
        if self.closed {
            return Err(PgError::TransactionClosed);
        }
        self.closed = true;
        self.client.execute(statement, &[])?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), PgError> {
        if self.closed {
            Err(PgError::TransactionClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::warn!("rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

impl PgExecutor for Transaction {
    fn execute(&self, statement: &str, params: &[&dyn ToSql]) -> Result<u64, PgError> {
        self.ensure_open()?;
        timed(statement, || self.client.execute(statement, params))
    }

    fn query_all(&self, statement: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, PgError> {
        self.ensure_open()?;
        timed(statement, || self.client.query(statement, params))
    }

    fn query_one(&self, statement: &str, params: &[&dyn ToSql]) -> Result<Row, PgError> {
        self.ensure_open()?;
        timed(statement, || self.client.query_one(statement, params))
    }
}
