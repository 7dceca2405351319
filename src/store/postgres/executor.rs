//! Statement execution over `may_postgres`.

use std::fmt;
use std::time::Instant;

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Postgres backend error type
#[derive(Debug)]
pub enum PgError {
    /// Error reported by `may_postgres`
    Postgres(PostgresError),
    /// Connection string rejected before dialing
    InvalidConnectionString(String),
    /// Statement used after its transaction was committed or rolled back
    TransactionClosed,
    /// Row could not be read back
    Parse(String),
}

impl fmt::Display for PgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            PgError::InvalidConnectionString(s) => write!(f, "Invalid connection string: {s}"),
            PgError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            PgError::Parse(s) => write!(f, "Parse error: {s}"),
        }
    }
}

impl std::error::Error for PgError {}

impl From<PostgresError> for PgError {
    fn from(err: PostgresError) -> Self {
        PgError::Postgres(err)
    }
}

/// Something statements can run on: a plain connection or an open transaction
pub trait PgExecutor {
    /// Run a statement, returning the number of rows affected
    fn execute(&self, statement: &str, params: &[&dyn ToSql]) -> Result<u64, PgError>;

    /// Run a query, returning every row
    fn query_all(&self, statement: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, PgError>;

    /// Run a query expected to return exactly one row
    fn query_one(&self, statement: &str, params: &[&dyn ToSql]) -> Result<Row, PgError>;
}

/// Run `f` against `client` with a span and statement metrics around it
pub(crate) fn timed<T>(
    statement: &str,
    f: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, PgError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_statement_span(statement).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = statement;

    let start = Instant::now();
    let result = f().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_statement_error();
        PgError::Postgres(e)
    });

    #[cfg(feature = "metrics")]
    METRICS.record_statement(start.elapsed());
    #[cfg(not(feature = "metrics"))]
    let _ = start;

    result
}

/// A single `may_postgres` connection
///
/// Statements run in autocommit mode; [`PgConnection::begin`] opens a
/// transaction on the same session. One connection serves one coroutine at a
/// time.
pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start a transaction on this connection
    pub fn begin(&self) -> Result<super::transaction::Transaction, PgError> {
        super::transaction::Transaction::begin(self.client.clone())
    }
}

impl PgExecutor for PgConnection {
    fn execute(&self, statement: &str, params: &[&dyn ToSql]) -> Result<u64, PgError> {
        timed(statement, || self.client.execute(statement, params))
    }

    fn query_all(&self, statement: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, PgError> {
        timed(statement, || self.client.query(statement, params))
    }

    fn query_one(&self, statement: &str, params: &[&dyn ToSql]) -> Result<Row, PgError> {
        timed(statement, || self.client.query_one(statement, params))
    }
}
