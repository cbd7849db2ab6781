use async_trait::async_trait;
use common::err::DatalayerError;
use futures_util::stream::BoxStream;

use crate::param::Param;
use crate::row::Row;

/// A streaming result set: one [`Row`] at a time, so a large result set
/// never needs to be buffered in memory before the caller can act on it.
pub type RowStream<'a> = BoxStream<'a, Result<Row, DatalayerError>>;

/// The physical driver surface the core depends on. A concrete
/// implementation wraps a real driver (e.g. `tiberius`); `connection::mock`
/// provides an in-memory fake for tests.
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Runs a statement and streams back rows with column reflection.
    async fn query(&self, statement: &str) -> Result<RowStream<'_>, DatalayerError>;

    /// Runs a statement expected to return at most one row/column,
    /// e.g. `SELECT GETDATE()` or `SELECT MAX(col) FROM t`.
    async fn query_scalar(&self, statement: &str) -> Result<crate::value::SqlValue, DatalayerError>;

    /// Executes a parameterized statement that doesn't stream rows back.
    async fn execute(&self, statement: &str, params: &[Param]) -> Result<u64, DatalayerError>;

    /// Liveness check used by the connection manager after opening a pool.
    async fn ping(&self) -> Result<(), DatalayerError>;

    /// Starts a transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>, DatalayerError>;
}

#[async_trait]
pub trait Transaction: Send {
    async fn execute(&mut self, statement: &str, params: &[Param]) -> Result<u64, DatalayerError>;
    async fn commit(self: Box<Self>) -> Result<(), DatalayerError>;
    async fn rollback(self: Box<Self>) -> Result<(), DatalayerError>;
}

/// Opens pooled [`SqlClient`] connections for a given connection URL.
/// Kept separate from `SqlClient` itself so a connection manager can hold
/// one `SqlPool` and re-open on configuration change without caring about
/// the concrete driver.
#[async_trait]
pub trait SqlPool: Send + Sync {
    async fn open(&self, connection_url: &str) -> Result<Box<dyn SqlClient>, DatalayerError>;
}
