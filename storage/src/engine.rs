//! Dialect-blind storage abstraction: each provider wraps a
//! concrete client behind this trait so the writer above it never
//! branches on `Provider` itself.

use async_trait::async_trait;
use common::error::CResult;
use common::value::Row;

use crate::types::ColumnDef;

#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// `SELECT 1` (or dialect equivalent). A target is reachable when
    /// this succeeds.
    async fn ping(&self) -> CResult<()>;

    async fn table_exists(&self, table: &str) -> CResult<bool>;

    /// Creates `table` with `columns` plus the `timestamp_utc` column,
    /// and the owning schema/namespace first if the dialect needs one
    /// and it doesn't exist yet.
    async fn create_table(&self, table: &str, columns: &[ColumnDef]) -> CResult<()>;

    /// Names of every managed table currently present, already stripped
    /// of the namespace prefix/schema so callers see the logical name.
    async fn discover_tables(&self) -> CResult<Vec<String>>;

    /// Inserts `rows` into `table` in one batched statement. An empty
    /// batch is a no-op that returns `Ok(0)`; rows with differing
    /// column sets are a `ConfigError` since the batch can't be encoded
    /// as a single multi-row `INSERT`.
    async fn insert_batch(&self, table: &str, rows: &[Row]) -> CResult<usize>;
}
