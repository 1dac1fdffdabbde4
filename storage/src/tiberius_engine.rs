//! [`StorageEngine`] for SQL Server. `sqlx` has no stable mssql driver,
//! so this dialect is driven directly through `tiberius`, wrapped in a
//! `tokio::sync::Mutex` since `tiberius::Client` drives one connection
//! and isn't safely shared across concurrent callers the way a pool is.

use async_trait::async_trait;
use common::error::{CResult, EngineError};
use common::value::{FieldValue, Row};
use tiberius::{Client, Config, ColumnData};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::engine::StorageEngine;
use crate::namespace::physical_table_name;
use crate::types::{sql_type_name, ColumnDef, Provider};

type TiberiusClient = Client<Compat<TcpStream>>;

pub struct TiberiusEngine {
    client: Mutex<TiberiusClient>,
    namespace: String,
}

impl TiberiusEngine {
    pub async fn connect(connection_string: &str, namespace: &str) -> CResult<Self> {
        let config = Config::from_ado_string(connection_string)
            .map_err(|e| EngineError::config(format!("invalid mssql connection string: {e}")))?;

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| EngineError::transport(format!("mssql connect failed: {e}")))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| EngineError::transport(format!("mssql handshake failed: {e}")))?;

        Ok(Self {
            client: Mutex::new(client),
            namespace: namespace.to_string(),
        })
    }

    fn physical(&self, table: &str) -> String {
        physical_table_name(&self.namespace, Provider::Mssql, table)
    }

    async fn ensure_schema(&self, client: &mut TiberiusClient) -> CResult<()> {
        let check = format!(
            "SELECT 1 FROM sys.schemas WHERE name = '{}'",
            self.namespace
        );
        let stream = client
            .simple_query(&check)
            .await
            .map_err(|e| EngineError::storage(format!("schema check failed: {e}")))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| EngineError::storage(format!("schema check failed: {e}")))?;

        if rows.is_empty() {
            let ddl = format!("EXEC('CREATE SCHEMA {}')", self.namespace);
            client
                .simple_query(&ddl)
                .await
                .map_err(|e| EngineError::storage(format!("create schema failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for TiberiusEngine {
    async fn ping(&self) -> CResult<()> {
        let mut client = self.client.lock().await;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| EngineError::storage(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> CResult<bool> {
        Ok(self.discover_tables().await?.iter().any(|t| t == table))
    }

    async fn create_table(&self, table: &str, columns: &[ColumnDef]) -> CResult<()> {
        let mut client = self.client.lock().await;
        self.ensure_schema(&mut client).await?;

        let mut cols = String::new();
        for col in columns {
            cols.push_str(&format!("{} {} NULL, ", col.key, sql_type_name(col.field_type)));
        }
        cols.push_str("timestamp_utc DATETIME2 NOT NULL");

        let ddl = format!(
            "IF OBJECT_ID('{phys}', 'U') IS NULL CREATE TABLE {phys} ({cols})",
            phys = self.physical(table),
            cols = cols
        );
        client
            .simple_query(&ddl)
            .await
            .map_err(|e| EngineError::storage(format!("create table failed: {e}")))?;
        Ok(())
    }

    async fn discover_tables(&self) -> CResult<Vec<String>> {
        let mut client = self.client.lock().await;
        let query = format!(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = '{}'",
            self.namespace
        );
        let stream = client
            .simple_query(&query)
            .await
            .map_err(|e| EngineError::storage(format!("discover failed: {e}")))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| EngineError::storage(format!("discover failed: {e}")))?;

        Ok(rows
            .iter()
            .filter_map(|r| r.get::<&str, _>(0))
            .map(|s| s.to_string())
            .collect())
    }

    async fn insert_batch(&self, table: &str, rows: &[Row]) -> CResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = rows[0].keys().cloned().collect();
        for row in rows {
            let keys: Vec<String> = row.keys().cloned().collect();
            if keys != columns {
                return Err(EngineError::config("insert_batch rows have mismatched column sets"));
            }
        }

        let mut params: Vec<ColumnData<'_>> = Vec::with_capacity(columns.len() * rows.len());
        let mut placeholder_idx = 1;
        let mut values_clause = String::new();
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                values_clause.push_str(", ");
            }
            values_clause.push('(');
            for (j, col) in columns.iter().enumerate() {
                if j > 0 {
                    values_clause.push_str(", ");
                }
                values_clause.push_str(&format!("@P{placeholder_idx}"));
                placeholder_idx += 1;
                params.push(to_column_data(row.get(col).unwrap_or(&FieldValue::Null)));
            }
            values_clause.push(')');
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.physical(table),
            columns.join(", "),
            values_clause
        );

        let refs: Vec<&dyn tiberius::ToSql> = params.iter().map(|p| p as &dyn tiberius::ToSql).collect();
        let mut client = self.client.lock().await;
        client
            .execute(&sql, &refs)
            .await
            .map_err(|e| EngineError::storage(format!("insert failed: {e}")))?;

        Ok(rows.len())
    }
}

fn to_column_data(value: &FieldValue) -> ColumnData<'static> {
    match value {
        FieldValue::Bool(v) => ColumnData::Bit(Some(*v)),
        FieldValue::Int(v) => ColumnData::I64(Some(*v)),
        FieldValue::Float(v) => ColumnData::F64(Some(*v)),
        FieldValue::String(v) => ColumnData::String(Some(v.clone().into())),
        FieldValue::Timestamp(v) => ColumnData::String(Some(v.to_rfc3339().into())),
        FieldValue::Null => ColumnData::String(None),
    }
}
