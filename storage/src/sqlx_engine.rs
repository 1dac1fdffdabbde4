//! [`StorageEngine`] for SQLite, Postgres and MySQL via `sqlx`'s `Any`
//! driver: one pool type, one query builder,
//! branching only on [`Provider`] for the handful of places the three
//! dialects actually disagree (placeholder syntax, schema DDL,
//! `information_schema` vs `sqlite_master`).

use async_trait::async_trait;
use common::error::{CResult, EngineError};
use common::value::{FieldValue, Row};
use sqlx::any::{AnyKind, AnyPoolOptions};
use sqlx::{AnyPool, Row as SqlxRow};

use crate::conn_string::build_connection_url;
use crate::engine::StorageEngine;
use crate::namespace::{physical_table_name, strip_prefix};
use crate::types::{sql_type_name, ColumnDef, Provider};

pub struct SqlxEngine {
    pool: AnyPool,
    provider: Provider,
    namespace: String,
}

impl SqlxEngine {
    pub async fn connect(provider: Provider, connection_string: &str, namespace: &str) -> CResult<Self> {
        sqlx::any::install_default_drivers();
        let url = build_connection_url(provider, connection_string);
        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| EngineError::storage(format!("connect failed: {e}")))?;
        Ok(Self {
            pool,
            provider,
            namespace: namespace.to_string(),
        })
    }

    fn physical(&self, table: &str) -> String {
        physical_table_name(&self.namespace, self.provider, table)
    }

    fn placeholder(&self, index: usize) -> String {
        match self.provider {
            Provider::Postgres => format!("${index}"),
            Provider::MySql | Provider::Sqlite => "?".to_string(),
            Provider::Mssql => unreachable!("mssql uses TiberiusEngine"),
        }
    }

    async fn ensure_schema(&self) -> CResult<()> {
        if self.provider == Provider::Postgres {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.namespace))
                .execute(&self.pool)
                .await
                .map_err(|e| EngineError::storage(format!("create schema failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for SqlxEngine {
    async fn ping(&self) -> CResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::storage(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> CResult<bool> {
        Ok(self.discover_tables().await?.iter().any(|t| t == table))
    }

    async fn create_table(&self, table: &str, columns: &[ColumnDef]) -> CResult<()> {
        self.ensure_schema().await?;

        let mut cols = String::new();
        for col in columns {
            cols.push_str(&format!("{} {} NULL, ", col.key, sql_type_name(col.field_type)));
        }
        cols.push_str("timestamp_utc TIMESTAMP NOT NULL");

        let ddl = format!("CREATE TABLE IF NOT EXISTS {} ({})", self.physical(table), cols);
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::storage(format!("create table failed: {e}")))?;
        Ok(())
    }

    async fn discover_tables(&self) -> CResult<Vec<String>> {
        let names: Vec<String> = match self.pool.any_kind() {
            AnyKind::Sqlite => {
                let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| EngineError::storage(format!("discover failed: {e}")))?;
                rows.iter().map(|r| r.get::<String, _>(0)).collect()
            }
            AnyKind::Postgres => {
                let rows = sqlx::query("SELECT table_name FROM information_schema.tables WHERE table_schema = $1")
                    .bind(&self.namespace)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| EngineError::storage(format!("discover failed: {e}")))?;
                return Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect());
            }
            AnyKind::MySql => {
                let rows = sqlx::query(
                    "SELECT table_name FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name LIKE ?",
                )
                .bind(format!("{}__%", self.namespace))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| EngineError::storage(format!("discover failed: {e}")))?;
                rows.iter().map(|r| r.get::<String, _>(0)).collect()
            }
            other => {
                return Err(EngineError::config(format!("unsupported backend: {other:?}")));
            }
        };

        Ok(names
            .into_iter()
            .filter(|n| n.starts_with(&format!("{}__", self.namespace)))
            .map(|n| strip_prefix(&self.namespace, &n))
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

        let mut placeholder_idx = 1;
        let mut values_clause = String::new();
        for (i, _row) in rows.iter().enumerate() {
            if i > 0 {
                values_clause.push_str(", ");
            }
            values_clause.push('(');
            for j in 0..columns.len() {
                if j > 0 {
                    values_clause.push_str(", ");
                }
                values_clause.push_str(&self.placeholder(placeholder_idx));
                placeholder_idx += 1;
            }
            values_clause.push(')');
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.physical(table),
            columns.join(", "),
            values_clause
        );

        let mut query = sqlx::query(&sql);
        for row in rows {
            for col in &columns {
                query = bind_field_value(query, row.get(col).unwrap_or(&FieldValue::Null));
            }
        }

        query
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::storage(format!("insert failed: {e}")))?;

        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::value::stamp_timestamp;
    use std::collections::BTreeMap;

    async fn sqlite_engine() -> SqlxEngine {
        SqlxEngine::connect(Provider::Sqlite, ":memory:", "neuract")
            .await
            .expect("in-memory sqlite connects")
    }

    #[tokio::test]
    async fn create_then_discover_round_trip() {
        let engine = sqlite_engine().await;
        let columns = vec![ColumnDef {
            key: "power".to_string(),
            field_type: common::value::DataType::Float,
        }];
        engine.create_table("lt_panel", &columns).await.unwrap();

        let tables = engine.discover_tables().await.unwrap();
        assert!(tables.contains(&"lt_panel".to_string()));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let engine = sqlite_engine().await;
        let columns = vec![ColumnDef {
            key: "power".to_string(),
            field_type: common::value::DataType::Float,
        }];
        engine.create_table("lt_panel", &columns).await.unwrap();

        let inserted = engine.insert_batch("lt_panel", &[]).await.unwrap();
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn insert_batch_writes_every_row() {
        let engine = sqlite_engine().await;
        let columns = vec![ColumnDef {
            key: "power".to_string(),
            field_type: common::value::DataType::Float,
        }];
        engine.create_table("lt_panel", &columns).await.unwrap();

        let mut row: Row = BTreeMap::new();
        row.insert("power".to_string(), FieldValue::Float(42.0));
        stamp_timestamp(&mut row, chrono::Utc::now());

        let inserted = engine.insert_batch("lt_panel", &[row.clone(), row]).await.unwrap();
        assert_eq!(inserted, 2);
    }

    #[tokio::test]
    async fn mismatched_row_shapes_are_rejected() {
        let engine = sqlite_engine().await;
        let columns = vec![ColumnDef {
            key: "power".to_string(),
            field_type: common::value::DataType::Float,
        }];
        engine.create_table("lt_panel", &columns).await.unwrap();

        let mut row_a: Row = BTreeMap::new();
        row_a.insert("power".to_string(), FieldValue::Float(1.0));
        let mut row_b: Row = BTreeMap::new();
        row_b.insert("power".to_string(), FieldValue::Float(1.0));
        row_b.insert("extra".to_string(), FieldValue::Int(1));

        let err = engine.insert_batch("lt_panel", &[row_a, row_b]).await.unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}

fn bind_field_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    value: &'q FieldValue,
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    match value {
        FieldValue::Bool(v) => query.bind(*v),
        FieldValue::Int(v) => query.bind(*v),
        FieldValue::Float(v) => query.bind(*v),
        FieldValue::String(v) => query.bind(v.as_str()),
        FieldValue::Timestamp(v) => query.bind(v.to_rfc3339()),
        FieldValue::Null => query.bind(Option::<String>::None),
    }
}
