pub mod conn_string;
pub mod engine;
pub mod namespace;
pub mod pool;
pub mod sqlx_engine;
pub mod tiberius_engine;
pub mod types;

pub use engine::StorageEngine;
pub use pool::EnginePool;
pub use types::{ColumnDef, Provider};
