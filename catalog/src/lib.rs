pub mod gateway;
pub mod models;
pub mod resolve;
pub mod store;

pub use gateway::{CatalogEngine, CatalogGateway};
pub use store::InMemoryCatalog;
