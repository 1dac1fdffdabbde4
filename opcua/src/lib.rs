pub mod auth;
pub mod client;
pub mod endpoint;
pub mod pool;
pub mod session;

pub use client::{BrowseNode, OpcuaClient};
