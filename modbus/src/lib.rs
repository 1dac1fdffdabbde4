pub mod address;
pub mod client;
pub mod codec;
pub mod connection;
pub mod frame;
pub mod pool;

pub use client::{ModbusClient, ReadParams};
