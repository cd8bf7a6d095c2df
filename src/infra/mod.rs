//! Infrastructure adapters and runtime bootstrap.

pub mod assets;
pub mod error;
pub mod http;
pub mod memory_store;
pub mod redis_store;
pub mod telemetry;
pub mod upstream;
