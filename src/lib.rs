// src/lib.rs
// Public library surface for integration tests and the Shuttle binary.

pub mod api;
pub mod ingest;
pub mod metrics;

pub use crate::api::router;
pub use crate::ingest::IngestError;
