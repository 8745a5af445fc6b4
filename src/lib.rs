// src/lib.rs
// Public library surface for integration tests and the binary.

pub mod aggregate;
pub mod airports;
pub mod api;
pub mod category;
pub mod config;
pub mod directory;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod processor;
pub mod record;
pub mod snapshot;
pub mod store;
pub mod summary;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::{Aggregator, Submission};
pub use crate::api::{router, AppState};
pub use crate::category::Category;
