//! Redis-backed persistence for publish jobs.
//!
//! One JSON document per job plus a per-owner recency index. The `JobStore`
//! trait is the seam the pipeline and API depend on; tests use the in-memory
//! implementation.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{InMemoryJobStore, JobStore, RedisJobStore, StoreConfig};
