//! campus-sync: scrape the university portals and keep a relational store
//! in step with them.
//!
//! Three pipelines share one engine. A [`portal::Portal`] lists partitions
//! (classrooms, departments, the calendar page) and fetches each one; a
//! [`jobs::PartitionJob`] extracts records, resolves them against the
//! store and writes a partition-scoped snapshot; the
//! [`orchestrator::Orchestrator`] sequences it all with retries and
//! per-partition failure containment.

pub mod config;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod http;
pub mod jobs;
pub mod orchestrator;
pub mod pipeline;
pub mod portal;
pub mod progress;
pub mod resolve;
pub mod store;
pub mod sync;
pub mod types;

pub use config::{RunConfig, StoreCredentials};
pub use fetch::RetryPolicy;
pub use orchestrator::{Orchestrator, RunContext, RunStats};
pub use store::{MemoryStore, PostgrestStore, Store};
pub use types::{Partition, SyncError, SyncResult};
