//! Reading ingestion
//!
//! ```text
//! upload ─▶ calibrate ─▶ classify ─▶ (LOW: drop) ─▶ region lock ─▶ resolve ─▶ store
//! ```
//!
//! GUARANTEE: two readings within merge radius of the same cluster never both
//! create a cluster, regardless of how many requests run concurrently.

mod ingest;
pub mod locks;

pub use ingest::{
    Disposition, IngestError, IngestOutcome, IngestPipeline, IngestStats, IngestStatsSnapshot,
};
pub use locks::RegionLocks;
