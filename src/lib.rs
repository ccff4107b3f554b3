//! RoadPulse: crowd-sourced road defect mapping
//!
//! Devices upload vibration and accelerometer readings tagged with GPS
//! coordinates. Each reading is classified LOW / MEDIUM / HIGH; qualifying
//! readings are folded into spatial clusters so repeat hits on the same
//! pothole raise its count instead of adding new points.
//!
//! ## Architecture
//!
//! - **Sensors**: raw device payload → calibrated [`Reading`]
//! - **Classifier**: threshold-based severity
//! - **Resolver**: bounding-box pre-filter + haversine match, merge planning
//! - **Pipeline**: region locking and compare-and-swap retry around the store
//! - **Storage**: [`ClusterStore`] trait with sled and in-memory backends
//! - **API**: axum router for uploads, map queries and admin actions

pub mod api;
pub mod classifier;
pub mod config;
pub mod geo;
pub mod pipeline;
pub mod query;
pub mod resolver;
pub mod sensors;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::RoadPulseConfig;

// Re-export commonly used types
pub use types::{
    ClusterFields, ClusterId, Confidence, MotionInput, Reading, ReadingError, RoadCluster,
    SensorSample, Severity,
};

// Re-export core components
pub use classifier::{SeverityClassifier, SeverityThresholds, ThresholdPolicy};
pub use pipeline::{Disposition, IngestError, IngestOutcome, IngestPipeline};
pub use resolver::{ClusterResolver, MatchStrategy, MatchStrategyKind};
pub use storage::{ClusterStore, InMemoryClusterStore, SledClusterStore, StoreError};
