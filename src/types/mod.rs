//! Shared data structures for road-defect mapping
//!
//! - `SensorSample` / `Reading`: inbound device data, raw and validated
//! - `Severity` / `Confidence`: ordered classification levels
//! - `RoadCluster`: persisted defect aggregated from nearby readings

mod cluster;
mod reading;
mod severity;

pub use cluster::*;
pub use reading::*;
pub use severity::*;
