//! Persisted road-defect cluster

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Severity;

/// Opaque store-assigned cluster identifier.
pub type ClusterId = u64;

/// Mutable state of a cluster, as written by a create or an update.
///
/// `vibration` is the normalized (percent of full scale) worst case, so the
/// classifier can be re-run directly on stored values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterFields {
    pub latitude: f64,
    pub longitude: f64,
    pub vibration: f64,
    pub motion_delta: f64,
    pub severity: Severity,
    pub occurrence_count: u32,
    pub last_updated: DateTime<Utc>,
}

/// One physical road-surface defect aggregated from nearby readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadCluster {
    pub id: ClusterId,
    pub latitude: f64,
    pub longitude: f64,
    pub vibration: f64,
    pub motion_delta: f64,
    pub severity: Severity,
    pub occurrence_count: u32,
    pub last_updated: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped on every committed update.
    pub version: u64,
}

impl RoadCluster {
    /// First version assigned on creation.
    pub const INITIAL_VERSION: u64 = 1;

    pub fn from_fields(id: ClusterId, version: u64, fields: &ClusterFields) -> Self {
        Self {
            id,
            latitude: fields.latitude,
            longitude: fields.longitude,
            vibration: fields.vibration,
            motion_delta: fields.motion_delta,
            severity: fields.severity,
            occurrence_count: fields.occurrence_count,
            last_updated: fields.last_updated,
            version,
        }
    }

    pub fn fields(&self) -> ClusterFields {
        ClusterFields {
            latitude: self.latitude,
            longitude: self.longitude,
            vibration: self.vibration,
            motion_delta: self.motion_delta,
            severity: self.severity,
            occurrence_count: self.occurrence_count,
            last_updated: self.last_updated,
        }
    }
}
