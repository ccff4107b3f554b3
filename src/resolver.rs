//! Spatial cluster resolution
//!
//! Given a classified reading, decide whether it belongs to an existing
//! cluster (within `radius_meters` of its centroid) or starts a new one, and
//! compute the fields to write. The resolver never writes itself: it returns
//! a [`MergeAction`] that the pipeline applies through the store.
//!
//! Steps:
//! 1. Bounding box around the reading (`radius * bbox_margin`)
//! 2. Store range query for centroids inside the box
//! 3. Haversine distance per candidate, match selected by a [`MatchStrategy`]
//! 4. `CreateNew` or `UpdateExisting` with running-mean centroid, worst-case
//!    vibration / motion and re-evaluated severity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::classifier::SeverityClassifier;
use crate::geo::{haversine_m, BoundingBox};
use crate::storage::{ClusterStore, StoreError};
use crate::types::{ClusterFields, ClusterId, Reading, RoadCluster, Severity};

// ============================================================================
// Match strategies
// ============================================================================

/// Picks which candidate cluster a reading merges into.
///
/// Candidates arrive in ascending id order (oldest first).
pub trait MatchStrategy: Send + Sync {
    /// Return the selected candidate and its distance, or `None` when no
    /// candidate is within `radius_m` (inclusive).
    fn select<'a>(
        &self,
        lat: f64,
        lon: f64,
        candidates: &'a [RoadCluster],
        radius_m: f64,
    ) -> Option<(&'a RoadCluster, f64)>;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;
}

/// First candidate within the radius wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl MatchStrategy for FirstMatch {
    fn select<'a>(
        &self,
        lat: f64,
        lon: f64,
        candidates: &'a [RoadCluster],
        radius_m: f64,
    ) -> Option<(&'a RoadCluster, f64)> {
        candidates
            .iter()
            .map(|c| (c, haversine_m(lat, lon, c.latitude, c.longitude)))
            .find(|(_, d)| *d <= radius_m)
    }

    fn name(&self) -> &'static str {
        "first-match"
    }
}

/// Closest candidate within the radius wins; ties go to the older cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestMatch;

impl MatchStrategy for NearestMatch {
    fn select<'a>(
        &self,
        lat: f64,
        lon: f64,
        candidates: &'a [RoadCluster],
        radius_m: f64,
    ) -> Option<(&'a RoadCluster, f64)> {
        candidates
            .iter()
            .map(|c| (c, haversine_m(lat, lon, c.latitude, c.longitude)))
            .filter(|(_, d)| *d <= radius_m)
            .fold(None, |best: Option<(&RoadCluster, f64)>, (c, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((c, d)),
            })
    }

    fn name(&self) -> &'static str {
        "nearest-match"
    }
}

/// Configurable strategy selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategyKind {
    #[default]
    First,
    Nearest,
}

impl MatchStrategyKind {
    pub fn build(self) -> Arc<dyn MatchStrategy> {
        match self {
            Self::First => Arc::new(FirstMatch),
            Self::Nearest => Arc::new(NearestMatch),
        }
    }
}

// ============================================================================
// Merge
// ============================================================================

/// Write to apply for one qualifying reading.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeAction {
    CreateNew(ClusterFields),
    UpdateExisting {
        id: ClusterId,
        expected_version: u64,
        fields: ClusterFields,
    },
}

/// Fields of a brand-new cluster seeded from one reading.
pub fn new_cluster_fields(
    reading: &Reading,
    severity: Severity,
    now: DateTime<Utc>,
) -> ClusterFields {
    ClusterFields {
        latitude: reading.latitude(),
        longitude: reading.longitude(),
        vibration: reading.vibration(),
        motion_delta: reading.motion_delta(),
        severity,
        occurrence_count: 1,
        last_updated: now,
    }
}

/// Fold one reading into an existing cluster.
///
/// - `occurrence_count + 1`
/// - centroid is the running mean `(old * n + new) / (n + 1)` per axis
/// - vibration and motion keep their maximum
/// - severity is re-classified from the worst-case values, never below the
///   stored level
pub fn merge_fields(
    cluster: &RoadCluster,
    reading: &Reading,
    classifier: &SeverityClassifier,
    now: DateTime<Utc>,
) -> ClusterFields {
    let old_count = f64::from(cluster.occurrence_count);
    let occurrence_count = cluster.occurrence_count.saturating_add(1);
    let new_count = f64::from(occurrence_count);

    let latitude = (cluster.latitude * old_count + reading.latitude()) / new_count;

    // Unwrap the reading's longitude next to the centroid before averaging
    let mut reading_lon = reading.longitude();
    if reading_lon - cluster.longitude > 180.0 {
        reading_lon -= 360.0;
    } else if cluster.longitude - reading_lon > 180.0 {
        reading_lon += 360.0;
    }
    let mut longitude = (cluster.longitude * old_count + reading_lon) / new_count;
    if longitude > 180.0 {
        longitude -= 360.0;
    } else if longitude < -180.0 {
        longitude += 360.0;
    }

    let vibration = cluster.vibration.max(reading.vibration());
    let motion_delta = cluster.motion_delta.max(reading.motion_delta());
    let severity = cluster
        .severity
        .max(classifier.classify(vibration, motion_delta));

    ClusterFields {
        latitude,
        longitude,
        vibration,
        motion_delta,
        severity,
        occurrence_count,
        last_updated: now,
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Find-or-create planner for qualifying readings.
#[derive(Clone)]
pub struct ClusterResolver {
    radius_m: f64,
    bbox_margin: f64,
    strategy: Arc<dyn MatchStrategy>,
}

impl std::fmt::Debug for ClusterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterResolver")
            .field("radius_m", &self.radius_m)
            .field("bbox_margin", &self.bbox_margin)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl ClusterResolver {
    pub fn new(radius_m: f64, bbox_margin: f64, strategy: Arc<dyn MatchStrategy>) -> Self {
        Self {
            radius_m,
            bbox_margin,
            strategy,
        }
    }

    pub const fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Pre-filter box for a reading.
    pub fn search_box(&self, reading: &Reading) -> BoundingBox {
        BoundingBox::around(
            reading.latitude(),
            reading.longitude(),
            self.radius_m,
            self.bbox_margin,
        )
    }

    /// Plan the write for a reading already classified above `Low`.
    pub async fn resolve(
        &self,
        reading: &Reading,
        severity: Severity,
        store: &dyn ClusterStore,
        classifier: &SeverityClassifier,
        now: DateTime<Utc>,
    ) -> Result<MergeAction, StoreError> {
        let bbox = self.search_box(reading);
        let mut candidates = store.find_in_bbox(&bbox).await?;
        candidates.sort_by_key(|c| c.id);

        let matched = self.strategy.select(
            reading.latitude(),
            reading.longitude(),
            &candidates,
            self.radius_m,
        );

        match matched {
            Some((cluster, distance_m)) => {
                tracing::debug!(
                    cluster_id = cluster.id,
                    distance_m,
                    candidates = candidates.len(),
                    strategy = self.strategy.name(),
                    "Reading matched existing cluster"
                );
                Ok(MergeAction::UpdateExisting {
                    id: cluster.id,
                    expected_version: cluster.version,
                    fields: merge_fields(cluster, reading, classifier, now),
                })
            }
            None => Ok(MergeAction::CreateNew(new_cluster_fields(
                reading, severity, now,
            ))),
        }
    }
}
