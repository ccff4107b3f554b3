//! Ingest pipeline: calibrate, classify, resolve, persist
//!
//! ```text
//! SensorSample ──calibrate──▶ Reading ──classify──▶ LOW? ──yes──▶ discard
//!                                                    │ no
//!                                                    ▼
//!                              lock region ─▶ resolve ─▶ create / CAS update
//!                                                ▲               │ conflict
//!                                                └───── retry ◀──┘
//! ```
//!
//! Readings classified `LOW` are never written. For everything else the
//! region lock serializes readings that could hit the same cluster, and the
//! store's version check catches writers that bypass the lock (another
//! process, an admin delete). A conflict re-runs the resolver against fresh
//! state, up to `max_merge_attempts` times.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::locks::RegionLocks;
use crate::classifier::SeverityClassifier;
use crate::config::RoadPulseConfig;
use crate::resolver::{ClusterResolver, MergeAction};
use crate::sensors::SensorCalibration;
use crate::storage::{ClusterStore, StoreError};
use crate::types::{ClusterId, Reading, ReadingError, SensorSample, Severity};

/// What happened to one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Classified `LOW`; nothing written.
    NotStored,
    Created { id: ClusterId },
    Updated { id: ClusterId, occurrence_count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Severity of the reading itself, not of the cluster it landed in.
    pub severity: Severity,
    pub disposition: Disposition,
}

impl IngestOutcome {
    pub fn stored(&self) -> bool {
        !matches!(self.disposition, Disposition::NotStored)
    }

    pub fn cluster_id(&self) -> Option<ClusterId> {
        match self.disposition {
            Disposition::NotStored => None,
            Disposition::Created { id } | Disposition::Updated { id, .. } => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("invalid reading: {0}")]
    InvalidInput(#[from] ReadingError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Every attempt lost the compare-and-swap race.
    #[error("cluster {id} kept changing; gave up after {attempts} attempts")]
    MergeConflict { id: ClusterId, attempts: u32 },
}

/// Running counters, readable while the pipeline serves traffic.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    discarded: AtomicU64,
    created: AtomicU64,
    merged: AtomicU64,
    conflicts: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestStatsSnapshot {
    pub received: u64,
    pub discarded: u64,
    pub created: u64,
    pub merged: u64,
    pub conflicts: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared ingest engine. One instance serves every request handler.
pub struct IngestPipeline {
    store: Arc<dyn ClusterStore>,
    classifier: SeverityClassifier,
    calibration: SensorCalibration,
    resolver: ClusterResolver,
    locks: RegionLocks,
    max_merge_attempts: u32,
    stats: IngestStats,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn ClusterStore>, config: &RoadPulseConfig) -> Self {
        let clustering = &config.clustering;
        let resolver = ClusterResolver::new(
            clustering.radius_meters,
            clustering.bbox_margin,
            clustering.match_strategy.build(),
        );

        info!(
            backend = store.backend_name(),
            radius_m = clustering.radius_meters,
            strategy = ?clustering.match_strategy,
            medium_policy = ?config.classifier.medium_policy,
            "Ingest pipeline ready"
        );

        Self {
            store,
            classifier: SeverityClassifier::new(config.classifier.clone()),
            calibration: config.calibration.clone(),
            resolver,
            locks: RegionLocks::new(),
            max_merge_attempts: clustering.max_merge_attempts.max(1),
            stats: IngestStats::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    pub fn classifier(&self) -> &SeverityClassifier {
        &self.classifier
    }

    pub fn calibration(&self) -> &SensorCalibration {
        &self.calibration
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    /// Calibrate and validate a raw device sample, then ingest it.
    pub async fn ingest_sample(&self, sample: &SensorSample) -> Result<IngestOutcome, IngestError> {
        let reading = self.calibration.to_reading(sample)?;
        self.ingest(&reading).await
    }

    /// Classify a validated reading and fold it into the cluster store.
    pub async fn ingest(&self, reading: &Reading) -> Result<IngestOutcome, IngestError> {
        IngestStats::bump(&self.stats.received);

        let severity = self
            .classifier
            .classify(reading.vibration(), reading.motion_delta());

        if !severity.is_defect() {
            IngestStats::bump(&self.stats.discarded);
            debug!(
                lat = reading.latitude(),
                lon = reading.longitude(),
                vibration = reading.vibration(),
                motion_delta = reading.motion_delta(),
                "Reading below MEDIUM, not stored"
            );
            return Ok(IngestOutcome {
                severity,
                disposition: Disposition::NotStored,
            });
        }

        let _region = self.locks.acquire(&self.resolver.search_box(reading)).await;

        let mut attempts = 0;
        loop {
            attempts += 1;

            let action = self
                .resolver
                .resolve(
                    reading,
                    severity,
                    self.store.as_ref(),
                    &self.classifier,
                    Utc::now(),
                )
                .await?;

            match self.apply(action).await {
                Ok(disposition) => {
                    return Ok(IngestOutcome {
                        severity,
                        disposition,
                    })
                }
                Err(StoreError::Conflict { id }) => {
                    IngestStats::bump(&self.stats.conflicts);
                    if attempts >= self.max_merge_attempts {
                        warn!(cluster_id = id, attempts, "Merge abandoned after repeated conflicts");
                        return Err(IngestError::MergeConflict { id, attempts });
                    }
                    warn!(cluster_id = id, attempts, "Cluster changed during merge, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn apply(&self, action: MergeAction) -> Result<Disposition, StoreError> {
        match action {
            MergeAction::CreateNew(fields) => {
                let cluster = self.store.create(&fields).await?;
                IngestStats::bump(&self.stats.created);
                info!(
                    cluster_id = cluster.id,
                    lat = cluster.latitude,
                    lon = cluster.longitude,
                    severity = %cluster.severity,
                    "New road defect cluster"
                );
                Ok(Disposition::Created { id: cluster.id })
            }
            MergeAction::UpdateExisting {
                id,
                expected_version,
                fields,
            } => {
                let cluster = self.store.update(id, expected_version, &fields).await?;
                IngestStats::bump(&self.stats.merged);
                info!(
                    cluster_id = cluster.id,
                    occurrences = cluster.occurrence_count,
                    severity = %cluster.severity,
                    "Reading merged into cluster"
                );
                Ok(Disposition::Updated {
                    id: cluster.id,
                    occurrence_count: cluster.occurrence_count,
                })
            }
        }
    }
}
