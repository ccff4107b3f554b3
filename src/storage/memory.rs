//! In-memory cluster store
//!
//! Thread-safe via `DashMap` shard locks: a compare-and-swap holds only the
//! shard of the cluster being updated. Not durable: data is lost on restart.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ClusterStore, StoreError};
use crate::geo::BoundingBox;
use crate::types::{ClusterFields, ClusterId, RoadCluster};

pub struct InMemoryClusterStore {
    clusters: DashMap<ClusterId, RoadCluster>,
    next_id: AtomicU64,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self {
            clusters: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn sorted(mut clusters: Vec<RoadCluster>) -> Vec<RoadCluster> {
        clusters.sort_by_key(|c| c.id);
        clusters
    }
}

impl Default for InMemoryClusterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterStore for InMemoryClusterStore {
    async fn find_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<RoadCluster>, StoreError> {
        let hits = self
            .clusters
            .iter()
            .filter(|entry| bbox.contains(entry.latitude, entry.longitude))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::sorted(hits))
    }

    async fn create(&self, fields: &ClusterFields) -> Result<RoadCluster, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cluster = RoadCluster::from_fields(id, RoadCluster::INITIAL_VERSION, fields);
        self.clusters.insert(id, cluster.clone());
        Ok(cluster)
    }

    async fn update(
        &self,
        id: ClusterId,
        expected_version: u64,
        fields: &ClusterFields,
    ) -> Result<RoadCluster, StoreError> {
        let mut entry = self
            .clusters
            .get_mut(&id)
            .ok_or(StoreError::Conflict { id })?;

        if entry.version != expected_version {
            return Err(StoreError::Conflict { id });
        }

        *entry = RoadCluster::from_fields(id, expected_version + 1, fields);
        Ok(entry.clone())
    }

    async fn get(&self, id: ClusterId) -> Result<Option<RoadCluster>, StoreError> {
        Ok(self.clusters.get(&id).map(|c| c.value().clone()))
    }

    async fn list(&self) -> Result<Vec<RoadCluster>, StoreError> {
        let all = self.clusters.iter().map(|c| c.value().clone()).collect();
        Ok(Self::sorted(all))
    }

    async fn delete(&self, id: ClusterId) -> Result<bool, StoreError> {
        Ok(self.clusters.remove(&id).is_some())
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let removed = self.clusters.len();
        self.clusters.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.clusters.len())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use chrono::Utc;

    fn fields(lat: f64, lon: f64) -> ClusterFields {
        ClusterFields {
            latitude: lat,
            longitude: lon,
            vibration: 40.0,
            motion_delta: 20.0,
            severity: Severity::High,
            occurrence_count: 1,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = InMemoryClusterStore::new();
        let a = store.create(&fields(44.0, 10.0)).await.unwrap();
        let b = store.create(&fields(45.0, 11.0)).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.version, RoadCluster::INITIAL_VERSION);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_in_bbox_filters_by_box() {
        let store = InMemoryClusterStore::new();
        let near = store.create(&fields(44.0, 10.0)).await.unwrap();
        store.create(&fields(44.01, 10.0)).await.unwrap();

        let bbox = BoundingBox::around(44.0, 10.0, 20.0, 1.5);
        let hits = store.find_in_bbox(&bbox).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, near.id);
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let store = InMemoryClusterStore::new();
        let c = store.create(&fields(44.0, 10.0)).await.unwrap();

        let mut next = c.fields();
        next.occurrence_count = 2;
        let updated = store.update(c.id, c.version, &next).await.unwrap();
        assert_eq!(updated.version, c.version + 1);
        assert_eq!(updated.occurrence_count, 2);

        // Stale version
        let err = store.update(c.id, c.version, &next).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict { id: c.id });
    }

    #[tokio::test]
    async fn test_update_after_clear_conflicts() {
        let store = InMemoryClusterStore::new();
        let c = store.create(&fields(44.0, 10.0)).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 1);

        let err = store.update(c.id, c.version, &c.fields()).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict { id: c.id });
        assert!(store.get(c.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = InMemoryClusterStore::new();
        let a = store.create(&fields(44.0, 10.0)).await.unwrap();
        let b = store.create(&fields(45.0, 10.0)).await.unwrap();

        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, b.id);
    }
}
