//! Sled-backed cluster store
//!
//! Two trees in one sled database:
//! - `clusters`: id (u64 big-endian) → JSON `RoadCluster`
//! - `cluster_lat_index`: order-preserving latitude bytes ++ id → empty
//!
//! Bounding-box queries range-scan the latitude index and check longitude
//! on the loaded record, so only the latitude band is read. Writes touch
//! both trees inside one sled transaction; a transaction has no await point,
//! so an abandoned request either commits fully or not at all.

use async_trait::async_trait;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, Transactional,
};
use sled::Tree;
use std::path::Path;

use super::{ClusterStore, StoreError};
use crate::geo::BoundingBox;
use crate::types::{ClusterFields, ClusterId, RoadCluster};

const CLUSTERS_TREE: &str = "clusters";
const LAT_INDEX_TREE: &str = "cluster_lat_index";

/// Durable cluster store
#[derive(Clone)]
pub struct SledClusterStore {
    db: sled::Db,
    clusters: Tree,
    lat_index: Tree,
}

impl SledClusterStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let clusters = db.open_tree(CLUSTERS_TREE)?;
        let lat_index = db.open_tree(LAT_INDEX_TREE)?;

        tracing::info!(path = %path_ref.display(), clusters = clusters.len(), "Cluster store opened");

        Ok(Self {
            db,
            clusters,
            lat_index,
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    /// Drop a latitude index entry whose record is gone. A write that
    /// commits between the two tree clears in `clear` leaves one behind.
    fn prune_orphan(&self, entry: &[u8], id: ClusterId) -> Result<bool, StoreError> {
        let key = id_key(id);
        let pruned = (&self.clusters, &self.lat_index)
            .transaction(|(clusters, index)| -> ConflictableTransactionResult<bool, StoreError> {
                if clusters.get(&key)?.is_some() {
                    return Ok(false);
                }
                Ok(index.remove(entry)?.is_some())
            })
            .map_err(from_tx)?;
        if pruned {
            tracing::debug!(cluster_id = id, "Pruned orphan latitude index entry");
        }
        Ok(pruned)
    }

    /// Remove every index entry without a record; returns how many.
    fn sweep_orphans(&self) -> Result<usize, StoreError> {
        let mut swept = 0;
        for item in self.lat_index.iter() {
            let (key, _) = item?;
            let Some(id) = id_from_index_key(&key) else {
                self.lat_index.remove(&key)?;
                swept += 1;
                continue;
            };
            if !self.clusters.contains_key(id_key(id))? && self.prune_orphan(&key, id)? {
                swept += 1;
            }
        }
        Ok(swept)
    }

    fn decode(raw: &[u8]) -> Result<RoadCluster, StoreError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

// ============================================================================
// Key encoding
// ============================================================================

fn id_key(id: ClusterId) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

/// Big-endian bytes whose lexicographic order matches numeric order.
fn sortable_f64(value: f64) -> [u8; 8] {
    // Fold -0.0 into +0.0 so both land on the same key
    let value = if value == 0.0 { 0.0 } else { value };
    let bits = value.to_bits();
    let ordered = if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    };
    ordered.to_be_bytes()
}

fn index_key(latitude: f64, id: ClusterId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&sortable_f64(latitude));
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn id_from_index_key(key: &[u8]) -> Option<ClusterId> {
    let tail: [u8; 8] = key.get(8..16)?.try_into().ok()?;
    Some(u64::from_be_bytes(tail))
}

fn abort(err: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err)
}

fn from_tx(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    }
}

// ============================================================================
// ClusterStore
// ============================================================================

#[async_trait]
impl ClusterStore for SledClusterStore {
    async fn find_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<RoadCluster>, StoreError> {
        let start = index_key(bbox.lat_min, 0);
        let end = index_key(bbox.lat_max, ClusterId::MAX);

        let mut hits = Vec::new();
        for item in self.lat_index.range(start..=end) {
            let (key, _) = item?;
            let Some(id) = id_from_index_key(&key) else {
                tracing::warn!(len = key.len(), "Skipping malformed latitude index key");
                continue;
            };
            match self.clusters.get(id_key(id))? {
                Some(raw) => {
                    let cluster = Self::decode(&raw)?;
                    if bbox.contains(cluster.latitude, cluster.longitude) {
                        hits.push(cluster);
                    }
                }
                None => {
                    self.prune_orphan(&key, id)?;
                }
            }
        }

        hits.sort_by_key(|c| c.id);
        Ok(hits)
    }

    async fn create(&self, fields: &ClusterFields) -> Result<RoadCluster, StoreError> {
        // sled ids start at 0; keep 0 free so ids read like row numbers
        let id = self.db.generate_id()? + 1;
        let cluster = RoadCluster::from_fields(id, RoadCluster::INITIAL_VERSION, fields);
        let value = serde_json::to_vec(&cluster)?;
        let key = id_key(id);
        let ikey = index_key(cluster.latitude, id);

        (&self.clusters, &self.lat_index)
            .transaction(|(clusters, index)| -> ConflictableTransactionResult<(), StoreError> {
                clusters.insert(key.clone(), value.clone())?;
                index.insert(ikey.clone(), Vec::<u8>::new())?;
                Ok(())
            })
            .map_err(from_tx)?;

        Ok(cluster)
    }

    async fn update(
        &self,
        id: ClusterId,
        expected_version: u64,
        fields: &ClusterFields,
    ) -> Result<RoadCluster, StoreError> {
        let key = id_key(id);

        (&self.clusters, &self.lat_index)
            .transaction(|(clusters, index)| -> ConflictableTransactionResult<RoadCluster, StoreError> {
                let Some(raw) = clusters.get(&key)? else {
                    return Err(abort(StoreError::Conflict { id }));
                };
                let current = Self::decode(&raw).map_err(abort)?;
                if current.version != expected_version {
                    return Err(abort(StoreError::Conflict { id }));
                }

                let next = RoadCluster::from_fields(id, expected_version + 1, fields);
                let value = serde_json::to_vec(&next)
                    .map_err(|e| abort(StoreError::from(e)))?;

                clusters.insert(key.clone(), value)?;
                index.remove(index_key(current.latitude, id))?;
                index.insert(index_key(next.latitude, id), Vec::<u8>::new())?;
                Ok(next)
            })
            .map_err(from_tx)
    }

    async fn get(&self, id: ClusterId) -> Result<Option<RoadCluster>, StoreError> {
        match self.clusters.get(id_key(id))? {
            Some(raw) => Ok(Some(Self::decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<RoadCluster>, StoreError> {
        // Big-endian id keys iterate in ascending id order
        let mut all = Vec::with_capacity(self.clusters.len());
        for item in self.clusters.iter() {
            let (_key, raw) = item?;
            match Self::decode(&raw) {
                Ok(cluster) => all.push(cluster),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to deserialize stored cluster");
                }
            }
        }
        Ok(all)
    }

    async fn delete(&self, id: ClusterId) -> Result<bool, StoreError> {
        let key = id_key(id);

        (&self.clusters, &self.lat_index)
            .transaction(|(clusters, index)| -> ConflictableTransactionResult<bool, StoreError> {
                let Some(raw) = clusters.remove(key.clone())? else {
                    return Ok(false);
                };
                let current = Self::decode(&raw).map_err(abort)?;
                index.remove(index_key(current.latitude, id))?;
                Ok(true)
            })
            .map_err(from_tx)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let removed = self.clusters.len();
        // Index first: a write racing the clear can only leave an index
        // entry without a record, which the sweep below collects.
        self.lat_index.clear()?;
        self.clusters.clear()?;
        let swept = self.sweep_orphans()?;
        if swept > 0 {
            tracing::debug!(swept, "Removed index entries orphaned by a concurrent write");
        }
        self.db.flush()?;
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.clusters.len())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
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

    #[test]
    fn test_sortable_f64_preserves_order() {
        let values = [-90.0, -44.5, -0.0001, 0.0, 0.0001, 10.0, 44.0, 89.99, 90.0];
        for pair in values.windows(2) {
            assert!(
                sortable_f64(pair[0]) < sortable_f64(pair[1]),
                "{} should sort before {}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(sortable_f64(-0.0), sortable_f64(0.0));
    }

    #[test]
    fn test_index_key_round_trips_id() {
        let key = index_key(44.0, 1234);
        assert_eq!(key.len(), 16);
        assert_eq!(id_from_index_key(&key), Some(1234));
        assert_eq!(id_from_index_key(&key[..10]), None);
    }

    #[tokio::test]
    async fn test_store_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.backend_name(), "sled");
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        let c = store.create(&fields(44.0, 10.0)).await.unwrap();
        assert!(c.id > 0);
        let loaded = store.get(c.id).await.unwrap().unwrap();
        assert_eq!(loaded, c);
    }

    #[tokio::test]
    async fn test_find_in_bbox_uses_latitude_band_and_longitude() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        let near = store.create(&fields(44.0001, 10.0)).await.unwrap();
        // Same latitude band, far east
        store.create(&fields(44.0001, 10.5)).await.unwrap();
        // Far north
        store.create(&fields(45.0, 10.0)).await.unwrap();
        // Southern hemisphere
        store.create(&fields(-44.0, 10.0)).await.unwrap();

        let bbox = BoundingBox::around(44.0, 10.0, 20.0, 1.5);
        let hits = store.find_in_bbox(&bbox).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, near.id);
    }

    #[tokio::test]
    async fn test_update_moves_index_entry() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        let c = store.create(&fields(44.0, 10.0)).await.unwrap();
        let mut moved = c.fields();
        moved.latitude = 44.0002;
        moved.occurrence_count = 2;
        let updated = store.update(c.id, c.version, &moved).await.unwrap();
        assert_eq!(updated.version, c.version + 1);

        let old_box = BoundingBox::around(43.9, 10.0, 20.0, 1.5);
        assert!(store.find_in_bbox(&old_box).await.unwrap().is_empty());
        let new_box = BoundingBox::around(44.0002, 10.0, 20.0, 1.5);
        let hits = store.find_in_bbox(&new_box).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].occurrence_count, 2);
        assert_eq!(store.lat_index.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        let c = store.create(&fields(44.0, 10.0)).await.unwrap();
        store.update(c.id, c.version, &c.fields()).await.unwrap();

        let err = store.update(c.id, c.version, &c.fields()).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict { id: c.id });
    }

    #[tokio::test]
    async fn test_update_after_clear_conflicts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        let c = store.create(&fields(44.0, 10.0)).await.unwrap();
        store.create(&fields(44.5, 10.0)).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);

        let err = store.update(c.id, c.version, &c.fields()).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict { id: c.id });
    }

    #[tokio::test]
    async fn test_find_in_bbox_prunes_orphan_index_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        let live = store.create(&fields(44.0, 10.0)).await.unwrap();
        // Index entry left behind by a write that raced a clear
        store
            .lat_index
            .insert(index_key(44.00001, live.id + 100), Vec::<u8>::new())
            .unwrap();
        assert_eq!(store.lat_index.len(), 2);

        let bbox = BoundingBox::around(44.0, 10.0, 20.0, 1.5);
        let hits = store.find_in_bbox(&bbox).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, live.id);
        assert_eq!(store.lat_index.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        store.create(&fields(44.0, 10.0)).await.unwrap();
        store.create(&fields(-12.0, 70.0)).await.unwrap();
        store
            .lat_index
            .insert(index_key(30.0, 999), Vec::<u8>::new())
            .unwrap();
        store
            .lat_index
            .insert(index_key(-60.0, 998), Vec::<u8>::new())
            .unwrap();

        assert_eq!(store.sweep_orphans().unwrap(), 2);
        assert_eq!(store.lat_index.len(), 2);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_leaves_empty_index() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        store.create(&fields(44.0, 10.0)).await.unwrap();
        store.create(&fields(45.0, 10.0)).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.lat_index.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_index() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = SledClusterStore::open(temp_dir.path()).unwrap();

        let c = store.create(&fields(44.0, 10.0)).await.unwrap();
        assert!(store.delete(c.id).await.unwrap());
        assert!(!store.delete(c.id).await.unwrap());
        assert_eq!(store.lat_index.len(), 0);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_preserves_clusters() {
        let temp_dir = tempfile::tempdir().unwrap();
        let id = {
            let store = SledClusterStore::open(temp_dir.path()).unwrap();
            let c = store.create(&fields(44.0, 10.0)).await.unwrap();
            store.flush().unwrap();
            c.id
        };

        let store = SledClusterStore::open(temp_dir.path()).unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
    }
}
