//! Cluster record stores
//!
//! [`ClusterStore`] is the seam between the merge logic and persistence:
//! - `SledClusterStore`: durable default, sled trees with a latitude index
//! - `InMemoryClusterStore`: sharded map for tests and ephemeral deployments
//!
//! Every store must make `create` / `update` / `delete` atomic and implement
//! `update` as a compare-and-swap on [`RoadCluster::version`].

mod memory;
mod sled_store;

pub use memory::InMemoryClusterStore;
pub use sled_store::SledClusterStore;

use async_trait::async_trait;

use crate::geo::BoundingBox;
use crate::types::{ClusterFields, ClusterId, RoadCluster};

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or failed; nothing was written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The cluster changed or disappeared since it was read.
    #[error("concurrent modification of cluster {id}")]
    Conflict { id: ClusterId },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Queryable record store for road clusters.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across request handlers.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Clusters whose centroid lies inside `bbox`, in ascending id order.
    async fn find_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<RoadCluster>, StoreError>;

    /// Insert a new cluster; the store assigns id and initial version.
    async fn create(&self, fields: &ClusterFields) -> Result<RoadCluster, StoreError>;

    /// Replace a cluster's fields if its version still equals
    /// `expected_version`. Returns `Conflict` otherwise, or when the cluster
    /// no longer exists.
    async fn update(
        &self,
        id: ClusterId,
        expected_version: u64,
        fields: &ClusterFields,
    ) -> Result<RoadCluster, StoreError>;

    async fn get(&self, id: ClusterId) -> Result<Option<RoadCluster>, StoreError>;

    /// All clusters in ascending id order.
    async fn list(&self) -> Result<Vec<RoadCluster>, StoreError>;

    /// Remove one cluster. Returns whether it existed.
    async fn delete(&self, id: ClusterId) -> Result<bool, StoreError>;

    /// Remove every cluster. Returns how many were removed.
    async fn clear(&self) -> Result<usize, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}
