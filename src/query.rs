//! Read side: cluster listings and aggregate stats for the map dashboard.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::storage::{ClusterStore, StoreError};
use crate::types::{ClusterId, Confidence, RoadCluster, Severity};

/// One cluster as shown on the map.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterView {
    pub id: ClusterId,
    pub lat: f64,
    pub lon: f64,
    /// Map color: `orange` or `red`
    pub status: &'static str,
    pub severity: Severity,
    pub count: u32,
    pub confidence: Confidence,
    /// Whole days since the last reading
    pub age_days: i64,
    pub timestamp: DateTime<Utc>,
}

impl ClusterView {
    pub fn from_cluster(cluster: &RoadCluster, now: DateTime<Utc>) -> Self {
        Self {
            id: cluster.id,
            lat: cluster.latitude,
            lon: cluster.longitude,
            status: cluster.severity.color(),
            severity: cluster.severity,
            count: cluster.occurrence_count,
            confidence: Confidence::from_occurrences(cluster.occurrence_count),
            age_days: age_days(cluster, now),
            timestamp: cluster.last_updated,
        }
    }
}

/// Whole days between the last reading and `now`, never negative.
pub fn age_days(cluster: &RoadCluster, now: DateTime<Utc>) -> i64 {
    (now - cluster.last_updated).num_days().max(0)
}

/// Oldest `last_updated` kept by a `days` window. `None` when the window
/// reaches past the representable time range.
pub fn window_start(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|window| now.checked_sub_signed(window))
}

/// Clusters updated within the last `max_age_days` (all when `None`),
/// most recently updated first.
pub async fn list_clusters(
    store: &dyn ClusterStore,
    now: DateTime<Utc>,
    max_age_days: Option<i64>,
) -> Result<Vec<ClusterView>, StoreError> {
    let cutoff = max_age_days.and_then(|days| window_start(now, days));
    let mut clusters: Vec<RoadCluster> = store
        .list()
        .await?
        .into_iter()
        .filter(|c| cutoff.map_or(true, |cutoff| c.last_updated >= cutoff))
        .collect();

    clusters.sort_by(|a, b| b.last_updated.cmp(&a.last_updated).then(a.id.cmp(&b.id)));

    Ok(clusters
        .iter()
        .map(|c| ClusterView::from_cluster(c, now))
        .collect())
}

/// Dashboard counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterStats {
    pub total_points: usize,
    /// HIGH clusters
    pub red_count: usize,
    /// MEDIUM clusters
    pub orange_count: usize,
    /// Rough mapped road length, one decimal
    pub estimated_km: f64,
    pub last_update: Option<DateTime<Utc>>,
}

pub async fn collect_stats(
    store: &dyn ClusterStore,
    meters_per_cluster: f64,
) -> Result<ClusterStats, StoreError> {
    let clusters = store.list().await?;

    let count_of = |severity: Severity| clusters.iter().filter(|c| c.severity == severity).count();
    let total_points = clusters.len();
    let km = total_points as f64 * meters_per_cluster / 1000.0;

    Ok(ClusterStats {
        total_points,
        red_count: count_of(Severity::High),
        orange_count: count_of(Severity::Medium),
        estimated_km: (km * 10.0).round() / 10.0,
        last_update: clusters.iter().map(|c| c.last_updated).max(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryClusterStore;
    use crate::types::ClusterFields;

    fn fields(severity: Severity, count: u32, updated: DateTime<Utc>) -> ClusterFields {
        ClusterFields {
            latitude: 44.0,
            longitude: 10.0,
            vibration: 40.0,
            motion_delta: 20.0,
            severity,
            occurrence_count: count,
            last_updated: updated,
        }
    }

    #[test]
    fn test_view_derives_confidence_and_age() {
        let now = Utc::now();
        let cluster = RoadCluster::from_fields(
            7,
            1,
            &fields(Severity::Medium, 3, now - Duration::hours(50)),
        );
        let view = ClusterView::from_cluster(&cluster, now);
        assert_eq!(view.status, "orange");
        assert_eq!(view.confidence, Confidence::Medium);
        assert_eq!(view.age_days, 2);
        assert_eq!(view.count, 3);
    }

    #[test]
    fn test_view_json_shape() {
        let now = Utc::now();
        let cluster = RoadCluster::from_fields(1, 1, &fields(Severity::High, 5, now));
        let json = serde_json::to_value(ClusterView::from_cluster(&cluster, now)).unwrap();
        assert_eq!(json["status"], "red");
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(json["confidence"], "High");
        assert_eq!(json["age_days"], 0);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_future_timestamp_age_is_zero() {
        let now = Utc::now();
        let cluster =
            RoadCluster::from_fields(1, 1, &fields(Severity::High, 1, now + Duration::days(3)));
        assert_eq!(age_days(&cluster, now), 0);
    }

    #[tokio::test]
    async fn test_days_filter_and_order() {
        let store = InMemoryClusterStore::new();
        let now = Utc::now();
        let old = store
            .create(&fields(Severity::High, 1, now - Duration::days(45)))
            .await
            .unwrap();
        let mid = store
            .create(&fields(Severity::Medium, 1, now - Duration::days(10)))
            .await
            .unwrap();
        let fresh = store
            .create(&fields(Severity::High, 1, now - Duration::hours(1)))
            .await
            .unwrap();

        let recent = list_clusters(&store, now, Some(30)).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![fresh.id, mid.id]);

        let all = list_clusters(&store, now, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().unwrap().id, old.id);

        let day = list_clusters(&store, now, Some(1)).await.unwrap();
        assert_eq!(day.len(), 1);
    }

    #[tokio::test]
    async fn test_days_window_is_exact_not_whole_days() {
        let store = InMemoryClusterStore::new();
        let now = Utc::now();
        // Reports age_days == 30 but is past the 30-day cutoff
        store
            .create(&fields(Severity::High, 1, now - Duration::days(30) - Duration::hours(23)))
            .await
            .unwrap();
        let inside = store
            .create(&fields(Severity::High, 1, now - Duration::days(30) + Duration::minutes(1)))
            .await
            .unwrap();

        let listed = list_clusters(&store, now, Some(30)).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![inside.id]);
        assert_eq!(listed[0].age_days, 29);
    }

    #[tokio::test]
    async fn test_huge_days_window_keeps_everything() {
        let store = InMemoryClusterStore::new();
        let now = Utc::now();
        store
            .create(&fields(Severity::High, 1, now - Duration::days(3650)))
            .await
            .unwrap();

        assert_eq!(window_start(now, i64::MAX), None);
        let listed = list_clusters(&store, now, Some(i64::MAX)).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryClusterStore::new();
        let empty = collect_stats(&store, 20.0).await.unwrap();
        assert_eq!(empty.total_points, 0);
        assert_eq!(empty.last_update, None);

        let now = Utc::now();
        for _ in 0..3 {
            store.create(&fields(Severity::High, 1, now)).await.unwrap();
        }
        store
            .create(&fields(Severity::Medium, 1, now - Duration::days(1)))
            .await
            .unwrap();

        let stats = collect_stats(&store, 20.0).await.unwrap();
        assert_eq!(stats.total_points, 4);
        assert_eq!(stats.red_count, 3);
        assert_eq!(stats.orange_count, 1);
        assert_eq!(stats.estimated_km, 0.1);
        assert_eq!(stats.last_update, Some(now));
    }
}
