//! System-wide default constants.
//!
//! Grouped by subsystem. Config structs fall back to these when a key is
//! absent from `roadpulse.toml`.

// ============================================================================
// Server
// ============================================================================

/// HTTP bind address.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:2101";

/// Maximum accepted request body (bytes). Upload forms are a few dozen bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

// ============================================================================
// Storage
// ============================================================================

/// Default sled database directory.
pub const DEFAULT_DB_PATH: &str = "./data/roadpulse.db";

// ============================================================================
// Clustering
// ============================================================================

/// Merge radius (meters). Readings this close to a centroid join its cluster.
pub const DEFAULT_CLUSTER_RADIUS_M: f64 = 20.0;

/// Bounding-box pre-filter size as a multiple of the radius.
pub const DEFAULT_BBOX_MARGIN: f64 = 1.5;

/// Smallest margin that still covers the radius circle with the rounded
/// meters-per-degree constant.
pub const MIN_BBOX_MARGIN: f64 = 1.5;

/// Find-or-create attempts before a merge conflict is surfaced.
pub const DEFAULT_MAX_MERGE_ATTEMPTS: u32 = 3;

/// Radius above which distinct defects start merging together (meters).
pub const SUSPICIOUS_RADIUS_HIGH_M: f64 = 200.0;

/// Radius below consumer GPS accuracy (meters).
pub const SUSPICIOUS_RADIUS_LOW_M: f64 = 3.0;

// ============================================================================
// Query
// ============================================================================

/// Default `days` window for cluster listing.
pub const DEFAULT_QUERY_DAYS: i64 = 30;

/// Average road length represented by one cluster (meters).
pub const DEFAULT_METERS_PER_CLUSTER: f64 = 20.0;
