//! RoadPulse service configuration
//!
//! All sections are optional in TOML; missing keys use built-in defaults.
//!
//! ## Search Order
//!
//! 1. `--config <path>` on the command line (errors are fatal)
//! 2. `$ROADPULSE_CONFIG` env var
//! 3. `./roadpulse.toml` in the working directory
//! 4. Built-in defaults
//!
//! Secrets and deployment-specific values are then taken from the
//! environment when set (`ROADPULSE_UPLOAD_KEY`, `ROADPULSE_DELETE_KEY`,
//! `ROADPULSE_ADMIN_KEY`, `ROADPULSE_SERVER_ADDR`, `ROADPULSE_DB_PATH`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::classifier::SeverityThresholds;
use crate::resolver::MatchStrategyKind;
use crate::sensors::SensorCalibration;

/// Env var naming a config file
pub const CONFIG_ENV_VAR: &str = "ROADPULSE_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "roadpulse.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoadPulseConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Severity thresholds and MEDIUM combination policy
    #[serde(default)]
    pub classifier: SeverityThresholds,

    /// Device unit conversion
    #[serde(default)]
    pub calibration: SensorCalibration,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

impl RoadPulseConfig {
    /// Load using the standard search order, then apply env overrides.
    ///
    /// An explicit `cli_path` must load cleanly. Env and local files fall back
    /// to the next source with a warning.
    pub fn load(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match cli_path {
            Some(path) => {
                let config = Self::load_from_file(path)?;
                info!(path = %path.display(), "Loaded config from --config");
                config
            }
            None => Self::load_from_search_path(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_from_search_path() -> Self {
        // 1. Env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Working directory
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Toml(e) => ConfigError::Parse(path.to_path_buf(), e),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate TOML text. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(ConfigError::Toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production; tests pass a map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ROADPULSE_SERVER_ADDR") {
            self.server.addr = addr;
        }
        if let Some(path) = lookup("ROADPULSE_DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(key) = lookup("ROADPULSE_UPLOAD_KEY") {
            self.auth.upload_key = key;
        }
        if let Some(key) = lookup("ROADPULSE_DELETE_KEY") {
            self.auth.delete_key = key;
        }
        if let Some(key) = lookup("ROADPULSE_ADMIN_KEY") {
            self.auth.admin_key = key;
        }
    }

    /// Reject configurations the service cannot run with.
    ///
    /// - Thresholds finite and non-negative, HIGH >= MEDIUM per metric
    /// - Calibration divisors positive
    /// - `radius_meters > 0`, `bbox_margin >= 1.5`, `max_merge_attempts >= 1`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let t = &self.classifier;
        Self::check_escalation(t.vibration_medium, t.vibration_high, "classifier.vibration", &mut errors);
        Self::check_escalation(t.motion_medium, t.motion_high, "classifier.motion", &mut errors);

        let c = &self.calibration;
        Self::check_positive(c.piezo_full_scale, "calibration.piezo_full_scale", &mut errors);
        Self::check_positive(c.counts_per_g, "calibration.counts_per_g", &mut errors);
        Self::check_positive(c.motion_scale, "calibration.motion_scale", &mut errors);
        if !c.resting_magnitude_g.is_finite() || c.resting_magnitude_g < 0.0 {
            errors.push(format!(
                "calibration.resting_magnitude_g must be finite and >= 0 (got {})",
                c.resting_magnitude_g
            ));
        }

        let cl = &self.clustering;
        Self::check_positive(cl.radius_meters, "clustering.radius_meters", &mut errors);
        if !cl.bbox_margin.is_finite() || cl.bbox_margin < defaults::MIN_BBOX_MARGIN {
            errors.push(format!(
                "clustering.bbox_margin ({}) must be >= {}",
                cl.bbox_margin,
                defaults::MIN_BBOX_MARGIN
            ));
        }
        if cl.max_merge_attempts == 0 {
            errors.push("clustering.max_merge_attempts must be > 0".to_string());
        }

        let q = &self.query;
        if q.default_days < 0 {
            errors.push(format!("query.default_days ({}) must be >= 0", q.default_days));
        }
        Self::check_positive(q.meters_per_cluster, "query.meters_per_cluster", &mut errors);

        if self.server.max_body_bytes == 0 {
            errors.push("server.max_body_bytes must be > 0".to_string());
        }
        if self.server.addr.trim().is_empty() {
            errors.push("server.addr must not be empty".to_string());
        }

        for w in &super::validation::validate_ranges(self) {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_escalation(medium: f64, high: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass
        if !medium.is_finite() || !high.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got medium={medium}, high={high})"
            ));
            return;
        }
        if medium < 0.0 || high < 0.0 {
            errors.push(format!(
                "{name}: thresholds must be >= 0 (got medium={medium}, high={high})"
            ));
        }
        if high < medium {
            errors.push(format!(
                "{name}: high ({high:.3}) must be >= medium ({medium:.3})"
            ));
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be finite and > 0 (got {value})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config parse error: {0}")]
    Toml(#[source] toml::de::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Bind address, `host:port`
    #[serde(default = "default_server_addr")]
    pub addr: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_server_addr() -> String {
    defaults::DEFAULT_SERVER_ADDR.to_string()
}
fn default_max_body_bytes() -> usize {
    defaults::DEFAULT_MAX_BODY_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// sled database directory
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_DB_PATH)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusteringConfig {
    /// Merge radius in meters (inclusive)
    #[serde(default = "default_radius_meters")]
    pub radius_meters: f64,

    /// Pre-filter box size as a multiple of the radius
    #[serde(default = "default_bbox_margin")]
    pub bbox_margin: f64,

    #[serde(default)]
    pub match_strategy: MatchStrategyKind,

    /// Find-or-create attempts before giving up on a contended cluster
    #[serde(default = "default_max_merge_attempts")]
    pub max_merge_attempts: u32,
}

fn default_radius_meters() -> f64 {
    defaults::DEFAULT_CLUSTER_RADIUS_M
}
fn default_bbox_margin() -> f64 {
    defaults::DEFAULT_BBOX_MARGIN
}
fn default_max_merge_attempts() -> u32 {
    defaults::DEFAULT_MAX_MERGE_ATTEMPTS
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            radius_meters: default_radius_meters(),
            bbox_margin: default_bbox_margin(),
            match_strategy: MatchStrategyKind::default(),
            max_merge_attempts: default_max_merge_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryConfig {
    /// Listing window when the request has no `days` parameter
    #[serde(default = "default_query_days")]
    pub default_days: i64,

    /// Road length one cluster stands for, used by the km estimate
    #[serde(default = "default_meters_per_cluster")]
    pub meters_per_cluster: f64,
}

fn default_query_days() -> i64 {
    defaults::DEFAULT_QUERY_DAYS
}
fn default_meters_per_cluster() -> f64 {
    defaults::DEFAULT_METERS_PER_CLUSTER
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_days: default_query_days(),
            meters_per_cluster: default_meters_per_cluster(),
        }
    }
}

/// Shared API keys checked against the `X-API-KEY` header.
///
/// An empty key disables its endpoint. Prefer the `ROADPULSE_*_KEY` env vars
/// over writing keys into the TOML file.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    #[serde(default)]
    pub upload_key: String,

    #[serde(default)]
    pub delete_key: String,

    #[serde(default)]
    pub admin_key: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(key: &str) -> &'static str {
            if key.is_empty() {
                "<unset>"
            } else {
                "<set>"
            }
        }
        f.debug_struct("AuthConfig")
            .field("upload_key", &mask(&self.upload_key))
            .field("delete_key", &mask(&self.delete_key))
            .field("admin_key", &mask(&self.admin_key))
            .finish()
    }
}
