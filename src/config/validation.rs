//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range sanity checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::defaults::{SUSPICIOUS_RADIUS_HIGH_M, SUSPICIOUS_RADIUS_LOW_M};
use super::RoadPulseConfig;
use crate::classifier::ThresholdPolicy;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of [`RoadPulseConfig`].
///
/// Maintained by hand; a field added to a config section must be added here.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [server]
        "server",
        "server.addr",
        "server.max_body_bytes",
        // [storage]
        "storage",
        "storage.path",
        // [classifier]
        "classifier",
        "classifier.vibration_high",
        "classifier.vibration_medium",
        "classifier.motion_high",
        "classifier.motion_medium",
        "classifier.medium_policy",
        // [calibration]
        "calibration",
        "calibration.piezo_full_scale",
        "calibration.counts_per_g",
        "calibration.resting_magnitude_g",
        "calibration.motion_scale",
        // [clustering]
        "clustering",
        "clustering.radius_meters",
        "clustering.bbox_margin",
        "clustering.match_strategy",
        "clustering.max_merge_attempts",
        // [query]
        "query",
        "query.default_days",
        "query.meters_per_cluster",
        // [auth]
        "auth",
        "auth.upload_key",
        "auth.delete_key",
        "auth.admin_key",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect all dotted key paths of a TOML table.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest known key within edit distance 3. Ties go to the
/// lexicographically smaller key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warnings for every unknown key in a raw TOML document.
///
/// Never fails: parse errors are reported by serde afterwards.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Checks
// ============================================================================

/// Suspicious but legal values on a parsed config.
pub fn validate_ranges(config: &RoadPulseConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let radius = config.clustering.radius_meters;
    if radius > SUSPICIOUS_RADIUS_HIGH_M {
        warnings.push(ValidationWarning {
            field: "clustering.radius_meters".to_string(),
            message: format!(
                "clustering.radius_meters = {radius:.1} is large; separate defects will merge"
            ),
            suggestion: None,
        });
    } else if radius > 0.0 && radius < SUSPICIOUS_RADIUS_LOW_M {
        warnings.push(ValidationWarning {
            field: "clustering.radius_meters".to_string(),
            message: format!(
                "clustering.radius_meters = {radius:.1} is below GPS accuracy; repeat hits will not merge"
            ),
            suggestion: None,
        });
    }

    let t = &config.classifier;
    if t.medium_policy == ThresholdPolicy::Any && t.vibration_medium == 0.0 {
        warnings.push(ValidationWarning {
            field: "classifier.vibration_medium".to_string(),
            message: "classifier.vibration_medium = 0 with medium_policy = \"any\" stores almost every reading".to_string(),
            suggestion: None,
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_toml_keys_nested() {
        let value: toml::Value = "[clustering]\nradius_meters = 20.0\n".parse().unwrap();
        let keys = walk_toml_keys(&value, "");
        assert_eq!(keys, vec!["clustering", "clustering.radius_meters"]);
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys("[clustering]\nradius_meter = 25.0\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "clustering.radius_meter");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("clustering.radius_meters")
        );
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml = r#"
            [server]
            addr = "0.0.0.0:2101"
            max_body_bytes = 4096

            [storage]
            path = "/var/lib/roadpulse"

            [classifier]
            vibration_high = 30.0
            vibration_medium = 15.0
            motion_high = 14.0
            motion_medium = 10.0
            medium_policy = "all"

            [calibration]
            piezo_full_scale = 1023.0
            counts_per_g = 2048.0
            resting_magnitude_g = 1.0
            motion_scale = 100.0

            [clustering]
            radius_meters = 20.0
            bbox_margin = 1.5
            match_strategy = "first"
            max_merge_attempts = 3

            [query]
            default_days = 30
            meters_per_cluster = 20.0

            [auth]
            upload_key = "u"
            delete_key = "d"
            admin_key = "a"
        "#;
        let warnings = validate_unknown_keys(toml);
        assert!(warnings.is_empty(), "unexpected: {warnings:?}");
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let warnings = validate_unknown_keys("[dashboard]\nenabled = true\n");
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("zzzzzzzzzzzzzzzzzzzz", &known).is_none());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_range_warnings() {
        let mut config = RoadPulseConfig::default();
        assert!(validate_ranges(&config).is_empty());

        config.clustering.radius_meters = 500.0;
        let warnings = validate_ranges(&config);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "clustering.radius_meters");

        config.clustering.radius_meters = 1.0;
        assert_eq!(validate_ranges(&config).len(), 1);
    }
}
