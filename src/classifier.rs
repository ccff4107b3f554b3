//! Severity classification
//!
//! Maps a normalized vibration amplitude and a motion delta onto
//! `Low` / `Medium` / `High`. Pure and total: no I/O, no error path.
//!
//! ## Decision rule
//!
//! - `High`   if `vibration > vibration_high` AND `motion_delta > motion_high`
//! - `Medium` if `vibration > vibration_medium` AND `motion_delta > motion_medium`
//!   (`medium_policy = "all"`, the default), or with OR when
//!   `medium_policy = "any"`
//! - `Low` otherwise
//!
//! Comparisons are strict. The `High` rule always requires both axes.
//! The AND default is a calibration decision: OR lets a single noisy axis
//! (a door slam on the piezo, a hard brake on the accelerometer) raise a
//! defect on its own.

use serde::{Deserialize, Serialize};

use crate::types::Severity;

/// How the two `Medium` thresholds combine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdPolicy {
    /// Both thresholds must be exceeded.
    #[default]
    All,
    /// Either threshold is enough.
    Any,
}

/// Tunable classifier thresholds, calibrated per sensor hardware generation.
///
/// Vibration is in percent of the piezo full scale, motion delta in percent
/// of 1 g (see [`crate::sensors::SensorCalibration`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeverityThresholds {
    #[serde(default = "default_vibration_high")]
    pub vibration_high: f64,

    #[serde(default = "default_vibration_medium")]
    pub vibration_medium: f64,

    #[serde(default = "default_motion_high")]
    pub motion_high: f64,

    #[serde(default = "default_motion_medium")]
    pub motion_medium: f64,

    #[serde(default)]
    pub medium_policy: ThresholdPolicy,
}

fn default_vibration_high() -> f64 {
    30.0
}
fn default_vibration_medium() -> f64 {
    15.0
}
fn default_motion_high() -> f64 {
    14.0
}
fn default_motion_medium() -> f64 {
    10.0
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            vibration_high: default_vibration_high(),
            vibration_medium: default_vibration_medium(),
            motion_high: default_motion_high(),
            motion_medium: default_motion_medium(),
            medium_policy: ThresholdPolicy::default(),
        }
    }
}

/// Deterministic severity classifier.
#[derive(Debug, Clone, Default)]
pub struct SeverityClassifier {
    thresholds: SeverityThresholds,
}

impl SeverityClassifier {
    pub const fn new(thresholds: SeverityThresholds) -> Self {
        Self { thresholds }
    }

    pub const fn thresholds(&self) -> &SeverityThresholds {
        &self.thresholds
    }

    /// Classify a validated (finite, non-negative) vibration / motion pair.
    pub fn classify(&self, vibration: f64, motion_delta: f64) -> Severity {
        let t = &self.thresholds;

        if vibration > t.vibration_high && motion_delta > t.motion_high {
            return Severity::High;
        }

        let vib_medium = vibration > t.vibration_medium;
        let motion_medium = motion_delta > t.motion_medium;
        let medium = match t.medium_policy {
            ThresholdPolicy::All => vib_medium && motion_medium,
            ThresholdPolicy::Any => vib_medium || motion_medium,
        };

        if medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}
