//! Device payload parsing and unit conversion
//!
//! Devices send a 10-bit piezo ADC count plus raw accelerometer counts. This
//! module turns those into the normalized [`Reading`] the classifier works on:
//!
//! - `vibration    = piezo_raw / piezo_full_scale * 100`
//! - `axis_g       = counts / counts_per_g`
//! - `motion_delta = |sqrt(x_g^2 + y_g^2) - resting_magnitude_g| * motion_scale`
//!
//! Only the horizontal axes enter the magnitude so that mounting tilt and
//! vertical gravity do not dominate the delta.

use serde::{Deserialize, Serialize};

use crate::types::{MotionInput, Reading, ReadingError, SensorSample};

/// Unit-conversion constants for one hardware generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorCalibration {
    /// Piezo ADC full-scale count (10-bit ADC = 1023).
    #[serde(default = "default_piezo_full_scale")]
    pub piezo_full_scale: f64,

    /// Accelerometer counts per g (MPU-6050 at +-16 g = 2048).
    #[serde(default = "default_counts_per_g")]
    pub counts_per_g: f64,

    /// Horizontal magnitude at rest, in g.
    #[serde(default = "default_resting_magnitude_g")]
    pub resting_magnitude_g: f64,

    /// Multiplier applied to the deviation from rest.
    #[serde(default = "default_motion_scale")]
    pub motion_scale: f64,
}

fn default_piezo_full_scale() -> f64 {
    1023.0
}
fn default_counts_per_g() -> f64 {
    2048.0
}
fn default_resting_magnitude_g() -> f64 {
    1.0
}
fn default_motion_scale() -> f64 {
    100.0
}

impl Default for SensorCalibration {
    fn default() -> Self {
        Self {
            piezo_full_scale: default_piezo_full_scale(),
            counts_per_g: default_counts_per_g(),
            resting_magnitude_g: default_resting_magnitude_g(),
            motion_scale: default_motion_scale(),
        }
    }
}

impl SensorCalibration {
    /// Piezo ADC count to percent of full scale.
    pub fn normalize_vibration(&self, piezo_raw: f64) -> f64 {
        piezo_raw / self.piezo_full_scale * 100.0
    }

    /// Raw accelerometer counts to the motion delta.
    pub fn motion_delta(&self, x: f64, y: f64) -> f64 {
        let x_g = x / self.counts_per_g;
        let y_g = y / self.counts_per_g;
        let magnitude = x_g.hypot(y_g);
        (magnitude - self.resting_magnitude_g).abs() * self.motion_scale
    }

    /// Convert and validate a device sample.
    pub fn to_reading(&self, sample: &SensorSample) -> Result<Reading, ReadingError> {
        if !sample.piezo_raw.is_finite() {
            return Err(ReadingError::NotFinite { field: "piezo" });
        }
        let motion_delta = match sample.motion {
            MotionInput::Accelerometer { x, y, z } => {
                for (field, value) in [("ax", x), ("ay", y), ("az", z)] {
                    if !value.is_finite() {
                        return Err(ReadingError::NotFinite { field });
                    }
                }
                self.motion_delta(x, y)
            }
            MotionInput::Delta(delta) => delta,
        };

        Reading::new(
            sample.latitude,
            sample.longitude,
            self.normalize_vibration(sample.piezo_raw),
            motion_delta,
        )
    }
}

/// Parse the `dati` payload: `"piezo,ax,ay,az"`.
///
/// Returns the raw piezo count and the accelerometer motion input.
pub fn parse_payload(dati: &str) -> Result<(f64, MotionInput), ReadingError> {
    let parts: Vec<&str> = dati.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(ReadingError::Malformed(format!(
            "expected 4 comma-separated values, got {}",
            parts.len()
        )));
    }

    let mut values = [0.0_f64; 4];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|_| ReadingError::Malformed(format!("'{part}' is not a number")))?;
    }

    let [piezo, x, y, z] = values;
    Ok((piezo, MotionInput::Accelerometer { x, y, z }))
}
