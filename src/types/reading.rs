//! Inbound sensor readings
//!
//! Two shapes exist:
//! - [`SensorSample`]: what a device sends (raw piezo ADC count, raw
//!   accelerometer counts or an already derived motion delta).
//! - [`Reading`]: the validated, normalized input of the classifier and the
//!   cluster resolver. Only constructible through [`Reading::new`].

use thiserror::Error;

/// Reasons a reading is rejected before it reaches the core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadingError {
    #[error("{field} is not a finite number")]
    NotFinite { field: &'static str },

    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("{field} must be >= 0 (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Motion part of a device sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionInput {
    /// Raw accelerometer counts on the three axes.
    Accelerometer { x: f64, y: f64, z: f64 },
    /// Motion delta already derived by the device.
    Delta(f64),
}

/// One raw sample as sent by a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Raw piezo amplitude (ADC counts).
    pub piezo_raw: f64,
    pub motion: MotionInput,
}

/// A validated reading: position plus normalized vibration and motion delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    latitude: f64,
    longitude: f64,
    vibration: f64,
    motion_delta: f64,
}

impl Reading {
    /// Validate and build a reading.
    pub fn new(
        latitude: f64,
        longitude: f64,
        vibration: f64,
        motion_delta: f64,
    ) -> Result<Self, ReadingError> {
        for (field, value) in [
            ("latitude", latitude),
            ("longitude", longitude),
            ("vibration", vibration),
            ("motion_delta", motion_delta),
        ] {
            if !value.is_finite() {
                return Err(ReadingError::NotFinite { field });
            }
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ReadingError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ReadingError::LongitudeOutOfRange(longitude));
        }
        if vibration < 0.0 {
            return Err(ReadingError::Negative {
                field: "vibration",
                value: vibration,
            });
        }
        if motion_delta < 0.0 {
            return Err(ReadingError::Negative {
                field: "motion_delta",
                value: motion_delta,
            });
        }

        Ok(Self {
            latitude,
            longitude,
            vibration,
            motion_delta,
        })
    }

    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    pub const fn vibration(&self) -> f64 {
        self.vibration
    }

    pub const fn motion_delta(&self) -> f64 {
        self.motion_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_reading() {
        let r = Reading::new(44.0, 10.0, 40.0, 20.0).unwrap();
        assert_eq!(r.latitude(), 44.0);
        assert_eq!(r.longitude(), 10.0);
        assert_eq!(r.vibration(), 40.0);
        assert_eq!(r.motion_delta(), 20.0);
    }

    #[test]
    fn test_coordinate_bounds_are_inclusive() {
        assert!(Reading::new(90.0, 180.0, 0.0, 0.0).is_ok());
        assert!(Reading::new(-90.0, -180.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_coordinates() {
        assert_eq!(
            Reading::new(90.5, 10.0, 1.0, 1.0),
            Err(ReadingError::LatitudeOutOfRange(90.5))
        );
        assert_eq!(
            Reading::new(44.0, -181.0, 1.0, 1.0),
            Err(ReadingError::LongitudeOutOfRange(-181.0))
        );
    }

    #[test]
    fn test_rejects_nan_and_negative() {
        assert_eq!(
            Reading::new(f64::NAN, 10.0, 1.0, 1.0),
            Err(ReadingError::NotFinite { field: "latitude" })
        );
        assert_eq!(
            Reading::new(44.0, 10.0, f64::INFINITY, 1.0),
            Err(ReadingError::NotFinite { field: "vibration" })
        );
        assert!(matches!(
            Reading::new(44.0, 10.0, 1.0, -0.5),
            Err(ReadingError::Negative { field: "motion_delta", .. })
        ));
    }
}
