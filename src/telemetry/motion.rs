//! Movement and posture detection from raw IMU samples

use tracing::debug;

use super::reading::Reading;

/// Standard gravity in m/s²
pub const GRAVITY: f64 = 9.81;

/// Deviation of ‖a‖ from gravity that counts as movement (m/s²)
pub const ACCEL_THRESHOLD: f64 = 0.9;

/// Angular rate magnitude that counts as movement (rad/s)
pub const GYRO_THRESHOLD: f64 = 0.9;

/// Z-axis acceleration above which the device is upright (m/s²)
pub const STANDING_THRESHOLD: f64 = 8.0;

/// Classifies IMU samples and reports only state changes
#[derive(Debug, Default)]
pub struct MotionClassifier {
    last: Option<(bool, bool)>,
}

impl MotionClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one sample
    ///
    /// # Arguments
    ///
    /// * `accel` - Acceleration in m/s² (x, y, z)
    /// * `gyro` - Angular rate in rad/s (x, y, z)
    pub fn classify(accel: [f64; 3], gyro: [f64; 3]) -> Reading {
        let accel_deviation = magnitude(accel) - GRAVITY;
        let gyro_magnitude = magnitude(gyro);

        debug!(
            "Accel deviation: {:.3} | Gyro magnitude: {:.3} | Z: {:.3}",
            accel_deviation, gyro_magnitude, accel[2]
        );

        Reading::Motion {
            moving: accel_deviation.abs() > ACCEL_THRESHOLD || gyro_magnitude > GYRO_THRESHOLD,
            standing: accel[2] > STANDING_THRESHOLD,
        }
    }

    /// Classify a sample, returning a reading only when the state changed
    pub fn update(&mut self, accel: [f64; 3], gyro: [f64; 3]) -> Option<Reading> {
        let reading = Self::classify(accel, gyro);
        let Reading::Motion { moving, standing } = reading else {
            return None;
        };

        if self.last == Some((moving, standing)) {
            return None;
        }
        self.last = Some((moving, standing));
        Some(reading)
    }

    /// Forget the last reported state
    pub fn reset(&mut self) {
        self.last = None;
    }
}

fn magnitude(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}
