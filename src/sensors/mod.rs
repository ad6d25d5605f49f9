pub mod ambient;
pub mod range;

pub use ambient::{AmbientReading, AmbientSensor};
pub use range::{RangeSensor, RawDistance};

use arrayvec::ArrayString;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MAX_SENSOR_ID_LEN: usize = 16;

pub type SensorId = ArrayString<MAX_SENSOR_ID_LEN>;

/// Physical conditions a sensor observes during one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorInput {
    pub level: f64,
    pub temperature: f64,
    pub pressure: f64,
}

/// Self-reported hardware status of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareStatus {
    Ok,
    /// The last reading hit a range limit and was clamped.
    Saturated,
}

/// A simulated sensor: produces one reading from the observed conditions.
///
/// Randomness is drawn from the caller's generator so that a seeded source
/// reproduces the exact reading sequence.
pub trait Sensor {
    type Reading: Clone + Serialize;

    fn id(&self) -> &str;
    fn sample<R: Rng + ?Sized>(&mut self, input: &SensorInput, rng: &mut R) -> Self::Reading;
    fn status(&self) -> HardwareStatus;
}

/// Zero-mean normal sample (Box-Muller).
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    // gen::<f64>() is in [0, 1); flip it so ln() never sees zero.
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * core::f64::consts::PI * u2).cos();
    z * std_dev
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gaussian_statistics() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| gaussian(&mut rng, 2.0)).collect();

        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;

        assert!(mean.abs() < 0.1, "mean {mean}");
        assert!((var.sqrt() - 2.0).abs() < 0.1, "std {}", var.sqrt());
    }

    #[test]
    fn test_gaussian_zero_std_is_silent() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(gaussian(&mut rng, 0.0), 0.0);
        }
    }
}
