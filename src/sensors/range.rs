//! Ultrasonic time-of-flight range finder mounted above the tank.

use super::{gaussian, HardwareStatus, Sensor, SensorId, SensorInput};
use crate::config::RangeSensorConfig;
use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Speed of sound in dry air at 0 °C (m/s).
pub const SPEED_OF_SOUND_0C: f64 = 331.3;
/// First-order temperature coefficient of the speed of sound (m/s per °C).
pub const SPEED_OF_SOUND_TEMP_COEFF: f64 = 0.606;

const CM_PER_M: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDistance {
    /// Reported distance from transducer to surface (cm), clamped to the
    /// mounting height.
    pub distance: f64,
    /// False when the echo fell outside the measurable range.
    pub valid: bool,
    /// Round-trip time of flight of the true distance (s).
    pub time_of_flight_s: f64,
}

/// Temperature-corrected speed of sound (m/s).
pub fn speed_of_sound(temperature_c: f64) -> f64 {
    SPEED_OF_SOUND_0C + SPEED_OF_SOUND_TEMP_COEFF * temperature_c
}

#[derive(Debug, Clone)]
pub struct RangeSensor {
    id: SensorId,
    installation_height: f64,
    noise_std: f64,
    outlier_probability: f64,
    outlier_range: f64,
    acquisition_delay: Duration,
    status: HardwareStatus,
}

impl RangeSensor {
    pub fn new(config: &RangeSensorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id: config.id,
            installation_height: config.installation_height_cm,
            noise_std: config.noise_std_cm,
            outlier_probability: config.outlier_probability,
            outlier_range: config.outlier_range_cm,
            acquisition_delay: Duration::from_millis(config.acquisition_delay_ms),
            status: HardwareStatus::Ok,
        })
    }

    /// Simulate one ping against a surface at `level`.
    ///
    /// Only temperature enters this stage's speed-of-sound model; `pressure`
    /// is part of the acquisition snapshot but is not applied here.
    pub fn measure<R: Rng + ?Sized>(
        &mut self,
        level: f64,
        temperature: f64,
        _pressure: f64,
        rng: &mut R,
    ) -> RawDistance {
        let true_distance = self.installation_height - level;
        let time_of_flight_s = 2.0 * (true_distance / CM_PER_M) / speed_of_sound(temperature);

        let mut distance = true_distance + gaussian(rng, self.noise_std);

        // Erratic echo. Left for the fusion window to absorb.
        if rng.gen::<f64>() < self.outlier_probability {
            distance += rng.gen_range(-self.outlier_range..=self.outlier_range);
        }

        let valid = (0.0..=self.installation_height).contains(&distance);
        self.status = if valid {
            HardwareStatus::Ok
        } else {
            HardwareStatus::Saturated
        };

        RawDistance {
            distance: distance.clamp(0.0, self.installation_height),
            valid,
            time_of_flight_s,
        }
    }

    pub fn installation_height(&self) -> f64 {
        self.installation_height
    }

    /// Wall-clock settle time of one ping. Paced runs may sleep for it;
    /// it never changes a reading.
    pub fn acquisition_delay(&self) -> Duration {
        self.acquisition_delay
    }
}

impl Sensor for RangeSensor {
    type Reading = RawDistance;

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn sample<R: Rng + ?Sized>(&mut self, input: &SensorInput, rng: &mut R) -> RawDistance {
        self.measure(input.level, input.temperature, input.pressure, rng)
    }

    fn status(&self) -> HardwareStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn quiet_sensor() -> RangeSensor {
        RangeSensor::new(&RangeSensorConfig {
            noise_std_cm: 0.0,
            outlier_probability: 0.0,
            ..RangeSensorConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_noiseless_distance_is_exact() {
        let mut sensor = quiet_sensor();
        let mut rng = StdRng::seed_from_u64(0);
        let reading = sensor.measure(50.0, 25.0, 1013.0, &mut rng);
        assert_eq!(reading.distance, 150.0);
        assert!(reading.valid);
    }

    #[test]
    fn test_time_of_flight_uses_temperature() {
        let mut sensor = quiet_sensor();
        let mut rng = StdRng::seed_from_u64(0);
        let cold = sensor.measure(100.0, 0.0, 1013.0, &mut rng);
        let warm = sensor.measure(100.0, 30.0, 1013.0, &mut rng);

        let expected_cold = 2.0 * 1.0 / 331.3;
        assert!((cold.time_of_flight_s - expected_cold).abs() < 1e-12);
        assert!(warm.time_of_flight_s < cold.time_of_flight_s);
    }

    #[test]
    fn test_speed_of_sound_first_order() {
        assert!((speed_of_sound(20.0) - (331.3 + 12.12)).abs() < 1e-9);
    }

    #[test]
    fn test_pressure_does_not_affect_sensor() {
        let mut a = RangeSensor::new(&RangeSensorConfig::default()).unwrap();
        let mut b = RangeSensor::new(&RangeSensorConfig::default()).unwrap();
        let mut rng_a = StdRng::seed_from_u64(11);
        let mut rng_b = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let ra = a.measure(80.0, 25.0, 950.0, &mut rng_a);
            let rb = b.measure(80.0, 25.0, 1050.0, &mut rng_b);
            assert_eq!(ra, rb);
        }
    }

    #[test]
    fn test_readings_clamped_to_mounting_height() {
        let mut sensor = RangeSensor::new(&RangeSensorConfig {
            noise_std_cm: 0.0,
            outlier_probability: 1.0,
            outlier_range_cm: 10.0,
            ..RangeSensorConfig::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..200 {
            let full = sensor.measure(200.0, 25.0, 1013.0, &mut rng);
            assert!((0.0..=200.0).contains(&full.distance));
            let empty = sensor.measure(0.0, 25.0, 1013.0, &mut rng);
            assert!((0.0..=200.0).contains(&empty.distance));
        }
    }

    #[test]
    fn test_saturated_echo_flagged_invalid() {
        let mut sensor = RangeSensor::new(&RangeSensorConfig {
            noise_std_cm: 0.0,
            outlier_probability: 1.0,
            outlier_range_cm: 10.0,
            ..RangeSensorConfig::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        // With the surface at the transducer every negative offset saturates.
        let mut saw_invalid = false;
        for _ in 0..100 {
            let reading = sensor.measure(200.0, 25.0, 1013.0, &mut rng);
            if !reading.valid {
                saw_invalid = true;
                assert_eq!(reading.distance, 0.0);
                assert_eq!(sensor.status(), HardwareStatus::Saturated);
            }
        }
        assert!(saw_invalid);
    }

    #[test]
    fn test_outliers_bounded_by_range() {
        let mut sensor = RangeSensor::new(&RangeSensorConfig {
            noise_std_cm: 0.0,
            outlier_probability: 1.0,
            outlier_range_cm: 10.0,
            ..RangeSensorConfig::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..500 {
            let reading = sensor.measure(100.0, 25.0, 1013.0, &mut rng);
            assert!((reading.distance - 100.0).abs() <= 10.0);
        }
    }

    #[test]
    fn test_sensor_trait_matches_measure() {
        let mut a = RangeSensor::new(&RangeSensorConfig::default()).unwrap();
        let mut b = RangeSensor::new(&RangeSensorConfig::default()).unwrap();
        let mut rng_a = StdRng::seed_from_u64(21);
        let mut rng_b = StdRng::seed_from_u64(21);
        let input = SensorInput {
            level: 120.0,
            temperature: 22.0,
            pressure: 1009.0,
        };

        assert_eq!(a.id(), "US-01");
        assert_eq!(
            a.sample(&input, &mut rng_a),
            b.measure(120.0, 22.0, 1009.0, &mut rng_b)
        );
    }
}
