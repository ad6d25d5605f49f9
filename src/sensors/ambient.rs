//! Combined temperature/pressure sensor with slow thermal drift.

use super::{gaussian, HardwareStatus, Sensor, SensorId, SensorInput};
use crate::config::AmbientSensorConfig;
use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientReading {
    /// °C
    pub temperature: f64,
    /// hPa
    pub pressure: f64,
}

#[derive(Debug, Clone)]
pub struct AmbientSensor {
    id: SensorId,
    baseline_temperature: f64,
    baseline_pressure: f64,
    drift_step_std: f64,
    temperature_noise_std: f64,
    pressure_noise_std: f64,
    /// Random-walk thermal drift, kept for the sensor's lifetime.
    drift: f64,
}

impl AmbientSensor {
    pub fn new(config: &AmbientSensorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id: config.id,
            baseline_temperature: config.baseline_temperature_c,
            baseline_pressure: config.baseline_pressure_hpa,
            drift_step_std: config.drift_step_std_c,
            temperature_noise_std: config.temperature_noise_std_c,
            pressure_noise_std: config.pressure_noise_std_hpa,
            drift: 0.0,
        })
    }

    pub fn read<R: Rng + ?Sized>(&mut self, rng: &mut R) -> AmbientReading {
        self.drift += gaussian(rng, self.drift_step_std);

        let temperature =
            self.baseline_temperature + self.drift + gaussian(rng, self.temperature_noise_std);
        let pressure = self.baseline_pressure + gaussian(rng, self.pressure_noise_std);

        AmbientReading {
            temperature,
            pressure,
        }
    }

    pub fn drift(&self) -> f64 {
        self.drift
    }
}

impl Sensor for AmbientSensor {
    type Reading = AmbientReading;

    fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Ambient conditions are generated, not observed; the input is ignored.
    fn sample<R: Rng + ?Sized>(&mut self, _input: &SensorInput, rng: &mut R) -> AmbientReading {
        self.read(rng)
    }

    fn status(&self) -> HardwareStatus {
        HardwareStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_noiseless_reading_is_baseline() {
        let mut sensor = AmbientSensor::new(&AmbientSensorConfig {
            drift_step_std_c: 0.0,
            temperature_noise_std_c: 0.0,
            pressure_noise_std_hpa: 0.0,
            ..AmbientSensorConfig::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let reading = sensor.read(&mut rng);
        assert_eq!(reading.temperature, 25.0);
        assert_eq!(reading.pressure, 1013.0);
    }

    #[test]
    fn test_drift_accumulates_across_reads() {
        let mut sensor = AmbientSensor::new(&AmbientSensorConfig {
            drift_step_std_c: 1.0,
            temperature_noise_std_c: 0.0,
            ..AmbientSensorConfig::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(4);

        for _ in 0..10 {
            let reading = sensor.read(&mut rng);
            // Without measurement noise the drift is all that moves temperature.
            assert!((reading.temperature - 25.0 - sensor.drift()).abs() < 1e-12);
        }
        assert_ne!(sensor.drift(), 0.0);
    }

    #[test]
    fn test_pressure_has_no_drift() {
        let mut sensor = AmbientSensor::new(&AmbientSensorConfig {
            drift_step_std_c: 5.0,
            pressure_noise_std_hpa: 0.0,
            ..AmbientSensorConfig::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..100 {
            assert_eq!(sensor.read(&mut rng).pressure, 1013.0);
        }
    }

    #[test]
    fn test_seeded_sequence_is_reproducible() {
        let config = AmbientSensorConfig::default();
        let mut a = AmbientSensor::new(&config).unwrap();
        let mut b = AmbientSensor::new(&config).unwrap();
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);

        for _ in 0..100 {
            assert_eq!(a.read(&mut rng_a), b.read(&mut rng_b));
        }
        assert_eq!(a.id(), "AMB-01");
    }
}
