//! Multi-sensor fusion: range + ambient readings into a smoothed level.
//!
//! The fusion stage re-derives the speed of sound from the ambient readings
//! on its own, including a pressure term the range sensor does not apply.
//! The level itself is `tank_height - distance`, smoothed by a moving average
//! over a bounded FIFO window. There is no dedicated outlier rejection: a
//! single erratic echo is damped by `1 / window_size`, not removed.

use crate::config::{FusionConfig, MAX_FILTER_WINDOW};
use crate::error::ConfigError;
use crate::sensors::range::speed_of_sound;
use crate::sensors::RawDistance;
use heapless::{Deque, Vec};
use serde::{Deserialize, Serialize};

/// Copy of the filter window at the time of fusion, oldest first.
pub type WindowSamples = Vec<f64, MAX_FILTER_WINDOW>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedLevel {
    /// Mean of the current window (cm).
    pub value: f64,
    /// Newest unfiltered estimate that entered the window (cm).
    pub instantaneous: f64,
    pub window_len: usize,
    pub window_samples: WindowSamples,
    /// Temperature- and pressure-corrected speed of sound (m/s).
    pub speed_of_sound: f64,
}

#[derive(Debug, Clone)]
pub struct FusionEngine {
    window: Deque<f64, MAX_FILTER_WINDOW>,
    capacity: usize,
    tank_height: f64,
    reference_pressure: f64,
    pressure_coefficient: f64,
}

impl FusionEngine {
    pub fn new(config: &FusionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            window: Deque::new(),
            capacity: config.window_size,
            tank_height: config.tank_height_cm,
            reference_pressure: config.reference_pressure_hpa,
            pressure_coefficient: config.pressure_coefficient,
        })
    }

    /// Speed of sound corrected for temperature and, heuristically, pressure.
    pub fn corrected_speed_of_sound(&self, temperature: f64, pressure: f64) -> f64 {
        let pressure_factor = 1.0 + (pressure - self.reference_pressure) * self.pressure_coefficient;
        speed_of_sound(temperature) * pressure_factor
    }

    pub fn fuse(
        &mut self,
        raw: &RawDistance,
        temperature: f64,
        pressure: f64,
        tank_height: f64,
    ) -> FusedLevel {
        let speed_of_sound = self.corrected_speed_of_sound(temperature, pressure);
        let instantaneous = tank_height - raw.distance;

        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        // Capacity is validated against MAX_FILTER_WINDOW, so this never fails.
        let _ = self.window.push_back(instantaneous);

        debug_assert!(
            self.window.len() <= self.capacity,
            "Fusion window length {} exceeds capacity {}",
            self.window.len(),
            self.capacity
        );

        FusedLevel {
            value: self.mean(),
            instantaneous,
            window_len: self.window.len(),
            window_samples: self.window.iter().copied().collect(),
            speed_of_sound,
        }
    }

    /// Fuse against the configured tank height.
    pub fn fuse_configured(&mut self, raw: &RawDistance, temperature: f64, pressure: f64) -> FusedLevel {
        let tank_height = self.tank_height;
        self.fuse(raw, temperature, pressure, tank_height)
    }

    fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Window contents, oldest first.
    pub fn window(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tank_height(&self) -> f64 {
        self.tank_height
    }
}
