//! Construction-time configuration for every part of the twin.
//!
//! All sections deserialize with per-field defaults, so a JSON file only has
//! to name what it changes. Defaults reproduce the reference installation: a
//! 200 cm tall, 100 cm wide tank watched by an ultrasonic range finder and a
//! temperature/pressure sensor, sampled on a 100 ms frame.

use crate::error::ConfigError;
use crate::scheduler::TaskId;
use crate::sensors::SensorId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

/// Upper bound on the fusion window; the window lives in a fixed-capacity buffer.
pub const MAX_FILTER_WINDOW: usize = 64;

const DEFAULT_TANK_HEIGHT_CM: f64 = 200.0;
const DEFAULT_TANK_DIAMETER_CM: f64 = 100.0;
const DEFAULT_INITIAL_LEVEL_CM: f64 = 50.0;
const DEFAULT_INFLOW_LPM: f64 = 5.0;
const DEFAULT_OUTFLOW_LPM: f64 = 3.0;

const DEFAULT_BASE_PERIOD_MS: u64 = 100;
const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankConfig {
    pub max_height_cm: f64,
    pub diameter_cm: f64,
    pub initial_level_cm: f64,
    /// Volumetric inflow when the inlet valve is open (L/min).
    pub inflow_rate_lpm: f64,
    /// Volumetric outflow when the drain pump runs (L/min).
    pub outflow_rate_lpm: f64,
    pub inflow_enabled: bool,
    pub outflow_enabled: bool,
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            max_height_cm: DEFAULT_TANK_HEIGHT_CM,
            diameter_cm: DEFAULT_TANK_DIAMETER_CM,
            initial_level_cm: DEFAULT_INITIAL_LEVEL_CM,
            inflow_rate_lpm: DEFAULT_INFLOW_LPM,
            outflow_rate_lpm: DEFAULT_OUTFLOW_LPM,
            inflow_enabled: true,
            outflow_enabled: false,
        }
    }
}

impl TankConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("tank max height", self.max_height_cm)?;
        positive("tank diameter", self.diameter_cm)?;
        non_negative("inflow rate", self.inflow_rate_lpm)?;
        non_negative("outflow rate", self.outflow_rate_lpm)?;
        if !(0.0..=self.max_height_cm).contains(&self.initial_level_cm) {
            return Err(ConfigError::InitialLevelOutOfRange {
                level: self.initial_level_cm,
                max_height: self.max_height_cm,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeSensorConfig {
    pub id: SensorId,
    /// Mounting height of the transducer above the tank floor.
    pub installation_height_cm: f64,
    pub noise_std_cm: f64,
    /// Per-measurement chance of an erratic echo.
    pub outlier_probability: f64,
    /// Erratic echoes are offset uniformly within `±outlier_range_cm`.
    pub outlier_range_cm: f64,
    /// Simulated transducer settle time. Only used for wall-clock pacing.
    pub acquisition_delay_ms: u64,
}

impl Default for RangeSensorConfig {
    fn default() -> Self {
        Self {
            id: SensorId::from("US-01").unwrap_or_default(),
            installation_height_cm: DEFAULT_TANK_HEIGHT_CM,
            noise_std_cm: 0.5,
            outlier_probability: 0.05,
            outlier_range_cm: 10.0,
            acquisition_delay_ms: 1,
        }
    }
}

impl RangeSensorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("installation height", self.installation_height_cm)?;
        non_negative("range noise std", self.noise_std_cm)?;
        non_negative("outlier range", self.outlier_range_cm)?;
        if !(0.0..=1.0).contains(&self.outlier_probability) {
            return Err(ConfigError::InvalidProbability(self.outlier_probability));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientSensorConfig {
    pub id: SensorId,
    pub baseline_temperature_c: f64,
    pub baseline_pressure_hpa: f64,
    /// Standard deviation of each random-walk step of the thermal drift.
    pub drift_step_std_c: f64,
    pub temperature_noise_std_c: f64,
    pub pressure_noise_std_hpa: f64,
}

impl Default for AmbientSensorConfig {
    fn default() -> Self {
        Self {
            id: SensorId::from("AMB-01").unwrap_or_default(),
            baseline_temperature_c: 25.0,
            baseline_pressure_hpa: 1013.0,
            drift_step_std_c: 0.01,
            temperature_noise_std_c: 0.3,
            pressure_noise_std_hpa: 1.5,
        }
    }
}

impl AmbientSensorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("drift step std", self.drift_step_std_c)?;
        non_negative("temperature noise std", self.temperature_noise_std_c)?;
        non_negative("pressure noise std", self.pressure_noise_std_hpa)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub window_size: usize,
    /// Height the fusion stage subtracts distances from.
    pub tank_height_cm: f64,
    pub reference_pressure_hpa: f64,
    /// Fractional speed-of-sound change per hPa away from the reference.
    pub pressure_coefficient: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            tank_height_cm: DEFAULT_TANK_HEIGHT_CM,
            reference_pressure_hpa: 1013.0,
            pressure_coefficient: 1e-4,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 || self.window_size > MAX_FILTER_WINDOW {
            return Err(ConfigError::InvalidWindow {
                size: self.window_size,
                max: MAX_FILTER_WINDOW,
            });
        }
        positive("fusion tank height", self.tank_height_cm)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub low_threshold_cm: f64,
    pub high_threshold_cm: f64,
    pub hysteresis_cm: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            low_threshold_cm: 30.0,
            high_threshold_cm: 170.0,
            hysteresis_cm: 5.0,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // partial_cmp also rejects NaN thresholds.
        if self.low_threshold_cm.partial_cmp(&self.high_threshold_cm) != Some(Ordering::Less) {
            return Err(ConfigError::InvertedThresholds {
                low: self.low_threshold_cm,
                high: self.high_threshold_cm,
            });
        }
        if !self.hysteresis_cm.is_finite() || self.hysteresis_cm < 0.0 {
            return Err(ConfigError::NegativeHysteresis(self.hysteresis_cm));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub base_period_ms: u64,
    pub acquisition_period: u32,
    pub control_period: u32,
    pub storage_period: u32,
    pub communication_period: u32,
    /// Per-task execution budget. Overruns are reported, never dropped.
    pub deadline_budget_us: Option<u64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            base_period_ms: DEFAULT_BASE_PERIOD_MS,
            acquisition_period: 1,
            control_period: 2,
            storage_period: 10,
            communication_period: 20,
            deadline_budget_us: None,
        }
    }
}

impl ScheduleConfig {
    pub fn base_period(&self) -> Duration {
        Duration::from_millis(self.base_period_ms)
    }

    pub fn period_of(&self, task: TaskId) -> u32 {
        match task {
            TaskId::Acquisition => self.acquisition_period,
            TaskId::Control => self.control_period,
            TaskId::Storage => self.storage_period,
            TaskId::Communication => self.communication_period,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_period_ms == 0 {
            return Err(ConfigError::ZeroBasePeriod);
        }
        if let Some(task) = TaskId::ALL.into_iter().find(|&t| self.period_of(t) == 0) {
            return Err(ConfigError::ZeroTaskPeriod(task));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub tank: TankConfig,
    pub range_sensor: RangeSensorConfig,
    pub ambient_sensor: AmbientSensorConfig,
    pub fusion: FusionConfig,
    pub control: ControlConfig,
    pub schedule: ScheduleConfig,
    /// Seed of the simulation's random source.
    pub seed: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            tank: TankConfig::default(),
            range_sensor: RangeSensorConfig::default(),
            ambient_sensor: AmbientSensorConfig::default(),
            fusion: FusionConfig::default(),
            control: ControlConfig::default(),
            schedule: ScheduleConfig::default(),
            seed: DEFAULT_SEED,
        }
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tank.validate()?;
        self.range_sensor.validate()?;
        self.ambient_sensor.validate()?;
        self.fusion.validate()?;
        self.control.validate()?;
        self.schedule.validate()?;
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Physics integration step; one acquisition frame advances the tank by
    /// one base period.
    pub fn physics_dt_s(&self) -> f64 {
        self.schedule.base_period().as_secs_f64()
    }

    /// Number of frames covering `seconds` of simulated time.
    pub fn frames_for_duration(&self, seconds: f64) -> u64 {
        let millis = (seconds * 1000.0).round();
        if millis.is_finite() && millis > 0.0 {
            millis as u64 / self.schedule.base_period_ms.max(1)
        } else {
            0
        }
    }
}

fn positive(what: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveGeometry { what, value })
    }
}

fn non_negative(what: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { what, value })
    }
}
