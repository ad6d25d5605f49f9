use crate::config::TankConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// 1 L/min expressed in cm³/s.
const CM3_PER_S_PER_LPM: f64 = 1000.0 / 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankState {
    pub level: f64,
    pub max_height: f64,
    pub diameter: f64,
    pub cross_section_area: f64,
    pub inflow_enabled: bool,
    pub outflow_enabled: bool,
    /// L/min
    pub inflow_rate: f64,
    /// L/min
    pub outflow_rate: f64,
}

/// Cylindrical tank integrated with explicit Euler:
/// `dh/dt = (Q_in - Q_out) / A`.
#[derive(Debug, Clone)]
pub struct PhysicalTank {
    state: TankState,
}

impl PhysicalTank {
    pub fn new(config: &TankConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let radius = config.diameter_cm / 2.0;
        Ok(Self {
            state: TankState {
                level: config.initial_level_cm,
                max_height: config.max_height_cm,
                diameter: config.diameter_cm,
                cross_section_area: core::f64::consts::PI * radius * radius,
                inflow_enabled: config.inflow_enabled,
                outflow_enabled: config.outflow_enabled,
                inflow_rate: config.inflow_rate_lpm,
                outflow_rate: config.outflow_rate_lpm,
            },
        })
    }

    /// Advance the level by `dt_s` seconds and return the new level.
    pub fn step(&mut self, dt_s: f64) -> f64 {
        let q_in = if self.state.inflow_enabled {
            self.state.inflow_rate * CM3_PER_S_PER_LPM
        } else {
            0.0
        };
        let q_out = if self.state.outflow_enabled {
            self.state.outflow_rate * CM3_PER_S_PER_LPM
        } else {
            0.0
        };

        let dh = (q_in - q_out) / self.state.cross_section_area * dt_s;
        self.state.level = (self.state.level + dh).clamp(0.0, self.state.max_height);

        debug_assert!(
            (0.0..=self.state.max_height).contains(&self.state.level),
            "Tank level {} outside [0, {}]",
            self.state.level,
            self.state.max_height
        );

        self.state.level
    }

    pub fn set_inflow(&mut self, enabled: bool) {
        self.state.inflow_enabled = enabled;
    }

    pub fn set_outflow(&mut self, enabled: bool) {
        self.state.outflow_enabled = enabled;
    }

    /// Net level rate in cm/s for the current valve configuration.
    pub fn net_level_rate(&self) -> f64 {
        let q_in = if self.state.inflow_enabled { self.state.inflow_rate } else { 0.0 };
        let q_out = if self.state.outflow_enabled { self.state.outflow_rate } else { 0.0 };
        (q_in - q_out) * CM3_PER_S_PER_LPM / self.state.cross_section_area
    }

    pub fn level(&self) -> f64 {
        self.state.level
    }

    pub fn max_height(&self) -> f64 {
        self.state.max_height
    }

    pub fn get_state(&self) -> TankState {
        self.state.clone()
    }
}
