use crate::config::ControlConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMode {
    Normal,
    LowAlarm,
    HighAlarm,
}

impl fmt::Display for AlarmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlarmMode::Normal => "NORMAL",
            AlarmMode::LowAlarm => "LOW_ALARM",
            AlarmMode::HighAlarm => "HIGH_ALARM",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlAction {
    ActivateInflow,
    ActivateOutflow,
    Maintain,
}

impl ControlAction {
    /// Valve configuration `(inflow_enabled, outflow_enabled)` for this action.
    pub fn valve_flags(self) -> (bool, bool) {
        match self {
            ControlAction::ActivateInflow => (true, false),
            ControlAction::ActivateOutflow => (false, true),
            // Steady fill under normal operation.
            ControlAction::Maintain => (true, false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub mode: AlarmMode,
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub hysteresis_band: f64,
    /// Level seen by the most recent evaluation.
    pub last_level: f64,
    pub transitions: u32,
}

/// Two-threshold alarm classifier with hysteresis. An active alarm is held
/// until the level clears its threshold by the hysteresis band, so the output
/// depends on the previous mode and not only on the current level.
#[derive(Debug, Clone)]
pub struct HysteresisController {
    state: ControlState,
}

impl HysteresisController {
    pub fn new(config: &ControlConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            state: ControlState {
                mode: AlarmMode::Normal,
                low_threshold: config.low_threshold_cm,
                high_threshold: config.high_threshold_cm,
                hysteresis_band: config.hysteresis_cm,
                last_level: 0.0,
                transitions: 0,
            },
        })
    }

    pub fn evaluate(&mut self, level: f64) -> ControlAction {
        let s = &self.state;
        let (mode, action) = if level <= s.low_threshold {
            (AlarmMode::LowAlarm, ControlAction::ActivateInflow)
        } else if level >= s.high_threshold {
            (AlarmMode::HighAlarm, ControlAction::ActivateOutflow)
        } else if s.mode == AlarmMode::LowAlarm && level < s.low_threshold + s.hysteresis_band {
            (AlarmMode::LowAlarm, ControlAction::ActivateInflow)
        } else if s.mode == AlarmMode::HighAlarm && level > s.high_threshold - s.hysteresis_band {
            (AlarmMode::HighAlarm, ControlAction::ActivateOutflow)
        } else {
            (AlarmMode::Normal, ControlAction::Maintain)
        };

        let previous = self.state.mode;
        self.state.mode = mode;
        self.state.last_level = level;

        if previous != mode {
            self.state.transitions = self.state.transitions.saturating_add(1);
            match mode {
                AlarmMode::Normal => info!(level, from = %previous, "level back to NORMAL"),
                _ => warn!(level, mode = %mode, "level alarm raised"),
            }
        } else if mode != AlarmMode::Normal {
            debug!(level, mode = %mode, "level alarm active");
        }

        action
    }

    pub fn mode(&self) -> AlarmMode {
        self.state.mode
    }

    pub fn get_state(&self) -> ControlState {
        self.state.clone()
    }
}
