use thiserror::Error;

use crate::scheduler::TaskId;

/// Rejected configuration. Raised at construction time only; nothing is
/// built from a configuration that fails validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("low threshold {low} must be strictly below high threshold {high}")]
    InvertedThresholds { low: f64, high: f64 },

    #[error("hysteresis margin must be non-negative, got {0}")]
    NegativeHysteresis(f64),

    #[error("{what} must be finite and positive, got {value}")]
    NonPositiveGeometry { what: &'static str, value: f64 },

    #[error("initial level {level} outside [0, {max_height}]")]
    InitialLevelOutOfRange { level: f64, max_height: f64 },

    #[error("filter window must be within 1..={max}, got {size}")]
    InvalidWindow { size: usize, max: usize },

    #[error("period of task {0} must be at least one frame")]
    ZeroTaskPeriod(TaskId),

    #[error("base frame period must be non-zero")]
    ZeroBasePeriod,

    #[error("{what} must be finite and non-negative, got {value}")]
    Negative { what: &'static str, value: f64 },

    #[error("outlier probability must lie in [0, 1], got {0}")]
    InvalidProbability(f64),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of an external collaborator (storage, communication).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// A periodic task that could not complete its export. Never fatal to the
/// frame loop.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("storage task failed: {0}")]
    Storage(#[source] SinkError),

    #[error("communication task failed: {0}")]
    Communication(#[source] SinkError),
}

impl TaskError {
    pub fn task(&self) -> TaskId {
        match self {
            TaskError::Storage(_) => TaskId::Storage,
            TaskError::Communication(_) => TaskId::Communication,
        }
    }
}
