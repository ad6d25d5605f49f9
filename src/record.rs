//! Boundary artifacts handed to the export collaborators.

use crate::control::AlarmMode;
use serde::{Deserialize, Serialize};

/// One row for the storage collaborator. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Simulated time since start of run (ms).
    pub timestamp_ms: u64,
    /// Fused level (cm).
    pub level: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub mode: AlarmMode,
}

/// Payload published by the communication task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSample {
    pub timestamp_ms: u64,
    pub level: f64,
}
