//! # Tank Digital Twin
//!
//! A simulated embedded control loop for a liquid-level tank: a cyclic
//! executive acquires range and ambient readings, fuses them into a filtered
//! level, applies hysteretic alarm control and drives the tank's physical
//! model, all deterministically under a seeded random source.
//!
//! ## Features
//!
//! - **Physical model**: explicit-Euler level integration with hard clamping
//! - **Sensor models**: ultrasonic time-of-flight with noise and erratic echoes,
//!   ambient temperature/pressure with slow thermal drift
//! - **Data fusion**: speed-of-sound correction and a bounded moving-average window
//! - **Hysteresis control**: NORMAL / LOW_ALARM / HIGH_ALARM with chatter suppression
//! - **Cyclic executive**: harmonic task periods on a fixed base frame
//! - **Export collaborators**: storage, communication and forecasting hooks
//!
//! ## Quick Start
//!
//! ```rust
//! use tanktwin::collaborators::{MemorySink, TracingPublisher};
//! use tanktwin::{Simulation, SystemConfig};
//!
//! let config = SystemConfig::default();
//! let mut sim = Simulation::new(&config, MemorySink::new(), TracingPublisher).unwrap();
//!
//! // 40 frames = 4 s of simulated time, no wall-clock pacing.
//! sim.run_headless(40);
//!
//! let snapshot = sim.twin().snapshot();
//! println!("level {:.2} cm, mode {}", snapshot.fused_level, snapshot.mode);
//! assert_eq!(sim.twin().sink().records().len(), 4);
//! ```
//!
//! ## Architecture
//!
//! - [`tank`] - physical tank model
//! - [`sensors`] - range and ambient sensor models
//! - [`fusion`] - fused level estimation
//! - [`control`] - hysteresis alarm controller
//! - [`scheduler`] - cyclic executive
//! - [`twin`] - the owned simulation context driven by the executive
//! - [`collaborators`] - storage, communication and forecasting interfaces

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod collaborators;
pub mod config;
pub mod control;
pub mod error;
pub mod fusion;
pub mod record;
pub mod scheduler;
pub mod sensors;
pub mod tank;
pub mod twin;

use static_assertions::const_assert;

const_assert!(config::MAX_FILTER_WINDOW >= 1);
const_assert!(twin::LEVEL_HISTORY_LEN >= config::MAX_FILTER_WINDOW);

// Re-export main public types for convenience
pub use config::SystemConfig;
pub use control::{AlarmMode, ControlAction, HysteresisController};
pub use error::{ConfigError, SinkError, TaskError};
pub use fusion::{FusedLevel, FusionEngine, WindowSamples};
pub use record::MeasurementRecord;
pub use scheduler::{CyclicExecutive, FrameSchedule, Pacing, TaskId};
pub use sensors::{AmbientSensor, RangeSensor, Sensor};
pub use tank::PhysicalTank;
pub use twin::{DigitalTwin, Simulation};
