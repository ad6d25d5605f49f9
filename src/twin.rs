//! The digital twin: one explicitly owned context holding the tank, its
//! sensors, the fusion window and the controller, plus the export
//! collaborators. The cyclic executive drives it through [`FrameTasks`].

use crate::collaborators::{LevelForecaster, LevelPublisher, MeasurementSink, MemorySink, TracingPublisher};
use crate::config::SystemConfig;
use crate::control::{AlarmMode, ControlAction, ControlState, HysteresisController};
use crate::error::{ConfigError, TaskError};
use crate::fusion::{FusedLevel, FusionEngine, WindowSamples};
use crate::record::{LevelSample, MeasurementRecord};
use crate::scheduler::{CyclicExecutive, FrameReport, FrameTasks, Pacing, RunSummary, TaskId, TaskList};
use crate::sensors::range::speed_of_sound;
use crate::sensors::{AmbientReading, AmbientSensor, RangeSensor};
use crate::tank::{PhysicalTank, TankState};
use heapless::HistoryBuffer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use tracing::info;

/// Fused levels retained for the forecasting export.
pub const LEVEL_HISTORY_LEN: usize = 64;

const STATUS_EVERY_FRAMES: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinStats {
    pub acquisitions: u64,
    pub invalid_readings: u64,
    pub control_cycles: u64,
    pub records_stored: u64,
    pub storage_failures: u64,
    pub samples_published: u64,
    pub publish_failures: u64,
    pub last_error: Option<String>,
}

/// Committed state after the most recent frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwinSnapshot {
    pub frame: u64,
    pub timestamp_ms: u64,
    pub true_level: f64,
    pub fused_level: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub mode: AlarmMode,
    pub inflow_enabled: bool,
    pub outflow_enabled: bool,
}

pub struct DigitalTwin<S = MemorySink, P = TracingPublisher, R = StdRng> {
    tank: PhysicalTank,
    range_sensor: RangeSensor,
    ambient_sensor: AmbientSensor,
    fusion: FusionEngine,
    controller: HysteresisController,
    rng: R,
    sink: S,
    publisher: P,

    physics_dt_s: f64,
    base_period_ms: u64,
    simulate_acquisition_delay: bool,

    ambient: AmbientReading,
    fused: FusedLevel,
    pending_action: Option<ControlAction>,
    last_action: Option<ControlAction>,
    history: HistoryBuffer<f64, LEVEL_HISTORY_LEN>,
    frame_tasks: TaskList,
    last_frame: Option<u64>,
    stats: TwinStats,
}

impl<S: MeasurementSink, P: LevelPublisher> DigitalTwin<S, P, StdRng> {
    /// Build a twin whose random source is seeded from `config.seed`.
    pub fn new(config: &SystemConfig, sink: S, publisher: P) -> Result<Self, ConfigError> {
        Self::with_rng(config, sink, publisher, StdRng::seed_from_u64(config.seed))
    }
}

impl<S: MeasurementSink, P: LevelPublisher, R: Rng> DigitalTwin<S, P, R> {
    pub fn with_rng(config: &SystemConfig, sink: S, publisher: P, rng: R) -> Result<Self, ConfigError> {
        config.validate()?;

        let tank = PhysicalTank::new(&config.tank)?;
        let initial_level = tank.level();
        let ambient = AmbientReading {
            temperature: config.ambient_sensor.baseline_temperature_c,
            pressure: config.ambient_sensor.baseline_pressure_hpa,
        };

        Ok(Self {
            range_sensor: RangeSensor::new(&config.range_sensor)?,
            ambient_sensor: AmbientSensor::new(&config.ambient_sensor)?,
            fusion: FusionEngine::new(&config.fusion)?,
            controller: HysteresisController::new(&config.control)?,
            tank,
            rng,
            sink,
            publisher,
            physics_dt_s: config.physics_dt_s(),
            base_period_ms: config.schedule.base_period_ms,
            simulate_acquisition_delay: false,
            ambient,
            fused: FusedLevel {
                value: initial_level,
                instantaneous: initial_level,
                window_len: 0,
                window_samples: WindowSamples::new(),
                speed_of_sound: speed_of_sound(ambient.temperature),
            },
            pending_action: None,
            last_action: None,
            history: HistoryBuffer::new(),
            frame_tasks: TaskList::new(),
            last_frame: None,
            stats: TwinStats::default(),
        })
    }

    /// Sleep for the range sensor's settle time on each acquisition.
    /// Wall-clock only; readings are unaffected.
    pub fn set_simulate_acquisition_delay(&mut self, enabled: bool) {
        self.simulate_acquisition_delay = enabled;
    }

    fn acquire(&mut self) {
        self.tank.step(self.physics_dt_s);

        if self.simulate_acquisition_delay {
            std::thread::sleep(self.range_sensor.acquisition_delay());
        }

        self.ambient = self.ambient_sensor.read(&mut self.rng);
        let raw = self.range_sensor.measure(
            self.tank.level(),
            self.ambient.temperature,
            self.ambient.pressure,
            &mut self.rng,
        );
        if !raw.valid {
            self.stats.invalid_readings += 1;
        }

        let tank_height = self.fusion.tank_height();
        self.fused = self
            .fusion
            .fuse(&raw, self.ambient.temperature, self.ambient.pressure, tank_height);
        self.history.write(self.fused.value);
        self.stats.acquisitions += 1;
    }

    fn control(&mut self) {
        let action = self.controller.evaluate(self.fused.value);
        // Applied to the valves at end of frame.
        self.pending_action = Some(action);
        self.stats.control_cycles += 1;
    }

    fn store(&mut self, frame: u64) -> Result<(), TaskError> {
        let record = MeasurementRecord {
            timestamp_ms: self.timestamp_ms(frame),
            level: self.fused.value,
            temperature: self.ambient.temperature,
            pressure: self.ambient.pressure,
            mode: self.controller.mode(),
        };

        let result = self.sink.store(&record).and_then(|()| self.sink.flush());
        match result {
            Ok(()) => {
                self.stats.records_stored += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.storage_failures += 1;
                self.stats.last_error = Some(e.to_string());
                Err(TaskError::Storage(e))
            }
        }
    }

    fn communicate(&mut self, frame: u64) -> Result<(), TaskError> {
        let sample = LevelSample {
            timestamp_ms: self.timestamp_ms(frame),
            level: self.fused.value,
        };

        match self.publisher.publish(&sample) {
            Ok(()) => {
                self.stats.samples_published += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                self.stats.last_error = Some(e.to_string());
                Err(TaskError::Communication(e))
            }
        }
    }

    fn timestamp_ms(&self, frame: u64) -> u64 {
        frame.saturating_mul(self.base_period_ms)
    }

    /// Forecast `steps` future levels from the retained fused-level history.
    pub fn forecast<F: LevelForecaster + ?Sized>(&self, forecaster: &F, steps: usize) -> Vec<f64> {
        forecaster.forecast(
            &self.level_history(),
            self.ambient.temperature,
            self.ambient.pressure,
            steps,
        )
    }

    /// Retained fused levels, oldest first.
    pub fn level_history(&self) -> Vec<f64> {
        self.history.oldest_ordered().copied().collect()
    }

    pub fn snapshot(&self) -> TwinSnapshot {
        let tank = self.tank.get_state();
        let frame = self.last_frame.unwrap_or(0);
        TwinSnapshot {
            frame,
            timestamp_ms: self.timestamp_ms(frame),
            true_level: tank.level,
            fused_level: self.fused.value,
            temperature: self.ambient.temperature,
            pressure: self.ambient.pressure,
            mode: self.controller.mode(),
            inflow_enabled: tank.inflow_enabled,
            outflow_enabled: tank.outflow_enabled,
        }
    }

    pub fn tank_state(&self) -> TankState {
        self.tank.get_state()
    }

    pub fn control_state(&self) -> ControlState {
        self.controller.get_state()
    }

    pub fn fused_level(&self) -> FusedLevel {
        self.fused.clone()
    }

    pub fn ambient(&self) -> AmbientReading {
        self.ambient
    }

    pub fn last_action(&self) -> Option<ControlAction> {
        self.last_action
    }

    pub fn fusion_window(&self) -> Vec<f64> {
        self.fusion.window().collect()
    }

    pub fn stats(&self) -> &TwinStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<S: MeasurementSink, P: LevelPublisher, R: Rng> FrameTasks for DigitalTwin<S, P, R> {
    fn run_task(&mut self, task: TaskId, frame: u64) -> Result<(), TaskError> {
        // One entry per task per frame.
        let _ = self.frame_tasks.push(task);
        match task {
            TaskId::Acquisition => {
                self.acquire();
                Ok(())
            }
            TaskId::Control => {
                self.control();
                Ok(())
            }
            TaskId::Storage => self.store(frame),
            TaskId::Communication => self.communicate(frame),
        }
    }

    fn end_frame(&mut self, frame: u64) {
        if let Some(action) = self.pending_action.take() {
            let (inflow, outflow) = action.valve_flags();
            self.tank.set_inflow(inflow);
            self.tank.set_outflow(outflow);
            self.last_action = Some(action);
        }
        self.last_frame = Some(frame);

        if frame % STATUS_EVERY_FRAMES == 0 {
            let tasks: Vec<&str> = self.frame_tasks.iter().map(|t| t.label()).collect();
            info!(
                "t={:6.1}s | true level {:6.2} | fused {:6.2} | {} | tasks {}",
                self.timestamp_ms(frame) as f64 / 1000.0,
                self.tank.level(),
                self.fused.value,
                self.controller.mode(),
                tasks.join(",")
            );
        }
        self.frame_tasks.clear();
    }
}

/// A twin and the executive that drives it.
pub struct Simulation<S = MemorySink, P = TracingPublisher, R = StdRng> {
    executive: CyclicExecutive,
    twin: DigitalTwin<S, P, R>,
}

impl<S: MeasurementSink, P: LevelPublisher> Simulation<S, P, StdRng> {
    pub fn new(config: &SystemConfig, sink: S, publisher: P) -> Result<Self, ConfigError> {
        Ok(Self {
            executive: CyclicExecutive::new(&config.schedule)?,
            twin: DigitalTwin::new(config, sink, publisher)?,
        })
    }
}

impl<S: MeasurementSink, P: LevelPublisher, R: Rng> Simulation<S, P, R> {
    pub fn from_parts(executive: CyclicExecutive, twin: DigitalTwin<S, P, R>) -> Self {
        Self { executive, twin }
    }

    pub fn step(&mut self) -> FrameReport {
        self.executive.run_frame(&mut self.twin)
    }

    pub fn run(&mut self, frames: u64, pacing: Pacing, stop: &AtomicBool) -> RunSummary {
        self.executive.run(&mut self.twin, frames, pacing, stop)
    }

    pub fn run_headless(&mut self, frames: u64) -> RunSummary {
        self.executive.run_headless(&mut self.twin, frames)
    }

    pub fn executive(&self) -> &CyclicExecutive {
        &self.executive
    }

    pub fn twin(&self) -> &DigitalTwin<S, P, R> {
        &self.twin
    }

    pub fn twin_mut(&mut self) -> &mut DigitalTwin<S, P, R> {
        &mut self.twin
    }

    pub fn into_twin(self) -> DigitalTwin<S, P, R> {
        self.twin
    }
}
