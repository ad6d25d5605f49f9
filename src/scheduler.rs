//! Fixed-frame cyclic executive.
//!
//! Each frame dispatches, in fixed priority order, every task whose period
//! divides the frame counter: acquisition/fusion, control, storage,
//! communication. Control therefore always sees the fusion output of its own
//! frame, and the export tasks see the control decision of their frame.

use crate::config::ScheduleConfig;
use crate::error::{ConfigError, TaskError};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const TASK_COUNT: usize = 4;

pub type TaskList = Vec<TaskId, TASK_COUNT>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskId {
    Acquisition,
    Control,
    Storage,
    Communication,
}

impl TaskId {
    /// Dispatch order within a frame.
    pub const ALL: [TaskId; TASK_COUNT] = [
        TaskId::Acquisition,
        TaskId::Control,
        TaskId::Storage,
        TaskId::Communication,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskId::Acquisition => "T1",
            TaskId::Control => "T2",
            TaskId::Storage => "T3",
            TaskId::Communication => "T4",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskId::Acquisition => "acquisition",
            TaskId::Control => "control",
            TaskId::Storage => "storage",
            TaskId::Communication => "communication",
        };
        f.write_str(name)
    }
}

/// The work dispatched by the executive.
pub trait FrameTasks {
    fn run_task(&mut self, task: TaskId, frame: u64) -> Result<(), TaskError>;

    /// Called once after every task of `frame` ran. Deferred effects (actuation)
    /// are committed here so a frame is never half-applied.
    fn end_frame(&mut self, frame: u64);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSchedule {
    base_period: Duration,
    task_periods: [u32; TASK_COUNT],
    frame_counter: u64,
}

impl FrameSchedule {
    pub fn new(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            base_period: config.base_period(),
            task_periods: TaskId::ALL.map(|task| config.period_of(task)),
            frame_counter: 0,
        })
    }

    pub fn is_due(&self, task: TaskId, frame: u64) -> bool {
        frame % u64::from(self.task_periods[task.index()]) == 0
    }

    pub fn due_tasks(&self, frame: u64) -> TaskList {
        let mut due = TaskList::new();
        for task in TaskId::ALL {
            if self.is_due(task, frame) {
                // At most TASK_COUNT entries.
                let _ = due.push(task);
            }
        }
        due
    }

    /// Least common multiple of the task periods: the frame count after which
    /// the dispatch pattern repeats. `None` if it does not fit in a `u64`.
    pub fn major_frame(&self) -> Option<u64> {
        self.task_periods
            .iter()
            .try_fold(1u64, |acc, &p| lcm(acc, u64::from(p)))
    }

    pub fn period_of(&self, task: TaskId) -> u32 {
        self.task_periods[task.index()]
    }

    pub fn base_period(&self) -> Duration {
        self.base_period
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u64, b: u64) -> Option<u64> {
    (a / gcd(a, b)).checked_mul(b)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame: u64,
    pub tasks: TaskList,
    pub failed: TaskList,
    pub overruns: TaskList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutiveStats {
    pub frames_executed: u64,
    pub task_runs: [u64; TASK_COUNT],
    pub task_failures: [u64; TASK_COUNT],
    pub deadline_overruns: [u64; TASK_COUNT],
    pub max_task_time_us: [u64; TASK_COUNT],
}

/// Accepted range of `Pacing::RealTime::time_scale`; values outside are clamped.
pub const MIN_TIME_SCALE: f64 = 1e-3;
pub const MAX_TIME_SCALE: f64 = 1e6;

/// Wall-clock pacing of a run. Never changes the computed trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    Headless,
    /// Sleep out each frame; `time_scale` > 1 runs faster than real time.
    RealTime { time_scale: f64 },
}

impl Pacing {
    /// Wall-clock length of one frame, or `None` when unpaced.
    ///
    /// A non-finite or non-positive `time_scale` means real time.
    pub fn frame_period(self, base_period: Duration) -> Option<Duration> {
        match self {
            Pacing::Headless => None,
            Pacing::RealTime { time_scale } => {
                let scale = if time_scale.is_finite() && time_scale > 0.0 {
                    time_scale.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE)
                } else {
                    1.0
                };
                Some(
                    Duration::try_from_secs_f64(base_period.as_secs_f64() / scale)
                        .unwrap_or(base_period),
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames_run: u64,
    pub stopped_early: bool,
}

#[derive(Debug)]
pub struct CyclicExecutive {
    schedule: FrameSchedule,
    stats: ExecutiveStats,
    deadline_budget: Option<Duration>,
}

impl CyclicExecutive {
    pub fn new(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            schedule: FrameSchedule::new(config)?,
            stats: ExecutiveStats::default(),
            deadline_budget: config.deadline_budget_us.map(Duration::from_micros),
        })
    }

    /// Execute one frame and advance the frame counter.
    pub fn run_frame<T: FrameTasks + ?Sized>(&mut self, tasks: &mut T) -> FrameReport {
        let frame = self.schedule.frame_counter;
        let mut report = FrameReport {
            frame,
            tasks: self.schedule.due_tasks(frame),
            failed: TaskList::new(),
            overruns: TaskList::new(),
        };

        for &task in &report.tasks {
            let started = Instant::now();
            let result = tasks.run_task(task, frame);
            let elapsed = started.elapsed();

            let i = task.index();
            self.stats.task_runs[i] += 1;
            self.stats.max_task_time_us[i] = self.stats.max_task_time_us[i].max(elapsed.as_micros() as u64);

            if let Err(e) = result {
                warn!(frame, task = %task, error = %e, "task failed; control loop continues");
                self.stats.task_failures[i] += 1;
                let _ = report.failed.push(task);
            }

            if let Some(budget) = self.deadline_budget {
                if elapsed > budget {
                    warn!(
                        frame,
                        task = %task,
                        elapsed_us = elapsed.as_micros() as u64,
                        budget_us = budget.as_micros() as u64,
                        "task missed its deadline"
                    );
                    self.stats.deadline_overruns[i] += 1;
                    let _ = report.overruns.push(task);
                }
            }
        }

        tasks.end_frame(frame);

        self.schedule.frame_counter += 1;
        self.stats.frames_executed += 1;
        debug!(frame, tasks = report.tasks.len(), "frame complete");

        report
    }

    /// Run up to `frames` frames, checking `stop` between frames only.
    pub fn run<T: FrameTasks + ?Sized>(
        &mut self,
        tasks: &mut T,
        frames: u64,
        pacing: Pacing,
        stop: &AtomicBool,
    ) -> RunSummary {
        let frame_period = pacing.frame_period(self.schedule.base_period);

        let mut summary = RunSummary {
            frames_run: 0,
            stopped_early: false,
        };

        for _ in 0..frames {
            if stop.load(Ordering::Relaxed) {
                summary.stopped_early = true;
                break;
            }

            let started = Instant::now();
            self.run_frame(tasks);
            summary.frames_run += 1;

            if let Some(period) = frame_period {
                if let Some(remaining) = period.checked_sub(started.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
        }

        summary
    }

    pub fn run_headless<T: FrameTasks + ?Sized>(&mut self, tasks: &mut T, frames: u64) -> RunSummary {
        self.run(tasks, frames, Pacing::Headless, &AtomicBool::new(false))
    }

    pub fn schedule(&self) -> &FrameSchedule {
        &self.schedule
    }

    pub fn frame_counter(&self) -> u64 {
        self.schedule.frame_counter
    }

    pub fn get_stats(&self) -> &ExecutiveStats {
        &self.stats
    }
}
