use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use tanktwin::config::ScheduleConfig;
use tanktwin::scheduler::{CyclicExecutive, FrameTasks};
use tanktwin::{ConfigError, Pacing, SinkError, TaskError, TaskId};

/// Records every dispatch; optionally fails the storage task.
#[derive(Default)]
struct DispatchLog {
    runs: BTreeMap<TaskId, Vec<u64>>,
    order: Vec<(u64, TaskId)>,
    frames_committed: Vec<u64>,
    fail_storage: bool,
}

impl FrameTasks for DispatchLog {
    fn run_task(&mut self, task: TaskId, frame: u64) -> Result<(), TaskError> {
        self.runs.entry(task).or_default().push(frame);
        self.order.push((frame, task));
        if self.fail_storage && task == TaskId::Storage {
            return Err(TaskError::Storage(SinkError::Unavailable("disk offline".into())));
        }
        Ok(())
    }

    fn end_frame(&mut self, frame: u64) {
        self.frames_committed.push(frame);
    }
}

fn executive() -> CyclicExecutive {
    CyclicExecutive::new(&ScheduleConfig::default()).unwrap()
}

#[test]
fn test_dispatch_pattern_over_forty_frames() {
    let mut exec = executive();
    let mut log = DispatchLog::default();

    let summary = exec.run_headless(&mut log, 40);
    assert_eq!(summary.frames_run, 40);
    assert!(!summary.stopped_early);

    assert_eq!(log.runs[&TaskId::Acquisition], (0..40).collect::<Vec<_>>());
    assert_eq!(log.runs[&TaskId::Control], (0..40).step_by(2).collect::<Vec<_>>());
    assert_eq!(log.runs[&TaskId::Storage], vec![0, 10, 20, 30]);
    assert_eq!(log.runs[&TaskId::Communication], vec![0, 20]);
    assert_eq!(log.frames_committed, (0..40).collect::<Vec<_>>());
}

#[test]
fn test_storage_failure_does_not_stop_the_loop() {
    let mut exec = executive();
    let mut log = DispatchLog {
        fail_storage: true,
        ..DispatchLog::default()
    };

    let report = exec.run_frame(&mut log);
    assert_eq!(report.failed.as_slice(), &[TaskId::Storage]);
    // Communication still ran after the failed storage task.
    assert_eq!(report.tasks.last(), Some(&TaskId::Communication));

    exec.run_headless(&mut log, 19);
    assert_eq!(exec.frame_counter(), 20);

    let stats = exec.get_stats();
    assert_eq!(stats.task_failures[TaskId::Storage.index()], 2);
    assert_eq!(stats.task_runs[TaskId::Acquisition.index()], 20);
}

#[test]
fn test_paced_run_matches_headless_dispatch() {
    let mut headless = executive();
    let mut paced = executive();
    let mut a = DispatchLog::default();
    let mut b = DispatchLog::default();

    headless.run_headless(&mut a, 20);
    paced.run(
        &mut b,
        20,
        Pacing::RealTime { time_scale: 1000.0 },
        &AtomicBool::new(false),
    );

    assert_eq!(a.order, b.order);
}

#[test]
fn test_zero_periods_rejected() {
    let zero_control = ScheduleConfig {
        control_period: 0,
        ..ScheduleConfig::default()
    };
    assert!(matches!(
        CyclicExecutive::new(&zero_control),
        Err(ConfigError::ZeroTaskPeriod(TaskId::Control))
    ));

    let zero_base = ScheduleConfig {
        base_period_ms: 0,
        ..ScheduleConfig::default()
    };
    assert!(matches!(
        CyclicExecutive::new(&zero_base),
        Err(ConfigError::ZeroBasePeriod)
    ));
}
