//! Export-side collaborators: storage, communication, forecasting.
//!
//! Nothing here feeds back into control. A failing collaborator degrades its
//! export path only; the twin logs the error and keeps running.

use crate::error::SinkError;
use crate::record::{LevelSample, MeasurementRecord};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Append-only destination for measurement records.
pub trait MeasurementSink {
    fn store(&mut self, record: &MeasurementRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Fire-and-forget publication of the current fused level.
pub trait LevelPublisher {
    fn publish(&mut self, sample: &LevelSample) -> Result<(), SinkError>;
}

/// Produces `steps` future level estimates from recent fused levels.
/// Used for display only.
pub trait LevelForecaster {
    fn forecast(&self, history: &[f64], temperature: f64, pressure: f64, steps: usize) -> Vec<f64>;
}

impl<T: MeasurementSink + ?Sized> MeasurementSink for Box<T> {
    fn store(&mut self, record: &MeasurementRecord) -> Result<(), SinkError> {
        (**self).store(record)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

impl<T: LevelPublisher + ?Sized> LevelPublisher for Box<T> {
    fn publish(&mut self, sample: &LevelSample) -> Result<(), SinkError> {
        (**self).publish(sample)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Vec<MeasurementRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Fused levels of every stored record, oldest first.
    pub fn levels(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.level).collect()
    }
}

impl MeasurementSink for MemorySink {
    fn store(&mut self, record: &MeasurementRecord) -> Result<(), SinkError> {
        self.records.push(*record);
        Ok(())
    }
}

/// One JSON object per line, appended to any writer.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed.
    pub fn append_to(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> MeasurementSink for JsonLinesSink<W> {
    fn store(&mut self, record: &MeasurementRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Publishes by logging, standing in for a network uplink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl LevelPublisher for TracingPublisher {
    fn publish(&mut self, sample: &LevelSample) -> Result<(), SinkError> {
        info!(
            timestamp_ms = sample.timestamp_ms,
            "publishing level {:.2} cm", sample.level
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPublisher {
    samples: Vec<LevelSample>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[LevelSample] {
        &self.samples
    }
}

impl LevelPublisher for MemoryPublisher {
    fn publish(&mut self, sample: &LevelSample) -> Result<(), SinkError> {
        self.samples.push(*sample);
        Ok(())
    }
}

/// Linear trend extrapolation over the most recent `window` levels.
#[derive(Debug, Clone, Copy)]
pub struct TrendForecaster {
    window: usize,
}

impl TrendForecaster {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
        }
    }
}

impl Default for TrendForecaster {
    fn default() -> Self {
        Self::new(5)
    }
}

impl LevelForecaster for TrendForecaster {
    fn forecast(&self, history: &[f64], _temperature: f64, _pressure: f64, steps: usize) -> Vec<f64> {
        let recent = &history[history.len().saturating_sub(self.window)..];
        let last = recent.last().copied().unwrap_or(0.0);
        let trend = match (recent.first(), recent.len()) {
            (Some(first), n) if n >= 2 => (last - first) / (n - 1) as f64,
            _ => 0.0,
        };

        (1..=steps)
            .map(|k| (last + trend * k as f64).max(0.0))
            .collect()
    }
}
