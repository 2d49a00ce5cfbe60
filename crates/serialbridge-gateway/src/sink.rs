use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serialbridge_dispatch::{TaskError, TaskResult};
use serialbridge_frame::{CommandFrame, CommandKind, DecodeError, SensorFrame, SensorKind};

/// A validated sensor frame, stamped when it was read off the link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub sensor_id: u8,
    pub kind: SensorKind,
    pub value: f32,
    pub received_at: SystemTime,
}

impl SensorReading {
    pub fn from_frame(frame: &SensorFrame, received_at: SystemTime) -> Self {
        Self {
            sensor_id: frame.sensor_id,
            kind: SensorKind::from_code(frame.data_type),
            value: frame.value,
            received_at,
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sensor {} {} = {}{}",
            self.sensor_id,
            self.kind,
            self.value,
            self.kind.unit()
        )
    }
}

/// A command frame received from the link (actuator acknowledgement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEcho {
    pub actuator_id: u8,
    pub kind: CommandKind,
    pub received_at: SystemTime,
}

impl CommandEcho {
    pub fn from_frame(frame: &CommandFrame, received_at: SystemTime) -> Self {
        Self {
            actuator_id: frame.actuator_id,
            kind: CommandKind::from_code(frame.command_type),
            received_at,
        }
    }
}

impl fmt::Display for CommandEcho {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actuator {} {}", self.actuator_id, self.kind)
    }
}

/// Record of one outbound command attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLog {
    pub actuator_id: u8,
    pub kind: CommandKind,
    pub success: bool,
    pub error: Option<String>,
    pub issued_at: SystemTime,
    pub operator: Option<String>,
}

/// Downstream consumer of gateway events (persistence, live feeds, ...).
///
/// Called from dispatcher workers, so implementations must be thread-safe.
/// An `Err` is logged and counted as a failed task; it never stops the
/// gateway.
pub trait Sink: Send + Sync {
    fn on_sensor(&self, reading: &SensorReading) -> TaskResult;

    fn on_command(&self, echo: &CommandEcho) -> TaskResult;

    fn on_command_sent(&self, _log: &CommandLog) -> TaskResult {
        Ok(())
    }

    /// Called on the reading flow for every rejected frame candidate.
    fn on_decode_error(&self, _error: &DecodeError) -> TaskResult {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn on_sensor(&self, reading: &SensorReading) -> TaskResult {
        (**self).on_sensor(reading)
    }

    fn on_command(&self, echo: &CommandEcho) -> TaskResult {
        (**self).on_command(echo)
    }

    fn on_command_sent(&self, log: &CommandLog) -> TaskResult {
        (**self).on_command_sent(log)
    }

    fn on_decode_error(&self, error: &DecodeError) -> TaskResult {
        (**self).on_decode_error(error)
    }
}

/// Every sink that failed during one fan-out.
#[derive(Debug)]
pub struct SinkFailures(Vec<TaskError>);

impl fmt::Display for SinkFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sink(s) failed", self.0.len())?;
        for (index, err) in self.0.iter().enumerate() {
            let sep = if index == 0 { ": " } else { "; " };
            write!(f, "{sep}{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SinkFailures {}

/// Fan-out over several sinks.
///
/// Every sink sees every event even when an earlier one fails; the failures
/// are reported together.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn Sink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }

    /// Builder-style `push`.
    pub fn with(mut self, sink: Arc<dyn Sink>) -> Self {
        self.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn each(&self, call: impl Fn(&dyn Sink) -> TaskResult) -> TaskResult {
        let mut failures: Vec<TaskError> = self
            .sinks
            .iter()
            .filter_map(|sink| call(sink.as_ref()).err())
            .collect();
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Box::new(SinkFailures(failures))),
        }
    }
}

impl Sink for SinkSet {
    fn on_sensor(&self, reading: &SensorReading) -> TaskResult {
        self.each(|sink| sink.on_sensor(reading))
    }

    fn on_command(&self, echo: &CommandEcho) -> TaskResult {
        self.each(|sink| sink.on_command(echo))
    }

    fn on_command_sent(&self, log: &CommandLog) -> TaskResult {
        self.each(|sink| sink.on_command_sent(log))
    }

    fn on_decode_error(&self, error: &DecodeError) -> TaskResult {
        self.each(|sink| sink.on_decode_error(error))
    }
}

impl fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSet")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Records {
    readings: Vec<SensorReading>,
    echoes: Vec<CommandEcho>,
    commands: Vec<CommandLog>,
    decode_errors: Vec<DecodeError>,
}

/// Sink that keeps everything it receives in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Records>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> Vec<SensorReading> {
        self.lock().readings.clone()
    }

    pub fn echoes(&self) -> Vec<CommandEcho> {
        self.lock().echoes.clone()
    }

    pub fn commands(&self) -> Vec<CommandLog> {
        self.lock().commands.clone()
    }

    pub fn decode_errors(&self) -> Vec<DecodeError> {
        self.lock().decode_errors.clone()
    }

    /// Number of events of any kind recorded so far.
    pub fn len(&self) -> usize {
        let records = self.lock();
        records.readings.len()
            + records.echoes.len()
            + records.commands.len()
            + records.decode_errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sink for MemorySink {
    fn on_sensor(&self, reading: &SensorReading) -> TaskResult {
        self.lock().readings.push(*reading);
        Ok(())
    }

    fn on_command(&self, echo: &CommandEcho) -> TaskResult {
        self.lock().echoes.push(*echo);
        Ok(())
    }

    fn on_command_sent(&self, log: &CommandLog) -> TaskResult {
        self.lock().commands.push(log.clone());
        Ok(())
    }

    fn on_decode_error(&self, error: &DecodeError) -> TaskResult {
        self.lock().decode_errors.push(*error);
        Ok(())
    }
}
