use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serialbridge_dispatch::{Dispatcher, Task};
use serialbridge_frame::{
    DecodeError, Frame, FrameConfig, FrameError, FrameReader, ReassemblerStats, StreamEvent,
};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sink::{CommandEcho, SensorReading, Sink, SinkSet};

/// Running totals of a gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub bytes_read: u64,
    pub sensor_frames: u64,
    pub command_frames: u64,
    /// Frame candidates rejected by the reassembler.
    pub rejected: u64,
    /// Frames the dispatcher refused (shut down or full).
    pub submit_failures: u64,
}

impl GatewayStats {
    pub fn frames(&self) -> u64 {
        self.sensor_frames + self.command_frames
    }
}

/// Reads frames from a link and dispatches one task per frame to the sinks.
///
/// The gateway is the only flow touching its reassembler. Frames are
/// submitted in stream order; with a multi-worker dispatcher the sinks may
/// still observe them out of order.
pub struct Gateway<T> {
    reader: FrameReader<T>,
    dispatcher: Arc<Dispatcher>,
    sinks: SinkSet,
    stats: GatewayStats,
}

impl<T: Read> Gateway<T> {
    pub fn new(inner: T, dispatcher: Arc<Dispatcher>, sinks: SinkSet) -> Self {
        Self::from_reader(FrameReader::new(inner), dispatcher, sinks)
    }

    pub fn with_config(
        inner: T,
        config: FrameConfig,
        dispatcher: Arc<Dispatcher>,
        sinks: SinkSet,
    ) -> Self {
        Self::from_reader(FrameReader::with_config(inner, config), dispatcher, sinks)
    }

    /// Wrap an already configured reader (e.g. one with a read timeout).
    pub fn from_reader(
        reader: FrameReader<T>,
        dispatcher: Arc<Dispatcher>,
        sinks: SinkSet,
    ) -> Self {
        Self {
            reader,
            dispatcher,
            sinks,
            stats: GatewayStats::default(),
        }
    }

    /// Read one chunk from the link and dispatch every frame it completes.
    ///
    /// Returns the number of frames submitted. A read that times out or would
    /// block returns `Ok(0)`; EOF is `FrameError::ConnectionClosed`.
    pub fn pump(&mut self) -> Result<usize> {
        self.pump_limited(None)
    }

    /// Like [`pump`](Self::pump), but stops decoding after `budget` frames.
    /// Bytes past the last dispatched frame stay buffered.
    fn pump_limited(&mut self, budget: Option<u64>) -> Result<usize> {
        match self.reader.fill() {
            Ok(read) => self.stats.bytes_read += read as u64,
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        }
        Ok(self.drain_events(budget))
    }

    /// Pump until EOF, the stop flag, or a fatal error.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<GatewayStats> {
        self.run_until(stop, None)
    }

    /// Pump until EOF, the stop flag, a fatal error, or `limit` frames.
    ///
    /// EOF ends the run normally.
    pub fn run_until(&mut self, stop: &AtomicBool, limit: Option<u64>) -> Result<GatewayStats> {
        info!(limit = ?limit, "gateway running");
        loop {
            if stop.load(Ordering::Acquire) {
                debug!("gateway stop requested");
                break;
            }
            if limit.is_some_and(|limit| self.stats.frames() >= limit) {
                debug!(frames = self.stats.frames(), "gateway frame limit reached");
                break;
            }
            if !self.dispatcher.is_accepting() {
                warn!("dispatcher stopped accepting; gateway exiting");
                break;
            }

            let budget = limit.map(|limit| limit - self.stats.frames());
            match self.pump_limited(budget) {
                Ok(_) => {}
                Err(crate::GatewayError::Frame(FrameError::ConnectionClosed)) => {
                    info!("link closed");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            frames = self.stats.frames(),
            rejected = self.stats.rejected,
            submit_failures = self.stats.submit_failures,
            "gateway stopped"
        );
        Ok(self.stats)
    }

    fn drain_events(&mut self, budget: Option<u64>) -> usize {
        let received_at = SystemTime::now();
        let mut submitted = 0usize;
        let mut remaining = budget;

        // Field-level borrows: the poll iterator holds `reader` mutably.
        let Self {
            reader,
            dispatcher,
            sinks,
            stats,
        } = self;

        let mut events = reader.poll();
        while remaining != Some(0) {
            let Some(event) = events.next() else {
                break;
            };
            match event {
                StreamEvent::Frame(frame) => {
                    let accepted = submit_frame(dispatcher, sinks, stats, frame, received_at);
                    submitted += usize::from(accepted);
                    remaining = remaining.map(|n| n - 1);
                }
                StreamEvent::Rejected(error) => report_rejection(sinks, stats, &error),
            }
        }
        submitted
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    pub fn reassembler_stats(&self) -> ReassemblerStats {
        self.reader.stats()
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.reader.buffered()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn sinks(&self) -> &SinkSet {
        &self.sinks
    }

    pub fn get_ref(&self) -> &T {
        self.reader.get_ref()
    }

    /// Consume the gateway and return the link. Undecoded bytes are lost.
    pub fn into_inner(self) -> T {
        self.reader.into_inner()
    }
}

/// Submit one frame as a sink task; false when the dispatcher refused it.
fn submit_frame(
    dispatcher: &Dispatcher,
    sinks: &SinkSet,
    stats: &mut GatewayStats,
    frame: Frame,
    received_at: SystemTime,
) -> bool {
    let task = match frame {
        Frame::Sensor(sensor) => {
            stats.sensor_frames += 1;
            let reading = SensorReading::from_frame(&sensor, received_at);
            let sinks = sinks.clone();
            Task::new(move || sinks.on_sensor(&reading))
                .with_label("sensor")
                .with_correlation_id(format!("sensor-{}", sensor.sensor_id))
        }
        Frame::Command(command) => {
            stats.command_frames += 1;
            let echo = CommandEcho::from_frame(&command, received_at);
            let sinks = sinks.clone();
            Task::new(move || sinks.on_command(&echo))
                .with_label("command-echo")
                .with_correlation_id(format!("actuator-{}", command.actuator_id))
        }
    };

    match dispatcher.submit(task) {
        Ok(_) => true,
        Err(err) => {
            stats.submit_failures += 1;
            warn!(frame = %frame, error = %err, "frame not dispatched");
            false
        }
    }
}

fn report_rejection(sinks: &SinkSet, stats: &mut GatewayStats, error: &DecodeError) {
    stats.rejected += 1;
    warn!(error = %error, "frame rejected");
    if let Err(err) = sinks.on_decode_error(error) {
        warn!(error = %err, "decode error sink failed");
    }
}
