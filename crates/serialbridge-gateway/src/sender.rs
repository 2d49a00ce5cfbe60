use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serialbridge_dispatch::{Dispatcher, Task, TaskId};
use serialbridge_frame::{CommandKind, FrameConfig, FrameWriter};
use tracing::{info, warn};

use crate::error::Result;
use crate::sink::{CommandLog, Sink, SinkSet};

/// Sends actuator commands through the dispatcher.
///
/// `send` returns as soon as the command is queued. The write happens on a
/// worker; its outcome is reported to the sinks as a [`CommandLog`], never to
/// the caller. Clones share the same writer.
pub struct CommandSender<W> {
    writer: Arc<Mutex<FrameWriter<W>>>,
    dispatcher: Arc<Dispatcher>,
    sinks: SinkSet,
}

impl<W: Write + Send + 'static> CommandSender<W> {
    pub fn new(inner: W, dispatcher: Arc<Dispatcher>, sinks: SinkSet) -> Self {
        Self::with_config(inner, &FrameConfig::default(), dispatcher, sinks)
    }

    pub fn with_config(
        inner: W,
        config: &FrameConfig,
        dispatcher: Arc<Dispatcher>,
        sinks: SinkSet,
    ) -> Self {
        Self {
            writer: Arc::new(Mutex::new(FrameWriter::with_config(inner, config))),
            dispatcher,
            sinks,
        }
    }

    /// Queue one command for `actuator_id`.
    pub fn send(
        &self,
        actuator_id: u8,
        kind: CommandKind,
        operator: Option<&str>,
    ) -> Result<TaskId> {
        let writer = Arc::clone(&self.writer);
        let sinks = self.sinks.clone();
        let operator = operator.map(str::to_owned);

        let task = Task::new(move || {
            let issued_at = SystemTime::now();
            let outcome = writer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send_command(actuator_id, kind);

            match &outcome {
                Ok(bytes) => info!(actuator_id, command = %kind, bytes, "command sent"),
                Err(err) => warn!(actuator_id, command = %kind, error = %err, "command failed"),
            }

            let log = CommandLog {
                actuator_id,
                kind,
                success: outcome.is_ok(),
                error: outcome.as_ref().err().map(ToString::to_string),
                issued_at,
                operator,
            };
            let recorded = sinks.on_command_sent(&log);
            outcome?;
            recorded
        })
        .with_label("command")
        .with_correlation_id(format!("actuator-{actuator_id}"));

        Ok(self.dispatcher.submit(task)?)
    }

    /// Run `f` with exclusive access to the writer.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut FrameWriter<W>) -> R) -> R {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut writer)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl<W> Clone for CommandSender<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            dispatcher: Arc::clone(&self.dispatcher),
            sinks: self.sinks.clone(),
        }
    }
}

impl<W> std::fmt::Debug for CommandSender<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender")
            .field("sinks", &self.sinks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use serialbridge_dispatch::DispatcherConfig;
    use serialbridge_frame::encode_command;

    use super::*;
    use crate::sink::MemorySink;

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(DispatcherConfig::default().with_max_workers(1)).unwrap())
    }

    #[test]
    fn send_writes_frame_and_logs() {
        let memory = Arc::new(MemorySink::new());
        let sender = CommandSender::new(
            Cursor::new(Vec::new()),
            dispatcher(),
            SinkSet::new().with(memory.clone() as Arc<dyn Sink>),
        );

        sender.send(3, CommandKind::On, Some("alice")).unwrap();
        sender.send(3, CommandKind::Off, None).unwrap();
        assert!(!sender.dispatcher().shutdown(Duration::from_secs(5)).timed_out);

        let wire = sender.with_writer(|w| w.get_ref().get_ref().clone());
        let mut expected = encode_command(3, 1).to_vec();
        expected.extend_from_slice(&encode_command(3, 0));
        assert_eq!(wire, expected);

        let logs = memory.commands();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log.success && log.error.is_none()));
        assert_eq!(logs[0].operator.as_deref(), Some("alice"));
        assert_eq!(logs[1].kind, CommandKind::Off);
    }

    #[test]
    fn write_failure_is_logged_not_returned() {
        struct Unplugged;

        impl Write for Unplugged {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let memory = Arc::new(MemorySink::new());
        let sender = CommandSender::new(
            Unplugged,
            dispatcher(),
            SinkSet::new().with(memory.clone() as Arc<dyn Sink>),
        );

        assert!(sender.send(9, CommandKind::On, None).is_ok());
        sender.dispatcher().shutdown(Duration::from_secs(5));

        let logs = memory.commands();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].success);
        assert!(logs[0].error.is_some());
        assert_eq!(sender.dispatcher().snapshot().failed, 1);
    }

    #[test]
    fn send_after_shutdown_is_refused() {
        let sender = CommandSender::new(Cursor::new(Vec::new()), dispatcher(), SinkSet::new());
        sender.dispatcher().shutdown(Duration::from_secs(1));
        assert!(matches!(
            sender.send(1, CommandKind::On, None),
            Err(crate::GatewayError::Dispatch(_))
        ));
    }
}
