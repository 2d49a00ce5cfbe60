use std::io::{ErrorKind, Read};
use std::time::Duration;

use serialbridge_transport::SerialStream;
use tracing::debug;

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reassembler::{Poll, Reassembler, ReassemblerStats, StreamEvent};

/// Reads frames from any `Read` byte link.
///
/// Handles partial reads and line noise internally. Callers get complete,
/// verified frames (or explicit rejections via [`read_event`](Self::read_event)).
pub struct FrameReader<T> {
    inner: T,
    reassembler: Reassembler,
    chunk: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            reassembler: Reassembler::with_config(&config),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            config,
        }
    }

    /// Read once from the link and append whatever arrived.
    ///
    /// Returns the number of bytes appended. EOF is reported as
    /// `FrameError::ConnectionClosed`; `WouldBlock`/`TimedOut` surface as
    /// `FrameError::Io` so the caller can check its own stop conditions.
    pub fn fill(&mut self) -> Result<usize> {
        loop {
            let read = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.reassembler.is_empty() {
                    debug!(
                        pending = self.reassembler.buffered(),
                        "link closed with undecoded bytes"
                    );
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.reassembler.append(&self.chunk[..read]);
            return Ok(read);
        }
    }

    /// Decode whatever is buffered without touching the link.
    pub fn poll(&mut self) -> Poll<'_> {
        self.reassembler.poll()
    }

    /// Read the next event (blocking).
    pub fn read_event(&mut self) -> Result<StreamEvent> {
        loop {
            if let Some(event) = self.reassembler.next_event() {
                return Ok(event);
            }
            self.fill()?;
        }
    }

    /// Read the next valid frame (blocking), skipping rejected candidates.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let StreamEvent::Frame(frame) = self.read_event()? {
                return Ok(frame);
            }
        }
    }

    /// Reassembly counters for this link.
    pub fn stats(&self) -> ReassemblerStats {
        self.reassembler.stats()
    }

    /// Bytes read but not yet consumed as a frame or skipped.
    pub fn buffered(&self) -> usize {
        self.reassembler.buffered()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Bytes still buffered in the reassembler are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<SerialStream> {
    /// Create a frame reader for `SerialStream` and apply a read timeout.
    pub fn with_read_timeout(
        mut inner: SerialStream,
        config: FrameConfig,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        inner
            .set_read_timeout(timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: serialbridge_transport::TransportError) -> FrameError {
    match err {
        serialbridge_transport::TransportError::Io(io) => FrameError::Io(io),
        serialbridge_transport::TransportError::Open { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
