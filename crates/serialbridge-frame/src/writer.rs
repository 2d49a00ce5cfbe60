use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{Frame, FrameCodec, FrameConfig, SENSOR_FRAME_LEN};
use crate::error::{FrameError, Result};
use crate::kinds::CommandKind;

/// Writes complete frames to any `Write` byte link.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    codec: FrameCodec,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: &FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(SENSOR_FRAME_LEN),
            codec: config.codec(),
        }
    }

    /// Write a complete frame (blocking) and flush.
    ///
    /// Returns the number of bytes written, which is always the frame's wire size.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
        self.buf.clear();
        self.codec.encode(frame, &mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        Ok(offset)
    }

    /// Encode and send an actuator command.
    pub fn send_command(&mut self, actuator_id: u8, command: CommandKind) -> Result<usize> {
        self.write_frame(&Frame::command(actuator_id, command.code()))
    }

    /// Encode and send a sensor reading.
    pub fn send_sensor(&mut self, sensor_id: u8, data_type: u8, value: f32) -> Result<usize> {
        self.write_frame(&Frame::sensor(sensor_id, data_type, value))
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }
}
