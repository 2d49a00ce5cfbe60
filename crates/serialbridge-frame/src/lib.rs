//! Sensor/command frame codec and stream reassembly for serial links.
//!
//! This is the core value-add layer of serialbridge. Every frame on the wire is:
//! - A 2-byte marker selecting the variant (sensor `0xAABB`, command `0xCCDD`)
//! - A 1-byte id and a 1-byte type code
//! - A 4-byte big-endian `f32` payload (sensor frames only)
//! - A 1-byte XOR checksum over everything before it
//!
//! The [`Reassembler`] turns an arbitrary, possibly corrupted byte stream into
//! validated frames, resynchronizing one byte at a time after noise.

pub mod codec;
pub mod error;
pub mod kinds;
pub mod reader;
pub mod reassembler;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    checksum, decode, encode_command, encode_sensor, CommandFrame, Frame, FrameCodec, FrameConfig,
    FrameKind, Markers, SensorFrame, COMMAND_FRAME_LEN, COMMAND_MARKER, MARKER_LEN,
    SENSOR_FRAME_LEN, SENSOR_MARKER,
};
pub use error::{DecodeError, FrameError, Result};
pub use kinds::{CommandKind, SensorKind};
pub use reader::FrameReader;
pub use reassembler::{Poll, Reassembler, ReassemblerStats, StreamEvent};
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::SerialCodec;
