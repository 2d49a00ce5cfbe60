//! Gateway between a serial link and downstream consumers.
//!
//! Inbound: bytes from the link go through a [`FrameReader`](serialbridge_frame::FrameReader);
//! every decoded frame becomes one dispatcher task that hands a domain event
//! to the configured [`Sink`]s. Outbound: [`CommandSender`] encodes actuator
//! commands and writes them from a dispatcher task, recording a
//! [`CommandLog`] for each attempt.

pub mod error;
pub mod gateway;
pub mod sender;
pub mod sink;

pub use error::{GatewayError, Result};
pub use gateway::{Gateway, GatewayStats};
pub use sender::CommandSender;
pub use sink::{CommandEcho, CommandLog, MemorySink, SensorReading, Sink, SinkSet};
