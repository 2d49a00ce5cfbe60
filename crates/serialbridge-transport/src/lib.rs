//! Byte link abstraction for the serial bridge.
//!
//! [`SerialStream`] implements `Read + Write` over:
//! - a serial port opened with explicit line settings ([`SerialConfig`])
//! - a plain file (replay captures, or a device the OS already configured)
//! - a connected Unix socket pair (loopback for tests and simulators)
//!
//! This is the lowest layer of serialbridge. Everything else builds on top of
//! the [`SerialStream`] type provided here.

pub mod config;
pub mod error;
pub mod ports;
pub mod stream;

pub use config::{DataBits, FlowControl, Parity, SerialConfig, StopBits, DEFAULT_BAUD_RATE};
pub use error::{Result, TransportError};
pub use ports::{available_ports, PortInfo};
pub use stream::{is_serial_device, SerialStream};
