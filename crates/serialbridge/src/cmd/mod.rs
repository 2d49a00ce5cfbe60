use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialbridge_frame::CommandKind;
use serialbridge_transport::DEFAULT_BAUD_RATE;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod listen;
pub mod ports;
pub mod send;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a sensor or command frame and print its bytes.
    Encode(EncodeArgs),
    /// Decode captured bytes into frames.
    Decode(DecodeArgs),
    /// Read frames from a device and print readings.
    Listen(ListenArgs),
    /// Send one actuator command.
    Send(SendArgs),
    /// List serial ports on this machine.
    Ports(PortsArgs),
    /// Write random sensor readings to a device, like a sensor board would.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(subcommand)]
    pub frame: EncodeFrame,
}

#[derive(Subcommand, Debug)]
pub enum EncodeFrame {
    /// Sensor frame (9 bytes).
    Sensor(EncodeSensorArgs),
    /// Command frame (5 bytes).
    Command(EncodeCommandArgs),
}

#[derive(Args, Debug)]
pub struct EncodeSensorArgs {
    /// Sensor id (0-255).
    #[arg(long)]
    pub id: u8,
    /// Measurement type: temperature, pressure, humidity or a byte code.
    #[arg(long = "type", value_name = "TYPE", value_parser = encode::parse_sensor_type)]
    pub data_type: u8,
    /// Reading value.
    #[arg(long, allow_negative_numbers = true)]
    pub value: f32,
}

#[derive(Args, Debug)]
pub struct EncodeCommandArgs {
    /// Actuator id (0-255).
    #[arg(long)]
    pub id: u8,
    /// Command: on, off or a byte code.
    #[arg(long)]
    pub command: CommandKind,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex bytes (e.g. `AABB05` or `AA BB 05`); several arguments are concatenated.
    #[arg(value_name = "HEX", conflicts_with = "file", required_unless_present = "file")]
    pub hex: Vec<String>,
    /// Read raw bytes from a capture file.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// Print reassembly counters after the frames.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Device node or capture file to read.
    #[arg(env = "SERIALBRIDGE_DEVICE")]
    pub device: PathBuf,
    /// Exit after N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Sample dispatcher load while running and print counters on exit.
    #[arg(long)]
    pub stats: bool,
    /// Load sampling interval when --stats is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub stats_interval: String,
    /// Maximum sink workers. Output order follows the link only with 1.
    #[arg(long, default_value = "1")]
    pub workers: usize,
    /// Read timeout for serial ports and sockets (e.g. 200ms).
    #[arg(long, default_value = "200ms")]
    pub read_timeout: String,
    /// Baud rate when DEVICE is a serial port (8N1).
    #[arg(
        long,
        default_value_t = DEFAULT_BAUD_RATE,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device node to write to.
    #[arg(env = "SERIALBRIDGE_DEVICE")]
    pub device: PathBuf,
    /// Actuator id (0-255).
    #[arg(long)]
    pub actuator: u8,
    /// Command: on, off or a byte code.
    #[arg(long)]
    pub command: CommandKind,
    /// Operator recorded in the command log.
    #[arg(long)]
    pub operator: Option<String>,
    /// Maximum time to wait for the write (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Baud rate when DEVICE is a serial port (8N1).
    #[arg(
        long,
        default_value_t = DEFAULT_BAUD_RATE,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct PortsArgs {
    /// Only list USB adapters.
    #[arg(long)]
    pub usb: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Device node or file to write frames to.
    #[arg(env = "SERIALBRIDGE_DEVICE")]
    pub device: PathBuf,
    /// Stop after N frames (default: until Ctrl-C).
    #[arg(long)]
    pub count: Option<u64>,
    /// Delay between frames (e.g. 2s, 100ms).
    #[arg(long, default_value = "2s")]
    pub interval: String,
    /// Seed for a repeatable sequence of readings.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Baud rate when DEVICE is a serial port (8N1).
    #[arg(
        long,
        default_value_t = DEFAULT_BAUD_RATE,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
