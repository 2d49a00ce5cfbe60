use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serialbridge_dispatch::LoadSnapshot;
use serialbridge_frame::{
    encode_command, encode_sensor, CommandKind, DecodeError, Frame, ReassemblerStats, SensorKind,
    StreamEvent,
};
use serialbridge_gateway::{CommandEcho, CommandLog, GatewayStats, SensorReading};
use serialbridge_transport::PortInfo;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One printable line of frame-level output.
#[derive(Serialize, Debug, PartialEq)]
struct FrameRow {
    event: &'static str,
    kind: &'static str,
    id: u8,
    type_code: u8,
    type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp_ms: Option<u64>,
}

impl FrameRow {
    fn from_frame(frame: &Frame) -> Self {
        match frame {
            Frame::Sensor(sensor) => {
                let kind = SensorKind::from_code(sensor.data_type);
                Self {
                    event: "frame",
                    kind: "sensor",
                    id: sensor.sensor_id,
                    type_code: sensor.data_type,
                    type_name: kind.to_string(),
                    value: Some(sensor.value),
                    unit: Some(kind.unit()),
                    timestamp_ms: None,
                }
            }
            Frame::Command(command) => Self {
                event: "frame",
                kind: "command",
                id: command.actuator_id,
                type_code: command.command_type,
                type_name: CommandKind::from_code(command.command_type).to_string(),
                value: None,
                unit: None,
                timestamp_ms: None,
            },
        }
    }

    fn from_reading(reading: &SensorReading) -> Self {
        Self {
            event: "reading",
            kind: "sensor",
            id: reading.sensor_id,
            type_code: reading.kind.code(),
            type_name: reading.kind.to_string(),
            value: Some(reading.value),
            unit: Some(reading.kind.unit()),
            timestamp_ms: Some(unix_millis(reading.received_at)),
        }
    }

    fn from_echo(echo: &CommandEcho) -> Self {
        Self {
            event: "echo",
            kind: "command",
            id: echo.actuator_id,
            type_code: echo.kind.code(),
            type_name: echo.kind.to_string(),
            value: None,
            unit: None,
            timestamp_ms: Some(unix_millis(echo.received_at)),
        }
    }

    fn value_text(&self) -> String {
        match (self.value, self.unit) {
            (Some(value), Some(unit)) => format!("{value}{unit}"),
            (Some(value), None) => value.to_string(),
            _ => "-".to_string(),
        }
    }
}

#[derive(Serialize)]
struct RejectedRow {
    event: &'static str,
    error: String,
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    kind: &'static str,
    len: usize,
    hex: String,
    bytes: &'a [u8],
}

#[derive(Serialize)]
struct CommandLogOutput<'a> {
    event: &'static str,
    actuator_id: u8,
    command: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    operator: Option<&'a str>,
    timestamp_ms: u64,
}

#[derive(Serialize, Debug, PartialEq)]
struct PortRow<'a> {
    name: &'a str,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    usb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl<'a> PortRow<'a> {
    fn from_port(port: &'a PortInfo) -> Self {
        let description = match (&port.manufacturer, &port.product) {
            (Some(manufacturer), Some(product)) => Some(format!("{manufacturer} {product}")),
            (Some(one), None) | (None, Some(one)) => Some(one.clone()),
            (None, None) => None,
        };
        Self {
            name: &port.name,
            kind: port.kind,
            usb_id: port.usb_id.map(|(vid, pid)| format!("{vid:04x}:{pid:04x}")),
            description,
        }
    }
}

/// End-of-run counters for `decode` and `listen --stats`.
#[derive(Serialize, Debug, Default)]
pub struct Summary {
    pub frames: u64,
    pub rejected: u64,
    pub checksum_failures: u64,
    pub bytes_skipped: u64,
    pub bytes_pending: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_failures: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadOutput>,
}

#[derive(Serialize, Debug)]
pub struct LoadOutput {
    pub active_tasks: u32,
    pub queue_depth: u32,
    pub total_submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub workers: u32,
}

impl Summary {
    pub fn from_reassembler(stats: ReassemblerStats, rejected: u64, bytes_pending: usize) -> Self {
        Self {
            frames: stats.frames_decoded,
            rejected,
            checksum_failures: stats.checksum_failures,
            bytes_skipped: stats.bytes_skipped,
            bytes_pending,
            ..Self::default()
        }
    }

    pub fn with_gateway(mut self, stats: &GatewayStats, load: &LoadSnapshot) -> Self {
        self.submit_failures = Some(stats.submit_failures);
        self.load = Some(LoadOutput {
            active_tasks: load.active_tasks,
            queue_depth: load.queue_depth,
            total_submitted: load.total_submitted,
            completed: load.completed,
            failed: load.failed,
            workers: load.workers,
        });
        self
    }
}

pub fn print_event(event: &StreamEvent, format: OutputFormat) {
    match event {
        StreamEvent::Frame(frame) => match format {
            OutputFormat::Raw => print_raw(&wire_bytes(frame)),
            _ => print_row(&FrameRow::from_frame(frame), format),
        },
        StreamEvent::Rejected(error) => print_rejected(error, format),
    }
}

pub fn print_reading(reading: &SensorReading, format: OutputFormat) {
    print_row(&FrameRow::from_reading(reading), format);
}

pub fn print_echo(echo: &CommandEcho, format: OutputFormat) {
    print_row(&FrameRow::from_echo(echo), format);
}

fn print_row(row: &FrameRow, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(row),
        OutputFormat::Table => {
            let mut table = new_table(vec!["EVENT", "KIND", "ID", "TYPE", "VALUE"]);
            table.add_row(vec![
                row.event.to_string(),
                row.kind.to_string(),
                row.id.to_string(),
                format!("{} (0x{:02X})", row.type_name, row.type_code),
                row.value_text(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "{} {} id={} type={} value={}",
                row.event,
                row.kind,
                row.id,
                row.type_name,
                row.value_text()
            );
        }
    }
}

fn print_rejected(error: &DecodeError, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&RejectedRow {
            event: "rejected",
            error: error.to_string(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["EVENT", "ERROR"]);
            table.add_row(vec!["rejected".to_string(), error.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("rejected: {error}"),
        // Raw output carries valid frames only.
        OutputFormat::Raw => {}
    }
}

pub fn print_encoded(frame: &Frame, bytes: &[u8], format: OutputFormat) {
    let kind = frame.kind().name();
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            kind,
            len: bytes.len(),
            hex: hex(bytes),
            bytes,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["KIND", "LEN", "BYTES"]);
            table.add_row(vec![kind.to_string(), bytes.len().to_string(), spaced_hex(bytes)]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", spaced_hex(bytes)),
        OutputFormat::Raw => print_raw(bytes),
    }
}

pub fn print_command_log(log: &CommandLog, format: OutputFormat) {
    let out = CommandLogOutput {
        event: "command",
        actuator_id: log.actuator_id,
        command: log.kind.to_string(),
        success: log.success,
        error: log.error.as_deref(),
        operator: log.operator.as_deref(),
        timestamp_ms: unix_millis(log.issued_at),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ACTUATOR", "COMMAND", "RESULT", "OPERATOR"]);
            table.add_row(vec![
                out.actuator_id.to_string(),
                out.command.clone(),
                result_text(&out),
                out.operator.unwrap_or("-").to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "actuator={} command={} result={}",
                out.actuator_id,
                out.command,
                result_text(&out)
            );
        }
    }
}

fn result_text(out: &CommandLogOutput<'_>) -> String {
    match (out.success, out.error) {
        (true, _) => "ok".to_string(),
        (false, Some(error)) => format!("failed: {error}"),
        (false, None) => "failed".to_string(),
    }
}

pub fn print_summary(summary: &Summary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COUNTER", "VALUE"]);
            for (name, value) in summary_pairs(summary) {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        // Raw stdout stays binary; counters go to stderr.
        OutputFormat::Raw => {
            for (name, value) in summary_pairs(summary) {
                eprintln!("{name}={value}");
            }
        }
        OutputFormat::Pretty => {
            for (name, value) in summary_pairs(summary) {
                println!("{name}={value}");
            }
        }
    }
}

fn summary_pairs(summary: &Summary) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("frames", summary.frames.to_string()),
        ("rejected", summary.rejected.to_string()),
        ("checksum_failures", summary.checksum_failures.to_string()),
        ("bytes_skipped", summary.bytes_skipped.to_string()),
        ("bytes_pending", summary.bytes_pending.to_string()),
    ];
    if let Some(submit_failures) = summary.submit_failures {
        pairs.push(("submit_failures", submit_failures.to_string()));
    }
    if let Some(load) = &summary.load {
        pairs.push(("tasks_submitted", load.total_submitted.to_string()));
        pairs.push(("tasks_completed", load.completed.to_string()));
        pairs.push(("tasks_failed", load.failed.to_string()));
        pairs.push(("tasks_active", load.active_tasks.to_string()));
        pairs.push(("queue_depth", load.queue_depth.to_string()));
    }
    pairs
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    let rows: Vec<PortRow<'_>> = ports.iter().map(PortRow::from_port).collect();
    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PORT", "TYPE", "USB ID", "DESCRIPTION"]);
            for row in &rows {
                table.add_row(vec![
                    row.name.to_string(),
                    row.kind.to_string(),
                    row.usb_id.clone().unwrap_or_else(|| "-".to_string()),
                    row.description.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &rows {
                println!("{}", row.name);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn wire_bytes(frame: &Frame) -> Vec<u8> {
    match frame {
        Frame::Sensor(sensor) => {
            encode_sensor(sensor.sensor_id, sensor.data_type, sensor.value).to_vec()
        }
        Frame::Command(command) => {
            encode_command(command.actuator_id, command.command_type).to_vec()
        }
    }
}

/// Contiguous upper-case hex, e.g. `AABB05`.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_row_joins_usb_details() {
        let port = PortInfo {
            name: "/dev/ttyUSB0".to_string(),
            kind: "usb",
            usb_id: Some((0x1a86, 0x7523)),
            manufacturer: Some("QinHeng".to_string()),
            product: Some("CH340".to_string()),
        };
        let row = PortRow::from_port(&port);
        assert_eq!(row.usb_id.as_deref(), Some("1a86:7523"));
        assert_eq!(row.description.as_deref(), Some("QinHeng CH340"));

        let bare = PortInfo {
            name: "/dev/ttyS0".to_string(),
            kind: "pci",
            usb_id: None,
            manufacturer: None,
            product: None,
        };
        let json = serde_json::to_string(&PortRow::from_port(&bare)).unwrap();
        assert_eq!(json, r#"{"name":"/dev/ttyS0","kind":"pci"}"#);
    }

    #[test]
    fn hex_formats_upper_case() {
        assert_eq!(hex(&[0xAA, 0x0B, 0x00]), "AA0B00");
        assert_eq!(spaced_hex(&[0xAA, 0x0B]), "AA 0B");
    }

    #[test]
    fn sensor_row_carries_unit() {
        let row = FrameRow::from_frame(&Frame::sensor(5, 0x01, 23.5));
        assert_eq!(row.kind, "sensor");
        assert_eq!(row.type_name, "Temperature");
        assert_eq!(row.value_text(), "23.5°C");
    }

    #[test]
    fn command_row_has_no_value() {
        let row = FrameRow::from_frame(&Frame::command(2, 0x01));
        assert_eq!(row.type_name, "ON");
        assert_eq!(row.value_text(), "-");
        let json = serde_json::to_string(&row).unwrap();
        assert!(!json.contains("value"));
    }

    #[test]
    fn wire_bytes_reencode_frame() {
        let frame = Frame::sensor(5, 0x01, 23.5);
        assert_eq!(
            wire_bytes(&frame),
            vec![0xAA, 0xBB, 0x05, 0x01, 0x41, 0xBC, 0x00, 0x00, 0xE8]
        );
    }

    #[test]
    fn summary_lists_load_when_present() {
        let summary = Summary::from_reassembler(ReassemblerStats::default(), 2, 3);
        let pairs = summary_pairs(&summary);
        assert!(pairs.contains(&("rejected", "2".to_string())));
        assert!(!pairs.iter().any(|(name, _)| *name == "tasks_submitted"));
    }
}
