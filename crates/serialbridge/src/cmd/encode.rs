use serialbridge_frame::{encode_command, encode_sensor, kinds, Frame};

use crate::cmd::{EncodeArgs, EncodeFrame};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let (frame, bytes) = match args.frame {
        EncodeFrame::Sensor(sensor) => (
            Frame::sensor(sensor.id, sensor.data_type, sensor.value),
            encode_sensor(sensor.id, sensor.data_type, sensor.value).to_vec(),
        ),
        EncodeFrame::Command(command) => (
            Frame::command(command.id, command.command.code()),
            encode_command(command.id, command.command.code()).to_vec(),
        ),
    };
    print_encoded(&frame, &bytes, format);
    Ok(SUCCESS)
}

/// Parse a sensor type name (`temperature`, `pressure`, `humidity`) or byte code.
pub fn parse_sensor_type(input: &str) -> Result<u8, String> {
    let trimmed = input.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "temperature" | "temp" => return Ok(kinds::TEMPERATURE),
        "pressure" => return Ok(kinds::PRESSURE),
        "humidity" => return Ok(kinds::HUMIDITY),
        _ => {}
    }
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => trimmed.parse::<u8>(),
    };
    parsed.map_err(|_| {
        format!("unknown sensor type: {input} (expected temperature, pressure, humidity or a byte code)")
    })
}
