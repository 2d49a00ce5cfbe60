use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeError, FrameError, Result};

/// Every frame starts with a 2-byte marker.
pub const MARKER_LEN: usize = 2;

/// Marker of sensor frames: 0xAA 0xBB.
pub const SENSOR_MARKER: [u8; 2] = [0xAA, 0xBB];

/// Marker of command frames: 0xCC 0xDD.
pub const COMMAND_MARKER: [u8; 2] = [0xCC, 0xDD];

/// Sensor frame: marker (2) + id (1) + type (1) + value (4) + checksum (1).
pub const SENSOR_FRAME_LEN: usize = 9;

/// Command frame: marker (2) + id (1) + type (1) + checksum (1).
pub const COMMAND_FRAME_LEN: usize = 5;

/// Default number of bytes requested from the link per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Default reassembly buffer capacity.
pub const DEFAULT_INITIAL_CAPACITY: usize = 4 * 1024;

/// A sensor reading as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    pub sensor_id: u8,
    pub data_type: u8,
    pub value: f32,
}

/// An actuator command (or its echo) as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    pub actuator_id: u8,
    pub command_type: u8,
}

/// One complete, validated protocol unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Sensor(SensorFrame),
    Command(CommandFrame),
}

impl Frame {
    /// Create a sensor frame.
    pub fn sensor(sensor_id: u8, data_type: u8, value: f32) -> Self {
        Self::Sensor(SensorFrame {
            sensor_id,
            data_type,
            value,
        })
    }

    /// Create a command frame.
    pub fn command(actuator_id: u8, command_type: u8) -> Self {
        Self::Command(CommandFrame {
            actuator_id,
            command_type,
        })
    }

    /// Which variant this frame is.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Sensor(_) => FrameKind::Sensor,
            Frame::Command(_) => FrameKind::Command,
        }
    }

    /// The total wire size of this frame, checksum included.
    pub fn wire_size(&self) -> usize {
        self.kind().wire_len()
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Sensor(s) => write!(
                f,
                "sensor frame [id 0x{:02X}, type 0x{:02X}, value {}]",
                s.sensor_id, s.data_type, s.value
            ),
            Frame::Command(c) => write!(
                f,
                "command frame [id 0x{:02X}, type 0x{:02X}]",
                c.actuator_id, c.command_type
            ),
        }
    }
}

/// Frame variant selected by a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Sensor,
    Command,
}

impl FrameKind {
    /// Wire length of frames of this kind.
    pub const fn wire_len(self) -> usize {
        match self {
            FrameKind::Sensor => SENSOR_FRAME_LEN,
            FrameKind::Command => COMMAND_FRAME_LEN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameKind::Sensor => "sensor",
            FrameKind::Command => "command",
        }
    }
}

/// The pair of markers that identify frame variants on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Markers {
    sensor: [u8; 2],
    command: [u8; 2],
}

impl Markers {
    /// Markers used by the field firmware.
    pub const DEFAULT: Markers = Markers {
        sensor: SENSOR_MARKER,
        command: COMMAND_MARKER,
    };

    /// Build a custom marker pair.
    ///
    /// Fails when both markers are equal, since the variant (and so the frame
    /// length) could not be told apart.
    pub fn new(sensor: [u8; 2], command: [u8; 2]) -> Result<Self> {
        if sensor == command {
            return Err(FrameError::InvalidMarkers(sensor));
        }
        Ok(Self { sensor, command })
    }

    pub fn sensor(&self) -> [u8; 2] {
        self.sensor
    }

    pub fn command(&self) -> [u8; 2] {
        self.command
    }

    /// Marker written in front of frames of `kind`.
    pub fn marker(&self, kind: FrameKind) -> [u8; 2] {
        match kind {
            FrameKind::Sensor => self.sensor,
            FrameKind::Command => self.command,
        }
    }

    /// Frame variant announced by a 2-byte header, if any.
    pub fn classify(&self, header: [u8; 2]) -> Option<FrameKind> {
        if header == self.sensor {
            Some(FrameKind::Sensor)
        } else if header == self.command {
            Some(FrameKind::Command)
        } else {
            None
        }
    }
}

impl Default for Markers {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// XOR of all bytes, the checksum carried in the last byte of every frame.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Encoder/decoder bound to a marker pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCodec {
    markers: Markers,
}

impl FrameCodec {
    /// Codec using the default markers.
    pub const DEFAULT: FrameCodec = FrameCodec::new(Markers::DEFAULT);

    pub const fn new(markers: Markers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Encode a sensor frame.
    ///
    /// Wire format:
    /// ```text
    /// ┌─────────────┬────────┬──────────┬──────────────┬──────────┐
    /// │ Marker (2B) │ Id (1) │ Type (1) │ Value (4B BE)│ XOR (1B) │
    /// │ 0xAA 0xBB   │        │          │ IEEE-754 f32 │          │
    /// └─────────────┴────────┴──────────┴──────────────┴──────────┘
    /// ```
    pub fn encode_sensor(
        &self,
        sensor_id: u8,
        data_type: u8,
        value: f32,
    ) -> [u8; SENSOR_FRAME_LEN] {
        let mut out = [0u8; SENSOR_FRAME_LEN];
        let mut dst = &mut out[..];
        dst.put_slice(&self.markers.sensor);
        dst.put_u8(sensor_id);
        dst.put_u8(data_type);
        dst.put_f32(value);
        out[SENSOR_FRAME_LEN - 1] = checksum(&out[..SENSOR_FRAME_LEN - 1]);
        out
    }

    /// Encode a command frame.
    ///
    /// Wire format:
    /// ```text
    /// ┌─────────────┬────────┬──────────┬──────────┐
    /// │ Marker (2B) │ Id (1) │ Type (1) │ XOR (1B) │
    /// │ 0xCC 0xDD   │        │          │          │
    /// └─────────────┴────────┴──────────┴──────────┘
    /// ```
    pub fn encode_command(&self, actuator_id: u8, command_type: u8) -> [u8; COMMAND_FRAME_LEN] {
        let mut out = [0u8; COMMAND_FRAME_LEN];
        let mut dst = &mut out[..];
        dst.put_slice(&self.markers.command);
        dst.put_u8(actuator_id);
        dst.put_u8(command_type);
        out[COMMAND_FRAME_LEN - 1] = checksum(&out[..COMMAND_FRAME_LEN - 1]);
        out
    }

    /// Append the wire form of `frame` to `dst`.
    pub fn encode(&self, frame: &Frame, dst: &mut BytesMut) {
        dst.reserve(frame.wire_size());
        match frame {
            Frame::Sensor(s) => {
                dst.put_slice(&self.encode_sensor(s.sensor_id, s.data_type, s.value))
            }
            Frame::Command(c) => {
                dst.put_slice(&self.encode_command(c.actuator_id, c.command_type))
            }
        }
    }

    /// Decode the frame at the start of `bytes`.
    ///
    /// Bytes past the frame's wire length are ignored.
    pub fn decode(&self, bytes: &[u8]) -> std::result::Result<Frame, DecodeError> {
        if bytes.len() < MARKER_LEN {
            return Err(DecodeError::TooShort {
                needed: MARKER_LEN,
                available: bytes.len(),
            });
        }

        let header = [bytes[0], bytes[1]];
        let kind = self
            .markers
            .classify(header)
            .ok_or(DecodeError::UnknownHeader(header))?;

        let len = kind.wire_len();
        if bytes.len() < len {
            return Err(DecodeError::TooShort {
                needed: len,
                available: bytes.len(),
            });
        }

        let expected = checksum(&bytes[..len - 1]);
        let actual = bytes[len - 1];
        if expected != actual {
            return Err(DecodeError::ChecksumMismatch { expected, actual });
        }

        let mut body = &bytes[MARKER_LEN..len - 1];
        let id = body.get_u8();
        let code = body.get_u8();
        Ok(match kind {
            FrameKind::Sensor => Frame::sensor(id, code, body.get_f32()),
            FrameKind::Command => Frame::command(id, code),
        })
    }
}

/// Encode a sensor frame with the default markers.
pub fn encode_sensor(sensor_id: u8, data_type: u8, value: f32) -> [u8; SENSOR_FRAME_LEN] {
    FrameCodec::DEFAULT.encode_sensor(sensor_id, data_type, value)
}

/// Encode a command frame with the default markers.
pub fn encode_command(actuator_id: u8, command_type: u8) -> [u8; COMMAND_FRAME_LEN] {
    FrameCodec::DEFAULT.encode_command(actuator_id, command_type)
}

/// Decode a frame with the default markers.
pub fn decode(bytes: &[u8]) -> std::result::Result<Frame, DecodeError> {
    FrameCodec::DEFAULT.decode(bytes)
}

/// Configuration for the frame layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Marker pair identifying frame variants.
    pub markers: Markers,
    /// Bytes requested from the link per read. Default: 1 KiB.
    pub read_chunk_size: usize,
    /// Initial reassembly buffer capacity. Default: 4 KiB.
    pub initial_capacity: usize,
}

impl FrameConfig {
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.markers)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            markers: Markers::DEFAULT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_temperature_reading_bit_exact() {
        let bytes = encode_sensor(5, 1, 23.5);
        let chk: u8 = 0xAA ^ 0xBB ^ 0x05 ^ 0x01 ^ 0x41 ^ 0xBC ^ 0x00 ^ 0x00;
        assert_eq!(chk, 0xE8);
        assert_eq!(bytes, [0xAA, 0xBB, 0x05, 0x01, 0x41, 0xBC, 0x00, 0x00, chk]);

        let frame = decode(&bytes).unwrap();
        assert_eq!(frame, Frame::sensor(5, 1, 23.5));
    }

    #[test]
    fn encodes_command_bit_exact() {
        let bytes = encode_command(3, 1);
        assert_eq!(bytes, [0xCC, 0xDD, 0x03, 0x01, 0xCC ^ 0xDD ^ 0x03 ^ 0x01]);
        assert_eq!(decode(&bytes).unwrap(), Frame::command(3, 1));
    }

    #[test]
    fn sensor_roundtrip_preserves_values() {
        let values = [0.0f32, -0.0, 1.0, -273.15, 1013.25, f32::MIN, f32::MAX, f32::EPSILON];
        for (i, value) in values.into_iter().enumerate() {
            let id = i as u8 * 31;
            let bytes = encode_sensor(id, 0xFF - id, value);
            match decode(&bytes).unwrap() {
                Frame::Sensor(s) => {
                    assert_eq!(s.sensor_id, id);
                    assert_eq!(s.data_type, 0xFF - id);
                    assert_eq!(s.value.to_bits(), value.to_bits());
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[test]
    fn nan_and_infinity_survive_as_bits() {
        for value in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let bytes = encode_sensor(1, 2, value);
            let Frame::Sensor(s) = decode(&bytes).unwrap() else {
                panic!("expected sensor frame");
            };
            assert_eq!(s.value.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn command_roundtrip_covers_full_id_range() {
        for id in [0u8, 1, 0x7F, 0x80, 0xFE, 0xFF] {
            for ty in [0u8, 1, 0xFF] {
                assert_eq!(
                    decode(&encode_command(id, ty)).unwrap(),
                    Frame::command(id, ty)
                );
            }
        }
    }

    #[test]
    fn any_body_bit_flip_is_a_checksum_mismatch() {
        let frames: [&[u8]; 2] = [&encode_sensor(7, 2, 101.3), &encode_command(9, 0)];
        for original in frames {
            for index in MARKER_LEN..original.len() {
                for bit in 0..8 {
                    let mut corrupted = original.to_vec();
                    corrupted[index] ^= 1 << bit;
                    assert!(
                        matches!(
                            decode(&corrupted),
                            Err(DecodeError::ChecksumMismatch { .. })
                        ),
                        "byte {index} bit {bit} was not detected"
                    );
                }
            }
        }
    }

    #[test]
    fn marker_bit_flip_is_an_unknown_header() {
        let original = encode_sensor(7, 2, 101.3);
        for index in 0..MARKER_LEN {
            for bit in 0..8 {
                let mut corrupted = original.to_vec();
                corrupted[index] ^= 1 << bit;
                assert!(matches!(
                    decode(&corrupted),
                    Err(DecodeError::UnknownHeader(_))
                ));
            }
        }
    }

    #[test]
    fn decode_reports_too_short() {
        assert_eq!(
            decode(&[0xAA]),
            Err(DecodeError::TooShort {
                needed: MARKER_LEN,
                available: 1
            })
        );

        let bytes = encode_sensor(1, 1, 1.0);
        assert_eq!(
            decode(&bytes[..6]),
            Err(DecodeError::TooShort {
                needed: SENSOR_FRAME_LEN,
                available: 6
            })
        );

        let bytes = encode_command(1, 1);
        assert_eq!(
            decode(&bytes[..4]),
            Err(DecodeError::TooShort {
                needed: COMMAND_FRAME_LEN,
                available: 4
            })
        );
    }

    #[test]
    fn decode_rejects_unknown_header() {
        assert_eq!(
            decode(&[0x00, 0x01, 0x02, 0x03, 0x04]),
            Err(DecodeError::UnknownHeader([0x00, 0x01]))
        );
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut bytes = encode_command(4, 0).to_vec();
        bytes.extend_from_slice(&[0xDE, 0xAD]);
        assert_eq!(decode(&bytes).unwrap(), Frame::command(4, 0));
    }

    #[test]
    fn checksum_is_order_independent_xor() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x0F, 0xF0]), 0xFF);
        assert_eq!(checksum(&[0xF0, 0x0F]), 0xFF);
        assert_eq!(checksum(&[0x55, 0x55]), 0);
    }

    #[test]
    fn identical_markers_are_rejected() {
        let err = Markers::new([0x01, 0x02], [0x01, 0x02]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMarkers([0x01, 0x02])));
    }

    #[test]
    fn custom_markers_drive_encode_and_decode() {
        let codec = FrameCodec::new(Markers::new([0x10, 0x20], [0x30, 0x40]).unwrap());
        let bytes = codec.encode_sensor(1, 3, 55.0);
        assert_eq!(&bytes[..2], &[0x10, 0x20]);
        assert_eq!(codec.decode(&bytes).unwrap(), Frame::sensor(1, 3, 55.0));

        // The default codec does not know these markers.
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::UnknownHeader([0x10, 0x20]))
        );
    }

    #[test]
    fn encode_appends_to_buffer() {
        let mut buf = BytesMut::new();
        FrameCodec::DEFAULT.encode(&Frame::sensor(5, 1, 23.5), &mut buf);
        FrameCodec::DEFAULT.encode(&Frame::command(2, 0), &mut buf);

        assert_eq!(buf.len(), SENSOR_FRAME_LEN + COMMAND_FRAME_LEN);
        assert_eq!(decode(&buf).unwrap(), Frame::sensor(5, 1, 23.5));
        assert_eq!(
            decode(&buf[SENSOR_FRAME_LEN..]).unwrap(),
            Frame::command(2, 0)
        );
    }

    #[test]
    fn frame_wire_size_and_display() {
        let frame = Frame::sensor(5, 1, 23.5);
        assert_eq!(frame.wire_size(), SENSOR_FRAME_LEN);
        assert_eq!(
            frame.to_string(),
            "sensor frame [id 0x05, type 0x01, value 23.5]"
        );
        assert_eq!(Frame::command(1, 0).wire_size(), COMMAND_FRAME_LEN);
    }
}
