/// Why a candidate frame was rejected by [`decode`](crate::codec::decode).
///
/// None of these are fatal to a stream: the reassembler reports them and
/// resynchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// More bytes are needed before the frame can be decoded.
    #[error("frame too short ({available} bytes, need {needed})")]
    TooShort { needed: usize, available: usize },

    /// The trailing checksum byte does not match the recomputed XOR.
    #[error("checksum mismatch (computed 0x{expected:02X}, frame carries 0x{actual:02X})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The first two bytes match neither frame marker.
    #[error("unknown frame header 0x{}", hex_marker(.0))]
    UnknownHeader([u8; 2]),
}

/// Errors that can occur while configuring the codec or moving frames over a link.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The marker configuration cannot distinguish sensor and command frames.
    #[error("invalid frame markers: sensor and command markers are both 0x{}", hex_marker(.0))]
    InvalidMarkers([u8; 2]),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed by the other side.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

fn hex_marker(marker: &[u8; 2]) -> String {
    format!("{:02X}{:02X}", marker[0], marker[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render_marker_as_hex() {
        assert_eq!(
            DecodeError::UnknownHeader([0x12, 0xAB]).to_string(),
            "unknown frame header 0x12AB"
        );
        assert_eq!(
            FrameError::InvalidMarkers([0xAA, 0xBB]).to_string(),
            "invalid frame markers: sensor and command markers are both 0xAABB"
        );
    }

    #[test]
    fn checksum_message_shows_both_bytes() {
        let err = DecodeError::ChecksumMismatch {
            expected: 0xE8,
            actual: 0x00,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch (computed 0xE8, frame carries 0x00)"
        );
    }
}
