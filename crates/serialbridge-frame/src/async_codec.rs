//! `tokio_util` codec for framing async byte links.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{Frame, FrameCodec, FrameConfig};
use crate::error::FrameError;
use crate::reassembler::{next_event, ReassemblerStats, StreamEvent};

/// Async counterpart of [`Reassembler`](crate::Reassembler) and
/// [`FrameWriter`](crate::FrameWriter) for `FramedRead`/`FramedWrite`.
///
/// The read buffer is owned by the `Framed*` wrapper; resynchronization
/// follows the same single-byte skip rules.
#[derive(Debug, Default)]
pub struct SerialCodec {
    codec: FrameCodec,
    stats: ReassemblerStats,
}

impl SerialCodec {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            stats: ReassemblerStats::default(),
        }
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self::new(config.codec())
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }
}

impl Decoder for SerialCodec {
    type Item = StreamEvent;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StreamEvent>, FrameError> {
        Ok(next_event(&self.codec, &mut self.stats, src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<StreamEvent>, FrameError> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        if !src.is_empty() {
            debug!(pending = src.len(), "link closed with undecoded bytes");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Frame> for SerialCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.codec.encode(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::{encode_command, encode_sensor, SENSOR_FRAME_LEN};
    use crate::error::DecodeError;

    #[test]
    fn decoder_matches_reassembler_rules() {
        let mut codec = SerialCodec::default();
        let mut corrupted = encode_sensor(1, 1, 1.0);
        corrupted[SENSOR_FRAME_LEN - 1] ^= 0x01;

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x00, 0x01]);
        buf.extend_from_slice(&corrupted);
        buf.extend_from_slice(&encode_command(2, 1));

        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(StreamEvent::Rejected(DecodeError::ChecksumMismatch { .. }))
        ));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(StreamEvent::Frame(Frame::command(2, 1)))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.stats().checksum_failures, 1);
    }

    #[test]
    fn decode_eof_discards_trailing_noise() {
        let mut codec = SerialCodec::default();
        let mut buf = BytesMut::from(&encode_sensor(1, 1, 1.0)[..5]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn framed_read_yields_events_in_stream_order() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_sensor(5, 1, 23.5));
        wire.extend_from_slice(&[0x42]);
        wire.extend_from_slice(&encode_command(6, 0));

        let mut framed = FramedRead::new(wire.as_slice(), SerialCodec::default());
        let mut frames = Vec::new();
        while let Some(event) = framed.next().await {
            if let StreamEvent::Frame(frame) = event.unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames, vec![Frame::sensor(5, 1, 23.5), Frame::command(6, 0)]);
    }

    #[tokio::test]
    async fn framed_write_encodes_frames() {
        let mut framed = FramedWrite::new(Vec::new(), SerialCodec::default());
        framed.send(Frame::command(1, 1)).await.unwrap();
        framed.send(Frame::sensor(2, 2, 7.0)).await.unwrap();

        let wire = framed.into_inner();
        let mut expected = encode_command(1, 1).to_vec();
        expected.extend_from_slice(&encode_sensor(2, 2, 7.0));
        assert_eq!(wire, expected);
    }
}
