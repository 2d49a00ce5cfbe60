use std::iter::FusedIterator;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{Frame, FrameCodec, FrameConfig, DEFAULT_INITIAL_CAPACITY, MARKER_LEN};
use crate::error::DecodeError;

/// One step of reassembly output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEvent {
    /// A complete frame whose checksum verified.
    Frame(Frame),
    /// A frame candidate at the head of the buffer was rejected; one byte was
    /// dropped and scanning continues.
    Rejected(DecodeError),
}

impl StreamEvent {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            StreamEvent::Frame(frame) => Some(frame),
            StreamEvent::Rejected(_) => None,
        }
    }
}

/// Running totals of a reassembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Frames that decoded and verified.
    pub frames_decoded: u64,
    /// Frame candidates dropped for a bad checksum.
    pub checksum_failures: u64,
    /// Bytes discarded while resynchronizing (noise and rejected frame heads).
    pub bytes_skipped: u64,
}

/// Turns an unbounded byte stream into frames.
///
/// Not thread-safe by construction (`&mut self` everywhere): exactly one flow
/// appends and polls.
#[derive(Debug)]
pub struct Reassembler {
    codec: FrameCodec,
    buf: BytesMut,
    stats: ReassemblerStats,
}

impl Reassembler {
    /// Create a reassembler for the default markers.
    pub fn new() -> Self {
        Self::with_codec(FrameCodec::DEFAULT)
    }

    pub fn with_codec(codec: FrameCodec) -> Self {
        Self {
            codec,
            buf: BytesMut::with_capacity(DEFAULT_INITIAL_CAPACITY),
            stats: ReassemblerStats::default(),
        }
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            codec: config.codec(),
            buf: BytesMut::with_capacity(config.initial_capacity),
            stats: ReassemblerStats::default(),
        }
    }

    /// Append raw bytes from the link. Nothing is decoded until [`poll`](Self::poll).
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Decode as much of the buffer as possible, lazily.
    ///
    /// The returned iterator ends when the buffer is empty, holds a single
    /// byte, or holds an incomplete frame behind a known marker. Dropping it
    /// early leaves the remaining bytes for the next call.
    pub fn poll(&mut self) -> Poll<'_> {
        Poll { inner: self }
    }

    /// Produce the next event, if the buffer allows any progress.
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        next_event(&self.codec, &mut self.stats, &mut self.buf)
    }

    /// Number of bytes waiting to be decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discard all buffered bytes, e.g. after the link was reopened.
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!(discarded = self.buf.len(), "reassembly buffer reset");
        }
        self.buf.clear();
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy sequence of events produced by [`Reassembler::poll`].
pub struct Poll<'a> {
    inner: &'a mut Reassembler,
}

impl<'a> Poll<'a> {
    /// Skip rejections and yield only frames.
    pub fn frames(self) -> impl Iterator<Item = Frame> + 'a {
        self.filter_map(StreamEvent::into_frame)
    }
}

impl Iterator for Poll<'_> {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        self.inner.next_event()
    }
}

impl FusedIterator for Poll<'_> {}

/// Core resynchronizing scan over `buf`.
///
/// Every iteration either returns an event, drops at least one byte, or
/// stops, so a buffer without markers drains to fewer than `MARKER_LEN` bytes.
pub(crate) fn next_event(
    codec: &FrameCodec,
    stats: &mut ReassemblerStats,
    buf: &mut BytesMut,
) -> Option<StreamEvent> {
    loop {
        if buf.len() < MARKER_LEN {
            return None;
        }

        let header = [buf[0], buf[1]];
        let Some(kind) = codec.markers().classify(header) else {
            trace!(byte = buf[0], "no frame marker, skipping byte");
            buf.advance(1);
            stats.bytes_skipped += 1;
            continue;
        };

        let len = kind.wire_len();
        if buf.len() < len {
            // Known marker, frame still in flight.
            return None;
        }

        return match codec.decode(&buf[..len]) {
            Ok(frame) => {
                buf.advance(len);
                stats.frames_decoded += 1;
                Some(StreamEvent::Frame(frame))
            }
            Err(err) => {
                debug!(kind = kind.name(), error = %err, "rejected frame, resynchronizing");
                buf.advance(1);
                stats.bytes_skipped += 1;
                if matches!(err, DecodeError::ChecksumMismatch { .. }) {
                    stats.checksum_failures += 1;
                }
                Some(StreamEvent::Rejected(err))
            }
        };
    }
}
