//! Length-prefixed message framing.
//!
//! Frame format: `[4-byte length (little-endian)][payload]`. There is no magic
//! number, checksum or version field; frames are delimited by the prefix only.

use crate::error::TransportError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload the prefix can describe.
pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;

/// Upper bound on how much space is reserved up front for a partial frame.
const RESERVE_LIMIT: usize = 64 * 1024;

/// Length-prefixed framing codec.
///
/// Usable directly on a [`BytesMut`] (see [`FrameAccumulator`]) or through
/// `tokio_util::codec::Framed` on any async stream.
#[derive(Debug, Clone, Copy)]
pub struct SizedFrameCodec {
    max_frame_size: usize,
}

impl SizedFrameCodec {
    /// Creates a new frame codec with the specified maximum frame size.
    ///
    /// Values above [`MAX_FRAME_SIZE`] are clamped to it.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(MAX_FRAME_SIZE),
        }
    }

    /// Returns the maximum frame size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encodes `payload` into a freshly allocated frame.
    ///
    /// # Errors
    /// Returns `TransportError::FrameTooLarge` if the payload exceeds the limit.
    pub fn encode_frame(&mut self, payload: &[u8]) -> Result<BytesMut, TransportError> {
        let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
        self.encode(payload, &mut frame)?;
        Ok(frame)
    }
}

impl Default for SizedFrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for SizedFrameCodec {
    type Item = BytesMut;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let length = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > self.max_frame_size {
            return Err(TransportError::frame_too_large(length, self.max_frame_size));
        }

        let Some(total) = LENGTH_PREFIX_SIZE.checked_add(length) else {
            return Err(TransportError::frame_too_large(length, self.max_frame_size));
        };
        if src.len() < total {
            // The prefix stays buffered until the rest of the payload arrives.
            src.reserve((total - src.len()).min(RESERVE_LIMIT));
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(length)))
    }
}

impl Encoder<&[u8]> for SizedFrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(TransportError::frame_too_large(
                item.len(),
                self.max_frame_size,
            ));
        }

        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        dst.put_u32_le(item.len() as u32);
        dst.put_slice(item);

        Ok(())
    }
}

impl Encoder<Bytes> for SizedFrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&[u8]>>::encode(self, &item, dst)
    }
}

impl Encoder<Vec<u8>> for SizedFrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&[u8]>>::encode(self, &item, dst)
    }
}

/// Inbound byte accumulator.
///
/// Raw chunks are appended at the back as they arrive; complete frames are
/// consumed from the front in arrival order. A partial frame is never
/// consumed, so extraction can be retried after more bytes arrive.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buffer: BytesMut,
    codec: SizedFrameCodec,
}

impl FrameAccumulator {
    /// Creates an empty accumulator with no frame size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty accumulator that rejects frames above `max_frame_size`.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            codec: SizedFrameCodec::new(max_frame_size),
        }
    }

    /// Appends a received chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Removes and returns the next complete frame payload.
    ///
    /// Returns `Ok(None)` while fewer than a full frame's bytes are buffered.
    ///
    /// # Errors
    /// Returns `TransportError::FrameTooLarge` if the buffered prefix announces
    /// a payload above the configured limit. The offending bytes stay buffered.
    pub fn try_next_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.codec.decode(&mut self.buffer)?.map(BytesMut::freeze))
    }

    /// Number of buffered, not yet consumed bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discards everything buffered, including any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_encode_decode() {
        let mut codec = SizedFrameCodec::default();
        let mut buf = BytesMut::new();

        let data = b"Hello, redial!";
        codec.encode(data.as_slice(), &mut buf).unwrap();
        assert_eq!(buf.len(), 4 + data.len());

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], data);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_writes_little_endian_prefix() {
        let mut codec = SizedFrameCodec::default();
        let frame = codec.encode_frame(b"A").unwrap();
        assert_eq!(&frame[..], &[0x01, 0x00, 0x00, 0x00, 0x41]);
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = SizedFrameCodec::new(1024);
        let mut buf = BytesMut::new();

        buf.put_u8(10);
        buf.put_u8(0);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.put_u8(0);
        buf.put_u8(0);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);

        buf.put_slice(&[7u8; 10]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], &[7u8; 10]);
    }

    #[test]
    fn test_frame_too_large() {
        let mut codec = SizedFrameCodec::new(100);
        let mut buf = BytesMut::new();
        buf.put_u32_le(200);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            TransportError::FrameTooLarge { size: 200, max: 100 }
        ));
    }

    #[test]
    fn test_encode_too_large() {
        let mut codec = SizedFrameCodec::new(10);
        let mut buf = BytesMut::new();

        let result = codec.encode([0u8; 20].as_slice(), &mut buf);
        assert!(result.is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_max_frame_size_is_clamped() {
        let codec = SizedFrameCodec::new(usize::MAX);
        assert_eq!(codec.max_frame_size(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_largest_length_prefix() {
        let mut codec = SizedFrameCodec::default();
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00][..]);

        // Waits for the payload where the total fits in usize, rejects it otherwise.
        match codec.decode(&mut buf) {
            Ok(None) => assert_eq!(buf.len(), 5),
            Err(TransportError::FrameTooLarge { size, .. }) => assert_eq!(size, u32::MAX as usize),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn test_zero_length_frame() {
        let mut acc = FrameAccumulator::new();
        acc.extend(&[0, 0, 0, 0]);

        let payload = acc.try_next_frame().unwrap().unwrap();
        assert!(payload.is_empty());
        assert!(acc.is_empty());
    }

    #[test]
    fn test_accumulator_single_byte_chunks() {
        let payload = b"split across many reads";
        let wire = frame(payload);
        let mut acc = FrameAccumulator::new();

        for (i, byte) in wire.iter().enumerate() {
            acc.extend(std::slice::from_ref(byte));
            if i + 1 < wire.len() {
                assert!(acc.try_next_frame().unwrap().is_none());
                assert_eq!(acc.len(), i + 1);
            }
        }

        assert_eq!(&acc.try_next_frame().unwrap().unwrap()[..], payload);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_accumulator_partial_then_complete() {
        let wire = frame(b"partial delivery");
        let mut acc = FrameAccumulator::new();

        acc.extend(&wire[..7]);
        for _ in 0..3 {
            assert!(acc.try_next_frame().unwrap().is_none());
        }
        assert_eq!(acc.len(), 7);

        acc.extend(&wire[7..]);
        assert_eq!(
            &acc.try_next_frame().unwrap().unwrap()[..],
            b"partial delivery"
        );
        assert!(acc.try_next_frame().unwrap().is_none());
    }

    #[test]
    fn test_accumulator_preserves_order() {
        let payloads: [&[u8]; 4] = [b"first", b"second", b"x", b"fourth frame"];
        let wire: Vec<u8> = payloads.iter().flat_map(|p| frame(p)).collect();

        let mut acc = FrameAccumulator::new();
        for chunk in wire.chunks(3) {
            acc.extend(chunk);
        }

        for expected in payloads {
            assert_eq!(&acc.try_next_frame().unwrap().unwrap()[..], expected);
        }
        assert!(acc.try_next_frame().unwrap().is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn test_accumulator_frame_then_trailing_partial() {
        let mut wire = frame(b"done");
        wire.extend_from_slice(&frame(b"pending")[..6]);

        let mut acc = FrameAccumulator::new();
        acc.extend(&wire);

        assert_eq!(&acc.try_next_frame().unwrap().unwrap()[..], b"done");
        assert!(acc.try_next_frame().unwrap().is_none());
        assert_eq!(acc.len(), 6);
    }

    #[test]
    fn test_accumulator_limit_keeps_bytes() {
        let mut acc = FrameAccumulator::with_max_frame_size(4);
        acc.extend(&frame(b"too long"));

        assert!(acc.try_next_frame().is_err());
        assert_eq!(acc.len(), 12);
    }

    #[test]
    fn test_accumulator_clear() {
        let mut acc = FrameAccumulator::new();
        acc.extend(&frame(b"abc")[..5]);
        acc.clear();
        assert!(acc.is_empty());
        assert!(acc.try_next_frame().unwrap().is_none());
    }
}
