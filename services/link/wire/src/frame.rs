//! Length-prefixed message framing.
//!
//! A frame is a big-endian `u32` length, a big-endian `u32` kind code and an
//! opaque body. The length counts every byte after itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::CodecError;

/// Maximum frame size (16 MiB default)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix plus kind code
pub const FRAME_HEADER_SIZE: usize = 8;

/// One framed message on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message kind code
    pub kind: u32,
    /// Encoded message body
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(kind: u32, body: Bytes) -> Self {
        Self { kind, body }
    }

    /// Get the total frame size when encoded
    pub fn encoded_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.body.len()
    }

    /// Append the encoded frame to `dst`
    pub fn encode(&self, max_frame_size: usize, dst: &mut BytesMut) -> Result<(), CodecError> {
        let total_size = self.encoded_size();
        if total_size > max_frame_size {
            return Err(CodecError::Size(total_size));
        }

        dst.reserve(total_size);
        // Frame length (everything after this u32)
        dst.put_u32((total_size - 4) as u32);
        dst.put_u32(self.kind);
        dst.put_slice(&self.body);
        Ok(())
    }
}

/// Frame decoder for parsing incoming frames
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a decoder with a custom size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Decode one frame from a buffer.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched until a whole frame has
    /// arrived; on success exactly that frame's bytes are consumed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        // Need at least 4 bytes for frame length
        if buf.len() < 4 {
            return Ok(None);
        }

        // Peek at frame length
        let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if frame_len > self.max_frame_size.saturating_sub(4) {
            return Err(CodecError::Size(frame_len.saturating_add(4)));
        }
        if frame_len < 4 {
            return Err(CodecError::Malformed);
        }

        // Check if we have the complete frame
        if buf.len() < 4 + frame_len {
            return Ok(None);
        }

        buf.advance(4);
        let mut frame_buf = buf.split_to(frame_len).freeze();
        let kind = frame_buf.get_u32();

        Ok(Some(Frame {
            kind,
            body: frame_buf,
        }))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let mut encoded = BytesMut::new();
        Frame::new(6, Bytes::from_static(b"{\"x\":1}"))
            .encode(DEFAULT_MAX_FRAME_SIZE, &mut encoded)
            .unwrap();

        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&encoded[..5]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&encoded[5..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.kind, 6);
        assert_eq!(&frame.body[..], b"{\"x\":1}");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let frame = Frame::new(1, Bytes::from(vec![0u8; 64]));
        let mut dst = BytesMut::new();
        assert!(matches!(frame.encode(32, &mut dst), Err(CodecError::Size(72))));

        let mut decoder = FrameDecoder::with_max_frame_size(32);
        let mut buf = BytesMut::new();
        buf.put_u32(1024);
        assert!(matches!(decoder.decode(&mut buf), Err(CodecError::Size(1028))));
    }

    #[test]
    fn test_max_length_prefix_rejected_without_overflow() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        buf.put_u32(u32::MAX);
        assert!(matches!(decoder.decode(&mut buf), Err(CodecError::Size(_))));
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_frame_without_kind_is_malformed() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_u16(0);
        assert!(matches!(decoder.decode(&mut buf), Err(CodecError::Malformed)));
    }
}
