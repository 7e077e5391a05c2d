//! Pluggable message codecs.
//!
//! The session layer only sees the [`Codec`] trait and the [`CodecFactory`]
//! construction hook, so the wire format can be replaced without touching
//! connection handling. [`JsonCodec`] is the default implementation.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::frame::{Frame, FrameDecoder, DEFAULT_MAX_FRAME_SIZE};
use crate::message::{Message, MessageKind};
use crate::CodecError;

/// Streaming message codec.
///
/// `decode` is called repeatedly against a growing buffer. It must return
/// `Ok(None)` without consuming anything while a frame is incomplete, and
/// consume exactly one frame's bytes for every message it yields.
pub trait Codec: Send + 'static {
    /// Append the framed encoding of `message` to `dst`
    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Decode the next complete message from `src`, if any
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError>;
}

/// Construction hook used by sessions to obtain a fresh codec per connection
pub trait CodecFactory: Send + Sync + 'static {
    /// Create a codec for a new session
    fn new_codec(&self) -> Box<dyn Codec>;
}

impl<F> CodecFactory for F
where
    F: Fn() -> Box<dyn Codec> + Send + Sync + 'static,
{
    fn new_codec(&self) -> Box<dyn Codec> {
        self()
    }
}

/// Drain every complete message currently buffered in `src`
pub fn decode_all(codec: &mut dyn Codec, src: &mut BytesMut) -> Result<Vec<Message>, CodecError> {
    let mut messages = Vec::new();
    while let Some(message) = codec.decode(src)? {
        messages.push(message);
    }
    Ok(messages)
}

/// Length-prefixed frames with a JSON body
#[derive(Debug)]
pub struct JsonCodec {
    decoder: FrameDecoder,
    max_frame_size: usize,
}

impl JsonCodec {
    /// Create a codec with the default frame limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom frame limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            decoder: FrameDecoder::with_max_frame_size(max_frame_size),
            max_frame_size,
        }
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for JsonCodec {
    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let body = message.to_json_body()?;
        let frame = Frame::new(message.kind().code(), Bytes::from(body));
        frame.encode(self.max_frame_size, dst)?;
        trace!("Encoded {:?} frame ({} bytes)", message.kind(), frame.encoded_size());
        Ok(())
    }

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        let Some(frame) = self.decoder.decode(src)? else {
            return Ok(None);
        };
        let kind = MessageKind::try_from(frame.kind)?;
        let message = Message::from_json_body(kind, &frame.body)?;
        trace!("Decoded {:?} frame ({} bytes)", kind, frame.encoded_size());
        Ok(Some(message))
    }
}

/// Factory for [`JsonCodec`]
#[derive(Debug, Clone)]
pub struct JsonCodecFactory {
    max_frame_size: usize,
}

impl JsonCodecFactory {
    /// Create a factory producing codecs with the given frame limit
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for JsonCodecFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl CodecFactory for JsonCodecFactory {
    fn new_codec(&self) -> Box<dyn Codec> {
        Box::new(JsonCodec::with_max_frame_size(self.max_frame_size))
    }
}
