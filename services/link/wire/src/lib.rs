//! Message model, framing, and pluggable codecs for companion-link.
//!
//! This crate defines the typed messages exchanged between a paired device and
//! its companion peer, the connection status value type, and the codec seam
//! that turns messages into framed bytes and back.
//!
//! ## Wire Format (default [`JsonCodec`])
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 frame_len        | length of bytes that follow|
//! +----------------------+----------------------------+
//! | u32 msg_kind         | message kind code          |
//! +----------------------+----------------------------+
//! | body                 | UTF-8 JSON (PascalCase)    |
//! +----------------------+----------------------------+
//! ```
//!
//! Any other format can be plugged in by implementing [`Codec`] and handing a
//! [`CodecFactory`] to the session layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod status;

// Re-export main types
pub use codec::{decode_all, Codec, CodecFactory, JsonCodec, JsonCodecFactory};
pub use error::CodecError;
pub use frame::{Frame, FrameDecoder, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
pub use message::{
    ButtonClickedMessage, CommandMessage, DeviceLoginMessage, LoginStateMessage, Message,
    MessageKind, PhotoMessage, TextDataMessage, ToggleMuteMessage, UpdateVolumeMessage,
    RESEND_STATE_COMMAND,
};
pub use status::ConnectionStatus;
