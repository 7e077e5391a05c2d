//! Typed protocol messages exchanged with the companion peer.
//!
//! Every message has a [`MessageKind`] that selects its wire code and a body
//! struct holding only primitive, string, or byte-string fields. Bodies use
//! PascalCase field names on the wire.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::CodecError;

/// Command token asking the peer to resend its current state
pub const RESEND_STATE_COMMAND: &str = "ResendState";

/// Message kinds as defined in the wire protocol
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Device login request (outbound)
    DeviceLogin = 1,
    /// Login result (inbound)
    LoginState = 2,
    /// Toggle master mute (outbound)
    ToggleMute = 3,
    /// Set master volume (outbound)
    UpdateVolume = 4,
    /// Action button pressed (outbound)
    ButtonClicked = 5,
    /// Free-form text payload (outbound)
    TextData = 6,
    /// Generic command with data (outbound)
    Command = 7,
    /// Photo upload (outbound)
    Photo = 8,
}

impl MessageKind {
    /// Wire code for this kind
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether the peer sends this kind to us
    pub fn is_inbound(self) -> bool {
        matches!(self, MessageKind::LoginState)
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageKind::DeviceLogin),
            2 => Ok(MessageKind::LoginState),
            3 => Ok(MessageKind::ToggleMute),
            4 => Ok(MessageKind::UpdateVolume),
            5 => Ok(MessageKind::ButtonClicked),
            6 => Ok(MessageKind::TextData),
            7 => Ok(MessageKind::Command),
            8 => Ok(MessageKind::Photo),
            _ => Err(CodecError::UnknownKind(value)),
        }
    }
}

/// Login request carrying the pairing code and device identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceLoginMessage {
    /// Pairing code from the client configuration
    pub connection_code: String,
    /// Client protocol/version string
    pub version: String,
    /// Human-readable device descriptor
    pub device_name: String,
}

/// Generic command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandMessage {
    /// Command token
    pub command: String,
    /// Command argument
    pub data: String,
}

impl CommandMessage {
    /// Request that the peer resend its full state
    pub fn resend_state() -> Self {
        Self {
            command: RESEND_STATE_COMMAND.to_string(),
            data: String::new(),
        }
    }
}

/// Text payload tagged with an application-defined type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextDataMessage {
    /// Application-defined data type
    pub data_type: i32,
    /// Text content
    pub data: String,
}

/// Photo upload; `data` holds the base64-encoded file content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhotoMessage {
    /// Original file name
    pub file_name: String,
    /// Base64-encoded content
    pub data: String,
}

impl PhotoMessage {
    /// Build a photo message from raw bytes
    pub fn from_bytes(file_name: impl Into<String>, content: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            data: STANDARD.encode(content),
        }
    }

    /// Decode the base64 content back to raw bytes
    pub fn content(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// Action button pressed on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ButtonClickedMessage {
    /// Index of the pressed button
    pub button_index: i32,
}

/// Toggle the peer's master mute
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToggleMuteMessage {}

/// Set the peer's master volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateVolumeMessage {
    /// Volume level
    pub master_volume: i32,
}

/// Peer's answer to a login request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginStateMessage {
    /// Whether the login was accepted
    pub is_logged_in: bool,
    /// Reason for rejection, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A protocol message of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Device login request
    DeviceLogin(DeviceLoginMessage),
    /// Generic command
    Command(CommandMessage),
    /// Text payload
    TextData(TextDataMessage),
    /// Photo upload
    Photo(PhotoMessage),
    /// Button press
    ButtonClicked(ButtonClickedMessage),
    /// Mute toggle
    ToggleMute(ToggleMuteMessage),
    /// Volume change
    UpdateVolume(UpdateVolumeMessage),
    /// Login result
    LoginState(LoginStateMessage),
}

impl Message {
    /// Kind tag of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::DeviceLogin(_) => MessageKind::DeviceLogin,
            Message::Command(_) => MessageKind::Command,
            Message::TextData(_) => MessageKind::TextData,
            Message::Photo(_) => MessageKind::Photo,
            Message::ButtonClicked(_) => MessageKind::ButtonClicked,
            Message::ToggleMute(_) => MessageKind::ToggleMute,
            Message::UpdateVolume(_) => MessageKind::UpdateVolume,
            Message::LoginState(_) => MessageKind::LoginState,
        }
    }

    /// Serialize the body (without kind tag) as JSON
    pub fn to_json_body(&self) -> Result<Vec<u8>, CodecError> {
        let body = match self {
            Message::DeviceLogin(m) => serde_json::to_vec(m)?,
            Message::Command(m) => serde_json::to_vec(m)?,
            Message::TextData(m) => serde_json::to_vec(m)?,
            Message::Photo(m) => serde_json::to_vec(m)?,
            Message::ButtonClicked(m) => serde_json::to_vec(m)?,
            Message::ToggleMute(m) => serde_json::to_vec(m)?,
            Message::UpdateVolume(m) => serde_json::to_vec(m)?,
            Message::LoginState(m) => serde_json::to_vec(m)?,
        };
        Ok(body)
    }

    /// Parse a JSON body for the given kind
    pub fn from_json_body(kind: MessageKind, body: &[u8]) -> Result<Self, CodecError> {
        let message = match kind {
            MessageKind::DeviceLogin => Message::DeviceLogin(serde_json::from_slice(body)?),
            MessageKind::Command => Message::Command(serde_json::from_slice(body)?),
            MessageKind::TextData => Message::TextData(serde_json::from_slice(body)?),
            MessageKind::Photo => Message::Photo(serde_json::from_slice(body)?),
            MessageKind::ButtonClicked => Message::ButtonClicked(serde_json::from_slice(body)?),
            MessageKind::ToggleMute => Message::ToggleMute(serde_json::from_slice(body)?),
            MessageKind::UpdateVolume => Message::UpdateVolume(serde_json::from_slice(body)?),
            MessageKind::LoginState => Message::LoginState(serde_json::from_slice(body)?),
        };
        Ok(message)
    }
}

macro_rules! impl_from_body {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(body: $ty) -> Self {
                    Message::$variant(body)
                }
            }
        )*
    };
}

impl_from_body!(
    DeviceLogin(DeviceLoginMessage),
    Command(CommandMessage),
    TextData(TextDataMessage),
    Photo(PhotoMessage),
    ButtonClicked(ButtonClickedMessage),
    ToggleMute(ToggleMuteMessage),
    UpdateVolume(UpdateVolumeMessage),
    LoginState(LoginStateMessage),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_roundtrip() {
        for code in 1..=8u32 {
            let kind = MessageKind::try_from(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert!(matches!(
            MessageKind::try_from(0),
            Err(CodecError::UnknownKind(0))
        ));
        assert!(MessageKind::LoginState.is_inbound());
        assert!(!MessageKind::DeviceLogin.is_inbound());
    }

    #[test]
    fn test_login_body_uses_pascal_case() {
        let login = Message::from(DeviceLoginMessage {
            connection_code: "ABCD".to_string(),
            version: "1.0.0".to_string(),
            device_name: "bench (linux x86_64)".to_string(),
        });

        let body = String::from_utf8(login.to_json_body().unwrap()).unwrap();
        assert!(body.contains("\"ConnectionCode\":\"ABCD\""));
        assert!(body.contains("\"DeviceName\""));
    }

    #[test]
    fn test_login_state_without_error_message() {
        let parsed =
            Message::from_json_body(MessageKind::LoginState, br#"{"IsLoggedIn":true}"#).unwrap();
        assert_eq!(
            parsed,
            Message::LoginState(LoginStateMessage {
                is_logged_in: true,
                error_message: None,
            })
        );
    }

    #[test]
    fn test_photo_content_is_base64() {
        let photo = PhotoMessage::from_bytes("shot.jpg", &[0xff, 0xd8, 0xff, 0x00]);
        assert_eq!(photo.data, "/9j/AA==");
        assert_eq!(photo.content().unwrap(), vec![0xff, 0xd8, 0xff, 0x00]);
    }

    #[test]
    fn test_resend_state_command() {
        let cmd = CommandMessage::resend_state();
        assert_eq!(cmd.command, RESEND_STATE_COMMAND);
        assert!(cmd.data.is_empty());
    }
}
