//! Frame payloads exchanged with the peer.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

// ============================================================================
// Constants
// ============================================================================

/// Largest payload a control frame (ping, pong, close) may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

// ============================================================================
// Outbound
// ============================================================================

/// A data frame queued by the caller.
///
/// The payload is owned by the queue until the write completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Outbound {
    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::text(text),
            Self::Binary(data) => Message::binary(data),
        }
    }
}

/// Close frame sent by a local `close`.
pub(crate) fn normal_close() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: String::new().into(),
    }))
}

// ============================================================================
// InboundMessage
// ============================================================================

/// A complete data message received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl InboundMessage {
    /// Converts a data message; control frames yield `None`.
    pub(crate) fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text.as_str().to_owned())),
            Message::Binary(data) => Some(Self::Binary(data.to_vec())),
            _ => None,
        }
    }

    /// Returns the text payload, if this is a text message.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary(data) => write!(f, "<{} bytes binary>", data.len()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_len() {
        assert_eq!(Outbound::Text("héllo".into()).len(), 6);
        assert!(Outbound::Binary(Vec::new()).is_empty());
    }

    #[test]
    fn test_outbound_is_framed_as_data() {
        assert!(Outbound::Text("a".into()).into_message().is_text());
        assert!(Outbound::Binary(vec![1]).into_message().is_binary());
    }

    #[test]
    fn test_control_frames_are_not_inbound_messages() {
        assert_eq!(InboundMessage::from_message(Message::Ping(Vec::new().into())), None);
        assert_eq!(InboundMessage::from_message(normal_close()), None);
    }

    #[test]
    fn test_inbound_text() {
        let inbound = InboundMessage::from_message(Message::text("hi")).unwrap();
        assert_eq!(inbound.as_text(), Some("hi"));
        assert_eq!(inbound.to_string(), "hi");
    }

    #[test]
    fn test_inbound_binary_display() {
        let inbound = InboundMessage::from_message(Message::binary(vec![1u8, 2, 3])).unwrap();
        assert_eq!(inbound.as_text(), None);
        assert_eq!(inbound.to_string(), "<3 bytes binary>");
    }
}
