//! Core types shared by the codecs and the session layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One end of a pseudo-connection, as carried in every transport header.
///
/// A client advertises the UDP port it is listening on together with an
/// arbitrary 16-bit id; the radio echoes both back in its replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// UDP port of the peer.
    pub port: u16,
    /// Peer-chosen connection id.
    pub id: u16,
}

impl Endpoint {
    /// Create an endpoint from a port and id.
    pub const fn new(port: u16, id: u16) -> Self {
        Endpoint { port, id }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:04x}", self.port, self.id)
    }
}

/// Lifecycle state of a session.
///
/// Sessions move `Disconnected -> Connecting -> Listening -> Connected`
/// and return to `Disconnected` on close or failure; a disconnected
/// session may be connected again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket is open.
    #[default]
    Disconnected,
    /// The socket is being opened.
    ///
    /// Event-only: `connect` holds the session exclusively until the
    /// socket is bound, so no snapshot reports this state. Watch for the
    /// `Connecting` session event instead.
    Connecting,
    /// The socket is bound; the handshake is in progress.
    Listening,
    /// Both handshake exchanges completed.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Listening => "listening",
            ConnectionState::Connected => "connected",
        };
        write!(f, "{s}")
    }
}

/// Which sub-protocol a session's data frames carry.
///
/// The radio exposes one UDP port per channel; a session is bound to
/// exactly one of them and decodes its data payloads accordingly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Login, capabilities and connection negotiation.
    #[default]
    Control,
    /// CI-V command frames.
    Serial,
    /// Audio stream (payloads are passed through undecoded).
    Audio,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelKind::Control => "control",
            ChannelKind::Serial => "serial",
            ChannelKind::Audio => "audio",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`ChannelKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelKindError(String);

impl fmt::Display for ParseChannelKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel: {}", self.0)
    }
}

impl std::error::Error for ParseChannelKindError {}

impl FromStr for ChannelKind {
    type Err = ParseChannelKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "control" => Ok(ChannelKind::Control),
            "serial" | "civ" => Ok(ChannelKind::Serial),
            "audio" => Ok(ChannelKind::Audio),
            _ => Err(ParseChannelKindError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::new(50001, 0x1a2b).to_string(), "50001/1a2b");
    }

    #[test]
    fn endpoint_serializes_as_mapping() {
        let json = serde_json::to_string(&Endpoint::new(50002, 7)).unwrap();
        assert_eq!(json, r#"{"port":50002,"id":7}"#);
    }

    #[test]
    fn connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Listening.to_string(), "listening");
    }

    #[test]
    fn channel_kind_from_str() {
        assert_eq!("control".parse::<ChannelKind>(), Ok(ChannelKind::Control));
        assert_eq!("CIV".parse::<ChannelKind>(), Ok(ChannelKind::Serial));
        assert_eq!("Audio".parse::<ChannelKind>(), Ok(ChannelKind::Audio));
        assert!("video".parse::<ChannelKind>().is_err());
    }
}
