//! Inbound messages, reply tags, and session events.
//!
//! Every non-ping datagram a session receives becomes an [`Inbound`]. It
//! is matched against the waiter table by [`MessageTag`] and, for data
//! frames, broadcast to subscribers as [`SessionEvent::Message`].

use std::fmt;

use icomnet_civ::CivMessage;
use icomnet_core::Endpoint;
use icomnet_proto::{ControlKind, ControlMessage, TransportType};

/// The kind of reply a caller can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// Any transport data frame.
    Data,
    /// A retransmit request.
    Retransmit,
    /// Answer to our Syn.
    SynAck,
    /// Remote disconnect notice.
    Disconnect,
    /// Readiness answer.
    Ready,
    /// A control reply of the given kind.
    Control(ControlKind),
    /// A CI-V frame whose path folds to this `command_code`.
    Civ(u64),
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageTag::Data => f.write_str("data"),
            MessageTag::Retransmit => f.write_str("retransmit"),
            MessageTag::SynAck => f.write_str("syn-ack"),
            MessageTag::Disconnect => f.write_str("disconnect"),
            MessageTag::Ready => f.write_str("ready"),
            MessageTag::Control(kind) => write!(f, "control {kind:?}"),
            MessageTag::Civ(code) => write!(f, "CI-V 0x{code:x}"),
        }
    }
}

/// Decoded contents of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The frame type carries no body (SynAck, Ready, Disconnect).
    Empty,
    /// Sequence numbers the radio asks us to resend.
    Retransmit(Vec<u16>),
    /// A control channel message.
    Control(ControlMessage),
    /// A CI-V frame from the serial channel.
    Civ(CivMessage),
    /// Audio data, or a data payload the channel codec could not decode.
    Raw(Vec<u8>),
}

/// One message received from the radio.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Transport frame type.
    pub kind: TransportType,
    /// Transport sequence number.
    pub sequence: u16,
    /// The radio's endpoint as stamped in the frame.
    pub sender: Endpoint,
    /// Decoded body.
    pub payload: Payload,
}

impl Inbound {
    /// Every tag this message satisfies.
    ///
    /// A data frame matches [`MessageTag::Data`] and, when its payload
    /// decoded, the control or CI-V tag for that payload as well.
    pub fn tags(&self) -> Vec<MessageTag> {
        match self.kind {
            TransportType::Data => {
                let mut tags = vec![MessageTag::Data];
                match &self.payload {
                    Payload::Control(msg) => tags.extend(msg.body.kind().map(MessageTag::Control)),
                    Payload::Civ(msg) => tags.push(MessageTag::Civ(msg.command.command_code)),
                    _ => {}
                }
                tags
            }
            TransportType::Retransmit => vec![MessageTag::Retransmit],
            TransportType::SynAck => vec![MessageTag::SynAck],
            TransportType::Disconnect => vec![MessageTag::Disconnect],
            TransportType::Ready => vec![MessageTag::Ready],
            TransportType::Syn | TransportType::Ping => Vec::new(),
        }
    }
}

/// An event emitted by a session.
///
/// Delivered through a bounded broadcast channel; slow subscribers may
/// miss events.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// `connect()` started.
    Connecting,
    /// The handshake completed.
    Connected,
    /// The session closed, locally or by the radio.
    Disconnected,
    /// A data frame arrived.
    Message(Inbound),
    /// A socket or handshake failure.
    Error(String),
}
