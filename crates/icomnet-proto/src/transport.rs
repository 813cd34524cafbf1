//! Transport frame codec.
//!
//! Every datagram exchanged with the radio starts with a 16-byte
//! little-endian header that carries the pseudo-connection's sequencing
//! and addressing. The header's `type` selects the body.
//!
//! ```text
//!  0       4     6     8          12           16
//! +-------+-----+-----+----------+------------+-------------
//! |length |type | seq | sender   | receiver   | body...
//! |u32    |u16  | u16 |port u16  |port u16    |
//! |       |     |     |id   u16  |id   u16    |
//! +-------+-----+-----+----------+------------+-------------
//! ```

use bytes::{Buf, BufMut, BytesMut};
use icomnet_core::{Endpoint, Error, Result, ensure_len};

/// Size of the transport header in bytes.
pub const HEADER_SIZE: usize = 0x10;

/// Size of a ping body: `reply:u8, ping_id:u32`.
pub const PING_BODY_SIZE: usize = 5;

/// Transport message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TransportType {
    /// Payload for the channel's sub-protocol.
    Data = 0x00,
    /// List of sequence numbers the sender wants resent.
    Retransmit = 0x01,
    /// "Are you there?"
    Syn = 0x03,
    /// "I am here."
    SynAck = 0x04,
    /// Tear down the pseudo-connection.
    Disconnect = 0x05,
    /// "Are you ready?" / "I am ready."
    Ready = 0x06,
    /// Keepalive request or reply.
    Ping = 0x07,
}

impl TransportType {
    /// Map a wire code to a type, if it is known.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x00 => Some(TransportType::Data),
            0x01 => Some(TransportType::Retransmit),
            0x03 => Some(TransportType::Syn),
            0x04 => Some(TransportType::SynAck),
            0x05 => Some(TransportType::Disconnect),
            0x06 => Some(TransportType::Ready),
            0x07 => Some(TransportType::Ping),
            _ => None,
        }
    }

    /// The wire code.
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// A transport body, selected by the header's type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportBody {
    /// Sub-protocol payload, passed up verbatim.
    Data(Vec<u8>),
    /// Sequence numbers to resend.
    Retransmit(Vec<u16>),
    /// Opens the handshake.
    Syn,
    /// Probe answer.
    SynAck,
    /// Disconnect notice.
    Disconnect,
    /// Readiness exchange.
    Ready,
    /// Keepalive.
    Ping {
        /// `true` when answering a ping.
        reply: bool,
        /// Identifier echoed back in the reply.
        ping_id: u32,
    },
    /// A type code this codec does not know. The body is kept raw.
    Unknown {
        /// The type code from the header.
        type_code: u16,
        /// Body bytes.
        payload: Vec<u8>,
    },
}

impl TransportBody {
    /// The header type code for this body.
    pub fn type_code(&self) -> u16 {
        match self {
            TransportBody::Data(_) => TransportType::Data.code(),
            TransportBody::Retransmit(_) => TransportType::Retransmit.code(),
            TransportBody::Syn => TransportType::Syn.code(),
            TransportBody::SynAck => TransportType::SynAck.code(),
            TransportBody::Disconnect => TransportType::Disconnect.code(),
            TransportBody::Ready => TransportType::Ready.code(),
            TransportBody::Ping { .. } => TransportType::Ping.code(),
            TransportBody::Unknown { type_code, .. } => *type_code,
        }
    }

    /// The known message type, or `None` for [`TransportBody::Unknown`].
    pub fn kind(&self) -> Option<TransportType> {
        TransportType::from_code(self.type_code())
    }

    fn encoded_len(&self) -> usize {
        match self {
            TransportBody::Data(p) | TransportBody::Unknown { payload: p, .. } => p.len(),
            TransportBody::Retransmit(seqs) => seqs.len() * 2,
            TransportBody::Ping { .. } => PING_BODY_SIZE,
            _ => 0,
        }
    }
}

/// One transport datagram.
///
/// `length` and `type_code` are derived from the body when encoding, see
/// [`length`](Self::length) and [`TransportBody::type_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFrame {
    /// Sender's sequence number.
    pub sequence: u16,
    /// Originating endpoint.
    pub sender: Endpoint,
    /// Destination endpoint.
    pub receiver: Endpoint,
    /// Type-specific body.
    pub body: TransportBody,
}

impl TransportFrame {
    /// Create a frame.
    pub fn new(sequence: u16, sender: Endpoint, receiver: Endpoint, body: TransportBody) -> Self {
        TransportFrame {
            sequence,
            sender,
            receiver,
            body,
        }
    }

    /// Total datagram size, header included.
    pub fn length(&self) -> usize {
        HEADER_SIZE + self.body.encoded_len()
    }

    /// Serialize the frame, recomputing `length`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.length());
        buf.put_u32_le(self.length() as u32);
        buf.put_u16_le(self.body.type_code());
        buf.put_u16_le(self.sequence);
        put_endpoint(&mut buf, self.sender);
        put_endpoint(&mut buf, self.receiver);

        match &self.body {
            TransportBody::Data(p) | TransportBody::Unknown { payload: p, .. } => buf.put_slice(p),
            TransportBody::Retransmit(seqs) => {
                for &seq in seqs {
                    buf.put_u16_le(seq);
                }
            }
            TransportBody::Ping { reply, ping_id } => {
                buf.put_u8(u8::from(*reply));
                buf.put_u32_le(*ping_id);
            }
            TransportBody::Syn
            | TransportBody::SynAck
            | TransportBody::Disconnect
            | TransportBody::Ready => {}
        }

        buf.to_vec()
    }

    /// Parse one datagram.
    ///
    /// Bytes past the declared `length` are ignored. An unrecognized type
    /// code is not an error; it yields [`TransportBody::Unknown`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "datagram is {} bytes, header needs {HEADER_SIZE}",
                buf.len()
            )));
        }

        let mut hdr = &buf[..HEADER_SIZE];
        let length = hdr.get_u32_le() as usize;
        let type_code = hdr.get_u16_le();
        let sequence = hdr.get_u16_le();
        let sender = get_endpoint(&mut hdr);
        let receiver = get_endpoint(&mut hdr);

        if length < HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "declared length {length} is shorter than the header"
            )));
        }
        ensure_len(buf, length)?;

        let mut body = &buf[HEADER_SIZE..length];
        let body = match TransportType::from_code(type_code) {
            Some(TransportType::Data) => TransportBody::Data(body.to_vec()),
            Some(TransportType::Retransmit) => {
                if body.len() % 2 != 0 {
                    return Err(Error::TruncatedBody {
                        declared: body.len() + 1,
                        available: body.len(),
                    });
                }
                let mut seqs = Vec::with_capacity(body.len() / 2);
                while body.has_remaining() {
                    seqs.push(body.get_u16_le());
                }
                TransportBody::Retransmit(seqs)
            }
            Some(TransportType::Syn) => TransportBody::Syn,
            Some(TransportType::SynAck) => TransportBody::SynAck,
            Some(TransportType::Disconnect) => TransportBody::Disconnect,
            Some(TransportType::Ready) => TransportBody::Ready,
            Some(TransportType::Ping) => {
                ensure_len(body, PING_BODY_SIZE)?;
                TransportBody::Ping {
                    reply: body.get_u8() != 0,
                    ping_id: body.get_u32_le(),
                }
            }
            None => {
                tracing::debug!(
                    error = %Error::UnknownType(type_code),
                    "keeping transport body raw"
                );
                TransportBody::Unknown {
                    type_code,
                    payload: body.to_vec(),
                }
            }
        };

        Ok(TransportFrame {
            sequence,
            sender,
            receiver,
            body,
        })
    }
}

fn put_endpoint(buf: &mut BytesMut, ep: Endpoint) {
    buf.put_u16_le(ep.port);
    buf.put_u16_le(ep.id);
}

fn get_endpoint(buf: &mut &[u8]) -> Endpoint {
    let port = buf.get_u16_le();
    let id = buf.get_u16_le();
    Endpoint { port, id }
}
