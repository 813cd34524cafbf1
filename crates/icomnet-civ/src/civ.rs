//! CI-V frame envelope.
//!
//! ```text
//! 0xFE 0xFE <dst> <src> <cmd> [<sub>...] [<data>...] 0xFD
//! ```
//!
//! Over the network the serial channel delivers one complete frame per
//! datagram, so decoding here is strict: the buffer must be exactly one
//! frame. The command bytes between the addresses and the trailer are
//! handed to the [command tree](crate::tree).

use bytes::{BufMut, BytesMut};
use icomnet_core::{Error, Result};

use crate::tree::{self, CommandTree};
use crate::value::CivMessage;

/// Preamble byte repeated twice at the start of every CI-V frame.
pub const PREAMBLE: u8 = 0xFE;

/// Frame terminator byte.
pub const TERMINATOR: u8 = 0xFD;

/// Standard PC controller CI-V address.
pub const CONTROLLER_ADDR: u8 = 0xE0;

/// ACK command byte, positive acknowledgement from the rig.
pub const ACK: u8 = 0xFB;

/// NAK command byte, negative acknowledgement from the rig.
pub const NAK: u8 = 0xFA;

/// Smallest valid frame: preamble, two addresses, one command, trailer.
pub const MIN_FRAME_LEN: usize = 6;

/// Wrap command bytes in a CI-V frame.
///
/// ```
/// use icomnet_civ::civ::encode_frame;
///
/// let frame = encode_frame(0xA4, 0xE0, &[0x03]);
/// assert_eq!(frame, vec![0xFE, 0xFE, 0xA4, 0xE0, 0x03, 0xFD]);
/// ```
pub fn encode_frame(dst: u8, src: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(5 + body.len());
    buf.put_u8(PREAMBLE);
    buf.put_u8(PREAMBLE);
    buf.put_u8(dst);
    buf.put_u8(src);
    buf.put_slice(body);
    buf.put_u8(TERMINATOR);
    buf.to_vec()
}

/// Split a frame into `(dst, src, command bytes)`.
///
/// Returns [`Error::MalformedHeader`] if the buffer is shorter than
/// [`MIN_FRAME_LEN`] or the preamble or trailer is wrong.
pub fn split_frame(buf: &[u8]) -> Result<(u8, u8, &[u8])> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(Error::MalformedHeader(format!(
            "CI-V frame is {} bytes, need at least {MIN_FRAME_LEN}",
            buf.len()
        )));
    }
    if buf[0] != PREAMBLE || buf[1] != PREAMBLE {
        return Err(Error::MalformedHeader(format!(
            "bad CI-V preamble {:02X} {:02X}",
            buf[0], buf[1]
        )));
    }
    let last = buf.len() - 1;
    if buf[last] != TERMINATOR {
        return Err(Error::MalformedHeader(format!(
            "bad CI-V trailer {:02X}",
            buf[last]
        )));
    }
    Ok((buf[2], buf[3], &buf[4..last]))
}

/// Decode a frame with the built-in command tree.
pub fn decode_civ(buf: &[u8]) -> Result<CivMessage> {
    decode_civ_with(tree::standard(), buf)
}

/// Encode a message with the built-in command tree.
pub fn encode_civ(msg: &CivMessage) -> Result<Vec<u8>> {
    encode_civ_with(tree::standard(), msg)
}

/// Decode a frame with a caller-supplied command tree.
pub fn decode_civ_with(tree: &CommandTree, buf: &[u8]) -> Result<CivMessage> {
    let (destination, source, body) = split_frame(buf)?;
    let command = tree.decode(body)?;
    Ok(CivMessage {
        destination,
        source,
        command,
    })
}

/// Encode a message with a caller-supplied command tree.
pub fn encode_civ_with(tree: &CommandTree, msg: &CivMessage) -> Result<Vec<u8>> {
    let body = tree.encode(&msg.command)?;
    Ok(encode_frame(msg.destination, msg.source, &body))
}

impl CivMessage {
    /// Whether this is the rig's positive acknowledgement (`FB`).
    pub fn is_ack(&self) -> bool {
        self.command.command_code == u64::from(ACK)
    }

    /// Whether this is the rig's negative acknowledgement (`FA`).
    pub fn is_nak(&self) -> bool {
        self.command.command_code == u64::from(NAK)
    }
}
