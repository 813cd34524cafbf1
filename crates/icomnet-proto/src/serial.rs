//! Serial channel codec.
//!
//! The serial channel tunnels CI-V frames: each transport `Data` body is
//! a 5-byte little-endian header followed by one complete CI-V frame.
//!
//! ```text
//! +----+--------+--------+-----------------
//! | id | length | seq    | FE FE .. FD
//! | u8 | u16    | u16    |
//! +----+--------+--------+-----------------
//! ```

use bytes::{Buf, BufMut, BytesMut};
use icomnet_civ::CivMessage;
use icomnet_core::{Error, Result, ensure_len};

/// Size of the serial header in bytes.
pub const SERIAL_HEADER_SIZE: usize = 5;

/// Header id used on outbound CI-V frames.
pub const SERIAL_CIV_ID: u8 = 0xC1;

/// One serial channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialFrame {
    /// Frame id.
    pub id: u8,
    /// Serial-layer sequence number.
    pub sequence: u16,
    /// A complete CI-V frame.
    pub payload: Vec<u8>,
}

impl SerialFrame {
    /// Wrap an encoded CI-V frame for sending.
    pub fn civ(sequence: u16, payload: Vec<u8>) -> Self {
        SerialFrame {
            id: SERIAL_CIV_ID,
            sequence,
            payload,
        }
    }

    /// Payload length as carried in the header.
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// Serialize, recomputing `length`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let length = u16::try_from(self.payload.len())
            .map_err(|_| Error::Encode(format!("serial payload of {} bytes", self.payload.len())))?;
        let mut buf = BytesMut::with_capacity(SERIAL_HEADER_SIZE + self.payload.len());
        buf.put_u8(self.id);
        buf.put_u16_le(length);
        buf.put_u16_le(self.sequence);
        buf.put_slice(&self.payload);
        Ok(buf.to_vec())
    }

    /// Parse a serial message.
    ///
    /// The payload is the `length` bytes after the header; anything past
    /// that is ignored. A header declaring more bytes than are present is
    /// [`Error::TruncatedBody`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < SERIAL_HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "serial message is {} bytes, header needs {SERIAL_HEADER_SIZE}",
                buf.len()
            )));
        }
        let mut hdr = &buf[..SERIAL_HEADER_SIZE];
        let id = hdr.get_u8();
        let length = usize::from(hdr.get_u16_le());
        let sequence = hdr.get_u16_le();
        let body = &buf[SERIAL_HEADER_SIZE..];
        ensure_len(body, length)?;
        if body.len() > length {
            tracing::debug!(length, actual = body.len(), "ignoring bytes past serial length");
        }
        let payload = body[..length].to_vec();
        Ok(SerialFrame {
            id,
            sequence,
            payload,
        })
    }

    /// Decode the payload as a CI-V frame.
    pub fn civ_message(&self) -> Result<CivMessage> {
        icomnet_civ::decode_civ(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_FREQ: [u8; 6] = [0xFE, 0xFE, 0xA4, 0xE0, 0x03, 0xFD];

    #[test]
    fn encode_layout() {
        let bytes = SerialFrame::civ(0x0102, READ_FREQ.to_vec()).encode().unwrap();
        assert_eq!(&bytes[..5], &[0xC1, 0x06, 0x00, 0x02, 0x01]);
        assert_eq!(&bytes[5..], &READ_FREQ);
    }

    #[test]
    fn round_trip() {
        let frame = SerialFrame::civ(9, READ_FREQ.to_vec());
        let bytes = frame.encode().unwrap();
        let decoded = SerialFrame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.length(), 6);
    }

    #[test]
    fn payload_decodes_as_civ() {
        let frame = SerialFrame::civ(0, READ_FREQ.to_vec());
        let msg = frame.civ_message().unwrap();
        assert_eq!(msg.destination, 0xA4);
        assert_eq!(msg.command.command, "read-operating-frequency");
    }

    #[test]
    fn short_header_is_malformed() {
        assert!(matches!(
            SerialFrame::decode(&[0xC1, 0x00]),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn declared_length_past_end_is_truncated() {
        let mut bytes = vec![0xC1, 0x40, 0x00, 0x01, 0x00];
        bytes.extend_from_slice(&READ_FREQ);
        match SerialFrame::decode(&bytes) {
            Err(Error::TruncatedBody {
                declared,
                available,
            }) => {
                assert_eq!(declared, 0x40);
                assert_eq!(available, 6);
            }
            other => panic!("expected TruncatedBody, got {other:?}"),
        }
    }

    #[test]
    fn bytes_past_length_are_ignored() {
        let mut bytes = SerialFrame::civ(3, READ_FREQ.to_vec()).encode().unwrap();
        bytes.extend_from_slice(&[0x00, 0x00]);
        let decoded = SerialFrame::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, READ_FREQ);
    }

    #[test]
    fn bad_civ_payload_is_malformed() {
        let frame = SerialFrame::civ(0, vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert!(matches!(frame.civ_message(), Err(Error::MalformedHeader(_))));
    }
}
