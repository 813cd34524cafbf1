//! Error types for icomnet.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Framing errors, field-level decode
//! errors, session state errors, and socket failures are all captured here.

/// The error type for all icomnet operations.
///
/// Framing-level variants ([`MalformedHeader`](Error::MalformedHeader),
/// [`TruncatedBody`](Error::TruncatedBody)) abort a decode. Command- and
/// field-level variants are normally logged and degraded by the decoders
/// rather than returned, so that one unknown firmware extension does not
/// tear down a session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wrong preamble/trailer, or a buffer shorter than the fixed header.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The declared length exceeds the bytes actually available.
    #[error("truncated body: declared {declared} bytes, {available} available")]
    TruncatedBody {
        /// Bytes the header or body layout requires.
        declared: usize,
        /// Bytes present in the buffer.
        available: usize,
    },

    /// Unrecognized transport or control type code.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownType(u16),

    /// No command tree entry matches a name or byte path.
    #[error("unknown CI-V command: {0}")]
    UnknownCommand(String),

    /// A table-driven field decoder received an index with no entry.
    #[error("table index {index} out of range (table has {len} entries)")]
    TableIndexOutOfRange {
        /// The index byte received.
        index: u8,
        /// Number of entries in the table.
        len: usize,
    },

    /// A credential field is not representable in its 16-byte slot.
    #[error("credential is {0} bytes, field holds 16")]
    CipherLengthMismatch(usize),

    /// A credential contains a character outside printable ASCII.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// A value cannot be represented on the wire.
    #[error("encode error: {0}")]
    Encode(String),

    /// `connect()` was called on a session that is not disconnected.
    #[error("session already connected")]
    AlreadyConnected,

    /// No connection to the radio has been established.
    #[error("not connected")]
    NotConnected,

    /// The session closed while an operation was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// Timed out waiting for a reply from the radio.
    #[error("timeout waiting for response")]
    Timeout,

    /// The radio answered a CI-V command with a negative acknowledgement.
    #[error("radio rejected the command (NAK)")]
    Rejected,

    /// A reply waiter is already registered for this message tag.
    #[error("a waiter is already registered for {0}")]
    WaiterBusy(String),

    /// A transport-level error (socket setup, address resolution).
    #[error("transport error: {0}")]
    Transport(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Check that `buf` holds at least `needed` bytes.
///
/// Shared by the fixed-layout codecs; returns [`Error::TruncatedBody`]
/// carrying both counts when the buffer is short.
pub fn ensure_len(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(Error::TruncatedBody {
            declared: needed,
            available: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_malformed_header() {
        let e = Error::MalformedHeader("missing preamble".into());
        assert_eq!(e.to_string(), "malformed header: missing preamble");
    }

    #[test]
    fn error_display_truncated_body() {
        let e = Error::TruncatedBody {
            declared: 96,
            available: 40,
        };
        assert_eq!(
            e.to_string(),
            "truncated body: declared 96 bytes, 40 available"
        );
    }

    #[test]
    fn error_display_unknown_type() {
        let e = Error::UnknownType(0x02);
        assert_eq!(e.to_string(), "unknown message type: 0x02");
    }

    #[test]
    fn error_display_table_index() {
        let e = Error::TableIndexOutOfRange { index: 7, len: 3 };
        assert_eq!(e.to_string(), "table index 7 out of range (table has 3 entries)");
    }

    #[test]
    fn error_display_cipher_length() {
        let e = Error::CipherLengthMismatch(20);
        assert_eq!(e.to_string(), "credential is 20 bytes, field holds 16");
    }

    #[test]
    fn error_display_session_states() {
        assert_eq!(Error::AlreadyConnected.to_string(), "session already connected");
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
        assert_eq!(Error::Rejected.to_string(), "radio rejected the command (NAK)");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("port taken"));
    }

    #[test]
    fn ensure_len_reports_counts() {
        assert!(ensure_len(&[0u8; 4], 4).is_ok());
        match ensure_len(&[0u8; 3], 5) {
            Err(Error::TruncatedBody {
                declared,
                available,
            }) => {
                assert_eq!(declared, 5);
                assert_eq!(available, 3);
            }
            other => panic!("expected TruncatedBody, got {other:?}"),
        }
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
