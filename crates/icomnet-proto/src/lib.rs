//! icomnet-proto: Wire codecs for the Icom network protocol.
//!
//! Three layers, outermost first:
//!
//! - [`transport`] -- the UDP datagram envelope: length, type, sequence and
//!   the sender/receiver endpoints of the pseudo-connection
//! - [`control`] -- login, capabilities and stream negotiation, carried in
//!   transport `Data` bodies on the control port; credentials pass through
//!   the [`cipher`]
//! - [`serial`] -- CI-V frames carried in transport `Data` bodies on the
//!   serial port
//!
//! All codecs are pure: `decode(&[u8]) -> Result<T>` and
//! `encode(&T) -> Vec<u8>` (or `Result<Vec<u8>>` where a value can fail to
//! fit its field).

pub mod cipher;
pub mod control;
pub mod serial;
pub mod transport;

pub use control::{
    Capabilities, ConnectionRequest, ConnectionResponse, ControlBody, ControlKind,
    ControlMessage, Guid, LoginRequest, LoginResponse, Logout, RadioInfo, Status,
};
pub use serial::{SERIAL_CIV_ID, SerialFrame};
pub use transport::{TransportBody, TransportFrame, TransportType};
