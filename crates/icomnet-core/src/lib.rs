//! icomnet-core: Core traits, types, and error definitions for icomnet.
//!
//! This crate holds the pieces every other icomnet crate shares: the
//! workspace-wide [`Error`] type, the endpoint and state types that appear
//! on the wire and in the session state machine, and the
//! [`DatagramTransport`] seam the session layer drives.
//!
//! # Key types
//!
//! - [`Error`] / [`Result`] -- error handling
//! - [`Endpoint`] -- `{port, id}` pair addressing one side of a pseudo-connection
//! - [`ConnectionState`] -- session lifecycle
//! - [`ChannelKind`] -- which sub-protocol a session carries
//! - [`DatagramTransport`] -- datagram-level communication channel

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, Result, ensure_len};
pub use transport::DatagramTransport;
pub use types::{ChannelKind, ConnectionState, Endpoint, ParseChannelKindError};
