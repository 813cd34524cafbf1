//! Datagram transport trait for radio sessions.
//!
//! The [`DatagramTransport`] trait abstracts over the socket a session
//! owns. The session IO task only ever sees a `Box<dyn DatagramTransport>`,
//! so the protocol engine is independent of how datagrams actually move.
//! The production implementation is `UdpTransport` from the
//! `icomnet-transport` crate.

use async_trait::async_trait;

use crate::error::Result;

/// Asynchronous datagram channel to a single remote peer.
///
/// Each `send` transmits exactly one datagram and each `recv` yields
/// exactly one; there is no stream reassembly at this layer.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Send one datagram to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<()>;

    /// Wait for the next datagram from the remote peer.
    ///
    /// Returns the number of bytes written into `buf`. There is no timeout
    /// at this layer; callers race it against other events.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Local UDP port the transport is bound to.
    fn local_port(&self) -> u16;
}
