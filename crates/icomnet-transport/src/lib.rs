//! Transport implementations for icomnet.
//!
//! - [`UdpTransport`]: a connected UDP socket implementing
//!   [`DatagramTransport`](icomnet_core::DatagramTransport), one per radio
//!   channel

pub mod udp;

pub use udp::UdpTransport;
