//! # icomnet -- Icom radios over the network
//!
//! `icomnet` talks to Icom transceivers that expose remote control over
//! UDP (IC-705, IC-9700, IC-7610 with the network option, and friends).
//! It covers the whole stack: the UDP pseudo-connection, login on the
//! control port, stream negotiation, and CI-V commands on the serial port.
//!
//! ## Quick Start
//!
//! ```no_run
//! use icomnet::civ::DecodedCommand;
//! use icomnet::session::Radio;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut radio = Radio::builder("192.168.1.50")
//!         .username("ic-705")
//!         .password("secret")
//!         .build()
//!         .await?;
//!
//!     let reply = radio
//!         .request(DecodedCommand::new("read-operating-frequency"))
//!         .await?;
//!     println!("{}", serde_json::to_string(&reply)?);
//!
//!     radio.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate               | Purpose                                          |
//! |---------------------|--------------------------------------------------|
//! | `icomnet-core`      | Error type, endpoints, states, transport trait   |
//! | `icomnet-civ`       | CI-V command tree, field decoders, frame codec   |
//! | `icomnet-proto`     | Transport, control and serial wire codecs        |
//! | `icomnet-transport` | UDP socket transport                             |
//! | `icomnet-session`   | Session state machine and channel clients        |
//! | **`icomnet`**       | This facade crate -- re-exports everything       |
//!
//! The codec crates are pure and synchronous. Only `icomnet-transport` and
//! `icomnet-session` need a tokio runtime.
//!
//! ## Feature Flags
//!
//! | Feature   | Enables                                 | Default |
//! |-----------|-----------------------------------------|---------|
//! | `session` | [`session`] and [`transport`] modules    | yes     |
//!
//! Without `session` the crate is a codec library with no async runtime.

pub use icomnet_core::*;

/// CI-V command tree, field decoders and frame codec.
pub mod civ {
    pub use icomnet_civ::*;
}

/// Wire codecs for the transport, control and serial layers.
pub mod proto {
    pub use icomnet_proto::*;
}

/// UDP transport.
#[cfg(feature = "session")]
pub mod transport {
    pub use icomnet_transport::*;
}

/// Sessions, the control and serial channel clients, and [`Radio`](session::Radio).
#[cfg(feature = "session")]
pub mod session {
    pub use icomnet_session::*;
}
