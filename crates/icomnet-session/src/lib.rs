//! icomnet-session: Sessions, channel clients, and the radio facade.
//!
//! A [`Session`] is one UDP pseudo-connection to one radio port. It runs
//! the Syn/Ready handshake, stamps sequence numbers, answers pings, and
//! matches replies to callers by [`MessageTag`]. [`ControlChannel`] and
//! [`SerialChannel`] speak the control and CI-V sub-protocols over a
//! session, and [`Radio`] strings them together into a logged-in radio.
//!
//! # Architecture
//!
//! Each connected session owns a spawned IO task holding the socket and
//! all mutable state. Callers send requests over an `mpsc` channel and
//! get oneshot replies; events go out on a `broadcast` channel.

pub mod builder;
pub mod control;
pub mod events;
pub(crate) mod io;
pub mod radio;
pub mod serial;
pub mod session;

pub use builder::{SessionBuilder, SessionConfig};
pub use control::ControlChannel;
pub use events::{Inbound, MessageTag, Payload, SessionEvent};
pub use radio::{DEFAULT_CONTROL_PORT, Radio, RadioBuilder, RadioEvent};
pub use serial::SerialChannel;
pub use session::{Completion, Session, SessionSnapshot};
