//! icomnet-test-harness: A mock radio for deterministic session tests.
//!
//! [`MockRadio`] is a UDP peer on loopback that plays the radio's side of
//! the transport handshake, records every frame it receives, and answers
//! data frames through a scripted [`Responder`]. The [`responders`]
//! module holds ready-made scripts for the control and serial channels.

pub mod mock_radio;
pub mod responders;

pub use mock_radio::{MockRadio, MockRadioBuilder, Responder};
pub use responders::{ControlScript, civ_responder, control_responder};
