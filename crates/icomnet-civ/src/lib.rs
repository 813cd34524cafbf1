//! icomnet-civ: Icom CI-V command decoding and encoding.
//!
//! Turns CI-V frames (`FE FE dst src cmd [sub...] [data...] FD`) into
//! named commands with typed fields, and back. The command catalogue is
//! static data ([`tree::CIV_COMMANDS`]); decoded commands serialize as
//! flat `{command, command_code, fields...}` mappings.
//!
//! ```
//! use icomnet_civ::{decode_civ, FieldValue};
//!
//! let msg = decode_civ(&[0xFE, 0xFE, 0xE0, 0xA4, 0x16, 0x02, 0x02, 0xFD]).unwrap();
//! assert_eq!(msg.command.command, "preamp");
//! assert_eq!(msg.command.field("status"), Some(&FieldValue::from("p.amp2")));
//! ```

pub mod civ;
pub mod fields;
pub mod tree;
pub mod value;

pub use civ::{CONTROLLER_ADDR, decode_civ, encode_civ, encode_frame, split_frame};
pub use fields::FieldDecoder;
pub use tree::{CommandNode, CommandTree};
pub use value::{CivMessage, DecodedCommand, FieldValue, Fields};
