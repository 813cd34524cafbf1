//! Decoded CI-V values.
//!
//! A decoded command is an open mapping of field names to values rather
//! than one struct per command: the command catalogue is data, and
//! collaborators exchange `{command, command_code, fields...}` mappings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A reserved table entry.
    Null,
    /// Integer value (frequencies in Hz, levels, signed RIT offsets).
    Int(i64),
    /// Fractional value (tone frequencies in Hz).
    Float(f64),
    /// Label from a lookup table, or `"on"`/`"off"`.
    Text(String),
    /// Raw bytes for commands with no structured decoder.
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// The value as a string slice, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a float, accepting integers too.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

/// Named fields produced by a field decoder.
pub type Fields = BTreeMap<String, FieldValue>;

/// The result of walking the command tree over one CI-V command payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedCommand {
    /// Command name from the tree, or a synthesized `command-0x..` name.
    pub command: String,
    /// Command and sub-command bytes accumulated big-endian.
    #[serde(default)]
    pub command_code: u64,
    /// Decoded field values.
    #[serde(flatten)]
    pub fields: Fields,
}

impl DecodedCommand {
    /// A command with no fields, ready to be filled in for encoding.
    pub fn new(command: impl Into<String>) -> Self {
        DecodedCommand {
            command: command.into(),
            command_code: 0,
            fields: Fields::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// A complete CI-V frame: addressing plus the decoded command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CivMessage {
    /// Destination CI-V address.
    pub destination: u8,
    /// Source CI-V address.
    pub source: u8,
    /// The decoded command.
    #[serde(flatten)]
    pub command: DecodedCommand,
}
