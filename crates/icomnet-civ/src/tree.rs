//! The CI-V command tree.
//!
//! CI-V commands are a byte path (`16 02` = preamp) followed by field data.
//! [`CIV_COMMANDS`] declares the known paths as static data; a
//! [`CommandTree`] indexes it by name so that decode walks bytes to names
//! and encode walks names back to bytes with one engine.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

use icomnet_core::{Error, Result};

use crate::fields::FieldDecoder;
use crate::value::{DecodedCommand, Fields};

/// Prefix of names synthesized for command paths missing from the tree.
pub const UNKNOWN_PREFIX: &str = "command-0x";

/// One entry in the command tree.
#[derive(Debug, Clone, Copy)]
pub enum CommandNode {
    /// A complete command; remaining bytes go to `decoder`.
    Terminal {
        /// Command name.
        name: &'static str,
        /// Field decoder for the bytes after the path.
        decoder: FieldDecoder,
    },
    /// A command byte that selects among sub-commands.
    Interior {
        /// Group name, used when a frame ends at this level.
        name: &'static str,
        /// Sub-commands keyed by the next byte.
        children: &'static [(u8, CommandNode)],
    },
}

impl CommandNode {
    /// The node's name.
    pub fn name(&self) -> &'static str {
        match self {
            CommandNode::Terminal { name, .. } | CommandNode::Interior { name, .. } => *name,
        }
    }
}

macro_rules! cmd {
    ($name:literal $(,)?) => {
        CommandNode::Terminal {
            name: $name,
            decoder: FieldDecoder::Raw,
        }
    };
}

macro_rules! with {
    ($name:literal, $decoder:expr $(,)?) => {
        CommandNode::Terminal {
            name: $name,
            decoder: $decoder,
        }
    };
}

macro_rules! on_off {
    ($name:literal $(,)?) => {
        with!($name, FieldDecoder::STATUS)
    };
}

macro_rules! table {
    ($name:literal, $labels:expr $(,)?) => {
        with!(
            $name,
            FieldDecoder::Table {
                field: "status",
                labels: $labels,
            }
        )
    };
}

macro_rules! group {
    ($name:literal, $children:expr $(,)?) => {
        CommandNode::Interior {
            name: $name,
            children: $children,
        }
    };
}

const TONE: FieldDecoder = FieldDecoder::Tone { field: "frequency" };

/// The built-in CI-V command catalogue.
pub static CIV_COMMANDS: &[(u8, CommandNode)] = &[
    (0x00, with!("send-frequency", FieldDecoder::FREQUENCY)),
    (0x01, cmd!("send-mode-data")),
    (0x02, cmd!("read-band-edge")),
    (0x03, with!("read-operating-frequency", FieldDecoder::FREQUENCY)),
    (0x04, cmd!("read-operating-mode")),
    (0x05, with!("set-operating-frequency", FieldDecoder::FREQUENCY)),
    (0x06, cmd!("set-operating-mode")),
    (
        0x07,
        group!(
            "select-vfo-mode",
            &[
                (0x00, cmd!("select-vfo-a")),
                (0x01, cmd!("select-vfo-b")),
                (0xa0, cmd!("equalize-vfo-a-b")),
                (0xb0, cmd!("exchange-vfo-a-b")),
            ],
        ),
    ),
    (
        0x08,
        group!("select-memory-mode", &[(0xa0, cmd!("select-memory-group"))]),
    ),
    (0x09, cmd!("memory-write")),
    (0x0a, cmd!("memory-copy-to-vfo")),
    (0x0b, cmd!("memory-clear")),
    (0x0c, cmd!("read-frequency-offset")),
    (0x0d, cmd!("send-frequency-offset")),
    (
        0x0e,
        group!(
            "scan",
            &[
                (0x00, cmd!("cancel-scan")),
                (0x01, cmd!("start-programmed-memory-scan")),
                (0x02, cmd!("start-programmed-scan")),
                (0x03, cmd!("start-delta-frequency-scan")),
                (0x12, cmd!("start-fine-programmed-scan")),
                (0x13, cmd!("start-fine-delta-frequency-scan")),
                (0x22, cmd!("start-memory-scan")),
                (0x23, cmd!("start-select-memory-scan")),
                (0x24, cmd!("start-mode-select-scan")),
                (0xb0, cmd!("clear-select-channel")),
                (0xb1, cmd!("set-select-channel")),
                (0xb2, cmd!("set-select-memory-channel")),
                (0xd0, cmd!("set-scan-resume-off")),
                (0xd3, cmd!("set-scan-resume-on")),
            ],
        ),
    ),
    (0x0f, cmd!("split")),
    (0x10, cmd!("tuning-step")),
    (0x11, cmd!("attenuator")),
    (
        0x13,
        group!(
            "speech",
            &[
                (0x00, cmd!("speech-all-data")),
                (0x01, cmd!("speech-all-frequency")),
                (0x02, cmd!("speech-all-mode")),
            ],
        ),
    ),
    (0x14, cmd!("levels")),
    (
        0x15,
        group!(
            "read-meter",
            &[
                (0x01, cmd!("read-s-meter-squelch")),
                (0x02, with!("read-s-meter-level", FieldDecoder::Level { field: "level" })),
                (0x05, cmd!("read-various-squelch")),
                (0x07, cmd!("read-overflow-status")),
                (0x11, cmd!("read-po-level")),
                (0x12, cmd!("read-swr-level")),
                (0x13, cmd!("read-alc-level")),
                (0x14, cmd!("read-comp-level")),
                (0x15, cmd!("read-vd-level")),
                (0x16, cmd!("read-id-level")),
            ],
        ),
    ),
    (
        0x16,
        group!(
            "functions",
            &[
                (0x02, table!("preamp", &[Some("off"), Some("p.amp1"), Some("p.amp2")])),
                (0x12, table!("agc-time", &[None, Some("fast"), Some("mid"), Some("slow")])),
                (0x22, on_off!("noise-blanker")),
                (0x40, on_off!("noise-reduction")),
                (0x41, on_off!("auto-notch")),
                (0x42, on_off!("repeater-tone")),
                (0x43, on_off!("tone-squelch")),
                (0x44, on_off!("speech-compressor")),
                (0x45, on_off!("monitor")),
                (0x46, on_off!("vox")),
                (0x47, table!("break-in", &[Some("off"), Some("semi"), Some("full")])),
                (0x48, on_off!("manual-notch")),
                (0x4b, on_off!("dtcs")),
                (0x4f, on_off!("twin-peak-filter")),
                (0x50, on_off!("dial-lock")),
                (0x56, table!("dsp-if-filter", &[Some("sharp"), Some("soft")])),
                (0x57, table!("manual-notch-width", &[Some("wide"), Some("mid"), Some("narrow")])),
                (0x58, table!("ssb-transmit-bandwidth", &[Some("wide"), Some("mid"), Some("narrow")])),
                (0x5b, table!("dsql-squelch", &[Some("off"), Some("dsql"), Some("csql")])),
                (0x5c, table!("gps-transmit-mode", &[Some("off"), Some("d-prs"), Some("nmea")])),
                (
                    0x5d,
                    table!("tone-squelch-function", &[Some("off"), Some("tone"), Some("tsql"), Some("dtcs")]),
                ),
            ],
        ),
    ),
    (0x17, cmd!("send-cw-message")),
    (
        0x18,
        group!("power", &[(0x00, cmd!("power-off")), (0x01, cmd!("power-on"))]),
    ),
    (0x19, cmd!("read-transceiver-id")),
    (
        0x1a,
        group!(
            "extended",
            &[
                (0x00, cmd!("memory")),
                (0x01, cmd!("stacking-register")),
                (0x02, cmd!("memory-keyer")),
                (0x03, cmd!("if-filter-width")),
                (0x04, cmd!("agc-time-constant")),
                (
                    0x05,
                    group!(
                        "settings",
                        &[
                            (
                                0x00,
                                group!("settings-general", &[(0x46, cmd!("set-function-split"))]),
                            ),
                            (0x01, group!("connectors", &[(0x19, on_off!("mod-input"))])),
                        ],
                    ),
                ),
                (0x06, with!("data-mode", FieldDecoder::DataMode)),
                (0x07, table!("ntp-access", &[Some("terminate"), Some("initiate")])),
                (
                    0x08,
                    table!("ntp-access-status", &[Some("accessing"), Some("success"), Some("failed")]),
                ),
                (0x09, on_off!("ovf-indicator")),
                (0x0a, table!("share-pictures", &[Some("off"), Some("on"), Some("on-repeat")])),
                (
                    0x0b,
                    with!(
                        "power-supply",
                        FieldDecoder::Table {
                            field: "type",
                            labels: &[Some("external"), Some("battery")],
                        },
                    ),
                ),
            ],
        ),
    ),
    (
        0x1b,
        group!(
            "tone",
            &[
                (0x00, with!("repeater-tone-frequency", TONE)),
                (0x01, with!("tsql-tone-frequency", TONE)),
                (0x02, cmd!("dtcs-code")),
                (0x07, cmd!("csql-code")),
            ],
        ),
    ),
    (
        0x1c,
        group!(
            "status",
            &[
                (0x00, table!("transceiver-status", &[Some("rx"), Some("tx")])),
                (0x01, table!("antenna-tuner-status", &[Some("off"), Some("on"), Some("tune")])),
                (0x02, on_off!("transmit-frequency-monitor")),
                (0x03, with!("transmit-frequency", FieldDecoder::FREQUENCY)),
            ],
        ),
    ),
    (
        0x21,
        group!(
            "rit",
            &[
                (0x00, with!("rit-frequency", FieldDecoder::Rit { field: "frequency" })),
                (0x01, on_off!("rit-setting")),
                (0x02, on_off!("delta-tx-setting")),
            ],
        ),
    ),
    (0x27, cmd!("scope-waveform")),
    (0xfa, cmd!("fail")),
    (0xfb, cmd!("ok")),
];

#[derive(Debug, Clone)]
struct CommandPath {
    bytes: Vec<u8>,
    decoder: Option<FieldDecoder>,
}

/// An indexed, validated command tree.
#[derive(Debug)]
pub struct CommandTree {
    root: &'static [(u8, CommandNode)],
    by_name: HashMap<&'static str, CommandPath>,
}

impl CommandTree {
    /// Index `root`, checking that every node name is unique and that no
    /// byte appears twice at one level.
    pub fn build(root: &'static [(u8, CommandNode)]) -> Result<Self> {
        let mut by_name = HashMap::new();
        index_level(root, &mut Vec::new(), &mut by_name)?;
        Ok(CommandTree { root, by_name })
    }

    /// Names of every node in the tree, terminal and interior.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_name.keys().copied()
    }

    /// Byte path for a node name.
    pub fn path(&self, name: &str) -> Option<&[u8]> {
        self.by_name.get(name).map(|p| p.bytes.as_slice())
    }

    /// The `command_code` a decoded reply to `name` would carry: its path
    /// bytes folded big-endian. Synthesized `command-0x..` names work too.
    pub fn command_code(&self, name: &str) -> Option<u64> {
        let bytes = match self.path(name) {
            Some(path) => path.to_vec(),
            None => parse_unknown_name(name)?,
        };
        Some(bytes.iter().fold(0, |code, &b| (code << 8) | u64::from(b)))
    }

    /// Walk `payload` (the bytes between the addresses and the trailer).
    ///
    /// Unknown bytes never fail the decode: they produce a synthesized
    /// `command-0x..` name with the rest of the payload kept raw.
    pub fn decode(&self, payload: &[u8]) -> Result<DecodedCommand> {
        if payload.is_empty() {
            return Err(Error::MalformedHeader("CI-V frame has no command byte".into()));
        }

        let mut level = self.root;
        let mut code: u64 = 0;
        let mut last_group = None;

        for (i, &byte) in payload.iter().enumerate() {
            code = (code << 8) | u64::from(byte);
            let rest = &payload[i + 1..];

            match find(level, byte) {
                Some(CommandNode::Terminal { name, decoder }) => {
                    return Ok(DecodedCommand {
                        command: (*name).to_string(),
                        command_code: code,
                        fields: decoder.decode(rest),
                    });
                }
                Some(CommandNode::Interior { name, children }) => {
                    level = *children;
                    last_group = Some(*name);
                }
                None => {
                    let path = &payload[..=i];
                    let name = unknown_name(path);
                    tracing::debug!(error = %Error::UnknownCommand(name.clone()), "uncatalogued command");
                    return Ok(DecodedCommand {
                        command: name,
                        command_code: code,
                        fields: FieldDecoder::Raw.decode(rest),
                    });
                }
            }
        }

        // Every byte selected a group; the frame ends at an interior node.
        Ok(DecodedCommand {
            command: last_group.unwrap_or_default().to_string(),
            command_code: code,
            fields: Fields::new(),
        })
    }

    /// Encode a command back into its path bytes plus field data.
    ///
    /// `command_code` is ignored; the name selects the path.
    pub fn encode(&self, command: &DecodedCommand) -> Result<Vec<u8>> {
        if let Some(path) = self.by_name.get(command.command.as_str()) {
            let mut out = path.bytes.clone();
            if let Some(decoder) = path.decoder {
                out.extend(decoder.encode(&command.fields)?);
            }
            return Ok(out);
        }

        let mut out = parse_unknown_name(&command.command)
            .ok_or_else(|| Error::UnknownCommand(command.command.clone()))?;
        out.extend(FieldDecoder::Raw.encode(&command.fields)?);
        Ok(out)
    }
}

/// The built-in tree, indexed on first use.
pub fn standard() -> &'static CommandTree {
    static TREE: OnceLock<CommandTree> = OnceLock::new();
    TREE.get_or_init(|| {
        CommandTree::build(CIV_COMMANDS).expect("built-in CI-V command tree is valid")
    })
}

fn index_level(
    level: &'static [(u8, CommandNode)],
    prefix: &mut Vec<u8>,
    by_name: &mut HashMap<&'static str, CommandPath>,
) -> Result<()> {
    for (i, (byte, node)) in level.iter().enumerate() {
        if level[..i].iter().any(|(b, _)| b == byte) {
            return Err(Error::Encode(format!(
                "duplicate command byte 0x{byte:02x} after {prefix:02x?}"
            )));
        }

        let name = node.name();
        if name.is_empty() || name.starts_with(UNKNOWN_PREFIX) {
            return Err(Error::Encode(format!("invalid command name {name:?}")));
        }

        prefix.push(*byte);
        let decoder = match node {
            CommandNode::Terminal { decoder, .. } => Some(*decoder),
            CommandNode::Interior { .. } => None,
        };
        let path = CommandPath {
            bytes: prefix.clone(),
            decoder,
        };
        if by_name.insert(name, path).is_some() {
            return Err(Error::Encode(format!("duplicate command name {name:?}")));
        }
        if let CommandNode::Interior { children, .. } = node {
            index_level(*children, prefix, by_name)?;
        }
        prefix.pop();
    }
    Ok(())
}

fn find(level: &'static [(u8, CommandNode)], byte: u8) -> Option<&'static CommandNode> {
    level.iter().find(|(b, _)| *b == byte).map(|(_, node)| node)
}

fn unknown_name(path: &[u8]) -> String {
    let mut name = String::from(UNKNOWN_PREFIX);
    for byte in path {
        let _ = write!(name, "{byte:02x}");
    }
    name
}

fn parse_unknown_name(name: &str) -> Option<Vec<u8>> {
    let digits = name.strip_prefix(UNKNOWN_PREFIX)?;
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn decode(bytes: &[u8]) -> DecodedCommand {
        standard().decode(bytes).unwrap()
    }

    // ---------------------------------------------------------------
    // Tree validation
    // ---------------------------------------------------------------

    #[test]
    fn standard_tree_builds() {
        let tree = standard();
        assert_eq!(tree.path("preamp"), Some(&[0x16, 0x02][..]));
        assert_eq!(tree.path("mod-input"), Some(&[0x1a, 0x05, 0x01, 0x19][..]));
        assert_eq!(tree.path("functions"), Some(&[0x16][..]));
        assert_eq!(tree.path("no-such-command"), None);
    }

    #[test]
    fn build_rejects_duplicate_names() {
        static DUP: &[(u8, CommandNode)] = &[
            (0x01, cmd!("same")),
            (0x02, group!("outer", &[(0x00, cmd!("same"))])),
        ];
        assert!(matches!(CommandTree::build(DUP), Err(Error::Encode(_))));
    }

    #[test]
    fn build_rejects_duplicate_bytes() {
        static DUP: &[(u8, CommandNode)] = &[(0x01, cmd!("a")), (0x01, cmd!("b"))];
        assert!(CommandTree::build(DUP).is_err());
    }

    #[test]
    fn build_rejects_reserved_prefix() {
        static BAD: &[(u8, CommandNode)] = &[(0x01, cmd!("command-0x01"))];
        assert!(CommandTree::build(BAD).is_err());
    }

    // ---------------------------------------------------------------
    // Decode
    // ---------------------------------------------------------------

    #[test]
    fn decode_frequency_command() {
        let cmd = decode(&[0x03, 0x00, 0x00, 0x07, 0x14, 0x01]);
        assert_eq!(cmd.command, "read-operating-frequency");
        assert_eq!(cmd.command_code, 0x03);
        assert_eq!(cmd.field("frequency"), Some(&FieldValue::Int(14_070_000)));
    }

    #[test]
    fn decode_preamp_table() {
        let cmd = decode(&[0x16, 0x02, 0x02]);
        assert_eq!(cmd.command, "preamp");
        assert_eq!(cmd.command_code, 0x1602);
        assert_eq!(cmd.field("status"), Some(&FieldValue::from("p.amp2")));
    }

    #[test]
    fn decode_four_byte_path() {
        let cmd = decode(&[0x1a, 0x05, 0x01, 0x19, 0x01]);
        assert_eq!(cmd.command, "mod-input");
        assert_eq!(cmd.command_code, 0x1a05_0119);
        assert_eq!(cmd.field("status"), Some(&FieldValue::from("on")));
    }

    #[test]
    fn decode_rit_and_tone() {
        let rit = decode(&[0x21, 0x00, 0x05, 0x00, 0x01]);
        assert_eq!(rit.command, "rit-frequency");
        assert_eq!(rit.field("frequency"), Some(&FieldValue::Int(-5)));

        let tone = decode(&[0x1b, 0x00, 0x00, 0x13, 0x18]);
        assert_eq!(tone.command, "repeater-tone-frequency");
        assert_eq!(tone.field("frequency"), Some(&FieldValue::Float(131.8)));
    }

    #[test]
    fn decode_unknown_top_level() {
        let cmd = decode(&[0x1d, 0x01, 0x02]);
        assert_eq!(cmd.command, "command-0x1d");
        assert_eq!(cmd.command_code, 0x1d);
        assert_eq!(cmd.field("payload"), Some(&FieldValue::Bytes(vec![0x01, 0x02])));
    }

    #[test]
    fn decode_unknown_sub_command() {
        let cmd = decode(&[0x16, 0x99, 0x01]);
        assert_eq!(cmd.command, "command-0x1699");
        assert_eq!(cmd.command_code, 0x1699);
        assert_eq!(cmd.field("payload"), Some(&FieldValue::Bytes(vec![0x01])));
    }

    #[test]
    fn decode_ends_at_group() {
        let cmd = decode(&[0x1c]);
        assert_eq!(cmd.command, "status");
        assert_eq!(cmd.command_code, 0x1c);
        assert!(cmd.fields.is_empty());
    }

    #[test]
    fn decode_empty_payload_is_malformed() {
        assert!(matches!(
            standard().decode(&[]),
            Err(Error::MalformedHeader(_))
        ));
    }

    // ---------------------------------------------------------------
    // Encode
    // ---------------------------------------------------------------

    #[test]
    fn every_catalogued_path_round_trips() {
        let tree = standard();
        for name in tree.names() {
            let bytes = tree.encode(&DecodedCommand::new(name)).unwrap();
            assert_eq!(Some(bytes.as_slice()), tree.path(name));
            let decoded = tree.decode(&bytes).unwrap();
            assert_eq!(decoded.command, name);
            assert_eq!(tree.encode(&decoded).unwrap(), bytes);
        }
    }

    #[test]
    fn payload_round_trips() {
        let frames: &[&[u8]] = &[
            &[0x00, 0x00, 0x50, 0x07, 0x14, 0x00],
            &[0x15, 0x02, 0x01, 0x20],
            &[0x16, 0x12, 0x03],
            &[0x16, 0x5d, 0x02],
            &[0x1a, 0x06, 0x01, 0x01],
            &[0x1a, 0x0b, 0x01],
            &[0x1c, 0x00, 0x01],
            &[0x21, 0x00, 0x99, 0x09, 0x00],
            &[0x27, 0x00, 0x00, 0x11, 0x22],
            &[0x1d, 0x01],
            &[0x1a, 0x05, 0x00, 0x47, 0x01],
            &[0x1a, 0x06, 0x00, 0x00],
            &[0x16, 0x02, 0x02, 0x00],
        ];
        for bytes in frames {
            let decoded = decode(bytes);
            assert_eq!(standard().encode(&decoded).unwrap(), *bytes, "{decoded:?}");
        }
    }

    #[test]
    fn encode_from_fields() {
        let cmd = DecodedCommand::new("set-operating-frequency").with("frequency", 7_074_000i64);
        assert_eq!(
            standard().encode(&cmd).unwrap(),
            vec![0x05, 0x00, 0x40, 0x07, 0x07, 0x00]
        );
    }

    #[test]
    fn encode_unknown_name_fails() {
        let err = standard().encode(&DecodedCommand::new("warp-drive")).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(ref n) if n == "warp-drive"));
    }

    #[test]
    fn encode_bad_synthesized_name_fails() {
        assert!(standard().encode(&DecodedCommand::new("command-0x1")).is_err());
        assert!(standard().encode(&DecodedCommand::new("command-0xzz")).is_err());
        assert!(standard().encode(&DecodedCommand::new("command-0x")).is_err());
    }

    #[test]
    fn command_code_matches_decode() {
        let tree = standard();
        assert_eq!(tree.command_code("read-operating-frequency"), Some(0x03));
        assert_eq!(tree.command_code("preamp"), Some(0x1602));
        assert_eq!(tree.command_code("command-0x1d"), Some(0x1d));
        assert_eq!(tree.command_code("warp-drive"), None);
        assert_eq!(
            tree.command_code("preamp"),
            Some(decode(&[0x16, 0x02, 0x01]).command_code)
        );
    }
}
