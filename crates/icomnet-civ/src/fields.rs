//! Field decoders for CI-V command payloads.
//!
//! Each terminal in the command tree carries a [`FieldDecoder`] that turns
//! the bytes following the command path into named [`FieldValue`]s, and
//! back again for encoding. The byte-level helpers (`bcd_reverse`,
//! `bcd_forward`, ...) are exposed for callers that handle raw payloads.
//!
//! All decoders treat an empty payload as "no value": a query such as
//! `03` (read operating frequency) decodes to a command with no fields,
//! and a command with no fields encodes to just its path bytes.
//!
//! Structured decoders read a fixed number of bytes. Anything the radio
//! sends past that width is kept verbatim under `payload` and appended
//! again on encode.

use icomnet_core::{Error, Result};

use crate::value::{FieldValue, Fields};

/// Wire width of a frequency field.
pub const FREQUENCY_WIDTH: usize = 5;
/// Wire width of a forward-BCD level field.
pub const LEVEL_WIDTH: usize = 2;
/// Wire width of a tone frequency field.
pub const TONE_WIDTH: usize = 3;
/// Wire width of the RIT magnitude (excluding the sign byte).
pub const RIT_MAGNITUDE_WIDTH: usize = 2;
/// Wire width of a data-mode field: mode byte plus filter byte.
pub const DATA_MODE_WIDTH: usize = 2;

const PAYLOAD: &str = "payload";

const ON: &str = "on";
const OFF: &str = "off";

const DATA_MODES: &[Option<&str>] = &[Some(OFF), Some(ON)];
const DATA_FILTERS: &[Option<&str>] = &[None, Some("filter-1"), Some("filter-2"), Some("filter-3")];

/// How the bytes after a command path are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDecoder {
    /// No structured fields; any bytes are kept verbatim as `payload`.
    Raw,
    /// BCD, least-significant byte first, in Hz.
    Frequency {
        /// Field name.
        field: &'static str,
    },
    /// BCD, most-significant byte first.
    Level {
        /// Field name.
        field: &'static str,
    },
    /// Forward BCD in tenths of a Hz.
    Tone {
        /// Field name.
        field: &'static str,
    },
    /// Two bytes reverse-BCD magnitude plus a sign byte.
    Rit {
        /// Field name.
        field: &'static str,
    },
    /// `0x01` is `"on"`, anything else `"off"`.
    Bool {
        /// Field name.
        field: &'static str,
    },
    /// One byte indexing a label table. `None` entries are reserved.
    Table {
        /// Field name.
        field: &'static str,
        /// Labels by index.
        labels: &'static [Option<&'static str>],
    },
    /// `data_mode` on/off, plus a `filter` label whenever the filter
    /// byte is present. Index 0 is a null filter.
    DataMode,
}

impl FieldDecoder {
    /// Shorthand for a frequency field named `frequency`.
    pub const FREQUENCY: FieldDecoder = FieldDecoder::Frequency { field: "frequency" };
    /// Shorthand for a boolean field named `status`.
    pub const STATUS: FieldDecoder = FieldDecoder::Bool { field: "status" };

    /// Bytes the structured value occupies, or `None` for [`Raw`](Self::Raw).
    pub fn width(&self) -> Option<usize> {
        match self {
            FieldDecoder::Raw => None,
            FieldDecoder::Frequency { .. } => Some(FREQUENCY_WIDTH),
            FieldDecoder::Level { .. } => Some(LEVEL_WIDTH),
            FieldDecoder::Tone { .. } => Some(TONE_WIDTH),
            FieldDecoder::Rit { .. } => Some(RIT_MAGNITUDE_WIDTH + 1),
            FieldDecoder::Bool { .. } | FieldDecoder::Table { .. } => Some(1),
            FieldDecoder::DataMode => Some(DATA_MODE_WIDTH),
        }
    }

    /// Decode `bytes` into named fields.
    ///
    /// Never fails: a field whose bytes cannot be interpreted is omitted
    /// and the reason logged.
    pub fn decode(&self, bytes: &[u8]) -> Fields {
        let mut fields = Fields::new();
        if bytes.is_empty() {
            return fields;
        }

        let (bytes, trailing) = match self.width() {
            Some(width) if bytes.len() > width => bytes.split_at(width),
            _ => (bytes, &[][..]),
        };
        if !trailing.is_empty() {
            tracing::debug!(?trailing, "keeping bytes past field width");
            insert(&mut fields, PAYLOAD, FieldValue::Bytes(trailing.to_vec()));
        }

        match *self {
            FieldDecoder::Raw => {
                insert(&mut fields, PAYLOAD, FieldValue::Bytes(bytes.to_vec()));
            }
            FieldDecoder::Frequency { field } => match bcd_reverse(bytes) {
                Some(hz) => insert(&mut fields, field, FieldValue::Int(hz as i64)),
                None => invalid_bcd(field, bytes),
            },
            FieldDecoder::Level { field } => match bcd_forward(bytes) {
                Some(v) => insert(&mut fields, field, FieldValue::Int(v as i64)),
                None => invalid_bcd(field, bytes),
            },
            FieldDecoder::Tone { field } => match bcd_forward(bytes) {
                Some(v) => insert(&mut fields, field, FieldValue::Float(v as f64 / 10.0)),
                None => invalid_bcd(field, bytes),
            },
            FieldDecoder::Rit { field } => match rit_frequency(bytes) {
                Some(v) => insert(&mut fields, field, FieldValue::Int(v)),
                None => invalid_bcd(field, bytes),
            },
            FieldDecoder::Bool { field } => {
                let label = if decode_bool(bytes) { ON } else { OFF };
                insert(&mut fields, field, FieldValue::from(label));
            }
            FieldDecoder::Table { field, labels } => {
                if let Some(v) = lookup(field, bytes[0], labels) {
                    insert(&mut fields, field, v);
                }
            }
            FieldDecoder::DataMode => {
                if let Some(v) = lookup("data_mode", bytes[0], DATA_MODES) {
                    insert(&mut fields, "data_mode", v);
                }
                match bytes.get(1) {
                    Some(&idx) => {
                        if let Some(v) = lookup("filter", idx, DATA_FILTERS) {
                            insert(&mut fields, "filter", v);
                        }
                    }
                    None if bytes[0] != 0 => tracing::debug!("data mode on without a filter byte"),
                    None => {}
                }
            }
        }

        fields
    }

    /// Encode named fields back into payload bytes.
    ///
    /// Absent fields encode to nothing, mirroring [`decode`](Self::decode)
    /// of an empty payload. A present field whose value cannot be
    /// represented returns [`Error::Encode`].
    pub fn encode(&self, fields: &Fields) -> Result<Vec<u8>> {
        let mut out = self.encode_value(fields)?;
        if self.width().is_some() {
            out.extend_from_slice(&payload_bytes(fields)?);
        }
        Ok(out)
    }

    fn encode_value(&self, fields: &Fields) -> Result<Vec<u8>> {
        match *self {
            FieldDecoder::Raw => payload_bytes(fields),
            FieldDecoder::Frequency { field } => match fields.get(field) {
                None => Ok(Vec::new()),
                Some(v) => to_bcd_reverse(unsigned(field, v)?, FREQUENCY_WIDTH),
            },
            FieldDecoder::Level { field } => match fields.get(field) {
                None => Ok(Vec::new()),
                Some(v) => to_bcd_forward(unsigned(field, v)?, LEVEL_WIDTH),
            },
            FieldDecoder::Tone { field } => match fields.get(field) {
                None => Ok(Vec::new()),
                Some(v) => {
                    let hz = v
                        .as_float()
                        .ok_or_else(|| wrong_type(field, "number", v))?;
                    let tenths = (hz * 10.0).round();
                    if tenths < 0.0 {
                        return Err(Error::Encode(format!("{field}: negative tone {hz}")));
                    }
                    to_bcd_forward(tenths as u64, TONE_WIDTH)
                }
            },
            FieldDecoder::Rit { field } => match fields.get(field) {
                None => Ok(Vec::new()),
                Some(v) => {
                    let hz = v.as_int().ok_or_else(|| wrong_type(field, "integer", v))?;
                    let mut out = to_bcd_reverse(hz.unsigned_abs(), RIT_MAGNITUDE_WIDTH)?;
                    out.push(u8::from(hz < 0));
                    Ok(out)
                }
            },
            FieldDecoder::Bool { field } => match fields.get(field) {
                None => Ok(Vec::new()),
                Some(v) => match v.as_text() {
                    Some(ON) => Ok(vec![0x01]),
                    Some(OFF) => Ok(vec![0x00]),
                    _ => Err(wrong_type(field, "\"on\" or \"off\"", v)),
                },
            },
            FieldDecoder::Table { field, labels } => match fields.get(field) {
                None => Ok(Vec::new()),
                Some(v) => Ok(vec![index_of(field, v, labels)?]),
            },
            FieldDecoder::DataMode => {
                let Some(mode) = fields.get("data_mode") else {
                    return Ok(Vec::new());
                };
                let mode = index_of("data_mode", mode, DATA_MODES)?;
                let mut out = vec![mode];
                let filter = fields.get("filter");
                if mode != 0 || filter.is_some() {
                    let filter = filter.unwrap_or(&FieldValue::Null);
                    out.push(index_of("filter", filter, DATA_FILTERS)?);
                }
                Ok(out)
            }
        }
    }
}

/// Decode BCD digits stored least-significant byte first.
///
/// Within a byte the high nibble is the more significant digit. Returns
/// `None` for an empty slice, a nibble above 9, or a value that does not
/// fit in a `u64`.
///
/// ```
/// use icomnet_civ::fields::bcd_reverse;
///
/// assert_eq!(bcd_reverse(&[0x00, 0x00, 0x07, 0x14, 0x01]), Some(14_070_000));
/// ```
pub fn bcd_reverse(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().rev().try_fold(0u64, push_bcd_byte)
}

/// Decode BCD digits stored most-significant byte first.
///
/// ```
/// use icomnet_civ::fields::bcd_forward;
///
/// assert_eq!(bcd_forward(&[0x00, 0x13, 0x18]), Some(1318));
/// ```
pub fn bcd_forward(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u64, push_bcd_byte)
}

fn push_bcd_byte(acc: u64, &byte: &u8) -> Option<u64> {
    let hi = (byte >> 4) & 0x0F;
    let lo = byte & 0x0F;
    if hi > 9 || lo > 9 {
        return None;
    }
    acc.checked_mul(100)?.checked_add(u64::from(hi * 10 + lo))
}

/// Encode `value` as `width` bytes of BCD, least-significant byte first.
///
/// This is the inverse of [`bcd_reverse`]. Fails if `value` needs more
/// than `2 * width` digits.
pub fn to_bcd_reverse(value: u64, width: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(width);
    let mut rest = value;
    for _ in 0..width {
        let lo = (rest % 10) as u8;
        rest /= 10;
        let hi = (rest % 10) as u8;
        rest /= 10;
        out.push((hi << 4) | lo);
    }
    if rest != 0 {
        return Err(Error::Encode(format!(
            "{value} does not fit in {} BCD digits",
            width * 2
        )));
    }
    Ok(out)
}

/// Encode `value` as `width` bytes of BCD, most-significant byte first.
pub fn to_bcd_forward(value: u64, width: usize) -> Result<Vec<u8>> {
    let mut out = to_bcd_reverse(value, width)?;
    out.reverse();
    Ok(out)
}

/// `0x01` is on; anything else (including an empty slice) is off.
pub fn decode_bool(bytes: &[u8]) -> bool {
    bytes.first() == Some(&0x01)
}

/// Signed RIT offset: reverse-BCD magnitude in the first two bytes, then a
/// sign byte where nonzero means negative. A missing sign byte reads as
/// positive.
pub fn rit_frequency(bytes: &[u8]) -> Option<i64> {
    let magnitude = bcd_reverse(bytes.get(..RIT_MAGNITUDE_WIDTH)?)? as i64;
    let negative = bytes.get(RIT_MAGNITUDE_WIDTH).is_some_and(|&s| s != 0);
    Some(if negative { -magnitude } else { magnitude })
}

/// Look up a table label by index.
///
/// Returns [`Error::TableIndexOutOfRange`] when `index` has no entry.
/// A reserved (`None`) entry yields `Ok(None)`.
pub fn table_label(
    index: u8,
    labels: &'static [Option<&'static str>],
) -> Result<Option<&'static str>> {
    labels
        .get(usize::from(index))
        .copied()
        .ok_or(Error::TableIndexOutOfRange {
            index,
            len: labels.len(),
        })
}

fn lookup(field: &str, index: u8, labels: &'static [Option<&'static str>]) -> Option<FieldValue> {
    match table_label(index, labels) {
        Ok(Some(label)) => Some(FieldValue::from(label)),
        Ok(None) => Some(FieldValue::Null),
        Err(e) => {
            tracing::warn!(field, error = %e, "omitting field");
            None
        }
    }
}

fn index_of(field: &str, value: &FieldValue, labels: &[Option<&str>]) -> Result<u8> {
    let wanted = match value {
        FieldValue::Null => None,
        FieldValue::Text(s) => Some(s.as_str()),
        other => return Err(wrong_type(field, "label", other)),
    };
    labels
        .iter()
        .position(|l| *l == wanted)
        .and_then(|i| u8::try_from(i).ok())
        .ok_or_else(|| Error::Encode(format!("{field}: no table entry for {value:?}")))
}

fn payload_bytes(fields: &Fields) -> Result<Vec<u8>> {
    match fields.get(PAYLOAD) {
        None => Ok(Vec::new()),
        Some(FieldValue::Bytes(b)) => Ok(b.clone()),
        Some(other) => Err(wrong_type(PAYLOAD, "bytes", other)),
    }
}

fn unsigned(field: &str, value: &FieldValue) -> Result<u64> {
    value
        .as_int()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| wrong_type(field, "non-negative integer", value))
}

fn wrong_type(field: &str, expected: &str, got: &FieldValue) -> Error {
    Error::Encode(format!("{field}: expected {expected}, got {got:?}"))
}

fn insert(fields: &mut Fields, name: &str, value: FieldValue) {
    fields.insert(name.to_string(), value);
}

fn invalid_bcd(field: &str, bytes: &[u8]) {
    tracing::warn!(field, ?bytes, "invalid BCD, omitting field");
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREAMP: FieldDecoder = FieldDecoder::Table {
        field: "status",
        labels: &[Some("off"), Some("p.amp1"), Some("p.amp2")],
    };

    const AGC: FieldDecoder = FieldDecoder::Table {
        field: "status",
        labels: &[None, Some("fast"), Some("mid"), Some("slow")],
    };

    fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // ---------------------------------------------------------------
    // BCD helpers
    // ---------------------------------------------------------------

    #[test]
    fn bcd_reverse_frequency() {
        assert_eq!(bcd_reverse(&[0x00, 0x00, 0x07, 0x14, 0x01]), Some(14_070_000));
        assert_eq!(bcd_reverse(&[0x00, 0x00, 0x25, 0x14, 0x00]), Some(14_250_000));
    }

    #[test]
    fn bcd_forward_and_reverse_read_opposite_ends() {
        assert_eq!(bcd_forward(&[0x00, 0x01, 0x18]), Some(118));
        assert_eq!(bcd_reverse(&[0x18, 0x01, 0x00]), Some(118));
        assert_eq!(bcd_forward(&[0x18, 0x01, 0x00]), Some(180_100));
    }

    #[test]
    fn bcd_rejects_bad_nibbles_and_empty() {
        assert_eq!(bcd_reverse(&[0x0A]), None);
        assert_eq!(bcd_forward(&[0xF0, 0x00]), None);
        assert_eq!(bcd_reverse(&[]), None);
        assert_eq!(bcd_forward(&[]), None);
    }

    #[test]
    fn bcd_overflow_is_none() {
        assert_eq!(bcd_forward(&[0x99; 10]), None);
    }

    #[test]
    fn to_bcd_reverse_frequency() {
        assert_eq!(
            to_bcd_reverse(7_000_000, 5).unwrap(),
            vec![0x00, 0x00, 0x00, 0x07, 0x00]
        );
        assert_eq!(to_bcd_forward(1318, 3).unwrap(), vec![0x00, 0x13, 0x18]);
    }

    #[test]
    fn to_bcd_rejects_too_many_digits() {
        assert!(matches!(to_bcd_reverse(10_000, 2), Err(Error::Encode(_))));
        assert!(to_bcd_reverse(9_999, 2).is_ok());
    }

    #[test]
    fn rit_sign_byte() {
        assert_eq!(rit_frequency(&[0x05, 0x00, 0x01]), Some(-5));
        assert_eq!(rit_frequency(&[0x50, 0x12, 0x00]), Some(1250));
        assert_eq!(rit_frequency(&[0x50, 0x12]), Some(1250));
        assert_eq!(rit_frequency(&[0x05]), None);
    }

    #[test]
    fn bool_only_one_is_on() {
        assert!(decode_bool(&[0x01]));
        assert!(!decode_bool(&[0x00]));
        assert!(!decode_bool(&[0x02]));
    }

    #[test]
    fn table_label_out_of_range() {
        let labels: &'static [Option<&'static str>] = &[Some("rx"), Some("tx")];
        assert_eq!(table_label(1, labels).unwrap(), Some("tx"));
        match table_label(2, labels) {
            Err(Error::TableIndexOutOfRange { index, len }) => {
                assert_eq!(index, 2);
                assert_eq!(len, 2);
            }
            other => panic!("expected TableIndexOutOfRange, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------
    // FieldDecoder::decode
    // ---------------------------------------------------------------

    #[test]
    fn decode_empty_yields_no_fields() {
        for d in [
            FieldDecoder::Raw,
            FieldDecoder::FREQUENCY,
            FieldDecoder::STATUS,
            PREAMP,
            FieldDecoder::DataMode,
        ] {
            assert!(d.decode(&[]).is_empty(), "{d:?}");
        }
    }

    #[test]
    fn decode_frequency() {
        let f = FieldDecoder::FREQUENCY.decode(&[0x00, 0x00, 0x07, 0x14, 0x01]);
        assert_eq!(f["frequency"], FieldValue::Int(14_070_000));
    }

    #[test]
    fn decode_tone() {
        let f = FieldDecoder::Tone { field: "frequency" }.decode(&[0x00, 0x13, 0x18]);
        assert_eq!(f["frequency"], FieldValue::Float(131.8));
    }

    #[test]
    fn decode_table() {
        let f = PREAMP.decode(&[0x02]);
        assert_eq!(f["status"], FieldValue::from("p.amp2"));
    }

    #[test]
    fn decode_table_reserved_entry_is_null() {
        let f = AGC.decode(&[0x00]);
        assert_eq!(f["status"], FieldValue::Null);
    }

    #[test]
    fn decode_table_out_of_range_omits_field() {
        assert!(PREAMP.decode(&[0x07]).is_empty());
    }

    #[test]
    fn decode_invalid_bcd_omits_field() {
        assert!(FieldDecoder::FREQUENCY.decode(&[0xAB, 0x00]).is_empty());
    }

    #[test]
    fn decode_data_mode() {
        let f = FieldDecoder::DataMode.decode(&[0x01, 0x02]);
        assert_eq!(f["data_mode"], FieldValue::from("on"));
        assert_eq!(f["filter"], FieldValue::from("filter-2"));

        let f = FieldDecoder::DataMode.decode(&[0x00, 0x00]);
        assert_eq!(f["data_mode"], FieldValue::from("off"));
        assert_eq!(f["filter"], FieldValue::Null);

        let f = FieldDecoder::DataMode.decode(&[0x00]);
        assert!(!f.contains_key("filter"));
    }

    #[test]
    fn decode_keeps_bytes_past_width() {
        let f = PREAMP.decode(&[0x02, 0x00]);
        assert_eq!(f["status"], FieldValue::from("p.amp2"));
        assert_eq!(f["payload"], FieldValue::Bytes(vec![0x00]));

        let f = FieldDecoder::STATUS.decode(&[0x01, 0x7F, 0x01]);
        assert_eq!(f["status"], FieldValue::from("on"));
        assert_eq!(f["payload"], FieldValue::Bytes(vec![0x7F, 0x01]));

        assert!(!PREAMP.decode(&[0x02]).contains_key("payload"));
    }

    #[test]
    fn encode_trailing_payload_must_be_bytes() {
        let f = fields(&[
            ("status", FieldValue::from("on")),
            ("payload", FieldValue::Int(3)),
        ]);
        assert!(matches!(FieldDecoder::STATUS.encode(&f), Err(Error::Encode(_))));
    }

    #[test]
    fn decode_raw_keeps_bytes() {
        let f = FieldDecoder::Raw.decode(&[0x01, 0x02]);
        assert_eq!(f["payload"], FieldValue::Bytes(vec![0x01, 0x02]));
    }

    // ---------------------------------------------------------------
    // FieldDecoder::encode
    // ---------------------------------------------------------------

    #[test]
    fn encode_absent_field_is_empty() {
        assert!(FieldDecoder::FREQUENCY.encode(&Fields::new()).unwrap().is_empty());
        assert!(PREAMP.encode(&Fields::new()).unwrap().is_empty());
    }

    #[test]
    fn encode_inverts_decode() {
        let cases: &[(FieldDecoder, &[u8])] = &[
            (FieldDecoder::FREQUENCY, &[0x00, 0x00, 0x07, 0x14, 0x01]),
            (FieldDecoder::Level { field: "level" }, &[0x01, 0x18]),
            (FieldDecoder::Tone { field: "frequency" }, &[0x00, 0x13, 0x18]),
            (FieldDecoder::Rit { field: "frequency" }, &[0x05, 0x00, 0x01]),
            (FieldDecoder::STATUS, &[0x01]),
            (PREAMP, &[0x02]),
            (AGC, &[0x00]),
            (FieldDecoder::DataMode, &[0x01, 0x03]),
            (FieldDecoder::DataMode, &[0x00]),
            (FieldDecoder::DataMode, &[0x00, 0x00]),
            (FieldDecoder::DataMode, &[0x01, 0x01, 0x05]),
            (PREAMP, &[0x02, 0x00]),
            (FieldDecoder::STATUS, &[0x00, 0x00]),
            (FieldDecoder::FREQUENCY, &[0x00, 0x00, 0x07, 0x14, 0x00, 0x00]),
            (FieldDecoder::Raw, &[0xDE, 0xAD]),
        ];
        for (decoder, bytes) in cases {
            let decoded = decoder.decode(bytes);
            assert_eq!(decoder.encode(&decoded).unwrap(), *bytes, "{decoder:?}");
        }
    }

    #[test]
    fn encode_tone_from_float() {
        let f = fields(&[("frequency", FieldValue::Float(88.5))]);
        assert_eq!(
            FieldDecoder::Tone { field: "frequency" }.encode(&f).unwrap(),
            vec![0x00, 0x08, 0x85]
        );
    }

    #[test]
    fn encode_rit_positive() {
        let f = fields(&[("frequency", FieldValue::Int(120))]);
        assert_eq!(
            FieldDecoder::Rit { field: "frequency" }.encode(&f).unwrap(),
            vec![0x20, 0x01, 0x00]
        );
    }

    #[test]
    fn encode_unknown_label_fails() {
        let f = fields(&[("status", FieldValue::from("p.amp3"))]);
        assert!(matches!(PREAMP.encode(&f), Err(Error::Encode(_))));
    }

    #[test]
    fn encode_wrong_type_fails() {
        let f = fields(&[("frequency", FieldValue::from("fast"))]);
        assert!(matches!(FieldDecoder::FREQUENCY.encode(&f), Err(Error::Encode(_))));
        let f = fields(&[("frequency", FieldValue::Int(-1))]);
        assert!(matches!(FieldDecoder::FREQUENCY.encode(&f), Err(Error::Encode(_))));
    }

    #[test]
    fn encode_bool_rejects_other_text() {
        let f = fields(&[("status", FieldValue::from("maybe"))]);
        assert!(FieldDecoder::STATUS.encode(&f).is_err());
    }
}
