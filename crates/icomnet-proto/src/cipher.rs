//! Credential substitution cipher.
//!
//! Usernames and passwords in login and connection requests are not sent
//! in the clear but through a fixed position-dependent substitution over
//! printable ASCII. It is obfuscation, not encryption.

use icomnet_core::{Error, Result};

/// Width of a credential field on the wire.
pub const CREDENTIAL_LEN: usize = 16;

const FIRST: u8 = 0x20;
const LAST: u8 = 0x7E;
const SPAN: u8 = LAST - FIRST + 1;

const ENCRYPT: [u8; 95] = [
    0x47, 0x5d, 0x4c, 0x42, 0x66, 0x20, 0x23, 0x46, 0x4e, 0x57, 0x45, 0x3d, 0x67, 0x76, 0x60, 0x41,
    0x62, 0x39, 0x59, 0x2d, 0x68, 0x7e, 0x7c, 0x65, 0x7d, 0x49, 0x29, 0x72, 0x73, 0x78, 0x21, 0x6e,
    0x5a, 0x5e, 0x4a, 0x3e, 0x71, 0x2c, 0x2a, 0x54, 0x3c, 0x3a, 0x63, 0x4f, 0x43, 0x75, 0x27, 0x79,
    0x5b, 0x35, 0x70, 0x48, 0x6b, 0x56, 0x6f, 0x34, 0x32, 0x6c, 0x30, 0x61, 0x6d, 0x7b, 0x2f, 0x4b,
    0x64, 0x38, 0x2b, 0x2e, 0x50, 0x40, 0x3f, 0x55, 0x33, 0x37, 0x25, 0x77, 0x24, 0x26, 0x74, 0x6a,
    0x28, 0x53, 0x4d, 0x69, 0x22, 0x5c, 0x44, 0x31, 0x36, 0x58, 0x3b, 0x7a, 0x51, 0x5f, 0x52,
];

const DECRYPT: [u8; 95] = [
    0x25, 0x3e, 0x74, 0x26, 0x6c, 0x6a, 0x6d, 0x4e, 0x70, 0x3a, 0x46, 0x62, 0x45, 0x33, 0x63, 0x5e,
    0x5a, 0x77, 0x58, 0x68, 0x57, 0x51, 0x78, 0x69, 0x61, 0x31, 0x49, 0x7a, 0x48, 0x2b, 0x43, 0x66,
    0x65, 0x2f, 0x23, 0x4c, 0x76, 0x2a, 0x27, 0x20, 0x53, 0x39, 0x42, 0x5f, 0x22, 0x72, 0x28, 0x4b,
    0x64, 0x7c, 0x7e, 0x71, 0x47, 0x67, 0x55, 0x29, 0x79, 0x32, 0x40, 0x50, 0x75, 0x21, 0x41, 0x7d,
    0x2e, 0x5b, 0x30, 0x4a, 0x60, 0x37, 0x24, 0x2c, 0x34, 0x73, 0x6f, 0x54, 0x59, 0x5c, 0x3f, 0x56,
    0x52, 0x44, 0x3b, 0x3c, 0x6e, 0x4d, 0x2d, 0x6b, 0x3d, 0x4f, 0x7b, 0x5d, 0x36, 0x38, 0x35,
];

/// Encipher a credential.
///
/// The input must be printable ASCII and at most [`CREDENTIAL_LEN`]
/// characters; the output has the same length.
///
/// ```
/// use icomnet_proto::cipher::encrypt;
///
/// assert_eq!(encrypt("ic-705").unwrap(), "7PA)h)");
/// ```
pub fn encrypt(plain: &str) -> Result<String> {
    let bytes = check(plain)?;
    let out = bytes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let mut p = c as usize + i;
            if p > LAST as usize {
                p = FIRST as usize + p % (LAST as usize + 1);
            }
            ENCRYPT[p - FIRST as usize] as char
        })
        .collect();
    Ok(out)
}

/// Decipher a credential; the inverse of [`encrypt`].
pub fn decrypt(cipher: &str) -> Result<String> {
    let bytes = check(cipher)?;
    let out = bytes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let k = DECRYPT[(c - FIRST) as usize] as usize;
            let k = if k < FIRST as usize + i {
                k + SPAN as usize - i
            } else {
                k - i
            };
            k as u8 as char
        })
        .collect();
    Ok(out)
}

fn check(s: &str) -> Result<&[u8]> {
    let bytes = s.as_bytes();
    if bytes.len() > CREDENTIAL_LEN {
        return Err(Error::CipherLengthMismatch(bytes.len()));
    }
    if let Some(pos) = bytes.iter().position(|b| !(FIRST..=LAST).contains(b)) {
        return Err(Error::InvalidCredential(format!(
            "non-printable character at position {pos}"
        )));
    }
    Ok(bytes)
}
