//! Reversible concealment of credentials stored in configuration files.
//!
//! Values are AES-CTR encrypted under a key that is embedded in this module
//! and then base64 encoded. This prevents a passphrase from being displayed
//! verbatim when a configuration file is opened in an editor or pasted into
//! a bug report. It is **not** a security boundary: anyone with a copy of
//! this crate can reverse it. Real secrecy comes from the key-derivation
//! step downstream.

use aes::Aes256;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use thiserror::Error;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Size of the random IV prepended to every obscured value.
const IV_SIZE: usize = 16;

// Fixed, deliberately public key. Changing it breaks every previously
// written configuration file.
const OBSCURE_KEY: [u8; 32] = [
    0x9c, 0x93, 0x5b, 0x48, 0x73, 0x0a, 0x55, 0x4d, 0x6b, 0xfd, 0x7c, 0x63, 0xc8, 0x86, 0xa9,
    0x2b, 0xd3, 0x90, 0x19, 0x8e, 0xb8, 0x12, 0x8a, 0xfb, 0xf4, 0xde, 0x16, 0x2b, 0x8b, 0x95,
    0xf6, 0x38,
];

/// Errors produced when reading back an obscured configuration value.
#[derive(Error, Debug)]
pub enum ObscureError {
    /// The value is not valid URL-safe base64.
    #[error("obscured value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded value is shorter than the IV it must start with.
    #[error("obscured value is too short to contain an IV")]
    TooShort,

    /// Decryption produced bytes that are not valid UTF-8, which means the
    /// value was corrupted or never produced by [`obscure`].
    #[error("revealed value is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Obscure a plaintext value for storage in a configuration file.
///
/// The output is `base64url(IV || AES-CTR(plaintext))` with a fresh random
/// 16-byte IV, so obscuring the same value twice yields different strings.
pub fn obscure(plain: &str) -> String {
    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let mut buf = Vec::with_capacity(IV_SIZE + plain.len());
    buf.extend_from_slice(&iv);
    buf.extend_from_slice(plain.as_bytes());

    let mut cipher = Aes256Ctr::new((&OBSCURE_KEY).into(), (&iv).into());
    cipher.apply_keystream(&mut buf[IV_SIZE..]);

    URL_SAFE_NO_PAD.encode(&buf)
}

/// Reverse [`obscure`], recovering the original plaintext.
///
/// # Errors
///
/// Returns [`ObscureError`] if the input is not valid base64, is shorter
/// than the 16-byte IV, or decrypts to invalid UTF-8.
pub fn reveal(obscured: &str) -> Result<String, ObscureError> {
    let mut buf = URL_SAFE_NO_PAD.decode(obscured)?;
    if buf.len() < IV_SIZE {
        return Err(ObscureError::TooShort);
    }

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&buf[..IV_SIZE]);
    let mut cipher = Aes256Ctr::new((&OBSCURE_KEY).into(), (&iv).into());
    cipher.apply_keystream(&mut buf[IV_SIZE..]);

    Ok(String::from_utf8(buf.split_off(IV_SIZE))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for value in ["potato", "", "pass with spaces", "ünïcödé-påss"] {
            let obscured = obscure(value);
            assert_eq!(reveal(&obscured).unwrap(), value, "failed for {value:?}");
        }
    }

    #[test]
    fn obscuring_is_randomized() {
        let a = obscure("potato");
        let b = obscure("potato");
        assert_ne!(a, b, "two obscured copies should use different IVs");
        assert_eq!(reveal(&a).unwrap(), reveal(&b).unwrap());
    }

    #[test]
    fn output_is_urlsafe_base64() {
        let obscured = obscure("some long passphrase with ünicode");
        assert!(obscured
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            reveal("not!!valid@@base64"),
            Err(ObscureError::Base64(_))
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        // 8 decoded bytes, too short for a 16-byte IV
        let short = URL_SAFE_NO_PAD.encode([0u8; 8]);
        assert!(matches!(reveal(&short), Err(ObscureError::TooShort)));
    }

    #[test]
    fn obscured_empty_string_is_iv_only() {
        let obscured = obscure("");
        let decoded = URL_SAFE_NO_PAD.decode(&obscured).unwrap();
        assert_eq!(decoded.len(), IV_SIZE);
        assert_eq!(reveal(&obscured).unwrap(), "");
    }
}
