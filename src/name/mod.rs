//! Filename encryption and obfuscation.
//!
//! Paths are `/`-separated; every non-empty component is transformed
//! independently so the directory structure of the backing store mirrors
//! the plaintext structure. Empty components (doubled or trailing slashes)
//! pass through verbatim in every mode.
//!
//! Three modes are supported:
//!
//! - **off**: identity.
//! - **standard**: PKCS#7-pad the component to a multiple of 16 bytes,
//!   encrypt with the EME wide-block cipher, and encode as lowercase
//!   unpadded base32. Deterministic, so lookups by name still work.
//! - **obfuscate**: a reversible character-class-preserving rotation with
//!   a self-describing shift prefix. Trivially analyzable, but keeps
//!   names readable-ish and survives case-insensitive stores.

mod obfuscate;

use std::sync::OnceLock;

use data_encoding::{Encoding, Specification};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::eme::{Eme, EmeError, BLOCK_SIZE};

/// How object names are transformed on the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameMode {
    /// Names pass through unchanged.
    Off,
    /// Full encryption with path-segment preservation.
    #[default]
    Standard,
    /// Reversible shift-based obfuscation.
    Obfuscate,
}

/// Errors from encoding or decoding an object name.
#[derive(Error, Debug)]
pub enum NameError {
    /// The encrypted name is not valid lowercase base32.
    #[error("encrypted name is not valid base32")]
    BadEncoding,

    /// The decoded ciphertext has a length the cipher cannot produce.
    #[error("encrypted name has an invalid length")]
    BadCipherLength,

    /// Decryption succeeded but the padding is inconsistent, which means
    /// the name was not produced under this key.
    #[error("decrypted name has invalid padding")]
    BadPadding,

    /// The decrypted bytes are not valid UTF-8.
    #[error("decrypted name is not valid UTF-8")]
    BadUtf8,

    /// The decoded component contains a NUL byte or path separator.
    #[error("decoded name contains forbidden characters")]
    Unsafe,

    /// The component is too long for the wide-block cipher.
    #[error("name component is too long to encrypt")]
    TooLong,

    /// An obfuscated name is missing its decimal shift prefix.
    #[error("obfuscated name has no valid shift prefix")]
    BadShiftPrefix,
}

/// Lowercase RFC 4648 base32 without padding.
fn base32_lower_nopad() -> &'static Encoding {
    static ENCODING: OnceLock<Encoding> = OnceLock::new();
    ENCODING.get_or_init(|| {
        let mut spec = Specification::new();
        spec.symbols.push_str("abcdefghijklmnopqrstuvwxyz234567");
        spec.encoding()
            .expect("static base32 specification is valid")
    })
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(data.len() + pad);
    padded.extend_from_slice(data);
    padded.extend(std::iter::repeat(pad as u8).take(pad));
    padded
}

fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], NameError> {
    let &pad = data.last().ok_or(NameError::BadPadding)?;
    let pad = pad as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return Err(NameError::BadPadding);
    }
    if !data[data.len() - pad..].iter().all(|&b| b == pad as u8) {
        return Err(NameError::BadPadding);
    }
    Ok(&data[..data.len() - pad])
}

/// Path codec bound to a filename mode and the derived name keys.
pub struct NameCodec {
    mode: FilenameMode,
    eme: Eme,
    name_key: Zeroizing<[u8; 32]>,
    tweak: [u8; 16],
}

impl NameCodec {
    pub fn new(mode: FilenameMode, name_key: &[u8; 32], tweak: &[u8; 16]) -> Self {
        NameCodec {
            mode,
            eme: Eme::new(name_key),
            name_key: Zeroizing::new(*name_key),
            tweak: *tweak,
        }
    }

    pub fn mode(&self) -> FilenameMode {
        self.mode
    }

    /// Encode a full slash-separated path.
    pub fn encode_path(&self, path: &str) -> Result<String, NameError> {
        if self.mode == FilenameMode::Off {
            return Ok(path.to_owned());
        }
        let segments = path
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    Ok(String::new())
                } else {
                    self.encode_segment(segment)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(segments.join("/"))
    }

    /// Decode a full slash-separated path. Exact inverse of
    /// [`encode_path`](Self::encode_path).
    pub fn decode_path(&self, path: &str) -> Result<String, NameError> {
        if self.mode == FilenameMode::Off {
            return Ok(path.to_owned());
        }
        let segments = path
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    Ok(String::new())
                } else {
                    self.decode_segment(segment)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(segments.join("/"))
    }

    /// Encode a single path component.
    pub fn encode_segment(&self, segment: &str) -> Result<String, NameError> {
        match self.mode {
            FilenameMode::Off => Ok(segment.to_owned()),
            FilenameMode::Standard => {
                let padded = pkcs7_pad(segment.as_bytes());
                let encrypted = self.eme.encrypt(&self.tweak, &padded).map_err(|err| match err {
                    EmeError::TooLong(_) => NameError::TooLong,
                    EmeError::BadLength(_) => NameError::BadCipherLength,
                })?;
                Ok(base32_lower_nopad().encode(&encrypted))
            }
            FilenameMode::Obfuscate => Ok(obfuscate::obfuscate_segment(segment, &self.name_key)),
        }
    }

    /// Decode a single path component.
    pub fn decode_segment(&self, segment: &str) -> Result<String, NameError> {
        match self.mode {
            FilenameMode::Off => Ok(segment.to_owned()),
            FilenameMode::Standard => {
                let encrypted = base32_lower_nopad()
                    .decode(segment.as_bytes())
                    .map_err(|_| NameError::BadEncoding)?;
                if encrypted.is_empty() || encrypted.len() % BLOCK_SIZE != 0 {
                    return Err(NameError::BadCipherLength);
                }
                let padded = self.eme.decrypt(&self.tweak, &encrypted).map_err(|err| {
                    match err {
                        EmeError::TooLong(_) => NameError::TooLong,
                        EmeError::BadLength(_) => NameError::BadCipherLength,
                    }
                })?;
                let plain = pkcs7_unpad(&padded)?;
                let name = std::str::from_utf8(plain).map_err(|_| NameError::BadUtf8)?;
                if name.contains('\0') || name.contains('/') {
                    return Err(NameError::Unsafe);
                }
                Ok(name.to_owned())
            }
            FilenameMode::Obfuscate => {
                obfuscate::deobfuscate_segment(segment, &self.name_key)
            }
        }
    }
}

impl std::fmt::Debug for NameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameCodec")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
