//! Passphrase-based key derivation.
//!
//! A single scrypt pass turns the user's passphrase and optional salt into
//! the three subkeys used by the overlay: a content-encryption key, a
//! filename-encryption key, and the tweak for the wide-block name cipher.
//! The derivation is the interoperability anchor between implementations,
//! so the parameters and the built-in default salt must never change.

use scrypt::Params;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Salt used when the user has not configured one.
///
/// This constant is part of the on-disk format: data written with the
/// default salt can only be read back by an implementation using exactly
/// these bytes.
pub const DEFAULT_SALT: [u8; 16] = [
    0xa8, 0x0d, 0xf4, 0x3a, 0x8f, 0xbd, 0x03, 0x08, 0xa7, 0xca, 0xb8, 0x3e, 0x58, 0x1f, 0x86,
    0xb1,
];

// scrypt parameters: N = 2^14 = 16384, r = 8, p = 1.
const SCRYPT_LOG2_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

const DATA_KEY_LEN: usize = 32;
const NAME_KEY_LEN: usize = 32;
const NAME_TWEAK_LEN: usize = 16;
const DERIVED_LEN: usize = DATA_KEY_LEN + NAME_KEY_LEN + NAME_TWEAK_LEN;

/// Errors from key derivation.
#[derive(Error, Debug)]
pub enum KdfError {
    /// An empty passphrase would silently produce a well-known key.
    #[error("passphrase must not be empty")]
    EmptyPassword,

    /// The scrypt computation itself failed (parameter or memory error).
    #[error("key derivation failed: {0}")]
    DerivationFailed(String),
}

/// The three subkeys derived from a passphrase.
///
/// Key material is wiped from memory when the value is dropped.
pub struct DerivedKeys {
    data_key: [u8; DATA_KEY_LEN],
    name_key: [u8; NAME_KEY_LEN],
    name_tweak: [u8; NAME_TWEAK_LEN],
}

impl DerivedKeys {
    /// Derive the subkeys from `password` and an optional salt.
    ///
    /// `None` and `Some("")` both select [`DEFAULT_SALT`]; any other value
    /// is used as its literal UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KdfError::EmptyPassword`] for an empty passphrase and
    /// [`KdfError::DerivationFailed`] if scrypt fails.
    pub fn derive(password: &str, salt: Option<&str>) -> Result<Self, KdfError> {
        if password.is_empty() {
            return Err(KdfError::EmptyPassword);
        }

        // `Params::new`'s `len` argument is only used for its own validation
        // (max 64) and is not consulted by `scrypt::scrypt`, which derives
        // exactly `output.len()` bytes regardless. Pass a valid in-range
        // placeholder here; the real output length is `DERIVED_LEN` below.
        let params = Params::new(SCRYPT_LOG2_N, SCRYPT_R, SCRYPT_P, Params::RECOMMENDED_LEN)
            .map_err(|e| KdfError::DerivationFailed(e.to_string()))?;

        let salt_bytes: &[u8] = match salt {
            Some(s) if !s.is_empty() => s.as_bytes(),
            _ => &DEFAULT_SALT,
        };

        let mut derived = Zeroizing::new([0u8; DERIVED_LEN]);
        scrypt::scrypt(password.as_bytes(), salt_bytes, &params, &mut derived[..])
            .map_err(|e| KdfError::DerivationFailed(e.to_string()))?;

        let mut keys = DerivedKeys {
            data_key: [0u8; DATA_KEY_LEN],
            name_key: [0u8; NAME_KEY_LEN],
            name_tweak: [0u8; NAME_TWEAK_LEN],
        };
        keys.data_key.copy_from_slice(&derived[..DATA_KEY_LEN]);
        keys.name_key
            .copy_from_slice(&derived[DATA_KEY_LEN..DATA_KEY_LEN + NAME_KEY_LEN]);
        keys.name_tweak
            .copy_from_slice(&derived[DATA_KEY_LEN + NAME_KEY_LEN..]);
        Ok(keys)
    }

    /// Key for content encryption.
    pub fn data_key(&self) -> &[u8; DATA_KEY_LEN] {
        &self.data_key
    }

    /// Key for filename encryption and obfuscation.
    pub fn name_key(&self) -> &[u8; NAME_KEY_LEN] {
        &self.name_key
    }

    /// Tweak for the wide-block filename cipher.
    pub fn name_tweak(&self) -> &[u8; NAME_TWEAK_LEN] {
        &self.name_tweak
    }
}

impl Drop for DerivedKeys {
    fn drop(&mut self) {
        self.data_key.zeroize();
        self.name_key.zeroize();
        self.name_tweak.zeroize();
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeys").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_salt_is_stable() {
        // On-disk compatibility depends on these exact bytes.
        assert_eq!(
            DEFAULT_SALT,
            [
                0xa8, 0x0d, 0xf4, 0x3a, 0x8f, 0xbd, 0x03, 0x08, 0xa7, 0xca, 0xb8, 0x3e, 0x58,
                0x1f, 0x86, 0xb1,
            ]
        );
    }

    #[test]
    fn default_salt_golden_vector() {
        // Pinned output of scrypt("potato", DEFAULT_SALT, N=16384, r=8,
        // p=1, 80 bytes), cross-checked against OpenSSL's RFC 7914
        // implementation. A change here breaks every store written with
        // the default salt.
        let keys = DerivedKeys::derive("potato", None).unwrap();
        assert_eq!(
            keys.data_key(),
            &[
                0x74, 0x55, 0xc7, 0x1a, 0xb1, 0x7c, 0x86, 0x5b, 0x84, 0x71, 0xf4, 0x7b, 0x79,
                0xac, 0xb0, 0x7e, 0xb3, 0x1d, 0x56, 0x78, 0xb8, 0x0c, 0x7e, 0x2e, 0xaf, 0x4f,
                0xc8, 0x06, 0x6a, 0x9e, 0xe4, 0x68,
            ]
        );
        assert_eq!(
            keys.name_key(),
            &[
                0x76, 0x5d, 0xa2, 0x7a, 0xb1, 0x5d, 0x77, 0xf9, 0x57, 0x96, 0x71, 0x1f, 0x7b,
                0x93, 0xad, 0x63, 0xbb, 0xb4, 0x84, 0x07, 0x2e, 0x71, 0x80, 0xa8, 0xd1, 0x7a,
                0x9b, 0xbe, 0xc1, 0x42, 0x70, 0xd0,
            ]
        );
        assert_eq!(
            keys.name_tweak(),
            &[
                0xc1, 0x8d, 0x59, 0x32, 0xf5, 0x5b, 0x28, 0x28, 0xc5, 0xe1, 0xe8, 0x72, 0x15,
                0x52, 0x03, 0x10,
            ]
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = DerivedKeys::derive("potato", None).unwrap();
        let b = DerivedKeys::derive("potato", None).unwrap();
        assert_eq!(a.data_key(), b.data_key());
        assert_eq!(a.name_key(), b.name_key());
        assert_eq!(a.name_tweak(), b.name_tweak());
    }

    #[test]
    fn empty_salt_selects_default() {
        let explicit = DerivedKeys::derive("potato", Some("")).unwrap();
        let implicit = DerivedKeys::derive("potato", None).unwrap();
        assert_eq!(explicit.data_key(), implicit.data_key());
        assert_eq!(explicit.name_key(), implicit.name_key());
        assert_eq!(explicit.name_tweak(), implicit.name_tweak());
    }

    #[test]
    fn password_changes_all_subkeys() {
        let a = DerivedKeys::derive("potato", None).unwrap();
        let b = DerivedKeys::derive("potato2", None).unwrap();
        assert_ne!(a.data_key(), b.data_key());
        assert_ne!(a.name_key(), b.name_key());
        assert_ne!(a.name_tweak(), b.name_tweak());
    }

    #[test]
    fn salt_changes_all_subkeys() {
        let a = DerivedKeys::derive("potato", None).unwrap();
        let b = DerivedKeys::derive("potato", Some("pepper")).unwrap();
        assert_ne!(a.data_key(), b.data_key());
        assert_ne!(a.name_key(), b.name_key());
        assert_ne!(a.name_tweak(), b.name_tweak());
    }

    #[test]
    fn subkeys_are_distinct() {
        let keys = DerivedKeys::derive("potato", None).unwrap();
        assert_ne!(keys.data_key(), keys.name_key());
        assert_ne!(&keys.name_key()[..16], &keys.name_tweak()[..]);
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(
            DerivedKeys::derive("", None),
            Err(KdfError::EmptyPassword)
        ));
    }
}
