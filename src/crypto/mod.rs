//! Cryptographic primitives for the encryption overlay.
//!
//! - [`kdf`]: scrypt-based derivation of the overlay's three subkeys
//! - [`obscure`]: reversible concealment of credentials in configuration
//! - [`eme`]: the wide-block cipher backing filename encryption

pub mod eme;
pub mod kdf;
pub mod obscure;

pub use kdf::{DerivedKeys, KdfError, DEFAULT_SALT};
pub use obscure::{obscure, reveal, ObscureError};
