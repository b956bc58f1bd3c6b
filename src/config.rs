//! Overlay configuration and the mount factory.
//!
//! A crypt overlay is described by a small option set, usually coming from
//! the tool's configuration file:
//!
//! | key                   | meaning                                      |
//! |-----------------------|----------------------------------------------|
//! | `type`                | must be `crypt`                              |
//! | `remote`              | name of the backing remote                   |
//! | `password`            | obscured passphrase                          |
//! | `password2`           | obscured salt (optional; built-in default)   |
//! | `filename_encryption` | `off`, `standard` (default) or `obfuscate`   |
//!
//! The record is immutable; [`CryptConfig::mount`] unobscures the
//! credentials, runs key derivation once, and returns a fully-initialized
//! [`CryptOverlay`]. Resolving the `remote` name to an actual store is the
//! caller's job, since concrete backends live outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::crypto::kdf::{DerivedKeys, KdfError};
use crate::crypto::obscure::{reveal, ObscureError};
use crate::name::FilenameMode;
use crate::overlay::CryptOverlay;
use crate::store::ObjectStore;

/// The `type` value identifying this overlay in configuration files.
pub const OVERLAY_TYPE: &str = "crypt";

/// Errors from parsing configuration or mounting the overlay.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("expected overlay type `crypt`, got `{0}`")]
    WrongType(String),

    #[error("missing required option `{0}`")]
    MissingOption(&'static str),

    #[error("unknown filename_encryption mode `{0}`")]
    UnknownMode(String),

    /// An obscured credential could not be read back.
    #[error("option `{0}` is malformed: {1}")]
    Malformed(&'static str, ObscureError),

    #[error(transparent)]
    Kdf(#[from] KdfError),
}

/// Immutable description of a crypt overlay.
#[derive(Debug, Clone, Deserialize)]
pub struct CryptConfig {
    /// Name of the backing remote (resolved by the caller).
    pub remote: String,
    /// Obscured passphrase.
    pub password: String,
    /// Obscured salt; `None` selects the built-in default salt.
    #[serde(default)]
    pub password2: Option<String>,
    #[serde(default)]
    pub filename_encryption: FilenameMode,
}

impl CryptConfig {
    /// Build a config from a flat option map, validating the `type` key.
    ///
    /// # Errors
    ///
    /// Fails if `type` is missing or not `crypt`, a required option is
    /// absent, or `filename_encryption` names an unknown mode.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        match params.get("type").map(String::as_str) {
            Some(OVERLAY_TYPE) => {}
            Some(other) => return Err(ConfigError::WrongType(other.to_owned())),
            None => return Err(ConfigError::MissingOption("type")),
        }

        let remote = params
            .get("remote")
            .cloned()
            .ok_or(ConfigError::MissingOption("remote"))?;
        let password = params
            .get("password")
            .cloned()
            .ok_or(ConfigError::MissingOption("password"))?;
        let password2 = params.get("password2").cloned();
        let filename_encryption = match params.get("filename_encryption").map(String::as_str) {
            None | Some("standard") => FilenameMode::Standard,
            Some("off") => FilenameMode::Off,
            Some("obfuscate") => FilenameMode::Obfuscate,
            Some(other) => return Err(ConfigError::UnknownMode(other.to_owned())),
        };

        Ok(CryptConfig {
            remote,
            password,
            password2,
            filename_encryption,
        })
    }

    /// Unobscure the credentials, derive the keys and wrap `backing`.
    ///
    /// # Errors
    ///
    /// Fails if a credential is malformed or key derivation fails. A
    /// *wrong* passphrase is not detectable here; it shows up later as an
    /// authentication failure on the first read.
    pub fn mount(&self, backing: Arc<dyn ObjectStore>) -> Result<CryptOverlay, ConfigError> {
        let password =
            reveal(&self.password).map_err(|err| ConfigError::Malformed("password", err))?;
        let salt = self
            .password2
            .as_deref()
            .map(|p2| reveal(p2).map_err(|err| ConfigError::Malformed("password2", err)))
            .transpose()?;

        let keys = DerivedKeys::derive(&password, salt.as_deref())?;
        Ok(CryptOverlay::new(backing, &keys, self.filename_encryption))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::obscure::obscure;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_minimal_config() {
        let config = CryptConfig::from_params(&params(&[
            ("type", "crypt"),
            ("remote", "mydrive:secret"),
            ("password", &obscure("potato")),
        ]))
        .unwrap();
        assert_eq!(config.remote, "mydrive:secret");
        assert_eq!(config.filename_encryption, FilenameMode::Standard);
        assert!(config.password2.is_none());
    }

    #[test]
    fn parses_all_modes() {
        for (text, mode) in [
            ("off", FilenameMode::Off),
            ("standard", FilenameMode::Standard),
            ("obfuscate", FilenameMode::Obfuscate),
        ] {
            let config = CryptConfig::from_params(&params(&[
                ("type", "crypt"),
                ("remote", "r"),
                ("password", "x"),
                ("filename_encryption", text),
            ]))
            .unwrap();
            assert_eq!(config.filename_encryption, mode);
        }
    }

    #[test]
    fn rejects_wrong_type() {
        let err = CryptConfig::from_params(&params(&[("type", "s3")])).unwrap_err();
        assert!(matches!(err, ConfigError::WrongType(t) if t == "s3"));

        let err = CryptConfig::from_params(&params(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption("type")));
    }

    #[test]
    fn rejects_missing_options() {
        let err =
            CryptConfig::from_params(&params(&[("type", "crypt"), ("remote", "r")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption("password")));
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = CryptConfig::from_params(&params(&[
            ("type", "crypt"),
            ("remote", "r"),
            ("password", "x"),
            ("filename_encryption", "rot13"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMode(m) if m == "rot13"));
    }

    #[test]
    fn mount_rejects_malformed_password() {
        let config = CryptConfig {
            remote: "r".into(),
            password: "!!not-base64!!".into(),
            password2: None,
            filename_encryption: FilenameMode::Standard,
        };
        let err = config
            .mount(Arc::new(crate::store::MemoryStore::new()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed("password", _)));
    }

    #[test]
    fn config_deserializes_from_json() {
        let config: CryptConfig = serde_json::from_str(
            r#"{"remote": "b2:bucket", "password": "xyz", "filename_encryption": "obfuscate"}"#,
        )
        .unwrap();
        assert_eq!(config.remote, "b2:bucket");
        assert_eq!(config.filename_encryption, FilenameMode::Obfuscate);
    }
}
