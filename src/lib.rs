//! Transparent client-side encryption overlay for cloud object stores.
//!
//! The overlay wraps any [`ObjectStore`] and presents the same interface
//! with plaintext semantics: contents are encrypted in authenticated
//! 64 KiB chunks behind a magic-tagged header, names are encrypted or
//! obfuscated per path component, and sizes are translated both ways so
//! listings stay truthful. Random-access reads decrypt only the chunks a
//! range actually touches.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use std::io::Read;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//!
//! use shroudfs::crypto::obscure;
//! use shroudfs::store::{MemoryStore, ObjectInfo, ObjectStore};
//! use shroudfs::CryptConfig;
//!
//! let obscured = obscure("correct horse battery staple");
//! let params: HashMap<String, String> = [
//!     ("type", "crypt"),
//!     ("remote", "memory:"),
//!     ("password", obscured.as_str()),
//! ]
//! .into_iter()
//! .map(|(k, v)| (k.to_string(), v.to_string()))
//! .collect();
//!
//! let config = CryptConfig::from_params(&params)?;
//! let overlay = config.mount(Arc::new(MemoryStore::new()))?;
//!
//! let body = b"hello world";
//! overlay.put(
//!     &mut &body[..],
//!     &ObjectInfo {
//!         path: "greet/en.txt".into(),
//!         size: body.len() as u64,
//!         mtime: SystemTime::now(),
//!     },
//! )?;
//!
//! let mut plaintext = Vec::new();
//! overlay.open("greet/en.txt", 0, None)?.read_to_end(&mut plaintext)?;
//! assert_eq!(plaintext, body);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! What the overlay does **not** hide: object sizes (within a fixed
//! additive overhead), directory structure, and modification times. It
//! also reports no hashes, since plaintext hashes cannot be known without
//! downloading.

#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod name;
pub mod overlay;
pub mod store;
pub mod stream;

pub use config::{ConfigError, CryptConfig, OVERLAY_TYPE};
pub use name::{FilenameMode, NameCodec, NameError};
pub use overlay::CryptOverlay;
pub use store::{
    Entry, Features, HashKind, ListDepth, ObjectInfo, ObjectMeta, ObjectStore, StoreError, Usage,
};
pub use stream::StreamError;
