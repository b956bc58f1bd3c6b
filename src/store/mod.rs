//! The object-store abstraction the overlay wraps and re-exposes.
//!
//! A store holds objects addressed by `/`-separated paths, plus explicit
//! (possibly empty) directories. Concrete remotes live elsewhere; this
//! crate ships only the trait, the capability record used to gate optional
//! server-side operations, and an in-memory implementation for tests.

pub mod memory;

pub use memory::MemoryStore;

use std::io::{self, Read};
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::name::NameError;
use crate::stream::StreamError;

/// Hash algorithms a store can provide for its objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Md5,
    Sha1,
    Sha256,
}

/// Optional capabilities of a store.
///
/// Callers must check the relevant flag before invoking an optional
/// operation; stores answer unsupported calls with
/// [`StoreError::NotSupported`] so the caller can fall back (for example
/// to download-and-reupload instead of a server-side copy).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub copy: bool,
    pub move_object: bool,
    pub dir_move: bool,
    pub purge: bool,
    pub put_unchecked: bool,
    pub duplicate_files: bool,
    pub about: bool,
}

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub path: String,
    pub size: u64,
    pub mtime: SystemTime,
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Object(ObjectMeta),
    Dir { path: String },
}

impl Entry {
    pub fn path(&self) -> &str {
        match self {
            Entry::Object(meta) => &meta.path,
            Entry::Dir { path } => path,
        }
    }
}

/// How deep a listing descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDepth {
    /// Immediate children only.
    Single,
    /// Everything under the prefix.
    Recursive,
}

/// Space accounting, where the store knows it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub total: Option<u64>,
    pub used: Option<u64>,
    pub free: Option<u64>,
}

/// Description of an object about to be written.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub path: String,
    /// Exact byte count the reader will deliver.
    pub size: u64,
    pub mtime: SystemTime,
}

/// Errors from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("directory not found: {0}")]
    DirNotFound(String),

    #[error("directory not empty: {0}")]
    DirNotEmpty(String),

    /// The operation is not implemented by this store; check
    /// [`Features`](ObjectStore::features) before calling.
    #[error("{0} is not supported by this store")]
    NotSupported(&'static str),

    /// The reader delivered a different number of bytes than declared.
    #[error("declared size {declared} does not match streamed length {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    /// Content-level corruption introduced by the encryption layer:
    /// bad header, failed authentication, impossible sizes.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A name failed to encode or decode.
    #[error(transparent)]
    Name(#[from] NameError),

    /// Transport or disk failure from the backing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Whether an outer retry layer may reasonably replay the operation.
    ///
    /// Corruption and authentication failures are never retryable; neither
    /// are I/O errors that merely tunnel a decryption failure (those carry
    /// [`io::ErrorKind::InvalidData`]).
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Io(err) => err.kind() != io::ErrorKind::InvalidData,
            _ => false,
        }
    }
}

/// A mounted object store.
///
/// Implementations must be safe to share across threads; all operations
/// take `&self` and independent operations may run concurrently. Streams
/// returned by [`open`](Self::open) and consumed by [`put`](Self::put) are
/// owned by a single operation and never shared.
pub trait ObjectStore: Send + Sync {
    /// Human-readable identifier for logs and error messages.
    fn name(&self) -> &str;

    /// Capability record for optional operations.
    fn features(&self) -> Features;

    /// Hash algorithms this store can report for its objects.
    fn hashes(&self) -> Vec<HashKind>;

    /// Modification-time resolution this store can faithfully store.
    fn precision(&self) -> Duration;

    /// List entries under `prefix`.
    fn list(&self, prefix: &str, depth: ListDepth) -> Result<Vec<Entry>, StoreError>;

    /// Look up a single object.
    fn new_object(&self, path: &str) -> Result<ObjectMeta, StoreError>;

    /// Open an object for reading from `offset`, up to `limit` bytes
    /// (`None` reads to the end).
    fn open(
        &self,
        path: &str,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Box<dyn Read + Send>, StoreError>;

    /// Store an object. `info.size` must match the reader's length; on any
    /// failure no object becomes visible at `info.path`.
    fn put(&self, reader: &mut dyn Read, info: &ObjectInfo) -> Result<ObjectMeta, StoreError>;

    /// Store an object without the usual duplicate/overwrite checks.
    fn put_unchecked(
        &self,
        reader: &mut dyn Read,
        info: &ObjectInfo,
    ) -> Result<ObjectMeta, StoreError> {
        let _ = (reader, info);
        Err(StoreError::NotSupported("put_unchecked"))
    }

    /// Delete a single object.
    fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Create a directory (a no-op on stores without real directories).
    fn mkdir(&self, path: &str) -> Result<(), StoreError>;

    /// Remove an empty directory. Fails on non-empty directories.
    fn rmdir(&self, path: &str) -> Result<(), StoreError>;

    /// Recursively delete a directory and its contents.
    fn purge(&self, path: &str) -> Result<(), StoreError> {
        let _ = path;
        Err(StoreError::NotSupported("purge"))
    }

    /// Server-side copy of a single object.
    fn copy(&self, src: &str, dst: &str) -> Result<ObjectMeta, StoreError> {
        let _ = (src, dst);
        Err(StoreError::NotSupported("copy"))
    }

    /// Server-side move of a single object.
    fn move_object(&self, src: &str, dst: &str) -> Result<ObjectMeta, StoreError> {
        let _ = (src, dst);
        Err(StoreError::NotSupported("move"))
    }

    /// Server-side move of a whole directory tree.
    fn dir_move(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let _ = (src, dst);
        Err(StoreError::NotSupported("dir_move"))
    }

    /// Space usage, where supported.
    fn about(&self) -> Result<Usage, StoreError> {
        Err(StoreError::NotSupported("about"))
    }
}
