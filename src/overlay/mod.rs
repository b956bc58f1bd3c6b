//! The wrapping filesystem: an [`ObjectStore`] that encrypts everything it
//! hands to another [`ObjectStore`].
//!
//! Paths are rewritten through the filename codec, uploads are wrapped in
//! the streaming encryptor, downloads in the streaming (or seeking)
//! decryptor, and listings are translated back to the plaintext view with
//! sizes corrected for the encryption overhead. Entries whose names do not
//! decode are foreign objects and are skipped, not fatal.
//!
//! The overlay keeps no mutable state of its own: configuration and keys
//! are fixed at mount, every operation builds its own reader instances,
//! and concurrent operations never share them.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::crypto::kdf::DerivedKeys;
use crate::name::{FilenameMode, NameCodec};
use crate::store::{
    Entry, Features, HashKind, ListDepth, ObjectInfo, ObjectMeta, ObjectStore, StoreError, Usage,
};
use crate::stream::{
    ciphertext_range, decrypted_size, encrypted_size, read_header, DecryptingReader,
    SeekingReader,
};

/// An encryption overlay wrapping a backing object store.
///
/// Presents the plaintext view: plaintext paths in, plaintext bytes out,
/// plaintext sizes in listings. Constructed via
/// [`CryptConfig::mount`](crate::config::CryptConfig::mount) or directly
/// from derived keys with [`CryptOverlay::new`].
pub struct CryptOverlay {
    backing: Arc<dyn ObjectStore>,
    codec: NameCodec,
    data_key: Zeroizing<[u8; 32]>,
    name: String,
}

impl CryptOverlay {
    pub fn new(backing: Arc<dyn ObjectStore>, keys: &DerivedKeys, mode: FilenameMode) -> Self {
        let name = format!("crypt({})", backing.name());
        debug!(backing = backing.name(), ?mode, "mounting encryption overlay");
        CryptOverlay {
            codec: NameCodec::new(mode, keys.name_key(), keys.name_tweak()),
            data_key: Zeroizing::new(*keys.data_key()),
            backing,
            name,
        }
    }

    /// The filename mode this overlay was mounted with.
    pub fn filename_mode(&self) -> FilenameMode {
        self.codec.mode()
    }

    /// Translate one backing entry into the plaintext view, or `None` for
    /// foreign entries that should be skipped.
    fn decode_entry(&self, entry: Entry) -> Option<Entry> {
        match entry {
            Entry::Object(meta) => {
                let path = match self.codec.decode_path(&meta.path) {
                    Ok(path) => path,
                    Err(err) => {
                        warn!(name = %meta.path, error = %err, "skipping object with undecodable name");
                        return None;
                    }
                };
                let size = match decrypted_size(meta.size) {
                    Ok(size) => size,
                    Err(err) => {
                        warn!(name = %meta.path, size = meta.size, error = %err,
                              "skipping object with invalid encrypted size");
                        return None;
                    }
                };
                Some(Entry::Object(ObjectMeta {
                    path,
                    size,
                    mtime: meta.mtime,
                }))
            }
            Entry::Dir { path } => match self.codec.decode_path(&path) {
                Ok(path) => Some(Entry::Dir { path }),
                Err(err) => {
                    warn!(name = %path, error = %err, "skipping directory with undecodable name");
                    None
                }
            },
        }
    }
}

impl ObjectStore for CryptOverlay {
    fn name(&self) -> &str {
        &self.name
    }

    fn features(&self) -> Features {
        // optional operations are offered exactly when the backing has the
        // server-side variant; callers fall back themselves otherwise
        self.backing.features()
    }

    /// Plaintext hashes are unknowable without downloading, and exposing
    /// ciphertext hashes would leak nothing useful to honest callers while
    /// pinning the nonce. So: none, in every mode.
    fn hashes(&self) -> Vec<HashKind> {
        Vec::new()
    }

    fn precision(&self) -> std::time::Duration {
        self.backing.precision()
    }

    #[instrument(level = "debug", skip(self))]
    fn list(&self, prefix: &str, depth: ListDepth) -> Result<Vec<Entry>, StoreError> {
        let encoded = self.codec.encode_path(prefix)?;
        let entries = self.backing.list(&encoded, depth)?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| self.decode_entry(entry))
            .collect())
    }

    fn new_object(&self, path: &str) -> Result<ObjectMeta, StoreError> {
        let encoded = self.codec.encode_path(path)?;
        let meta = self.backing.new_object(&encoded)?;
        Ok(ObjectMeta {
            path: path.to_owned(),
            size: decrypted_size(meta.size)?,
            mtime: meta.mtime,
        })
    }

    #[instrument(level = "debug", skip(self))]
    fn open(
        &self,
        path: &str,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Box<dyn Read + Send>, StoreError> {
        let encoded = self.codec.encode_path(path)?;

        if offset == 0 && limit.is_none() {
            let inner = self.backing.open(&encoded, 0, None)?;
            return Ok(Box::new(DecryptingReader::new(inner, &self.data_key)));
        }

        // a range read needs the stream nonce from the header first
        let mut header = self
            .backing
            .open(&encoded, 0, Some(crate::stream::HEADER_SIZE as u64))?;
        let nonce = read_header(&mut header)?;

        let (start, len) = ciphertext_range(offset, limit);
        let inner = self.backing.open(&encoded, start, len)?;
        Ok(Box::new(SeekingReader::new(
            inner,
            &self.data_key,
            nonce,
            offset,
            limit,
        )))
    }

    #[instrument(level = "debug", skip(self, reader, info), fields(path = %info.path, size = info.size))]
    fn put(&self, reader: &mut dyn Read, info: &ObjectInfo) -> Result<ObjectMeta, StoreError> {
        let encoded = self.codec.encode_path(&info.path)?;
        let encoded_info = ObjectInfo {
            path: encoded.clone(),
            size: encrypted_size(info.size),
            mtime: info.mtime,
        };

        let mut encrypting = crate::stream::EncryptingReader::new(&mut *reader, &self.data_key);
        match self.backing.put(&mut encrypting, &encoded_info) {
            Ok(meta) => Ok(ObjectMeta {
                path: info.path.clone(),
                size: info.size,
                mtime: meta.mtime,
            }),
            Err(err) => {
                // a partial upload must not stay visible under the target name
                match self.backing.remove(&encoded) {
                    Ok(()) | Err(StoreError::NotFound(_)) => {}
                    Err(cleanup) => {
                        warn!(path = %info.path, error = %cleanup, "failed to clean up after aborted put");
                    }
                }
                Err(err)
            }
        }
    }

    fn put_unchecked(
        &self,
        reader: &mut dyn Read,
        info: &ObjectInfo,
    ) -> Result<ObjectMeta, StoreError> {
        if !self.backing.features().put_unchecked {
            return Err(StoreError::NotSupported("put_unchecked"));
        }
        let encoded = self.codec.encode_path(&info.path)?;
        let encoded_info = ObjectInfo {
            path: encoded,
            size: encrypted_size(info.size),
            mtime: info.mtime,
        };
        let mut encrypting = crate::stream::EncryptingReader::new(&mut *reader, &self.data_key);
        let meta = self.backing.put_unchecked(&mut encrypting, &encoded_info)?;
        Ok(ObjectMeta {
            path: info.path.clone(),
            size: info.size,
            mtime: meta.mtime,
        })
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        let encoded = self.codec.encode_path(path)?;
        self.backing.remove(&encoded)
    }

    fn mkdir(&self, path: &str) -> Result<(), StoreError> {
        let encoded = self.codec.encode_path(path)?;
        self.backing.mkdir(&encoded)
    }

    fn rmdir(&self, path: &str) -> Result<(), StoreError> {
        let encoded = self.codec.encode_path(path)?;
        self.backing.rmdir(&encoded)
    }

    fn purge(&self, path: &str) -> Result<(), StoreError> {
        if !self.backing.features().purge {
            return Err(StoreError::NotSupported("purge"));
        }
        let encoded = self.codec.encode_path(path)?;
        self.backing.purge(&encoded)
    }

    fn copy(&self, src: &str, dst: &str) -> Result<ObjectMeta, StoreError> {
        if !self.backing.features().copy {
            return Err(StoreError::NotSupported("copy"));
        }
        let enc_src = self.codec.encode_path(src)?;
        let enc_dst = self.codec.encode_path(dst)?;
        let meta = self.backing.copy(&enc_src, &enc_dst)?;
        Ok(ObjectMeta {
            path: dst.to_owned(),
            size: decrypted_size(meta.size)?,
            mtime: meta.mtime,
        })
    }

    fn move_object(&self, src: &str, dst: &str) -> Result<ObjectMeta, StoreError> {
        if !self.backing.features().move_object {
            return Err(StoreError::NotSupported("move"));
        }
        let enc_src = self.codec.encode_path(src)?;
        let enc_dst = self.codec.encode_path(dst)?;
        let meta = self.backing.move_object(&enc_src, &enc_dst)?;
        Ok(ObjectMeta {
            path: dst.to_owned(),
            size: decrypted_size(meta.size)?,
            mtime: meta.mtime,
        })
    }

    fn dir_move(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        if !self.backing.features().dir_move {
            return Err(StoreError::NotSupported("dir_move"));
        }
        let enc_src = self.codec.encode_path(src)?;
        let enc_dst = self.codec.encode_path(dst)?;
        self.backing.dir_move(&enc_src, &enc_dst)
    }

    fn about(&self) -> Result<Usage, StoreError> {
        self.backing.about()
    }
}

impl std::fmt::Debug for CryptOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptOverlay")
            .field("name", &self.name)
            .field("mode", &self.codec.mode())
            .finish_non_exhaustive()
    }
}
