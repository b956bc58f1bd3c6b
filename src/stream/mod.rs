//! Streaming content encryption.
//!
//! # File format
//!
//! Every encrypted object is laid out as a 24-byte header followed by a
//! sequence of authenticated chunks:
//!
//! - **Header**: 8 magic bytes `RCLONE\x00\x00` + 16 random nonce bytes.
//! - **Chunks**: up to 65,536 plaintext bytes each, sealed with
//!   XSalsa20-Poly1305 into ciphertext plus a 16-byte tag (65,552 bytes on
//!   the wire for a full chunk). The final chunk may be shorter but always
//!   carries at least one plaintext byte; an empty object is a bare header.
//!
//! The header nonce is treated as a little-endian 128-bit counter: chunk
//! `n` is sealed under `header_nonce + n`, so any chunk can be decrypted
//! independently once the header has been read. That is what makes
//! random-access reads possible without touching earlier chunks.
//!
//! Sequential decryption lives in [`DecryptingReader`], range-addressed
//! decryption in [`SeekingReader`]; both share one chunk-decrypt primitive.

pub mod decrypt;
pub mod encrypt;

pub use decrypt::{DecryptingReader, SeekingReader};
pub use encrypt::EncryptingReader;

use std::io::{self, Read};

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::XSalsa20Poly1305;
use thiserror::Error;

/// Magic bytes identifying an encrypted object.
pub const FILE_MAGIC: &[u8; 8] = b"RCLONE\x00\x00";

/// Size of the random per-object nonce stored in the header.
pub const NONCE_SIZE: usize = 16;

/// Total header size: magic plus nonce.
pub const HEADER_SIZE: usize = FILE_MAGIC.len() + NONCE_SIZE;

/// Size of the Poly1305 authentication tag appended to each chunk.
pub const TAG_SIZE: usize = 16;

/// Plaintext bytes per chunk.
pub const CHUNK_PLAINTEXT_SIZE: usize = 64 * 1024;

/// On-wire bytes per full chunk.
pub const CHUNK_CIPHERTEXT_SIZE: usize = CHUNK_PLAINTEXT_SIZE + TAG_SIZE;

// XSalsa20 takes a 24-byte nonce; the 16 counter bytes are zero-extended.
const AEAD_NONCE_SIZE: usize = 24;

/// Errors from encrypting or decrypting an object stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The stream is shorter than a header or does not start with the magic.
    #[error("stream does not begin with a valid encryption header")]
    BadHeader,

    /// A chunk failed authentication: the data was tampered with,
    /// truncated, or encrypted under a different key.
    #[error("chunk {0} failed authentication")]
    BadAuth(u64),

    /// The ciphertext size cannot correspond to any plaintext size.
    #[error("ciphertext size {0} is not a valid encrypted object size")]
    BadLength(u64),

    /// Sealing a chunk failed. Practically unreachable for in-memory
    /// buffers, kept as an error so it can never pass silently.
    #[error("chunk {0} could not be encrypted")]
    ChunkEncryption(u64),

    /// The underlying reader failed.
    #[error("read error: {0}")]
    Io(#[from] io::Error),
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> io::Error {
        match err {
            StreamError::Io(io) => io,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// The per-object nonce, interpreted as a little-endian 128-bit counter.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StreamNonce([u8; NONCE_SIZE]);

impl StreamNonce {
    /// A fresh random nonce for a new object.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        StreamNonce(bytes)
    }

    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        StreamNonce(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// The nonce for chunk `index`: this nonce plus `index`, mod 2^128.
    pub fn offset(&self, index: u64) -> Self {
        let value = u128::from_le_bytes(self.0).wrapping_add(u128::from(index));
        StreamNonce(value.to_le_bytes())
    }

    fn aead(&self) -> crypto_secretbox::Nonce {
        let mut bytes = [0u8; AEAD_NONCE_SIZE];
        bytes[..NONCE_SIZE].copy_from_slice(&self.0);
        crypto_secretbox::Nonce::clone_from_slice(&bytes)
    }
}

impl std::fmt::Debug for StreamNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // nonces are not secret, but 32 hex chars of noise help nobody
        f.debug_struct("StreamNonce").finish_non_exhaustive()
    }
}

/// Build the content AEAD for a derived data key.
pub(crate) fn content_cipher(data_key: &[u8; 32]) -> XSalsa20Poly1305 {
    XSalsa20Poly1305::new(data_key.into())
}

/// Seal one chunk: returns ciphertext with the 16-byte tag appended.
pub(crate) fn seal_chunk(
    cipher: &XSalsa20Poly1305,
    nonce: &StreamNonce,
    index: u64,
    plaintext: &[u8],
) -> Result<Vec<u8>, StreamError> {
    cipher
        .encrypt(&nonce.offset(index).aead(), plaintext)
        .map_err(|_| StreamError::ChunkEncryption(index))
}

/// Open one chunk, verifying its tag.
pub(crate) fn open_chunk(
    cipher: &XSalsa20Poly1305,
    nonce: &StreamNonce,
    index: u64,
    chunk: &[u8],
) -> Result<Vec<u8>, StreamError> {
    cipher
        .decrypt(&nonce.offset(index).aead(), chunk)
        .map_err(|_| StreamError::BadAuth(index))
}

/// Read and validate the 24-byte header, returning the stream nonce.
pub fn read_header(reader: &mut dyn Read) -> Result<StreamNonce, StreamError> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            StreamError::BadHeader
        } else {
            StreamError::Io(err)
        }
    })?;
    if &header[..FILE_MAGIC.len()] != FILE_MAGIC {
        return Err(StreamError::BadHeader);
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&header[FILE_MAGIC.len()..]);
    Ok(StreamNonce::from_bytes(nonce))
}

/// Ciphertext size for a plaintext of `plaintext` bytes.
pub fn encrypted_size(plaintext: u64) -> u64 {
    let chunks = plaintext.div_ceil(CHUNK_PLAINTEXT_SIZE as u64);
    HEADER_SIZE as u64 + chunks * TAG_SIZE as u64 + plaintext
}

/// Plaintext size for a ciphertext of `ciphertext` bytes.
///
/// # Errors
///
/// - [`StreamError::BadHeader`] if the object is too small to hold a header
///   (this includes zero-byte objects, which were never encrypted by us).
/// - [`StreamError::BadLength`] if the remainder after the last full chunk
///   could hold a tag but no plaintext.
pub fn decrypted_size(ciphertext: u64) -> Result<u64, StreamError> {
    if ciphertext < HEADER_SIZE as u64 {
        return Err(StreamError::BadHeader);
    }
    let body = ciphertext - HEADER_SIZE as u64;
    if body == 0 {
        return Ok(0);
    }
    let full = body / CHUNK_CIPHERTEXT_SIZE as u64;
    let rem = body % CHUNK_CIPHERTEXT_SIZE as u64;
    if rem == 0 {
        Ok(full * CHUNK_PLAINTEXT_SIZE as u64)
    } else if rem > TAG_SIZE as u64 {
        Ok(full * CHUNK_PLAINTEXT_SIZE as u64 + rem - TAG_SIZE as u64)
    } else {
        Err(StreamError::BadLength(ciphertext))
    }
}

/// Map a plaintext range to the ciphertext range that covers it.
///
/// Returns the ciphertext byte offset of the chunk containing `offset` and,
/// when `limit` is bounded, the number of ciphertext bytes spanning all
/// chunks the range touches.
pub fn ciphertext_range(offset: u64, limit: Option<u64>) -> (u64, Option<u64>) {
    let first_chunk = offset / CHUNK_PLAINTEXT_SIZE as u64;
    let start = HEADER_SIZE as u64 + first_chunk * CHUNK_CIPHERTEXT_SIZE as u64;
    let len = limit.map(|limit| {
        let skip = offset % CHUNK_PLAINTEXT_SIZE as u64;
        let chunks = (skip + limit).div_ceil(CHUNK_PLAINTEXT_SIZE as u64);
        chunks * CHUNK_CIPHERTEXT_SIZE as u64
    });
    (start, len)
}
