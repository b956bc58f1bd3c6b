//! Streaming encryption of object contents.

use std::io::{self, Read};

use crypto_secretbox::XSalsa20Poly1305;
use tracing::trace;

use super::{
    content_cipher, seal_chunk, StreamNonce, CHUNK_PLAINTEXT_SIZE, FILE_MAGIC, HEADER_SIZE,
};

/// Wraps a plaintext reader and yields the encrypted stream.
///
/// The header is emitted first, then one sealed chunk per 65,536 bytes of
/// input. At most one plaintext chunk and one sealed chunk are buffered at
/// a time, so memory use is bounded regardless of object size.
pub struct EncryptingReader<R> {
    inner: R,
    cipher: XSalsa20Poly1305,
    nonce: StreamNonce,
    chunk_index: u64,
    /// Plaintext staging buffer, reused between chunks.
    plain: Vec<u8>,
    /// Pending output (header, then sealed chunks).
    out: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> EncryptingReader<R> {
    /// Encrypt `inner` under `data_key` with a fresh random nonce.
    pub fn new(inner: R, data_key: &[u8; 32]) -> Self {
        Self::with_nonce(inner, data_key, StreamNonce::random())
    }

    /// Encrypt with a caller-provided nonce.
    ///
    /// A nonce must never be reused with the same key; outside of tests the
    /// random constructor is the one to use.
    pub fn with_nonce(inner: R, data_key: &[u8; 32], nonce: StreamNonce) -> Self {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(FILE_MAGIC);
        out.extend_from_slice(nonce.as_bytes());
        EncryptingReader {
            inner,
            cipher: content_cipher(data_key),
            nonce,
            chunk_index: 0,
            plain: vec![0u8; CHUNK_PLAINTEXT_SIZE],
            out,
            pos: 0,
            done: false,
        }
    }

    /// The nonce written into this stream's header.
    pub fn nonce(&self) -> &StreamNonce {
        &self.nonce
    }

    /// Read one full chunk of plaintext and seal it into `self.out`.
    fn refill(&mut self) -> io::Result<()> {
        debug_assert_eq!(self.pos, self.out.len());

        let mut filled = 0;
        while filled < CHUNK_PLAINTEXT_SIZE {
            let n = self.inner.read(&mut self.plain[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            // end of input; an empty stream still got its header above
            self.done = true;
            return Ok(());
        }

        let sealed = seal_chunk(&self.cipher, &self.nonce, self.chunk_index, &self.plain[..filled])
            .map_err(io::Error::from)?;
        trace!(chunk = self.chunk_index, plaintext = filled, "sealed chunk");
        self.chunk_index += 1;
        self.out = sealed;
        self.pos = 0;
        if filled < CHUNK_PLAINTEXT_SIZE {
            self.done = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for EncryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.out.len() {
            if self.done {
                return Ok(0);
            }
            self.refill()?;
        }
        let n = (self.out.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{encrypted_size, CHUNK_CIPHERTEXT_SIZE, TAG_SIZE};

    fn test_key() -> [u8; 32] {
        [0x11; 32]
    }

    fn encrypt_all(plaintext: &[u8]) -> Vec<u8> {
        let mut reader = EncryptingReader::new(plaintext, &test_key());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn empty_input_yields_bare_header() {
        let out = encrypt_all(b"");
        assert_eq!(out.len(), HEADER_SIZE);
        assert_eq!(&out[..8], FILE_MAGIC);
    }

    #[test]
    fn output_size_matches_arithmetic() {
        for len in [0usize, 1, 11, 1000, 65_535, 65_536, 65_537, 200_000] {
            let plaintext = vec![0xabu8; len];
            let out = encrypt_all(&plaintext);
            assert_eq!(
                out.len() as u64,
                encrypted_size(len as u64),
                "wrong ciphertext size for {len} plaintext bytes"
            );
        }
    }

    #[test]
    fn single_full_chunk_layout() {
        let out = encrypt_all(&vec![0u8; CHUNK_PLAINTEXT_SIZE]);
        assert_eq!(out.len(), HEADER_SIZE + CHUNK_CIPHERTEXT_SIZE);
    }

    #[test]
    fn one_byte_over_chunk_makes_two_chunks() {
        let out = encrypt_all(&vec![0u8; CHUNK_PLAINTEXT_SIZE + 1]);
        assert_eq!(
            out.len(),
            HEADER_SIZE + CHUNK_CIPHERTEXT_SIZE + 1 + TAG_SIZE
        );
    }

    #[test]
    fn fresh_nonces_give_distinct_ciphertexts() {
        let a = encrypt_all(b"same plaintext");
        let b = encrypt_all(b"same plaintext");
        assert_ne!(a, b, "two encryptions should differ in nonce and body");
        // but both carry the magic
        assert_eq!(&a[..8], FILE_MAGIC);
        assert_eq!(&b[..8], FILE_MAGIC);
    }

    #[test]
    fn fixed_nonce_is_deterministic() {
        let nonce = StreamNonce::from_bytes([9u8; 16]);
        let mut out_a = Vec::new();
        EncryptingReader::with_nonce(&b"payload"[..], &test_key(), nonce)
            .read_to_end(&mut out_a)
            .unwrap();
        let mut out_b = Vec::new();
        EncryptingReader::with_nonce(&b"payload"[..], &test_key(), nonce)
            .read_to_end(&mut out_b)
            .unwrap();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn small_destination_buffers_work() {
        let plaintext = vec![0x5au8; 70_000];
        let mut reader = EncryptingReader::new(plaintext.as_slice(), &test_key());
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out.len() as u64, encrypted_size(70_000));
    }

    #[test]
    fn propagates_inner_errors() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "boom"))
            }
        }

        let mut reader = EncryptingReader::new(FailingReader, &test_key());
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
