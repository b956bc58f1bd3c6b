//! Streaming and random-access decryption of object contents.

use std::io::{self, Read};

use crypto_secretbox::XSalsa20Poly1305;
use tracing::trace;

use super::{
    content_cipher, open_chunk, read_header, StreamError, StreamNonce, CHUNK_CIPHERTEXT_SIZE,
    CHUNK_PLAINTEXT_SIZE, TAG_SIZE,
};

/// Fill `buf` from `reader`, returning how many bytes were read before EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Decode state shared by both reader types.
///
/// Holds the AEAD, the base nonce and the next chunk index, reads one
/// framed chunk at a time from the wrapped reader, and keeps the decrypted
/// chunk until the consumer has drained it. Once an error has been
/// returned the stream is poisoned and every later read fails.
struct ChunkDecoder<R> {
    inner: R,
    cipher: XSalsa20Poly1305,
    nonce: StreamNonce,
    chunk_index: u64,
    frame: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
    eof: bool,
    poisoned: bool,
}

impl<R: Read> ChunkDecoder<R> {
    fn new(inner: R, data_key: &[u8; 32], nonce: StreamNonce, first_chunk: u64) -> Self {
        ChunkDecoder {
            inner,
            cipher: content_cipher(data_key),
            nonce,
            chunk_index: first_chunk,
            frame: vec![0u8; CHUNK_CIPHERTEXT_SIZE],
            out: Vec::new(),
            pos: 0,
            eof: false,
            poisoned: false,
        }
    }

    /// Decrypt the next chunk into the output buffer.
    fn advance(&mut self) -> Result<(), StreamError> {
        debug_assert_eq!(self.pos, self.out.len());

        let filled = read_full(&mut self.inner, &mut self.frame)?;
        if filled == 0 {
            self.eof = true;
            return Ok(());
        }
        // a chunk must hold its tag plus at least one plaintext byte
        if filled <= TAG_SIZE {
            return Err(StreamError::BadAuth(self.chunk_index));
        }

        let plaintext = open_chunk(
            &self.cipher,
            &self.nonce,
            self.chunk_index,
            &self.frame[..filled],
        )?;
        trace!(chunk = self.chunk_index, plaintext = plaintext.len(), "opened chunk");
        self.chunk_index += 1;
        self.out = plaintext;
        self.pos = 0;
        if filled < CHUNK_CIPHERTEXT_SIZE {
            // short frame can only be the final chunk
            self.eof = true;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "decryption stream previously failed",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.out.len() {
            if self.eof {
                return Ok(0);
            }
            if let Err(err) = self.advance() {
                self.poisoned = true;
                return Err(err.into());
            }
        }
        let n = (self.out.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    /// Drop `skip` plaintext bytes from the front of the stream.
    fn discard(&mut self, mut skip: usize) -> io::Result<()> {
        let mut scratch = [0u8; 4096];
        while skip > 0 {
            let len = skip.min(scratch.len());
            let n = self.read(&mut scratch[..len])?;
            if n == 0 {
                break;
            }
            skip -= n;
        }
        Ok(())
    }
}

/// Sequential decryptor for a complete encrypted stream.
///
/// Reads and checks the header on the first read, then decrypts chunks in
/// order. Authentication failures, truncation and a missing or corrupt
/// header surface as `InvalidData` I/O errors carrying the underlying
/// [`StreamError`].
pub struct DecryptingReader<R> {
    decoder: ChunkDecoder<R>,
    header_read: bool,
}

impl<R: Read> DecryptingReader<R> {
    /// Decrypt `inner`, which must start with the 24-byte header.
    pub fn new(inner: R, data_key: &[u8; 32]) -> Self {
        DecryptingReader {
            // nonce is replaced once the header has been read
            decoder: ChunkDecoder::new(inner, data_key, StreamNonce::from_bytes([0u8; 16]), 0),
            header_read: false,
        }
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.decoder.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "decryption stream previously failed",
            ));
        }
        if !self.header_read {
            match read_header(&mut self.decoder.inner) {
                Ok(nonce) => {
                    self.decoder.nonce = nonce;
                    self.header_read = true;
                }
                Err(err) => {
                    self.decoder.poisoned = true;
                    return Err(err.into());
                }
            }
        }
        self.decoder.read(buf)
    }
}

/// Random-access decryptor for a range of an encrypted stream.
///
/// The caller supplies the stream nonce (from a prior header read) and a
/// reader positioned at the ciphertext offset of the chunk containing
/// `offset` (see [`ciphertext_range`](super::ciphertext_range)). The
/// reader decrypts whole chunks, discards the first `offset mod 65536`
/// plaintext bytes, and stops after `limit` bytes when one is given.
pub struct SeekingReader<R> {
    decoder: ChunkDecoder<R>,
    skip: usize,
    remaining: Option<u64>,
}

impl<R: Read> SeekingReader<R> {
    pub fn new(
        inner: R,
        data_key: &[u8; 32],
        nonce: StreamNonce,
        offset: u64,
        limit: Option<u64>,
    ) -> Self {
        let first_chunk = offset / CHUNK_PLAINTEXT_SIZE as u64;
        let skip = (offset % CHUNK_PLAINTEXT_SIZE as u64) as usize;
        SeekingReader {
            decoder: ChunkDecoder::new(inner, data_key, nonce, first_chunk),
            skip,
            remaining: limit,
        }
    }
}

impl<R: Read> Read for SeekingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.skip > 0 {
            let skip = std::mem::take(&mut self.skip);
            self.decoder.discard(skip)?;
        }
        let want = match self.remaining {
            Some(0) => return Ok(0),
            Some(remaining) => (remaining.min(buf.len() as u64)) as usize,
            None => buf.len(),
        };
        let n = self.decoder.read(&mut buf[..want])?;
        if let Some(remaining) = &mut self.remaining {
            *remaining -= n as u64;
        }
        Ok(n)
    }
}
