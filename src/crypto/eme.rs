//! EME wide-block encryption (Halevi-Rogaway 2003).
//!
//! EME turns AES into a length-preserving, tweakable cipher over messages
//! of 1 to 128 AES blocks. Flipping any input bit affects every output
//! block, which is what makes it suitable for encrypting filenames: equal
//! names encrypt equally (lookups stay exact-match), while similar names
//! share no visible structure.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes256, Block};
use thiserror::Error;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// EME is only defined for up to 128 blocks (2048 bytes).
pub const MAX_BLOCKS: usize = 128;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Errors from the wide-block transform.
#[derive(Error, Debug)]
pub enum EmeError {
    /// Input must be a positive multiple of the AES block size.
    #[error("input length {0} is not a positive multiple of {BLOCK_SIZE}")]
    BadLength(usize),

    /// Input exceeds the 128-block limit of the mode.
    #[error("input of {0} blocks exceeds the EME limit of {MAX_BLOCKS}")]
    TooLong(usize),
}

/// AES-256 based EME transform.
pub struct Eme {
    cipher: Aes256,
}

impl Eme {
    pub fn new(key: &[u8; 32]) -> Self {
        Eme {
            cipher: Aes256::new(key.into()),
        }
    }

    /// Encrypt `data` under `tweak`. Output length equals input length.
    ///
    /// # Errors
    ///
    /// Fails if `data` is empty, not a multiple of 16 bytes, or longer than
    /// 2048 bytes.
    pub fn encrypt(&self, tweak: &[u8; BLOCK_SIZE], data: &[u8]) -> Result<Vec<u8>, EmeError> {
        self.transform(tweak, data, Direction::Encrypt)
    }

    /// Decrypt `data` under `tweak`. Exact inverse of [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, tweak: &[u8; BLOCK_SIZE], data: &[u8]) -> Result<Vec<u8>, EmeError> {
        self.transform(tweak, data, Direction::Decrypt)
    }

    fn transform(
        &self,
        tweak: &[u8; BLOCK_SIZE],
        data: &[u8],
        direction: Direction,
    ) -> Result<Vec<u8>, EmeError> {
        if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
            return Err(EmeError::BadLength(data.len()));
        }
        let m = data.len() / BLOCK_SIZE;
        if m > MAX_BLOCKS {
            return Err(EmeError::TooLong(m));
        }

        // l_table[j] = 2^(j+1) * AES-enc(K, 0^16) in GF(2^128)
        let mut l = [0u8; BLOCK_SIZE];
        {
            let mut zero = Block::default();
            self.cipher.encrypt_block(&mut zero);
            l.copy_from_slice(&zero);
        }
        let mut l_table = Vec::with_capacity(m);
        for _ in 0..m {
            mult_by_two(&mut l);
            l_table.push(l);
        }

        let mut out = vec![0u8; data.len()];

        // PPPj = cipher(Pj xor 2^j L)
        for j in 0..m {
            let mut pp = [0u8; BLOCK_SIZE];
            for i in 0..BLOCK_SIZE {
                pp[i] = data[j * BLOCK_SIZE + i] ^ l_table[j][i];
            }
            let ppp = self.apply(&pp, direction);
            out[j * BLOCK_SIZE..(j + 1) * BLOCK_SIZE].copy_from_slice(&ppp);
        }

        // MP = PPP1 xor T xor PPP2 xor ... xor PPPm
        let mut mp = [0u8; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            mp[i] = out[i] ^ tweak[i];
        }
        for j in 1..m {
            for i in 0..BLOCK_SIZE {
                mp[i] ^= out[j * BLOCK_SIZE + i];
            }
        }

        let mc = self.apply(&mp, direction);

        // M1 = MP xor MC; Mj = 2^(j-1) M1
        let mut mask = [0u8; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            mask[i] = mp[i] ^ mc[i];
        }
        for j in 1..m {
            mult_by_two(&mut mask);
            for i in 0..BLOCK_SIZE {
                out[j * BLOCK_SIZE + i] ^= mask[i];
            }
        }

        // CCC1 = MC xor T xor CCC2 xor ... xor CCCm
        let mut ccc1 = [0u8; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            ccc1[i] = mc[i] ^ tweak[i];
        }
        for j in 1..m {
            for i in 0..BLOCK_SIZE {
                ccc1[i] ^= out[j * BLOCK_SIZE + i];
            }
        }
        out[..BLOCK_SIZE].copy_from_slice(&ccc1);

        // Cj = cipher(CCCj) xor 2^j L
        for j in 0..m {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&out[j * BLOCK_SIZE..(j + 1) * BLOCK_SIZE]);
            let cc = self.apply(&block, direction);
            for i in 0..BLOCK_SIZE {
                out[j * BLOCK_SIZE + i] = cc[i] ^ l_table[j][i];
            }
        }

        Ok(out)
    }

    fn apply(&self, block: &[u8; BLOCK_SIZE], direction: Direction) -> [u8; BLOCK_SIZE] {
        let mut b = Block::clone_from_slice(block);
        match direction {
            Direction::Encrypt => self.cipher.encrypt_block(&mut b),
            Direction::Decrypt => self.cipher.decrypt_block(&mut b),
        }
        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&b);
        out
    }
}

impl std::fmt::Debug for Eme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eme").finish_non_exhaustive()
    }
}

/// Doubling in GF(2^128) with the byte ordering used by EME: bytes are
/// little-endian, the reduction polynomial is x^128 + x^7 + x^2 + x + 1.
fn mult_by_two(block: &mut [u8; BLOCK_SIZE]) {
    let mut out = [0u8; BLOCK_SIZE];
    out[0] = block[0].wrapping_mul(2);
    if block[15] >= 128 {
        out[0] ^= 135;
    }
    for j in 1..BLOCK_SIZE {
        out[j] = block[j].wrapping_mul(2);
        if block[j - 1] >= 128 {
            out[j] = out[j].wrapping_add(1);
        }
    }
    *block = out;
}
