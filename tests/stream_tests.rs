//! Property-based tests for the streaming content cipher.

use std::io::Read;

use proptest::prelude::*;
use rand::RngCore;

use shroudfs::stream::{
    ciphertext_range, decrypted_size, encrypted_size, read_header, DecryptingReader,
    EncryptingReader, SeekingReader, StreamNonce, CHUNK_PLAINTEXT_SIZE, HEADER_SIZE,
};

fn generate_data_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    key
}

fn encrypt_all(plaintext: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let mut reader = EncryptingReader::new(plaintext, key);
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

fn decrypt_all(ciphertext: &[u8], key: &[u8; 32]) -> std::io::Result<Vec<u8>> {
    let mut reader = DecryptingReader::new(ciphertext, key);
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roundtrip(content in prop::collection::vec(any::<u8>(), 0..200_000)) {
        let key = generate_data_key();
        let ciphertext = encrypt_all(&content, &key);
        let decrypted = decrypt_all(&ciphertext, &key).unwrap();
        prop_assert_eq!(decrypted, content);
    }

    #[test]
    fn ciphertext_size_matches_arithmetic(
        content in prop::collection::vec(any::<u8>(), 0..200_000)
    ) {
        let key = generate_data_key();
        let ciphertext = encrypt_all(&content, &key);
        prop_assert_eq!(ciphertext.len() as u64, encrypted_size(content.len() as u64));
        prop_assert_eq!(
            decrypted_size(ciphertext.len() as u64).unwrap(),
            content.len() as u64
        );
    }

    #[test]
    fn seekable_read_equals_slice(
        content in prop::collection::vec(any::<u8>(), 1..150_000),
        start_frac in 0.0f64..1.0,
        len_frac in 0.0f64..1.0,
    ) {
        let key = generate_data_key();
        let ciphertext = encrypt_all(&content, &key);
        let nonce = read_header(&mut ciphertext.as_slice()).unwrap();

        let offset = (start_frac * content.len() as f64) as u64;
        let max_len = content.len() as u64 - offset;
        let len = (len_frac * max_len as f64) as u64;

        let (cstart, clen) = ciphertext_range(offset, Some(len));
        let end = match clen {
            Some(clen) => (cstart + clen).min(ciphertext.len() as u64),
            None => ciphertext.len() as u64,
        };
        let mut reader = SeekingReader::new(
            &ciphertext[cstart as usize..end as usize],
            &key,
            nonce,
            offset,
            Some(len),
        );
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        prop_assert_eq!(out.as_slice(), &content[offset as usize..(offset + len) as usize]);
    }

    #[test]
    fn bit_flips_are_detected(
        content in prop::collection::vec(any::<u8>(), 1..100_000),
        position_frac in 0.0f64..1.0,
        bit in 0u8..8,
    ) {
        let key = generate_data_key();
        let mut ciphertext = encrypt_all(&content, &key);

        // flip one bit anywhere after the magic; corrupting the nonce
        // changes every chunk nonce, corrupting a chunk breaks its tag
        let lo = 8usize;
        let position = lo + (position_frac * (ciphertext.len() - lo - 1) as f64) as usize;
        ciphertext[position] ^= 1 << bit;

        prop_assert!(
            decrypt_all(&ciphertext, &key).is_err(),
            "flip at byte {} bit {} went undetected",
            position,
            bit
        );
    }

    #[test]
    fn truncations_are_detected(
        content in prop::collection::vec(any::<u8>(), 1..100_000),
        cut_frac in 0.0f64..1.0,
    ) {
        let key = generate_data_key();
        let ciphertext = encrypt_all(&content, &key);

        // cut at least one byte, avoiding exact chunk boundaries: a stream
        // cut precisely between chunks is indistinguishable from a shorter
        // object without the size from the listing
        let mut cut = 1 + (cut_frac * (ciphertext.len() - 1) as f64) as usize;
        let body = ciphertext.len() - HEADER_SIZE;
        while cut <= body && (body - cut) % (CHUNK_PLAINTEXT_SIZE + 16) == 0 {
            cut += 1;
        }
        let truncated = &ciphertext[..ciphertext.len() - cut];
        prop_assert!(
            decrypt_all(truncated, &key).is_err(),
            "truncating {} bytes went undetected",
            cut
        );
    }

    #[test]
    fn fresh_nonces_make_distinct_ciphertexts(
        content in prop::collection::vec(any::<u8>(), 1..10_000)
    ) {
        let key = generate_data_key();
        let a = encrypt_all(&content, &key);
        let b = encrypt_all(&content, &key);
        prop_assert_ne!(a, b);
    }

    #[test]
    fn nonce_arithmetic_is_additive(base in any::<[u8; 16]>(), a in any::<u32>(), b in any::<u32>()) {
        let nonce = StreamNonce::from_bytes(base);
        let stepped = nonce.offset(u64::from(a)).offset(u64::from(b));
        let jumped = nonce.offset(u64::from(a) + u64::from(b));
        prop_assert_eq!(stepped.as_bytes(), jumped.as_bytes());
    }
}

#[test]
fn known_sizes_from_the_format() {
    // empty object: header only
    assert_eq!(encrypted_size(0), 24);
    // "hello world"
    assert_eq!(encrypted_size(11), 51);
    // exactly one chunk
    assert_eq!(encrypted_size(65_536), 65_576);
    // one byte spills into a second chunk
    assert_eq!(encrypted_size(65_537), 65_593);
    // seek math: second chunk starts right after the first framed chunk
    assert_eq!(ciphertext_range(100_000, None).0, 65_576);
}
