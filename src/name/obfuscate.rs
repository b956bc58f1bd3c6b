//! Reversible, non-cryptographic name obfuscation.
//!
//! Each path component becomes `<shift>.<rotated>` where `shift` is an
//! FNV-1a hash of the name key and the original component, and `rotated`
//! rotates every character forward within its class (letters stay letters,
//! digits stay digits, everything else is untouched). The prefix makes
//! decoding self-describing, and because character classes and length are
//! preserved the result survives case-insensitive stores and keeps sort
//! behavior roughly intact.

use super::NameError;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

fn fnv1a(key: &[u8], data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in key.iter().chain(data) {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

fn rotate(c: char, base: u8, class_size: u32, shift: u32, direction: Direction) -> char {
    let amount = shift % class_size;
    let pos = c as u32 - u32::from(base);
    let rotated = match direction {
        Direction::Forward => (pos + amount) % class_size,
        Direction::Backward => (pos + class_size - amount) % class_size,
    };
    char::from(base + rotated as u8)
}

fn shift_chars(segment: &str, shift: u32, direction: Direction) -> String {
    segment
        .chars()
        .map(|c| match c {
            'a'..='z' => rotate(c, b'a', 26, shift, direction),
            'A'..='Z' => rotate(c, b'A', 26, shift, direction),
            '0'..='9' => rotate(c, b'0', 10, shift, direction),
            other => other,
        })
        .collect()
}

pub(super) fn obfuscate_segment(segment: &str, name_key: &[u8; 32]) -> String {
    let shift = fnv1a(name_key, segment.as_bytes());
    format!("{shift}.{}", shift_chars(segment, shift, Direction::Forward))
}

pub(super) fn deobfuscate_segment(segment: &str, _name_key: &[u8; 32]) -> Result<String, NameError> {
    let (prefix, rest) = segment.split_once('.').ok_or(NameError::BadShiftPrefix)?;
    let shift: u32 = prefix.parse().map_err(|_| NameError::BadShiftPrefix)?;
    let plain = shift_chars(rest, shift, Direction::Backward);
    if plain.contains('\0') {
        return Err(NameError::Unsafe);
    }
    Ok(plain)
}
