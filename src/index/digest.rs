//! Key digest functions.
//!
//! Keys are located in the trie solely by a fixed-width digest of their
//! raw bytes. The engine assumes digest uniqueness over the stored key
//! set; there is no collision handling.

use std::fmt;

use md5::{Digest as _, Md5};

/// A fixed-width digest function, chosen per file at creation.
#[derive(Clone)]
pub struct Digester {
    size: usize,
    func: fn(&[u8]) -> Vec<u8>,
}

impl Digester {
    /// MD5, 16 bytes. The default.
    pub fn md5() -> Self {
        Self { size: 16, func: md5_digest }
    }

    /// A caller-supplied digest of `size` bytes.
    ///
    /// `func` must always return exactly `size` bytes and must be
    /// well-distributed; the bucket split algorithm depends on it.
    pub fn custom(size: usize, func: fn(&[u8]) -> Vec<u8>) -> Self {
        Self { size, func }
    }

    /// Digest width in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Digests raw key bytes.
    pub fn digest(&self, key: &[u8]) -> Vec<u8> {
        (self.func)(key)
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digester").field("size", &self.size).finish()
    }
}

fn md5_digest(key: &[u8]) -> Vec<u8> {
    Md5::digest(key).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        let d = Digester::md5();
        assert_eq!(d.size(), 16);
        // MD5 of the empty string.
        assert_eq!(
            d.digest(b""),
            [
                0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec,
                0xf8, 0x42, 0x7e
            ]
        );
    }

    #[test]
    fn test_md5_is_stable() {
        let d = Digester::md5();
        assert_eq!(d.digest(b"key1"), d.digest(b"key1"));
        assert_ne!(d.digest(b"key1"), d.digest(b"key2"));
    }

    #[test]
    fn test_custom_digester() {
        let d = Digester::custom(2, |key| {
            let mut sum = 0u16;
            for &b in key {
                sum = sum.wrapping_mul(31).wrapping_add(b as u16);
            }
            sum.to_be_bytes().to_vec()
        });
        assert_eq!(d.size(), 2);
        assert_eq!(d.digest(b"ab").len(), 2);
    }
}
