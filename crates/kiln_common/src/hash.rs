//! Content fingerprints for cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// A 128-bit XXH3 fingerprint of a canonical byte encoding.
///
/// Cache keys are compared structurally; the fingerprint is a compact,
/// stable stand-in used when a key has to be printed, logged, or exported
/// in a debug dump.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Streaming builder for a [`ContentHash`].
///
/// Callers feed tagged fields one at a time; variable-length fields are
/// length-prefixed so that adjacent fields cannot run together.
pub struct ContentHasher {
    state: Xxh3,
}

impl ContentHasher {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self { state: Xxh3::new() }
    }

    /// Feeds a single tag byte.
    pub fn write_tag(&mut self, tag: u8) {
        self.state.update(&[tag]);
    }

    /// Feeds a fixed-width unsigned integer.
    pub fn write_u64(&mut self, value: u64) {
        self.state.update(&value.to_le_bytes());
    }

    /// Feeds a length-prefixed byte string.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u64(bytes.len() as u64);
        self.state.update(bytes);
    }

    /// Consumes the hasher and returns the fingerprint.
    pub fn finish(self) -> ContentHash {
        ContentHash(self.state.digest128().to_le_bytes())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(data: &[u8]) -> ContentHash {
        let mut h = ContentHasher::new();
        h.write_bytes(data);
        h.finish()
    }

    #[test]
    fn deterministic() {
        let a = hash_of(b"CheckpointLoader");
        let b = hash_of(b"CheckpointLoader");
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let a = hash_of(b"KSampler");
        let b = hash_of(b"VAEDecode");
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_32_hex_chars() {
        let h = hash_of(b"test");
        let s = format!("{h}");
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_abbreviated() {
        let s = format!("{:?}", hash_of(b"test"));
        assert!(s.starts_with("ContentHash("));
        assert!(s.ends_with(")"));
    }

    #[test]
    fn length_prefix_separates_fields() {
        let mut a = ContentHasher::new();
        a.write_bytes(b"ab");
        a.write_bytes(b"c");
        let mut b = ContentHasher::new();
        b.write_bytes(b"a");
        b.write_bytes(b"bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn streaming_is_deterministic() {
        let build = || {
            let mut h = ContentHasher::new();
            h.write_tag(3);
            h.write_u64(42);
            h.write_bytes(b"seed");
            h.finish()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn serde_roundtrip() {
        let h = hash_of(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
