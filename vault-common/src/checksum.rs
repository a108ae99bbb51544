//! CRC-32 checksums
//!
//! Standard CRC-32 (IEEE 802.3, reflected, init and xorout `0xFFFFFFFF`),
//! the same variant clients compute locally before comparing.

/// Incremental CRC-32 over a sequence of byte slices
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
    len: u64,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another slice into the checksum
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.len += bytes.len() as u64;
    }

    /// Number of bytes folded in so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// Checksum a byte slice in one call
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}
