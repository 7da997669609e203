//! Stable checksum for keys, buckets and in-table slot placement.
//!
//! The format fixes the hash: start at 5381, then `h = (h * 33) ^ byte` with
//! 32-bit wraparound. No seed, no salt. The same value picks the bucket
//! (`h % 256`) and the starting slot inside that bucket's table
//! (`(h / 256) % slots`).

use std::hash::Hasher;
use std::io;

use crate::consts::{BUCKETS, HASH_START};

/// Fold `bytes` into an existing checksum state.
#[inline]
pub fn hash_update(mut h: u32, bytes: &[u8]) -> u32 {
    for &b in bytes {
        h = (h << 5).wrapping_add(h) ^ (b as u32);
    }
    h
}

/// Checksum of a whole key.
#[inline]
pub fn cdb_hash(bytes: &[u8]) -> u32 {
    hash_update(HASH_START, bytes)
}

/// Bucket (secondary table) index for a checksum.
#[inline]
pub fn bucket_of(h: u32) -> usize {
    (h as usize) % BUCKETS
}

/// First slot index to look at inside a table with `slots` entries.
#[inline]
pub fn slot_start(h: u32, slots: u32) -> u32 {
    debug_assert!(slots > 0, "slots must be > 0");
    (h / BUCKETS as u32) % slots
}

/// Incremental checksum.
///
/// Implements `io::Write`, so the key can be hashed while it is being
/// written to the output (see `make::builder`).
#[derive(Debug, Clone, Copy)]
pub struct CdbHasher {
    h: u32,
}

impl CdbHasher {
    pub fn new() -> Self {
        Self { h: HASH_START }
    }

    pub fn reset(&mut self) {
        self.h = HASH_START;
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.h = hash_update(self.h, bytes);
    }

    pub fn sum32(&self) -> u32 {
        self.h
    }

    /// Append the big-endian bytes of the current state to `out`.
    pub fn sum(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.h.to_be_bytes());
    }

    pub fn size(&self) -> usize {
        4
    }

    pub fn block_size(&self) -> usize {
        1
    }
}

impl Default for CdbHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for CdbHasher {
    fn finish(&self) -> u64 {
        self.h as u64
    }

    fn write(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

impl io::Write for CdbHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
