//! Bloom gate consulted before a read-through load.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

/// Probabilistic membership test.
///
/// `false` means the key is definitely absent from the backing source;
/// `true` only means it may be present.
#[async_trait]
pub trait BloomFilter: Send + Sync {
    async fn has_key(&self, key: &str) -> bool;
}

/// In-process Bloom filter over an atomic bit array.
///
/// Bit positions come from double hashing two SipHash digests, so inserts
/// and lookups never take a lock.
#[derive(Debug)]
pub struct HashBloomFilter {
    words: Vec<AtomicU64>,
    num_bits: u64,
    num_hashes: u32,
}

impl HashBloomFilter {
    /// Sizes the filter for `expected_items` at the target false positive rate.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let num_bits = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().clamp(1.0, 32.0) as u32;
        let words = (0..num_bits.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();

        Self {
            words,
            num_bits,
            num_hashes,
        }
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn insert(&self, key: &str) {
        for bit in self.positions(key) {
            self.words[(bit / 64) as usize].fetch_or(1 << (bit % 64), Ordering::Relaxed);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions(key)
            .all(|bit| self.words[(bit / 64) as usize].load(Ordering::Relaxed) & (1 << (bit % 64)) != 0)
    }

    fn positions(&self, key: &str) -> impl Iterator<Item = u64> + '_ {
        let h1 = digest(0, key);
        let h2 = digest(1, key) | 1;
        (0..u64::from(self.num_hashes))
            .map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }
}

fn digest(seed: u64, key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}

#[async_trait]
impl BloomFilter for HashBloomFilter {
    async fn has_key(&self, key: &str) -> bool {
        self.contains(key)
    }
}
