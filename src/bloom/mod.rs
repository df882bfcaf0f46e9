//! Probabilistic membership for memory-bounded exploration.
//!
//! Both structures are insert-only and shared by all workers of one run.
//! Neither produces false negatives; both may report an unseen state as
//! seen, which prunes its subtree.

mod hash;

pub use hash::{fold64, jenkins_hash, state_hash, wang32_hash};

use std::sync::atomic::{AtomicU64, Ordering};

const WORD_BITS: u64 = 64;

fn alloc_words(bits: u64) -> Box<[AtomicU64]> {
    let words = bits.div_ceil(WORD_BITS).max(1) as usize;
    (0..words).map(|_| AtomicU64::new(0)).collect()
}

/// Set bit `index`, returning whether it was already set.
fn test_and_set(words: &[AtomicU64], index: u64) -> bool {
    let word = &words[(index / WORD_BITS) as usize];
    let mask = 1u64 << (index % WORD_BITS);
    word.fetch_or(mask, Ordering::AcqRel) & mask != 0
}

fn test(words: &[AtomicU64], index: u64) -> bool {
    let word = &words[(index / WORD_BITS) as usize];
    word.load(Ordering::Acquire) & (1u64 << (index % WORD_BITS)) != 0
}

// =============================================================================
// Bloom filter
// =============================================================================

/// `k` bit positions per element derived by double hashing (Jenkins, Wang).
pub struct BloomFilter {
    words: Box<[AtomicU64]>,
    mem_bits: u64,
    hash_count: u32,
}

impl BloomFilter {
    pub fn new(mem_bits: u64, hash_count: u32) -> Self {
        debug_assert!(mem_bits > 0, "bloom filter needs at least one bit");
        debug_assert!(hash_count > 0, "bloom filter needs at least one hash");
        let mem_bits = mem_bits.max(1);
        BloomFilter {
            words: alloc_words(mem_bits),
            mem_bits,
            hash_count: hash_count.max(1),
        }
    }

    /// Hash count minimising the false-positive rate for `expected` elements.
    pub fn optimal_hash_count(mem_bits: u64, expected: u64) -> u32 {
        if expected == 0 {
            return 1;
        }
        let k = (mem_bits as f64 / expected as f64) * std::f64::consts::LN_2;
        (k.round() as u32).clamp(1, 32)
    }

    fn bit_index(&self, h: u64, i: u32) -> u64 {
        let folded = fold64(h);
        let h1 = jenkins_hash(folded) as u64;
        let h2 = (wang32_hash(folded) | 1) as u64;
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.mem_bits
    }

    /// Returns true when every indexed bit was already set.
    pub fn insert(&self, h: u64) -> bool {
        let mut present = true;
        for i in 0..self.hash_count {
            present &= test_and_set(&self.words, self.bit_index(h, i));
        }
        present
    }

    pub fn contains(&self, h: u64) -> bool {
        (0..self.hash_count).all(|i| test(&self.words, self.bit_index(h, i)))
    }

    pub fn mem_bits(&self) -> u64 {
        self.mem_bits
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Theoretical false-positive rate after `inserted` distinct elements:
    /// `(1 - e^(-k n / m))^k`.
    pub fn expected_false_positive_rate(&self, inserted: u64) -> f64 {
        let k = self.hash_count as f64;
        let fill = 1.0 - (-k * inserted as f64 / self.mem_bits as f64).exp();
        fill.powf(k)
    }

    pub fn fill_ratio(&self) -> f64 {
        let set: u64 = self
            .words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as u64)
            .sum();
        set as f64 / self.mem_bits as f64
    }
}

// =============================================================================
// Bitstate table
// =============================================================================

/// One bit per state at `jenkins(h) & mask`, `mask = 2^log2_bits - 1`.
pub struct BitstateTable {
    words: Box<[AtomicU64]>,
    mask: u64,
}

impl BitstateTable {
    pub fn new(log2_bits: u32) -> Self {
        debug_assert!((1..=32).contains(&log2_bits));
        let log2_bits = log2_bits.clamp(1, 32);
        let bits = 1u64 << log2_bits;
        BitstateTable {
            words: alloc_words(bits),
            mask: bits - 1,
        }
    }

    fn index(&self, h: u64) -> u64 {
        jenkins_hash(fold64(h)) as u64 & self.mask
    }

    /// Returns true when the bit was already set.
    pub fn insert(&self, h: u64) -> bool {
        test_and_set(&self.words, self.index(h))
    }

    pub fn contains(&self, h: u64) -> bool {
        test(&self.words, self.index(h))
    }

    pub fn size_bits(&self) -> u64 {
        self.mask + 1
    }
}
