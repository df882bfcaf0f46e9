//! Integer mixers and the stable state hash.
//!
//! `state_hash` uses FNV so that every thread and every rank of a cluster
//! computes the same value for the same state (ownership and bit positions
//! depend on it). `ahash` is only used for in-process shard routing.

use fnv::FnvHasher;
use std::hash::{Hash, Hasher};

/// Bob Jenkins' lookup3 final mix applied to a single word, internal state
/// seeded with `0xdeadbeef`.
pub fn jenkins_hash(mut k: u32) -> u32 {
    let mut s1: u32 = 0xdead_beef;
    let mut s2: u32 = 0xdead_beef;

    s2 ^= s1;
    s2 = s2.wrapping_sub(s1.rotate_left(14));
    k ^= s2;
    k = k.wrapping_sub(s2.rotate_left(11));
    s1 ^= k;
    s1 = s1.wrapping_sub(k.rotate_left(25));
    s2 ^= s1;
    s2 = s2.wrapping_sub(s1.rotate_left(16));
    k ^= s2;
    k = k.wrapping_sub(s2.rotate_left(4));
    s1 ^= k;
    s1 = s1.wrapping_sub(k.rotate_left(14));
    s2 ^= s1;
    s2 = s2.wrapping_sub(s1.rotate_left(24));

    s2
}

/// Thomas Wang's 32-bit integer hash.
pub fn wang32_hash(mut key: u32) -> u32 {
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

/// Fold a 64-bit hash into the 32-bit domain of the mixers.
pub fn fold64(h: u64) -> u32 {
    (h ^ (h >> 32)) as u32
}

/// Stable hash of a state, identical across threads, runs and ranks.
pub fn state_hash<S: Hash + ?Sized>(state: &S) -> u64 {
    let mut hasher = FnvHasher::default();
    state.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixers_are_deterministic_and_spread() {
        assert_eq!(jenkins_hash(42), jenkins_hash(42));
        assert_ne!(jenkins_hash(1), jenkins_hash(2));
        assert_ne!(wang32_hash(1), wang32_hash(2));
    }

    #[test]
    fn test_state_hash_is_stable() {
        assert_eq!(state_hash(&(3u32, 4u32)), state_hash(&(3u32, 4u32)));
        assert_ne!(state_hash(&3u32), state_hash(&4u32));
    }
}
