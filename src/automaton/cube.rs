//! Conjunctions of literals over at most 64 atomic propositions.
//!
//! A cube stores two masks: bit `i` of `pos` means "proposition `i` holds",
//! bit `i` of `neg` means "proposition `i` does not hold". A proposition in
//! neither mask is free. System states carry full valuations (every
//! proposition in exactly one mask); automaton guards are usually partial.

use serde::{Deserialize, Serialize};

pub const MAX_APS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cube {
    pos: u64,
    neg: u64,
}

impl Cube {
    /// The cube with no literal (`true`).
    pub const fn top() -> Self {
        Cube { pos: 0, neg: 0 }
    }

    /// Full valuation over `ap_count` propositions: bit `i` of `bits` gives
    /// the value of proposition `i`.
    pub fn valuation(bits: u64, ap_count: usize) -> Self {
        debug_assert!(ap_count <= MAX_APS);
        let all = if ap_count >= MAX_APS {
            u64::MAX
        } else {
            (1u64 << ap_count) - 1
        };
        Cube {
            pos: bits & all,
            neg: !bits & all,
        }
    }

    pub fn with_true(mut self, ap: usize) -> Self {
        debug_assert!(ap < MAX_APS);
        self.pos |= 1 << ap;
        self.neg &= !(1 << ap);
        self
    }

    pub fn with_false(mut self, ap: usize) -> Self {
        debug_assert!(ap < MAX_APS);
        self.neg |= 1 << ap;
        self.pos &= !(1 << ap);
        self
    }

    pub fn is_true(&self, ap: usize) -> bool {
        self.pos & (1 << ap) != 0
    }

    pub fn is_false(&self, ap: usize) -> bool {
        self.neg & (1 << ap) != 0
    }

    pub fn is_top(&self) -> bool {
        self.pos == 0 && self.neg == 0
    }

    /// Two cubes overlap unless one asserts a literal the other negates.
    pub fn intersects(&self, other: &Cube) -> bool {
        self.pos & other.neg == 0 && self.neg & other.pos == 0
    }

    /// Render with proposition names, e.g. `p & !q`.
    pub fn format(&self, aps: &[String]) -> String {
        if self.is_top() {
            return "1".to_string();
        }
        let mut parts = Vec::new();
        for (i, name) in aps.iter().enumerate().take(MAX_APS) {
            if self.is_true(i) {
                parts.push(name.clone());
            } else if self.is_false(i) {
                parts.push(format!("!{}", name));
            }
        }
        parts.join(" & ")
    }
}
