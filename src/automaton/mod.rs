//! Property automata: acceptance marks, acceptance conditions and the
//! explicit transition-based automaton used by the product explorer.

mod cube;
mod twacube;

pub use cube::{Cube, MAX_APS};
pub use twacube::TwaCube;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

// =============================================================================
// Acceptance marks
// =============================================================================

/// Set of acceptance sets (at most 32) carried by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AccMark(u32);

impl AccMark {
    pub const fn empty() -> Self {
        AccMark(0)
    }

    pub fn from_sets(sets: &[u32]) -> Self {
        let mut bits = 0u32;
        for &s in sets {
            debug_assert!(s < 32, "acceptance set {} out of range", s);
            bits |= 1 << s;
        }
        AccMark(bits)
    }

    pub const fn from_bits(bits: u32) -> Self {
        AccMark(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn has(self, set: u32) -> bool {
        set < 32 && self.0 & (1 << set) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Sets present in `self` but missing from `other`.
    pub fn minus(self, other: AccMark) -> AccMark {
        AccMark(self.0 & !other.0)
    }
}

impl BitOr for AccMark {
    type Output = AccMark;

    fn bitor(self, rhs: AccMark) -> AccMark {
        AccMark(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccMark {
    fn bitor_assign(&mut self, rhs: AccMark) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for AccMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for set in 0..32 {
            if self.has(set) {
                if !first {
                    write!(f, ",")?;
                }
                write!(f, "{}", set)?;
                first = false;
            }
        }
        write!(f, "}}")
    }
}

// =============================================================================
// Acceptance conditions
// =============================================================================

/// Shape of an acceptance condition. Emptiness strategies declare which
/// shapes they support; construction fails on the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcceptanceShape {
    /// `Inf(0) & ... & Inf(sets-1)`; zero sets means every cycle is accepting.
    GeneralizedBuchi { sets: u32 },
    /// No run is accepting.
    False,
    CoBuchi { sets: u32 },
    Rabin { pairs: u32 },
    Streett { pairs: u32 },
    Parity { colors: u32 },
}

impl AcceptanceShape {
    pub fn is_generalized_buchi(&self) -> bool {
        matches!(self, AcceptanceShape::GeneralizedBuchi { .. })
    }

    pub fn num_sets(&self) -> u32 {
        match *self {
            AcceptanceShape::GeneralizedBuchi { sets } | AcceptanceShape::CoBuchi { sets } => sets,
            AcceptanceShape::False => 0,
            AcceptanceShape::Rabin { pairs } | AcceptanceShape::Streett { pairs } => 2 * pairs,
            AcceptanceShape::Parity { colors } => colors,
        }
    }
}

impl fmt::Display for AcceptanceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptanceShape::GeneralizedBuchi { sets: 0 } => write!(f, "t"),
            AcceptanceShape::GeneralizedBuchi { sets: 1 } => write!(f, "Buchi"),
            AcceptanceShape::GeneralizedBuchi { sets } => write!(f, "generalized-Buchi {}", sets),
            AcceptanceShape::False => write!(f, "f"),
            AcceptanceShape::CoBuchi { sets } => write!(f, "co-Buchi {}", sets),
            AcceptanceShape::Rabin { pairs } => write!(f, "Rabin {}", pairs),
            AcceptanceShape::Streett { pairs } => write!(f, "Streett {}", pairs),
            AcceptanceShape::Parity { colors } => write!(f, "parity {}", colors),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    shape: AcceptanceShape,
}

impl Acceptance {
    pub fn new(shape: AcceptanceShape) -> Self {
        Acceptance { shape }
    }

    pub fn buchi() -> Self {
        Self::generalized_buchi(1)
    }

    pub fn generalized_buchi(sets: u32) -> Self {
        debug_assert!(sets <= 32);
        Acceptance {
            shape: AcceptanceShape::GeneralizedBuchi { sets },
        }
    }

    pub fn shape(&self) -> AcceptanceShape {
        self.shape
    }

    pub fn num_sets(&self) -> u32 {
        self.shape.num_sets()
    }

    /// All sets the condition needs to see infinitely often.
    pub fn all_sets(&self) -> AccMark {
        match self.shape {
            AcceptanceShape::GeneralizedBuchi { sets } if sets >= 32 => AccMark::from_bits(u32::MAX),
            AcceptanceShape::GeneralizedBuchi { sets } => AccMark::from_bits((1u32 << sets) - 1),
            _ => AccMark::empty(),
        }
    }

    /// Whether a cycle visiting exactly `marks` is accepting. Only
    /// generalized Büchi conditions can be decided from a mark union; the
    /// other shapes never reach this point because strategies reject them.
    pub fn accepting(&self, marks: AccMark) -> bool {
        match self.shape {
            AcceptanceShape::GeneralizedBuchi { .. } => {
                let needed = self.all_sets();
                marks.bits() & needed.bits() == needed.bits()
            }
            _ => false,
        }
    }
}

// =============================================================================
// Automaton interface
// =============================================================================

/// One automaton edge: guard over atomic propositions, acceptance mark, target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub guard: Cube,
    pub mark: AccMark,
    pub dst: u32,
}

/// Property automaton collaborator. Edge lists double as successor cursors:
/// callers keep an index into the returned slice.
pub trait Automaton: Send + Sync {
    fn initial(&self) -> u32;

    fn succ(&self, state: u32) -> &[Transition];

    fn acceptance(&self) -> &Acceptance;

    fn ap(&self) -> &[String];

    fn num_states(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_ops() {
        let a = AccMark::from_sets(&[0, 2]);
        let b = AccMark::from_sets(&[1]);
        let c = a | b;
        assert!(c.has(0) && c.has(1) && c.has(2));
        assert_eq!(c.count(), 3);
        assert_eq!(c.minus(a), b);
        assert_eq!(a.to_string(), "{0,2}");
    }

    #[test]
    fn test_generalized_buchi_accepting() {
        let acc = Acceptance::generalized_buchi(2);
        assert!(!acc.accepting(AccMark::empty()));
        assert!(!acc.accepting(AccMark::from_sets(&[1])));
        assert!(acc.accepting(AccMark::from_sets(&[0, 1])));
        assert!(acc.accepting(AccMark::from_sets(&[0, 1, 5])));
    }

    #[test]
    fn test_true_acceptance_accepts_any_cycle() {
        let acc = Acceptance::generalized_buchi(0);
        assert!(acc.accepting(AccMark::empty()));
        assert_eq!(acc.shape().to_string(), "t");
    }

    #[test]
    fn test_other_shapes_never_accept() {
        let acc = Acceptance::new(AcceptanceShape::Rabin { pairs: 1 });
        assert!(!acc.accepting(AccMark::from_sets(&[0, 1])));
        assert!(!acc.shape().is_generalized_buchi());
    }
}
