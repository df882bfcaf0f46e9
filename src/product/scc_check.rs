use super::EmptinessCheck;
use crate::automaton::{AccMark, Acceptance};
use crate::error::{McError, McResult};
use crate::unionfind::IntUnionFind;

#[derive(Debug, Clone, Copy)]
struct Root {
    serial: u32,
    /// Mark of the tree edge entering the root.
    ingoing: AccMark,
    /// Marks seen on edges inside the candidate component.
    acc: AccMark,
}

/// Couvreur-style emptiness check over product serial numbers.
///
/// Only generalized Büchi acceptance is supported: marks of a component are
/// accumulated on its root and compared against the full set.
#[derive(Debug)]
pub struct SccEmptinessCheck {
    acceptance: Acceptance,
    uf: IntUnionFind,
    roots: Vec<Root>,
    found: bool,
}

impl SccEmptinessCheck {
    pub fn new(acceptance: &Acceptance) -> McResult<Self> {
        if !acceptance.shape().is_generalized_buchi() {
            return Err(McError::UnsupportedAcceptance {
                strategy: "scc_emptiness",
                shape: acceptance.shape(),
            });
        }
        Ok(SccEmptinessCheck {
            acceptance: *acceptance,
            uf: IntUnionFind::with_capacity(1024),
            roots: Vec::with_capacity(1024),
            found: false,
        })
    }
}

impl<S> EmptinessCheck<S> for SccEmptinessCheck {
    fn name(&self) -> &'static str {
        "scc_emptiness"
    }

    fn on_push(&mut self, _state: &S, serial: u32, incoming: AccMark) -> bool {
        self.uf.makeset(serial);
        self.roots.push(Root {
            serial,
            ingoing: incoming,
            acc: AccMark::empty(),
        });
        true
    }

    fn on_pop(&mut self, _state: &S, serial: u32, _is_initial: bool, _parent: Option<(&S, u32)>) -> bool {
        if self.roots.last().map(|r| r.serial) == Some(serial) {
            self.roots.pop();
            self.uf.markdead(serial);
        }
        true
    }

    fn on_update(&mut self, _src: &S, _src_serial: u32, _dst: &S, dst_serial: u32, mark: AccMark) -> bool {
        if self.uf.isdead(dst_serial) {
            return false;
        }
        // Live destination: it is on the stack, so the edge closes a cycle.
        let mut acc = mark;
        while let Some(top) = self.roots.last().copied() {
            if self.uf.sameset(dst_serial, top.serial) || self.roots.len() == 1 {
                break;
            }
            self.roots.pop();
            acc |= top.acc | top.ingoing;
            self.uf.unite(dst_serial, top.serial);
        }
        let Some(top) = self.roots.last_mut() else {
            return false;
        };
        self.uf.unite(dst_serial, top.serial);
        top.acc |= acc;
        if self.acceptance.accepting(top.acc) {
            self.found = true;
        }
        self.found
    }

    fn counterexample_found(&self) -> bool {
        self.found
    }

    fn same_component(&mut self, a: u32, b: u32) -> bool {
        self.uf.contains(a) && self.uf.contains(b) && self.uf.sameset(a, b)
    }

    fn acceptance(&self) -> &Acceptance {
        &self.acceptance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::AcceptanceShape;

    #[test]
    fn test_rejects_non_buchi_shapes() {
        for shape in [
            AcceptanceShape::Rabin { pairs: 1 },
            AcceptanceShape::Streett { pairs: 2 },
            AcceptanceShape::Parity { colors: 3 },
            AcceptanceShape::CoBuchi { sets: 1 },
            AcceptanceShape::False,
        ] {
            let err = SccEmptinessCheck::new(&Acceptance::new(shape)).unwrap_err();
            assert!(matches!(err, McError::UnsupportedAcceptance { .. }), "{shape}");
        }
    }

    #[test]
    fn test_marks_fold_into_root() {
        // 0 -a-> 1 -b-> 2 -> 1 with acceptance Inf(0) & Inf(1): the
        // cycle 1 -> 2 -> 1 only carries b.
        let mut check = SccEmptinessCheck::new(&Acceptance::generalized_buchi(2)).unwrap();
        let c: &mut dyn EmptinessCheck<()> = &mut check;
        c.on_push(&(), 0, AccMark::empty());
        c.on_push(&(), 1, AccMark::from_sets(&[0]));
        c.on_push(&(), 2, AccMark::from_sets(&[1]));
        assert!(!c.on_update(&(), 2, &(), 1, AccMark::empty()));
        // A back edge 2 -> 0 with mark a closes the accepting cycle.
        assert!(c.on_update(&(), 2, &(), 0, AccMark::from_sets(&[0])));
        assert!(c.counterexample_found());
        assert!(c.same_component(0, 2));
    }
}
