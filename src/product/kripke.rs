//! Synchronous product of a system with a property automaton, exposed as a
//! transition system of its own so that every explorer can walk it.

use crate::automaton::{AccMark, Automaton, Cube};
use crate::kripke::{KripkeCube, SuccCursor};

/// Product state: system state paired with an automaton state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductState<S> {
    pub sys: S,
    pub prop: u32,
}

pub struct ProductKripke<'a, K, A> {
    sys: &'a K,
    twa: &'a A,
}

impl<'a, K: KripkeCube, A: Automaton> ProductKripke<'a, K, A> {
    pub fn new(sys: &'a K, twa: &'a A) -> Self {
        ProductKripke { sys, twa }
    }

    pub fn system(&self) -> &'a K {
        self.sys
    }

    pub fn automaton(&self) -> &'a A {
        self.twa
    }
}

/// Walks system successors in the outer loop and the automaton edges whose
/// guard is compatible with the source label in the inner loop.
pub struct ProductCursor<C> {
    inner: C,
    /// Automaton edges enabled under the source label: (destination, mark).
    edges: Vec<(u32, AccMark)>,
    pos: usize,
}

impl<S, C: SuccCursor<S>> SuccCursor<ProductState<S>> for ProductCursor<C> {
    fn done(&self) -> bool {
        self.edges.is_empty() || self.inner.done()
    }

    fn state(&self) -> ProductState<S> {
        ProductState {
            sys: self.inner.state(),
            prop: self.edges[self.pos].0,
        }
    }

    fn next(&mut self) {
        self.pos += 1;
        if self.pos >= self.edges.len() {
            self.pos = 0;
            self.inner.next();
        }
    }

    fn condition(&self) -> Cube {
        self.inner.condition()
    }

    fn acc(&self) -> AccMark {
        self.edges.get(self.pos).map(|e| e.1).unwrap_or_default()
    }

    fn is_progress(&self) -> bool {
        self.inner.is_progress()
    }

    fn reduced(&self) -> Option<Vec<bool>> {
        self.inner.reduced()
    }

    fn enabled(&self) -> usize {
        self.inner.enabled()
    }

    fn naturally_expanded(&self) -> bool {
        self.inner.naturally_expanded()
    }

    fn fire_all(&mut self) {
        self.inner.fire_all();
    }
}

impl<'a, K: KripkeCube, A: Automaton> KripkeCube for ProductKripke<'a, K, A> {
    type State = ProductState<K::State>;
    type Cursor = ProductCursor<K::Cursor>;

    fn initial(&self, tid: usize) -> Self::State {
        ProductState {
            sys: self.sys.initial(tid),
            prop: self.twa.initial(),
        }
    }

    fn succ(&self, state: &Self::State, tid: usize, reduction: Option<&[bool]>) -> Self::Cursor {
        let inner = self.sys.succ(&state.sys, tid, reduction);
        let label = inner.condition();
        let edges = self
            .twa
            .succ(state.prop)
            .iter()
            .filter(|t| t.guard.intersects(&label))
            .map(|t| (t.dst, t.mark))
            .collect();
        ProductCursor {
            inner,
            edges,
            pos: 0,
        }
    }

    fn recycle(&self, cursor: Self::Cursor, tid: usize) {
        self.sys.recycle(cursor.inner, tid);
    }

    fn state_to_string(&self, state: &Self::State) -> String {
        format!("{}*{}", state.prop, self.sys.state_to_string(&state.sys))
    }

    fn ap(&self) -> Vec<String> {
        self.sys.ap()
    }
}
