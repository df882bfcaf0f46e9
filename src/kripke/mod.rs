//! System collaborator interface.
//!
//! The engines never look inside a state: they hash it, compare it, clone it
//! and hand it back to the system. Successors are produced lazily through a
//! per-thread cursor which the engines return with [`KripkeCube::recycle`]
//! once exhausted (or when a run is stopped).

mod explicit;
mod pool;
mod swarm;

pub use explicit::{ExplicitCursor, ExplicitKripke, ExplicitKripkeBuilder};
pub use pool::BufferPool;
pub use swarm::{SwarmCursor, SwarmedKripke};

use crate::automaton::{AccMark, Cube};
use std::fmt::Debug;
use std::hash::Hash;

/// Lazy iterator over the successors of one state.
pub trait SuccCursor<S> {
    fn done(&self) -> bool;

    /// Current successor. Only meaningful while `!done()`.
    fn state(&self) -> S;

    fn next(&mut self);

    /// Label of the source state, matched against automaton guards.
    fn condition(&self) -> Cube;

    /// Acceptance mark of the current edge (product graphs only).
    fn acc(&self) -> AccMark {
        AccMark::empty()
    }

    /// Whether the current edge is a progress transition.
    fn is_progress(&self) -> bool {
        false
    }

    /// Reduced successor set as a mask over the full successor list, when
    /// the system applies a reduction to this state.
    fn reduced(&self) -> Option<Vec<bool>> {
        None
    }

    /// Number of enabled transitions before reduction.
    fn enabled(&self) -> usize;

    fn naturally_expanded(&self) -> bool {
        true
    }

    /// Extend the iteration to every enabled transition.
    fn fire_all(&mut self) {}
}

/// Implicit transition system.
pub trait KripkeCube: Send + Sync {
    type State: Clone + Eq + Hash + Debug + Send + Sync;
    type Cursor: SuccCursor<Self::State>;

    fn initial(&self, tid: usize) -> Self::State;

    /// Successors of `state` for worker `tid`. A `reduction` hint is a mask
    /// previously obtained from [`SuccCursor::reduced`] for the same state;
    /// when present the system must not recompute it.
    fn succ(&self, state: &Self::State, tid: usize, reduction: Option<&[bool]>) -> Self::Cursor;

    fn recycle(&self, cursor: Self::Cursor, tid: usize) {
        let _ = (cursor, tid);
    }

    fn state_to_string(&self, state: &Self::State) -> String;

    fn ap(&self) -> Vec<String>;
}
