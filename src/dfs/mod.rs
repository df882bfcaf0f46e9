//! Per-worker depth-first explorers.
//!
//! Every explorer owns its DFS stack and successor cursors and coordinates
//! with the other workers only through shared structures (state store,
//! union-find, Bloom filter, frontier queue) and a shared stop flag polled
//! once per loop iteration. On stop, explorers hand every open cursor back
//! to the system and report partial statistics.

mod deadlock;
mod deadlock_bitstate;
mod livelock;
mod reachability;
mod scc;

pub use deadlock::DeadlockExplorer;
pub use deadlock_bitstate::{DeadlockBitstateExplorer, OpenTable};
pub use livelock::{LivelockExplorer, LivelockShared};
pub use reachability::{reachable_bitstate, reachable_exact};
pub use scc::{
    CondDestStrategy, CondSourceStrategy, EmptinessStrategy, Flow, PlainStrategy, RootEntry, SccExplorer,
    SccStrategy, TerminalStrategy,
};

use crate::error::McResult;
use crate::kripke::KripkeCube;
use crate::report::WorkerStats;

/// A worker built on its own thread, then started once all workers are ready.
pub trait Worker {
    fn run(self) -> McResult<WorkerStats>;
}

/// Return every cursor still held by a stack to the system.
fn release_cursors<K: KripkeCube, F>(sys: &K, tid: usize, frames: &mut Vec<F>, cursor: impl Fn(F) -> K::Cursor) {
    while let Some(frame) = frames.pop() {
        sys.recycle(cursor(frame), tid);
    }
}
