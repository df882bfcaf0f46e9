//! Sequential reachability counts, exact and with bitstate hashing.
//! The bitstate count is a lower bound: a collision hides a state.

use crate::bloom::{state_hash, BitstateTable};
use crate::kripke::{KripkeCube, SuccCursor};
use crate::report::{McStatus, WorkerStats};
use ahash::AHashSet;
use std::time::Instant;

fn explore<K: KripkeCube>(sys: &K, tid: usize, mut seen: impl FnMut(&K::State) -> bool) -> WorkerStats {
    let start = Instant::now();
    let mut stats = WorkerStats::new(tid);
    let initial = sys.initial(tid);
    seen(&initial);
    stats.states = 1;
    let mut todo = vec![initial];

    while let Some(current) = todo.pop() {
        let mut cursor = sys.succ(&current, tid, None);
        while !cursor.done() {
            let next = cursor.state();
            cursor.next();
            stats.transitions += 1;
            if !seen(&next) {
                todo.push(next);
                stats.states += 1;
                stats.observe_depth(todo.len());
            }
        }
        sys.recycle(cursor, tid);
    }

    stats.inserted = stats.states;
    stats.walltime_ms = start.elapsed().as_millis() as u64;
    stats.status = McStatus::Success;
    stats
}

/// Count reachable states with an exact visited set.
pub fn reachable_exact<K: KripkeCube>(sys: &K, tid: usize) -> WorkerStats {
    let mut seen: AHashSet<K::State> = AHashSet::new();
    explore(sys, tid, |s| !seen.insert(s.clone()))
}

/// Count reachable states with a bitstate table of `2^log2_bits` bits.
pub fn reachable_bitstate<K: KripkeCube>(sys: &K, tid: usize, log2_bits: u32) -> WorkerStats {
    let table = BitstateTable::new(log2_bits);
    explore(sys, tid, |s| table.insert(state_hash(s)))
}
