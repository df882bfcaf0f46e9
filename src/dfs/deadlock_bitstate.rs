//! Deadlock detection with bounded memory.
//!
//! Only states currently on some worker's stack are stored exactly (with the
//! mask of workers having them open). Closed states go to a shared Bloom
//! filter and leave the exact table once no worker has them open. A Bloom
//! false positive prunes an unexplored state, so "no deadlock" is not a
//! proof in this mode.

use super::{release_cursors, Worker};
use crate::bloom::{state_hash, BloomFilter};
use crate::error::McResult;
use crate::kripke::{KripkeCube, SuccCursor};
use crate::report::{McStatus, WorkerStats};
use crate::store::worker_bit;
use ahash::{AHashMap, RandomState};
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::info;

const OPEN_SHARDS: usize = 64;

/// Exact table of open states: state -> mask of workers having it open.
pub struct OpenTable<S> {
    shards: Box<[Mutex<AHashMap<S, u64>>]>,
    hasher: RandomState,
}

impl<S: Hash + Eq + Clone> OpenTable<S> {
    pub fn new() -> Self {
        OpenTable {
            shards: (0..OPEN_SHARDS).map(|_| Mutex::new(AHashMap::new())).collect(),
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, state: &S) -> &Mutex<AHashMap<S, u64>> {
        &self.shards[(self.hasher.hash_one(state) as usize) % OPEN_SHARDS]
    }

    /// Open `state` for `tid`. Returns `None` if it is already open for
    /// this worker, otherwise whether the state entered the table.
    pub fn open(&self, state: &S, tid: usize) -> Option<bool> {
        let bit = worker_bit(tid);
        let mut map = self.shard(state).lock();
        match map.get_mut(state) {
            Some(mask) if *mask & bit != 0 => None,
            Some(mask) => {
                *mask |= bit;
                Some(false)
            }
            None => {
                map.insert(state.clone(), bit);
                Some(true)
            }
        }
    }

    /// Close `state` for `tid`, dropping it once no worker has it open.
    pub fn close(&self, state: &S, tid: usize) {
        let mut map = self.shard(state).lock();
        if let Some(mask) = map.get_mut(state) {
            *mask &= !worker_bit(tid);
            if *mask == 0 {
                map.remove(state);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Hash + Eq + Clone> Default for OpenTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

struct Frame<S, C> {
    state: S,
    hash: u64,
    cursor: C,
    transitions_at_push: u64,
}

pub struct DeadlockBitstateExplorer<'a, K: KripkeCube> {
    sys: &'a K,
    open: &'a OpenTable<K::State>,
    closed: &'a BloomFilter,
    tid: usize,
    stop: &'a AtomicBool,
    todo: Vec<Frame<K::State, K::Cursor>>,
    stats: WorkerStats,
    witness: Option<String>,
}

impl<'a, K: KripkeCube> DeadlockBitstateExplorer<'a, K> {
    pub fn new(
        sys: &'a K,
        open: &'a OpenTable<K::State>,
        closed: &'a BloomFilter,
        tid: usize,
        stop: &'a AtomicBool,
    ) -> Self {
        DeadlockBitstateExplorer {
            sys,
            open,
            closed,
            tid,
            stop,
            todo: Vec::with_capacity(1024),
            stats: WorkerStats::new(tid),
            witness: None,
        }
    }

    fn push(&mut self, state: K::State) {
        let hash = state_hash(&state);
        if self.closed.contains(hash) {
            return;
        }
        match self.open.open(&state, self.tid) {
            None => return,
            Some(true) => self.stats.inserted += 1,
            Some(false) => {}
        }
        let cursor = self.sys.succ(&state, self.tid, None);
        self.todo.push(Frame {
            state,
            hash,
            cursor,
            transitions_at_push: self.stats.transitions,
        });
        self.stats.states += 1;
        self.stats.observe_depth(self.todo.len());
    }

    fn explore(&mut self) {
        let initial = self.sys.initial(self.tid);
        self.push(initial);

        while !self.stop.load(Ordering::Relaxed) {
            let Some(top) = self.todo.last_mut() else {
                break;
            };
            if !top.cursor.done() {
                let dst = top.cursor.state();
                top.cursor.next();
                self.stats.transitions += 1;
                self.push(dst);
                continue;
            }

            let Some(frame) = self.todo.pop() else {
                break;
            };
            self.closed.insert(frame.hash);
            self.open.close(&frame.state, self.tid);
            self.sys.recycle(frame.cursor, self.tid);
            if frame.transitions_at_push == self.stats.transitions {
                self.witness = Some(self.sys.state_to_string(&frame.state));
                self.stop.store(true, Ordering::Relaxed);
                break;
            }
        }
    }
}

impl<'a, K: KripkeCube> Worker for DeadlockBitstateExplorer<'a, K> {
    fn run(mut self) -> McResult<WorkerStats> {
        let start = Instant::now();
        self.explore();
        let completed = self.todo.is_empty();
        for frame in &self.todo {
            self.open.close(&frame.state, self.tid);
        }
        release_cursors(self.sys, self.tid, &mut self.todo, |f| f.cursor);

        self.stats.walltime_ms = start.elapsed().as_millis() as u64;
        self.stats.status = match (&self.witness, completed) {
            (Some(_), _) => McStatus::Deadlock,
            (None, true) => {
                self.stop.store(true, Ordering::Relaxed);
                McStatus::NoDeadlock
            }
            (None, false) => McStatus::Interrupted,
        };
        self.stats.trace = self.witness.take();
        info!(
            tid = self.tid,
            states = self.stats.states,
            status = self.stats.status.name(),
            "deadlock-bitstate worker finished"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kripke::ExplicitKripke;

    fn run_single(sys: &ExplicitKripke) -> (WorkerStats, usize) {
        let open = OpenTable::new();
        let bloom = BloomFilter::new(1 << 16, 3);
        let stop = AtomicBool::new(false);
        let stats = DeadlockBitstateExplorer::new(sys, &open, &bloom, 0, &stop)
            .run()
            .unwrap();
        (stats, open.len())
    }

    #[test]
    fn test_verdicts_match_exact_explorer() {
        let (looping, _) = run_single(&ExplicitKripke::from_edges(2, &[(0, 1), (1, 1)]));
        assert_eq!(looping.status, McStatus::NoDeadlock);
        let (sink, _) = run_single(&ExplicitKripke::from_edges(3, &[(0, 1), (1, 2)]));
        assert_eq!(sink.status, McStatus::Deadlock);
        assert_eq!(sink.trace.as_deref(), Some("s2"));
    }

    #[test]
    fn test_open_table_drains() {
        let (stats, open_left) = run_single(&ExplicitKripke::from_edges(
            4,
            &[(0, 1), (1, 2), (2, 3), (3, 0), (1, 3)],
        ));
        assert_eq!(stats.status, McStatus::NoDeadlock);
        assert_eq!(stats.states, 4);
        assert_eq!(open_left, 0);
    }

    #[test]
    fn test_open_table_masks() {
        let table: OpenTable<u32> = OpenTable::new();
        assert_eq!(table.open(&1, 0), Some(true));
        assert_eq!(table.open(&1, 0), None);
        assert_eq!(table.open(&1, 1), Some(false));
        table.close(&1, 0);
        assert_eq!(table.len(), 1);
        table.close(&1, 1);
        assert!(table.is_empty());
    }
}
