//! Livelock (non-progress cycle) detection.
//!
//! Workers pull start states from a shared frontier queue. From each start
//! state a local DFS follows non-progress transitions only; the targets of
//! progress transitions are pushed to the frontier instead. Reaching a state
//! on the local stack through a non-progress transition closes a cycle
//! without progress: a livelock.
//!
//! A state may be picked from the frontier by several workers before any of
//! them marks it visited. That duplicate work is tolerated.

use super::Worker;
use crate::error::McResult;
use crate::kripke::{KripkeCube, SuccCursor};
use crate::report::{McStatus, WorkerStats};
use crate::store::{worker_bit, StateId, StateStore};
use ahash::AHashSet;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// State shared by all livelock workers of a run.
pub struct LivelockShared<S> {
    store: StateStore<S>,
    frontier: SegQueue<StateId>,
    /// Workers currently holding a frontier state.
    active: AtomicUsize,
}

impl<S: std::hash::Hash + Eq + Clone> LivelockShared<S> {
    pub fn new(store: StateStore<S>) -> Self {
        LivelockShared {
            store,
            frontier: SegQueue::new(),
            active: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    fn is_visited(&self, id: StateId) -> bool {
        self.store.entry(id).claimed_mask() != 0
    }
}

struct Frame<C> {
    id: StateId,
    cursor: C,
}

pub struct LivelockExplorer<'a, K: KripkeCube> {
    sys: &'a K,
    shared: &'a LivelockShared<K::State>,
    tid: usize,
    stop: &'a AtomicBool,
    stack: Vec<Frame<K::Cursor>>,
    on_stack: AHashSet<StateId>,
    stats: WorkerStats,
    livelock: bool,
}

impl<'a, K: KripkeCube> LivelockExplorer<'a, K> {
    pub fn new(sys: &'a K, shared: &'a LivelockShared<K::State>, tid: usize, stop: &'a AtomicBool) -> Self {
        LivelockExplorer {
            sys,
            shared,
            tid,
            stop,
            stack: Vec::with_capacity(256),
            on_stack: AHashSet::new(),
            stats: WorkerStats::new(tid),
            livelock: false,
        }
    }

    fn insert(&mut self, state: &K::State) -> McResult<StateId> {
        let inserted = self.shared.store.insert(state)?;
        if inserted.fresh {
            self.stats.inserted += 1;
        }
        Ok(inserted.id)
    }

    fn push_frontier(&self, id: StateId) {
        let bit = worker_bit(self.tid);
        let entry = self.shared.store.entry(id);
        if entry.frontier.fetch_or(bit, Ordering::AcqRel) & bit == 0 {
            self.shared.frontier.push(id);
        }
    }

    fn remove_frontier(&self, id: StateId) {
        let entry = self.shared.store.entry(id);
        entry.frontier.fetch_and(!worker_bit(self.tid), Ordering::AcqRel);
    }

    fn pick_unvisited(&self) -> Option<StateId> {
        while let Some(id) = self.shared.frontier.pop() {
            if !self.shared.is_visited(id) {
                return Some(id);
            }
        }
        None
    }

    fn open(&mut self, id: StateId) {
        let cursor = self.sys.succ(self.shared.store.state(id), self.tid, None);
        self.stack.push(Frame { id, cursor });
        self.on_stack.insert(id);
        self.stats.states += 1;
        self.stats.observe_depth(self.stack.len());
    }

    /// Local DFS over non-progress transitions. Returns true on livelock.
    fn dfs(&mut self, start: StateId) -> McResult<bool> {
        self.open(start);
        while let Some(top) = self.stack.last_mut() {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(false);
            }
            if top.cursor.done() {
                if let Some(frame) = self.stack.pop() {
                    self.shared.store.entry(frame.id).claim_for(self.tid);
                    self.on_stack.remove(&frame.id);
                    self.sys.recycle(frame.cursor, self.tid);
                }
                continue;
            }

            let dst = top.cursor.state();
            let progress = top.cursor.is_progress();
            top.cursor.next();
            self.stats.transitions += 1;

            let id = self.insert(&dst)?;
            if !progress && self.on_stack.contains(&id) {
                return Ok(true);
            }
            if self.shared.is_visited(id) {
                continue;
            }
            if progress {
                self.push_frontier(id);
            } else {
                self.open(id);
            }
        }
        Ok(false)
    }

    fn unwind(&mut self) {
        while let Some(frame) = self.stack.pop() {
            self.sys.recycle(frame.cursor, self.tid);
        }
        self.on_stack.clear();
    }

    fn explore(&mut self) -> McResult<()> {
        let initial = self.sys.initial(self.tid);
        let id = self.insert(&initial)?;
        self.push_frontier(id);

        let shared = self.shared;
        while !self.stop.load(Ordering::Relaxed) {
            shared.active.fetch_add(1, Ordering::SeqCst);
            let Some(start) = self.pick_unvisited() else {
                shared.active.fetch_sub(1, Ordering::SeqCst);
                // Quiescent once nobody holds a frontier state and the
                // queue is empty; the order of the two reads matters.
                if shared.active.load(Ordering::SeqCst) == 0 && shared.frontier.is_empty() {
                    break;
                }
                std::thread::yield_now();
                continue;
            };

            let found = self.dfs(start);
            self.unwind();
            self.remove_frontier(start);
            shared.active.fetch_sub(1, Ordering::SeqCst);
            if found? {
                debug!(tid = self.tid, "livelock found");
                self.livelock = true;
                self.stop.store(true, Ordering::Relaxed);
                break;
            }
        }
        Ok(())
    }
}

impl<'a, K: KripkeCube> Worker for LivelockExplorer<'a, K> {
    fn run(mut self) -> McResult<WorkerStats> {
        let start = Instant::now();
        let result = self.explore();
        self.unwind();
        if let Err(e) = result {
            self.stop.store(true, Ordering::Relaxed);
            return Err(e);
        }
        self.stats.walltime_ms = start.elapsed().as_millis() as u64;
        self.stats.status = if self.livelock {
            McStatus::Livelock
        } else if self.stop.load(Ordering::Relaxed) {
            McStatus::Interrupted
        } else {
            McStatus::NoLivelock
        };
        info!(
            tid = self.tid,
            states = self.stats.states,
            status = self.stats.status.name(),
            "livelock worker finished"
        );
        Ok(self.stats)
    }
}
