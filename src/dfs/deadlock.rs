//! Swarmed deadlock detection.
//!
//! A state is open for a worker while it sits on that worker's stack and is
//! closed (dead in the store) once any worker has exhausted its successors.
//! Pushing a closed state, or one already open for this worker, is refused.
//! A popped frame that produced no transition since its push is a deadlock.

use super::{release_cursors, Worker};
use crate::error::McResult;
use crate::kripke::{KripkeCube, SuccCursor};
use crate::report::{McStatus, WorkerStats};
use crate::store::{ClaimStatus, StateId, StateStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

struct Frame<C> {
    id: StateId,
    cursor: C,
    /// Transition counter when the frame was pushed.
    transitions_at_push: u64,
}

pub struct DeadlockExplorer<'a, K: KripkeCube> {
    sys: &'a K,
    store: &'a StateStore<K::State>,
    tid: usize,
    stop: &'a AtomicBool,
    todo: Vec<Frame<K::Cursor>>,
    stats: WorkerStats,
    witness: Option<String>,
}

impl<'a, K: KripkeCube> DeadlockExplorer<'a, K> {
    pub fn new(sys: &'a K, store: &'a StateStore<K::State>, tid: usize, stop: &'a AtomicBool) -> Self {
        DeadlockExplorer {
            sys,
            store,
            tid,
            stop,
            todo: Vec::with_capacity(1024),
            stats: WorkerStats::new(tid),
            witness: None,
        }
    }

    fn push(&mut self, state: &K::State) -> McResult<()> {
        let (status, inserted) = self.store.claim(state, self.tid)?;
        if inserted.fresh {
            self.stats.inserted += 1;
        }
        if status != ClaimStatus::New {
            return Ok(());
        }
        let cursor = self.sys.succ(state, self.tid, None);
        self.todo.push(Frame {
            id: inserted.id,
            cursor,
            transitions_at_push: self.stats.transitions,
        });
        self.stats.states += 1;
        self.stats.observe_depth(self.todo.len());
        Ok(())
    }

    fn explore(&mut self) -> McResult<()> {
        let initial = self.sys.initial(self.tid);
        self.push(&initial)?;

        while !self.stop.load(Ordering::Relaxed) {
            let Some(top) = self.todo.last_mut() else {
                break;
            };
            if !top.cursor.done() {
                let dst = top.cursor.state();
                top.cursor.next();
                self.stats.transitions += 1;
                self.push(&dst)?;
                continue;
            }

            let Some(frame) = self.todo.pop() else {
                break;
            };
            let deadlock = frame.transitions_at_push == self.stats.transitions;
            self.store.mark_dead(frame.id);
            self.sys.recycle(frame.cursor, self.tid);
            if deadlock {
                let witness = self.sys.state_to_string(self.store.state(frame.id));
                debug!(tid = self.tid, witness = %witness, "deadlock found");
                self.witness = Some(witness);
                self.stop.store(true, Ordering::Relaxed);
                break;
            }
        }
        Ok(())
    }
}

impl<'a, K: KripkeCube> Worker for DeadlockExplorer<'a, K> {
    fn run(mut self) -> McResult<WorkerStats> {
        let start = Instant::now();
        let result = self.explore();
        let completed = self.todo.is_empty();
        release_cursors(self.sys, self.tid, &mut self.todo, |f| f.cursor);
        if let Err(e) = result {
            self.stop.store(true, Ordering::Relaxed);
            return Err(e);
        }

        self.stats.walltime_ms = start.elapsed().as_millis() as u64;
        self.stats.status = match (&self.witness, completed) {
            (Some(_), _) => McStatus::Deadlock,
            (None, true) => {
                // A worker that exhausted its stack has covered every state
                // not already closed by someone else: nobody else needs to go on.
                self.stop.store(true, Ordering::Relaxed);
                McStatus::NoDeadlock
            }
            (None, false) => McStatus::Interrupted,
        };
        self.stats.trace = self.witness.take();
        info!(
            tid = self.tid,
            states = self.stats.states,
            transitions = self.stats.transitions,
            status = self.stats.status.name(),
            "deadlock worker finished"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kripke::ExplicitKripke;

    fn run_single(sys: &ExplicitKripke) -> WorkerStats {
        let store = StateStore::new();
        let stop = AtomicBool::new(false);
        DeadlockExplorer::new(sys, &store, 0, &stop).run().unwrap()
    }

    #[test]
    fn test_self_loop_is_not_deadlock() {
        let sys = ExplicitKripke::from_edges(2, &[(0, 1), (1, 1)]);
        let stats = run_single(&sys);
        assert_eq!(stats.status, McStatus::NoDeadlock);
        assert_eq!(stats.states, 2);
        assert_eq!(stats.transitions, 2);
    }

    #[test]
    fn test_single_sink_is_deadlock() {
        let sys = ExplicitKripke::from_edges(1, &[]);
        let stats = run_single(&sys);
        assert_eq!(stats.status, McStatus::Deadlock);
        assert_eq!(stats.trace.as_deref(), Some("s0"));
    }

    #[test]
    fn test_deep_sink_reported() {
        let sys = ExplicitKripke::from_edges(4, &[(0, 1), (1, 0), (1, 2), (2, 3)]);
        let stats = run_single(&sys);
        assert_eq!(stats.status, McStatus::Deadlock);
        assert_eq!(stats.trace.as_deref(), Some("s3"));
    }

    #[test]
    fn test_stop_flag_interrupts() {
        let sys = ExplicitKripke::from_edges(2, &[(0, 1), (1, 0)]);
        let store = StateStore::new();
        let stop = AtomicBool::new(true);
        let stats = DeadlockExplorer::new(&sys, &store, 0, &stop).run().unwrap();
        assert_eq!(stats.status, McStatus::Interrupted);
    }

    #[test]
    fn test_memory_limit_is_reported() {
        let sys = ExplicitKripke::from_edges(3, &[(0, 1), (1, 2), (2, 0)]);
        let store = StateStore::with_limit(Some(2));
        let stop = AtomicBool::new(false);
        let result = DeadlockExplorer::new(&sys, &store, 0, &stop).run();
        assert!(matches!(result, Err(crate::error::McError::MemoryExhausted { .. })));
        assert!(stop.load(Ordering::Relaxed));
    }
}
