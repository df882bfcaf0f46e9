//! Collaborative nested depth-first search for Büchi emptiness.
//!
//! Workers share one state store and two global colors. A state turns blue
//! once some worker finished it in its outer (blue) search, and red once it
//! is known to lie on no accepting cycle. Being on this worker's blue stack
//! (cyan) and on its current red search are per-worker masks.
//!
//! Acceptance is carried by edges: the target of an accepting edge seeds a
//! red search, which reports a counterexample when it reaches a cyan state,
//! or the seed itself through an accepting edge. Before coloring its
//! visited states red, a worker waits until every other state it reached
//! through an accepting edge is red.

use super::{ProductCursor, ProductKripke, ProductState};
use crate::automaton::{AccMark, Acceptance, Automaton};
use crate::dfs::Worker;
use crate::error::{McError, McResult};
use crate::kripke::{KripkeCube, SuccCursor};
use crate::report::{McStatus, WorkerStats};
use crate::store::{StateId, StateStore, BLUE, RED};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

struct BlueFrame<C> {
    id: StateId,
    cursor: C,
    /// Entered through an accepting edge.
    from_accepting: bool,
}

struct RedFrame<C> {
    id: StateId,
    cursor: C,
}

type Cursor<K> = ProductCursor<<K as KripkeCube>::Cursor>;

pub struct CndfsExplorer<'a, K: KripkeCube, A: Automaton> {
    product: ProductKripke<'a, K, A>,
    store: &'a StateStore<ProductState<K::State>>,
    tid: usize,
    stop: &'a AtomicBool,
    /// Zero acceptance sets: every cycle is accepting.
    every_edge_accepting: bool,
    blue: Vec<BlueFrame<Cursor<K>>>,
    red: Vec<RedFrame<Cursor<K>>>,
    /// States visited by the current red search.
    red_visited: Vec<StateId>,
    /// Among them, those reached through an accepting edge.
    red_accepting: Vec<StateId>,
    cycle_start: Option<StateId>,
    stats: WorkerStats,
    stopped_here: bool,
    compute_trace: bool,
}

impl<'a, K, A> CndfsExplorer<'a, K, A>
where
    K: KripkeCube,
    A: Automaton,
{
    /// Nested search handles Büchi conditions only: at most one set.
    pub fn supports(acceptance: &Acceptance) -> McResult<()> {
        let shape = acceptance.shape();
        if !shape.is_generalized_buchi() || acceptance.num_sets() > 1 {
            return Err(McError::UnsupportedAcceptance {
                strategy: "cndfs",
                shape,
            });
        }
        Ok(())
    }

    pub fn new(
        sys: &'a K,
        twa: &'a A,
        store: &'a StateStore<ProductState<K::State>>,
        tid: usize,
        stop: &'a AtomicBool,
    ) -> Self {
        CndfsExplorer {
            product: ProductKripke::new(sys, twa),
            store,
            tid,
            stop,
            every_edge_accepting: twa.acceptance().num_sets() == 0,
            blue: Vec::with_capacity(1024),
            red: Vec::with_capacity(256),
            red_visited: Vec::new(),
            red_accepting: Vec::new(),
            cycle_start: None,
            stats: WorkerStats::new(tid),
            stopped_here: false,
            compute_trace: false,
        }
    }

    pub fn with_trace(mut self, compute_trace: bool) -> Self {
        self.compute_trace = compute_trace;
        self
    }

    fn is_accepting(&self, mark: AccMark) -> bool {
        self.every_edge_accepting || !mark.is_empty()
    }

    fn insert(&mut self, state: &ProductState<K::State>) -> McResult<StateId> {
        let inserted = self.store.insert(state)?;
        if inserted.fresh {
            self.stats.inserted += 1;
        }
        Ok(inserted.id)
    }

    /// Open `state` in the blue search unless it is blue or already cyan.
    fn push_blue(&mut self, state: ProductState<K::State>, from_accepting: bool) -> McResult<(StateId, bool)> {
        let id = self.insert(&state)?;
        let entry = self.store.entry(id);
        if entry.is_blue() || entry.is_onstack(self.tid) {
            return Ok((id, false));
        }
        entry.set_onstack(self.tid);
        let cursor = self.product.succ(&state, self.tid, None);
        self.blue.push(BlueFrame {
            id,
            cursor,
            from_accepting,
        });
        self.stats.states += 1;
        self.stats.observe_depth(self.blue.len());
        Ok((id, true))
    }

    fn push_red(&mut self, id: StateId) {
        let entry = self.store.entry(id);
        entry.set_red_path(self.tid);
        self.red_visited.push(id);
        let cursor = self.product.succ(entry.state(), self.tid, None);
        self.red.push(RedFrame { id, cursor });
    }

    fn release_red(&mut self) {
        while let Some(frame) = self.red.pop() {
            self.product.recycle(frame.cursor, self.tid);
        }
    }

    /// Red search from `seed`. Returns true on a counterexample, leaving
    /// the red stack in place for the trace.
    fn red_search(&mut self, seed: StateId) -> McResult<bool> {
        self.red_visited.clear();
        self.red_accepting.clear();
        let seed_entry = self.store.entry(seed);
        if seed_entry.is_red() || seed_entry.on_red_path(self.tid) {
            return Ok(false);
        }
        self.push_red(seed);

        while let Some(top) = self.red.last_mut() {
            if self.stop.load(Ordering::Relaxed) {
                self.release_red();
                return Ok(false);
            }
            if top.cursor.done() {
                if let Some(frame) = self.red.pop() {
                    self.product.recycle(frame.cursor, self.tid);
                }
                continue;
            }
            let dst = top.cursor.state();
            let mark = top.cursor.acc();
            top.cursor.next();
            self.stats.transitions += 1;
            let accepting = self.is_accepting(mark);

            let id = self.insert(&dst)?;
            let entry = self.store.entry(id);
            if id == seed {
                if accepting {
                    self.cycle_start = Some(id);
                    return Ok(true);
                }
                continue;
            }
            if entry.is_onstack(self.tid) {
                self.cycle_start = Some(id);
                return Ok(true);
            }
            if entry.is_red() {
                continue;
            }
            if entry.on_red_path(self.tid) {
                if accepting {
                    self.red_accepting.push(id);
                }
                continue;
            }
            if accepting {
                self.red_accepting.push(id);
            }
            self.push_red(id);
        }
        Ok(false)
    }

    /// Wait for the other accepting targets to turn red, then color every
    /// state of the red search red.
    fn post_red(&mut self, seed: StateId) {
        for &s in &self.red_accepting {
            if s == seed {
                continue;
            }
            while !self.store.entry(s).is_red() {
                if self.stop.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::yield_now();
            }
        }
        let stopped = self.stop.load(Ordering::Relaxed);
        for &s in &self.red_visited {
            let entry = self.store.entry(s);
            if !stopped {
                entry.set_color(RED);
            }
            entry.clear_red_path(self.tid);
        }
    }

    /// Red search plus coloring. Returns true on a counterexample.
    fn nested(&mut self, seed: StateId) -> McResult<bool> {
        if self.red_search(seed)? {
            return Ok(true);
        }
        self.post_red(seed);
        Ok(false)
    }

    fn explore(&mut self) -> McResult<()> {
        let initial = self.product.initial(self.tid);
        self.push_blue(initial, false)?;

        while !self.stop.load(Ordering::Relaxed) {
            let Some(top) = self.blue.last_mut() else {
                break;
            };
            if top.cursor.done() {
                let (id, from_accepting) = (top.id, top.from_accepting);
                self.store.entry(id).set_color(BLUE);
                if from_accepting && self.nested(id)? {
                    self.stop_here();
                    break;
                }
                if let Some(frame) = self.blue.pop() {
                    self.store.entry(frame.id).clear_onstack(self.tid);
                    self.product.recycle(frame.cursor, self.tid);
                }
                continue;
            }

            let dst = top.cursor.state();
            let mark = top.cursor.acc();
            top.cursor.next();
            self.stats.transitions += 1;
            let accepting = self.is_accepting(mark);

            let (id, pushed) = self.push_blue(dst, accepting)?;
            if pushed || !accepting {
                continue;
            }
            if self.store.entry(id).is_onstack(self.tid) {
                self.cycle_start = Some(id);
                self.stop_here();
                break;
            }
            if self.nested(id)? {
                self.stop_here();
                break;
            }
        }
        Ok(())
    }

    fn stop_here(&mut self) {
        debug!(tid = self.tid, "accepting cycle closed");
        self.stopped_here = true;
        self.stats.trace = self.trace();
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Blue stack up to the cycle start as prefix; the rest of the blue
    /// stack, the red stack and the cycle start again as cycle.
    fn trace(&self) -> Option<String> {
        if !self.compute_trace {
            return None;
        }
        let start = self.cycle_start?;
        let name = |id: StateId| self.product.state_to_string(self.store.state(id));
        let split = self.blue.iter().position(|f| f.id == start).unwrap_or(self.blue.len());
        let mut out = String::from("Prefix:\n");
        for frame in &self.blue[..split] {
            out.push_str(&format!("  {}\n", name(frame.id)));
        }
        out.push_str("Cycle:\n");
        for frame in &self.blue[split..] {
            out.push_str(&format!("  {}\n", name(frame.id)));
        }
        // A red search seeded at the blue top starts with that same state.
        let skip = match (self.red.first(), self.blue.last()) {
            (Some(r), Some(b)) if r.id == b.id => 1,
            _ => 0,
        };
        for frame in self.red.iter().skip(skip) {
            out.push_str(&format!("  {}\n", name(frame.id)));
        }
        out.push_str(&format!("  {}\n", name(start)));
        Some(out)
    }
}

impl<'a, K, A> Worker for CndfsExplorer<'a, K, A>
where
    K: KripkeCube,
    A: Automaton,
{
    fn run(mut self) -> McResult<WorkerStats> {
        let start = Instant::now();
        let result = self.explore();
        let completed = self.blue.is_empty();
        self.release_red();
        while let Some(frame) = self.blue.pop() {
            self.store.entry(frame.id).clear_onstack(self.tid);
            self.product.recycle(frame.cursor, self.tid);
        }
        if let Err(e) = result {
            self.stop.store(true, Ordering::Relaxed);
            return Err(e);
        }

        self.stats.walltime_ms = start.elapsed().as_millis() as u64;
        self.stats.status = if self.stopped_here {
            McStatus::NotEmpty
        } else if completed {
            McStatus::Empty
        } else {
            McStatus::Interrupted
        };
        info!(
            tid = self.tid,
            states = self.stats.states,
            transitions = self.stats.transitions,
            status = self.stats.status.name(),
            "cndfs worker finished"
        );
        Ok(self.stats)
    }
}
