//! Swarmed SCC decomposition over the iterable union-find.
//!
//! Each worker keeps a DFS stack of frames and a root stack. Every frame
//! stands for one set: it repeatedly picks a busy member of its set from
//! the union-find list, walks that member's successors and marks it done.
//! A successor is claimed in the union-find:
//! - `New`: pushed as a new frame and a new root;
//! - `Found` (its set holds a state open on this worker's stack): roots are
//!   popped and united until the top root's set contains the successor;
//! - `Dead`: skipped.
//!
//! A frame pops once its set has no busy member left. The set is then dead,
//! and the worker whose pick killed it counts the component, so every SCC
//! is counted exactly once over all workers. Members explored by other
//! workers keep the set alive until they are done too.
//!
//! Variants plug in through [`SccStrategy`]: plain decomposition, terminal
//! components, the expanded-destination and expanded-source provisos, and
//! emptiness over a product graph.

use super::Worker;
use crate::automaton::{AccMark, Acceptance};
use crate::error::McResult;
use crate::kripke::{KripkeCube, SuccCursor};
use crate::report::{McStatus, WorkerStats};
use crate::store::{ClaimStatus, StateId};
use crate::unionfind::{Pick, SharedUnionFind};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Counterexample found: stop every worker.
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct RootEntry {
    pub id: StateId,
    /// Position of the root's frame in the DFS stack.
    pub index: usize,
    /// Mark of the tree edge that opened the frame.
    pub ingoing: AccMark,
}

/// Hooks of one SCC algorithm family.
pub trait SccStrategy<S> {
    fn name(&self) -> &'static str;

    /// Edge `src -> dst` where `dst`'s set is open on this worker's stack.
    /// Called before folding.
    fn on_found(&mut self, uf: &SharedUnionFind<S>, tid: usize, src: StateId, dst: StateId) {
        let _ = (uf, tid, src, dst);
    }

    /// Edge inside one set, carrying `mark`.
    fn on_cycle_edge(&mut self, uf: &SharedUnionFind<S>, dst: StateId, mark: AccMark) -> Flow {
        let _ = (uf, dst, mark);
        Flow::Continue
    }

    /// `popped` was united into the set of `into`.
    fn on_root_fold(&mut self, uf: &SharedUnionFind<S>, popped: &RootEntry, into: StateId) -> Flow {
        let _ = (uf, popped, into);
        Flow::Continue
    }

    /// Edge from the set of `src` into another set that is already dead.
    fn on_leaving_edge(&mut self, uf: &SharedUnionFind<S>, src: StateId) {
        let _ = (uf, src);
    }

    /// This worker killed the set of `id`.
    fn on_finalized(&mut self, uf: &SharedUnionFind<S>, id: StateId) {
        let _ = (uf, id);
    }

    fn terminal_sccs(&self) -> u64 {
        0
    }
}

// =============================================================================
// Strategies
// =============================================================================

/// Plain decomposition.
#[derive(Debug, Default)]
pub struct PlainStrategy;

impl<S> SccStrategy<S> for PlainStrategy {
    fn name(&self) -> &'static str {
        "scc"
    }
}

/// Counts terminal (bottom) components: no edge leaves them. Leaving
/// edges are recorded on the set before its last member is done, so the
/// finalizer sees every one of them.
#[derive(Debug, Default)]
pub struct TerminalStrategy {
    terminal: u64,
}

impl<S: Hash + Eq + Clone> SccStrategy<S> for TerminalStrategy {
    fn name(&self) -> &'static str {
        "terminal_scc"
    }

    fn on_leaving_edge(&mut self, uf: &SharedUnionFind<S>, src: StateId) {
        uf.mark_leaving(src);
    }

    fn on_finalized(&mut self, uf: &SharedUnionFind<S>, id: StateId) {
        if !uf.leaves(id) {
            self.terminal += 1;
        }
    }

    fn terminal_sccs(&self) -> u64 {
        self.terminal
    }
}

/// Expanded-destination proviso: closing a cycle on this worker's stack from
/// a state that is not fully expanded forces the destination to expand.
#[derive(Debug, Default)]
pub struct CondDestStrategy;

impl<S: Hash + Eq + Clone> SccStrategy<S> for CondDestStrategy {
    fn name(&self) -> &'static str {
        "cond_dest_scc"
    }

    fn on_found(&mut self, uf: &SharedUnionFind<S>, tid: usize, src: StateId, dst: StateId) {
        let store = uf.store();
        let target = store.entry(dst);
        if target.is_onstack(tid) && !store.entry(src).is_expanded() {
            target.set_expanded();
        }
    }
}

/// Expanded-source proviso: the state closing a cycle on this worker's
/// stack expands itself when it is not fully expanded yet.
#[derive(Debug, Default)]
pub struct CondSourceStrategy;

impl<S: Hash + Eq + Clone> SccStrategy<S> for CondSourceStrategy {
    fn name(&self) -> &'static str {
        "cond_source_scc"
    }

    fn on_found(&mut self, uf: &SharedUnionFind<S>, tid: usize, src: StateId, dst: StateId) {
        let store = uf.store();
        let source = store.entry(src);
        if store.entry(dst).is_onstack(tid) && !source.is_expanded() {
            source.set_expanded();
        }
    }
}

/// Emptiness over a product graph: acceptance marks accumulate at set
/// roots; a set whose marks satisfy the acceptance condition contains an
/// accepting cycle.
#[derive(Debug)]
pub struct EmptinessStrategy {
    acceptance: Acceptance,
    found: bool,
}

impl EmptinessStrategy {
    pub fn new(acceptance: Acceptance) -> Self {
        EmptinessStrategy {
            acceptance,
            found: false,
        }
    }

    pub fn counterexample_found(&self) -> bool {
        self.found
    }

    fn check(&mut self, marks: AccMark) -> Flow {
        if self.acceptance.accepting(marks) {
            self.found = true;
            Flow::Stop
        } else {
            Flow::Continue
        }
    }
}

impl<S: Hash + Eq + Clone> SccStrategy<S> for EmptinessStrategy {
    fn name(&self) -> &'static str {
        "swarmed_emptiness"
    }

    fn on_cycle_edge(&mut self, uf: &SharedUnionFind<S>, dst: StateId, mark: AccMark) -> Flow {
        let marks = uf.add_marks(dst, mark);
        self.check(marks)
    }

    fn on_root_fold(&mut self, uf: &SharedUnionFind<S>, popped: &RootEntry, into: StateId) -> Flow {
        let marks = uf.add_marks(into, popped.ingoing);
        self.check(marks)
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Successor walk of one picked member.
struct Work<C> {
    state: StateId,
    cursor: C,
    fired: bool,
}

struct Frame<C> {
    id: StateId,
    work: Option<Work<C>>,
}

pub struct SccExplorer<'a, K: KripkeCube, T> {
    sys: &'a K,
    uf: &'a SharedUnionFind<K::State>,
    tid: usize,
    stop: &'a AtomicBool,
    strategy: T,
    todo: Vec<Frame<K::Cursor>>,
    roots: Vec<RootEntry>,
    stats: WorkerStats,
    stopped_here: bool,
    compute_trace: bool,
}

impl<'a, K, T> SccExplorer<'a, K, T>
where
    K: KripkeCube,
    T: SccStrategy<K::State>,
{
    pub fn new(sys: &'a K, uf: &'a SharedUnionFind<K::State>, tid: usize, stop: &'a AtomicBool, strategy: T) -> Self {
        SccExplorer {
            sys,
            uf,
            tid,
            stop,
            strategy,
            todo: Vec::with_capacity(1024),
            roots: Vec::with_capacity(1024),
            stats: WorkerStats::new(tid),
            stopped_here: false,
            compute_trace: false,
        }
    }

    pub fn with_trace(mut self, compute_trace: bool) -> Self {
        self.compute_trace = compute_trace;
        self
    }

    pub fn strategy(&self) -> &T {
        &self.strategy
    }

    fn push_frame(&mut self, id: StateId, ingoing: AccMark) {
        self.uf.store().entry(id).set_onstack(self.tid);
        self.roots.push(RootEntry {
            id,
            index: self.todo.len(),
            ingoing,
        });
        self.todo.push(Frame { id, work: None });
        self.stats.states += 1;
        self.stats.observe_depth(self.todo.len());
    }

    /// Open the successors of `v`, reusing its cached reduction.
    fn open(&self, v: StateId) -> Work<K::Cursor> {
        let entry = self.uf.store().entry(v);
        let hint = entry.reduced().get();
        let cursor = self.sys.succ(entry.state(), self.tid, hint);
        if hint.is_none() {
            if let Some(mask) = cursor.reduced() {
                entry.reduced().try_publish(mask);
            }
        }
        Work {
            state: v,
            cursor,
            fired: false,
        }
    }

    /// Pop and unite roots until the top root's set contains `w`. Stops
    /// early if `w`'s set died meanwhile and is no longer on the stack.
    fn fold(&mut self, w: StateId) -> Flow {
        while let Some(top) = self.roots.last() {
            if self.uf.same_set(w, top.id) || self.roots.len() < 2 {
                break;
            }
            let Some(popped) = self.roots.pop() else {
                break;
            };
            let Some(into) = self.roots.last().map(|r| r.id) else {
                break;
            };
            self.uf.unite(popped.id, into);
            if self.strategy.on_root_fold(self.uf, &popped, into) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn edge_to_open(&mut self, src: StateId, dst: StateId, mark: AccMark) -> Flow {
        self.strategy.on_found(self.uf, self.tid, src, dst);
        if self.fold(dst) == Flow::Stop {
            return Flow::Stop;
        }
        if self.uf.same_set(src, dst) {
            self.strategy.on_cycle_edge(self.uf, dst, mark)
        } else {
            self.strategy.on_leaving_edge(self.uf, src);
            Flow::Continue
        }
    }

    /// Pop the top frame, whose set just died.
    fn pop_frame(&mut self, finalized: bool) -> Flow {
        let Some(frame) = self.todo.pop() else {
            return Flow::Continue;
        };
        self.uf.store().entry(frame.id).clear_onstack(self.tid);
        if let Some(work) = frame.work {
            self.sys.recycle(work.cursor, self.tid);
        }
        if finalized {
            self.stats.sccs += 1;
            self.strategy.on_finalized(self.uf, frame.id);
        }

        let mut flow = Flow::Continue;
        if self.roots.last().is_some_and(|r| r.index == self.todo.len()) {
            if let Some(root) = self.roots.pop() {
                // Another worker merged this set with the one below: the
                // tree edge into it is a cycle edge after all.
                if let Some(below) = self.roots.last().map(|r| r.id) {
                    if self.uf.same_set(root.id, below) {
                        flow = self.strategy.on_root_fold(self.uf, &root, below);
                    }
                }
            }
        }
        if let Some(parent) = self.todo.last().and_then(|f| f.work.as_ref()).map(|w| w.state) {
            if !self.uf.same_set(parent, frame.id) {
                self.strategy.on_leaving_edge(self.uf, parent);
            }
        }
        flow
    }

    fn explore(&mut self) -> McResult<()> {
        let initial = self.sys.initial(self.tid);
        let claim = self.uf.claim(&initial, self.tid)?;
        if claim.fresh {
            self.stats.inserted += 1;
        }
        if claim.status != ClaimStatus::New {
            return Ok(());
        }
        self.push_frame(claim.id, AccMark::empty());

        while !self.stop.load(Ordering::Relaxed) {
            let Some(frame) = self.todo.last() else {
                break;
            };
            let id = frame.id;
            if frame.work.is_none() {
                match self.uf.pick_from_list(id) {
                    Pick::Busy(v) => {
                        let work = self.open(v);
                        if let Some(top) = self.todo.last_mut() {
                            top.work = Some(work);
                        }
                    }
                    Pick::Done { finalized } => {
                        if self.pop_frame(finalized) == Flow::Stop {
                            self.stop_here(id);
                            break;
                        }
                    }
                }
                continue;
            }

            let Some(work) = self.todo.last_mut().and_then(|f| f.work.as_mut()) else {
                continue;
            };
            let entry = self.uf.store().entry(work.state);
            if entry.is_expanded() {
                if !work.fired {
                    work.cursor.fire_all();
                    work.fired = true;
                }
            } else if work.cursor.naturally_expanded() {
                entry.set_expanded();
            }

            if work.cursor.done() {
                let src = work.state;
                if let Some(done) = self.todo.last_mut().and_then(|f| f.work.take()) {
                    self.sys.recycle(done.cursor, self.tid);
                }
                self.uf.remove_from_list(src);
                continue;
            }

            let src = work.state;
            let dst = work.cursor.state();
            let mark = work.cursor.acc();
            work.cursor.next();
            self.stats.transitions += 1;

            let claim = self.uf.claim(&dst, self.tid)?;
            if claim.fresh {
                self.stats.inserted += 1;
            }
            let flow = match claim.status {
                ClaimStatus::New => {
                    self.push_frame(claim.id, mark);
                    Flow::Continue
                }
                ClaimStatus::Found => self.edge_to_open(src, claim.id, mark),
                ClaimStatus::Dead => {
                    if !self.uf.same_set(src, claim.id) {
                        self.strategy.on_leaving_edge(self.uf, src);
                    }
                    Flow::Continue
                }
            };
            if flow == Flow::Stop {
                self.stop_here(claim.id);
                break;
            }
        }
        Ok(())
    }

    fn stop_here(&mut self, closing: StateId) {
        self.stopped_here = true;
        self.stats.trace = self.trace(closing);
        self.stop.store(true, Ordering::Relaxed);
    }

    /// DFS stack as prefix, then the state closing the accepting cycle.
    fn trace(&self, closing: StateId) -> Option<String> {
        if !self.compute_trace {
            return None;
        }
        let store = self.uf.store();
        let mut out = String::from("Prefix:\n");
        for frame in &self.todo {
            out.push_str("  ");
            out.push_str(&self.sys.state_to_string(store.state(frame.id)));
            out.push('\n');
        }
        out.push_str("Cycle:\n  ");
        out.push_str(&self.sys.state_to_string(store.state(closing)));
        out.push('\n');
        Some(out)
    }
}

impl<'a, K, T> Worker for SccExplorer<'a, K, T>
where
    K: KripkeCube,
    T: SccStrategy<K::State>,
{
    fn run(mut self) -> McResult<WorkerStats> {
        let start = Instant::now();
        let result = self.explore();
        let completed = self.todo.is_empty();
        let store = self.uf.store();
        while let Some(frame) = self.todo.pop() {
            store.entry(frame.id).clear_onstack(self.tid);
            if let Some(work) = frame.work {
                self.sys.recycle(work.cursor, self.tid);
            }
        }
        self.roots.clear();
        if let Err(e) = result {
            self.stop.store(true, Ordering::Relaxed);
            return Err(e);
        }

        self.stats.walltime_ms = start.elapsed().as_millis() as u64;
        self.stats.terminal_sccs = self.strategy.terminal_sccs();
        self.stats.status = if self.stopped_here {
            McStatus::NotEmpty
        } else if completed {
            McStatus::Success
        } else {
            McStatus::Interrupted
        };
        debug!(tid = self.tid, sccs = self.stats.sccs, "components finalized");
        info!(
            tid = self.tid,
            algorithm = self.strategy.name(),
            states = self.stats.states,
            transitions = self.stats.transitions,
            status = self.stats.status.name(),
            "scc worker finished"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::run_workers;
    use crate::kripke::{ExplicitKripke, SwarmedKripke};
    use crate::store::StateStore;

    fn run_with<T: SccStrategy<u32>>(sys: &ExplicitKripke, strategy: T) -> WorkerStats {
        let uf = SharedUnionFind::new(StateStore::new());
        let stop = AtomicBool::new(false);
        SccExplorer::new(sys, &uf, 0, &stop, strategy).run().unwrap()
    }

    /// Total components and terminal components over `workers` swarmed workers.
    fn run_parallel<T, F>(sys: &ExplicitKripke, workers: usize, seed: u64, make: F) -> (u64, u64)
    where
        T: SccStrategy<u32>,
        F: Fn() -> T + Sync,
    {
        let swarmed = SwarmedKripke::new(sys, seed);
        let uf = SharedUnionFind::new(StateStore::new());
        let stop = AtomicBool::new(false);
        let stats = run_workers(workers, |tid| SccExplorer::new(&swarmed, &uf, tid, &stop, make())).unwrap();
        (
            stats.iter().map(|s| s.sccs).sum(),
            stats.iter().map(|s| s.terminal_sccs).sum(),
        )
    }

    /// 0 -> 1 -> 2 -> 3 -> 1, 3 -> 4 -> 5: one 3-state SCC and three trivial ones.
    fn six_states() -> ExplicitKripke {
        ExplicitKripke::from_edges(6, &[(0, 1), (1, 2), (2, 3), (3, 1), (3, 4), (4, 5)])
    }

    /// `rings` rings of `size` states, ring k feeding ring k+1 through a
    /// one-way edge, with a chord inside every ring.
    fn ring_chain(rings: u32, size: u32) -> ExplicitKripke {
        let mut edges = Vec::new();
        for k in 0..rings {
            let base = k * size;
            for i in 0..size {
                edges.push((base + i, base + (i + 1) % size));
            }
            edges.push((base, base + size / 2));
            if k + 1 < rings {
                edges.push((base + size / 3, base + size + size / 4));
            }
        }
        ExplicitKripke::from_edges(rings * size, &edges)
    }

    #[test]
    fn test_six_state_graph_has_four_sccs() {
        let stats = run_with(&six_states(), PlainStrategy);
        assert_eq!(stats.sccs, 4);
        assert_eq!(stats.states, 6);
        assert_eq!(stats.status, McStatus::Success);
    }

    #[test]
    fn test_nested_cycles_fold_into_one() {
        let sys = ExplicitKripke::from_edges(4, &[(0, 1), (1, 2), (2, 0), (2, 3), (3, 1)]);
        let stats = run_with(&sys, PlainStrategy);
        assert_eq!(stats.sccs, 1);
    }

    #[test]
    fn test_terminal_components() {
        // {1,2,3} leads to {4}; {5} is reached from 4; only {5} is terminal.
        let stats = run_with(&six_states(), TerminalStrategy::default());
        assert_eq!(stats.sccs, 4);
        assert_eq!(stats.terminal_sccs, 1);

        // Two sinks reached from the initial state.
        let sys = ExplicitKripke::from_edges(3, &[(0, 1), (0, 2)]);
        let stats = run_with(&sys, TerminalStrategy::default());
        assert_eq!(stats.terminal_sccs, 2);
    }

    #[test]
    fn test_parallel_workers_count_each_component_once() {
        // 40 rings of 25 states: 40 components, the last one terminal.
        let sys = ring_chain(40, 25);
        for seed in 0..20 {
            for workers in [2, 8] {
                let (sccs, terminal) = run_parallel(&sys, workers, seed, TerminalStrategy::default);
                assert_eq!(sccs, 40, "seed={} workers={}", seed, workers);
                assert_eq!(terminal, 1, "seed={} workers={}", seed, workers);
            }
        }
    }

    #[test]
    fn test_parallel_workers_on_one_big_component() {
        // Every ring also points back to the first one: a single component.
        let mut edges: Vec<(u32, u32)> = (0..600).map(|s| (s, (s + 1) % 600)).collect();
        edges.extend((0..600).step_by(7).map(|s| (s, (s * 13 + 5) % 600)));
        let sys = ExplicitKripke::from_edges(600, &edges);
        for seed in 0..10 {
            let (sccs, terminal) = run_parallel(&sys, 8, seed, TerminalStrategy::default);
            assert_eq!((sccs, terminal), (1, 1), "seed={}", seed);
        }
    }

    #[test]
    fn test_cond_dest_caches_reductions_once() {
        let mut b = ExplicitKripke::builder(Vec::new());
        for _ in 0..4 {
            b.add_state(0);
        }
        // 0 -> 1 -> 0 closes a cycle while 1 is reduced to {0}; the
        // proviso expands 0, so 2 is reached. The cycle then contains a
        // fully expanded state and 3 may stay pruned.
        b.edge(0, 1)
            .edge(0, 2)
            .edge(1, 0)
            .edge(1, 3)
            .reduce(0, vec![true, false])
            .reduce(1, vec![true, false]);
        let sys = b.build();
        let stats = run_with(&sys, CondDestStrategy);
        assert_eq!(stats.states, 3);
        let plain = run_with(&sys, PlainStrategy);
        assert_eq!(plain.states, 2);
        assert_eq!(sys.reductions_computed(), 2);
    }

    #[test]
    fn test_cond_source_expands_the_closing_state() {
        let mut b = ExplicitKripke::builder(Vec::new());
        for _ in 0..3 {
            b.add_state(0);
        }
        // 0 is fully expanded, 1 is reduced to {0}. The edge 1 -> 0 closes
        // a cycle: the source 1 expands itself and 2 is reached. Expanding
        // the destination instead changes nothing, 0 is already complete.
        b.edge(0, 1).edge(1, 0).edge(1, 2).reduce(1, vec![true, false]);
        let sys = b.build();
        let uf = SharedUnionFind::new(StateStore::new());
        let stop = AtomicBool::new(false);
        let stats = SccExplorer::new(&sys, &uf, 0, &stop, CondSourceStrategy).run().unwrap();
        assert_eq!(stats.states, 3);
        assert_eq!(stats.sccs, 2);
        assert!(uf.store().get(&2).is_some());

        assert_eq!(run_with(&sys, CondDestStrategy).states, 2);
        assert_eq!(run_with(&sys, PlainStrategy).states, 2);
    }

    #[test]
    fn test_emptiness_strategy_stops_on_accepting_cycle() {
        let sys = ExplicitKripke::from_edges(2, &[(0, 1), (1, 0)]);
        let uf = SharedUnionFind::new(StateStore::new());
        let stop = AtomicBool::new(false);
        let explorer = SccExplorer::new(&sys, &uf, 0, &stop, EmptinessStrategy::new(Acceptance::generalized_buchi(0)))
            .with_trace(true);
        let stats = explorer.run().unwrap();
        assert_eq!(stats.status, McStatus::NotEmpty);
        assert!(stop.load(Ordering::Relaxed));
        let trace = stats.trace.unwrap();
        assert!(trace.starts_with("Prefix:"));
        assert!(trace.contains("Cycle:"));
    }

    #[test]
    fn test_emptiness_strategy_ignores_acyclic_graph() {
        let sys = ExplicitKripke::from_edges(3, &[(0, 1), (1, 2), (0, 2)]);
        let stats = run_with(&sys, EmptinessStrategy::new(Acceptance::generalized_buchi(0)));
        assert_eq!(stats.status, McStatus::Success);
        assert_eq!(stats.sccs, 3);
    }

    #[test]
    fn test_dead_initial_is_skipped() {
        let sys = six_states();
        let uf = SharedUnionFind::new(StateStore::new());
        let stop = AtomicBool::new(false);
        SccExplorer::new(&sys, &uf, 0, &stop, PlainStrategy).run().unwrap();
        let second = SccExplorer::new(&sys, &uf, 1, &stop, PlainStrategy).run().unwrap();
        assert_eq!(second.states, 0);
        assert_eq!(second.sccs, 0);
    }
}
