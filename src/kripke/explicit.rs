//! Explicit in-memory transition systems.
//!
//! Used by the test suites, the simulation harness and the benches. States
//! are dense `u32` ids; each carries a full valuation of the atomic
//! propositions. Edges may be tagged as progress transitions and a state may
//! carry a reduced successor mask to exercise partial-order style reductions.

use super::{BufferPool, KripkeCube, SuccCursor};
use crate::automaton::{Cube, MAX_APS};
use crate::config::MAX_WORKERS;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    dst: u32,
    progress: bool,
}

pub struct ExplicitKripke {
    aps: Vec<String>,
    labels: Vec<Cube>,
    edges: Vec<Vec<Edge>>,
    reductions: Vec<Option<Vec<bool>>>,
    initial: u32,
    pool: BufferPool<Edge>,
    /// Number of reduced sets computed (not served from a hint).
    reductions_computed: AtomicU64,
}

impl ExplicitKripke {
    pub fn builder(aps: Vec<String>) -> ExplicitKripkeBuilder {
        ExplicitKripkeBuilder::new(aps)
    }

    /// Unlabelled system with states `0..n`, initial state 0.
    pub fn from_edges(n: u32, edges: &[(u32, u32)]) -> Self {
        let mut b = ExplicitKripkeBuilder::new(Vec::new());
        for _ in 0..n {
            b.add_state(0);
        }
        for &(src, dst) in edges {
            b.edge(src, dst);
        }
        b.build()
    }

    pub fn num_states(&self) -> usize {
        self.labels.len()
    }

    pub fn initial_state(&self) -> u32 {
        self.initial
    }

    pub fn label(&self, state: u32) -> Cube {
        self.labels.get(state as usize).copied().unwrap_or_default()
    }

    pub fn successors(&self, state: u32) -> impl Iterator<Item = u32> + '_ {
        self.edges
            .get(state as usize)
            .into_iter()
            .flat_map(|v| v.iter().map(|e| e.dst))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(|v| v.len()).sum()
    }

    pub fn reductions_computed(&self) -> u64 {
        self.reductions_computed.load(Ordering::Relaxed)
    }
}

impl KripkeCube for ExplicitKripke {
    type State = u32;
    type Cursor = ExplicitCursor;

    fn initial(&self, _tid: usize) -> u32 {
        self.initial
    }

    fn succ(&self, state: &u32, tid: usize, reduction: Option<&[bool]>) -> ExplicitCursor {
        let idx = *state as usize;
        let edges: &[Edge] = self.edges.get(idx).map(|v| v.as_slice()).unwrap_or(&[]);

        let mask: Option<Vec<bool>> = match (reduction, self.reductions.get(idx)) {
            (Some(hint), _) if hint.len() == edges.len() => Some(hint.to_vec()),
            (_, Some(Some(mask))) => {
                self.reductions_computed.fetch_add(1, Ordering::Relaxed);
                Some(mask.clone())
            }
            _ => None,
        };

        let mut pending = self.pool.acquire(tid);
        let mut deferred = Vec::new();
        for (i, e) in edges.iter().enumerate() {
            match &mask {
                Some(m) if !m.get(i).copied().unwrap_or(true) => deferred.push(*e),
                _ => pending.push(*e),
            }
        }

        ExplicitCursor {
            condition: self.label(*state),
            pending,
            deferred,
            pos: 0,
            enabled: edges.len(),
            reduced: mask,
        }
    }

    fn recycle(&self, cursor: ExplicitCursor, tid: usize) {
        self.pool.release(tid, cursor.pending);
    }

    fn state_to_string(&self, state: &u32) -> String {
        format!("s{}", state)
    }

    fn ap(&self) -> Vec<String> {
        self.aps.clone()
    }
}

pub struct ExplicitCursor {
    condition: Cube,
    pending: Vec<Edge>,
    deferred: Vec<Edge>,
    pos: usize,
    enabled: usize,
    reduced: Option<Vec<bool>>,
}

impl SuccCursor<u32> for ExplicitCursor {
    fn done(&self) -> bool {
        self.pos >= self.pending.len()
    }

    fn state(&self) -> u32 {
        debug_assert!(!self.done());
        self.pending[self.pos].dst
    }

    fn next(&mut self) {
        self.pos += 1;
    }

    fn condition(&self) -> Cube {
        self.condition
    }

    fn is_progress(&self) -> bool {
        self.pending.get(self.pos).map(|e| e.progress).unwrap_or(false)
    }

    fn reduced(&self) -> Option<Vec<bool>> {
        self.reduced.clone()
    }

    fn enabled(&self) -> usize {
        self.enabled
    }

    fn naturally_expanded(&self) -> bool {
        self.deferred.is_empty()
    }

    fn fire_all(&mut self) {
        self.pending.append(&mut self.deferred);
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct ExplicitKripkeBuilder {
    aps: Vec<String>,
    labels: Vec<Cube>,
    edges: Vec<Vec<Edge>>,
    reductions: Vec<Option<Vec<bool>>>,
    initial: u32,
}

impl ExplicitKripkeBuilder {
    pub fn new(aps: Vec<String>) -> Self {
        debug_assert!(aps.len() <= MAX_APS);
        ExplicitKripkeBuilder {
            aps,
            labels: Vec::new(),
            edges: Vec::new(),
            reductions: Vec::new(),
            initial: 0,
        }
    }

    /// Add a state whose valuation is `bits` (bit `i` = proposition `i`).
    pub fn add_state(&mut self, bits: u64) -> u32 {
        self.labels.push(Cube::valuation(bits, self.aps.len()));
        self.edges.push(Vec::new());
        self.reductions.push(None);
        (self.labels.len() - 1) as u32
    }

    pub fn edge(&mut self, src: u32, dst: u32) -> &mut Self {
        self.push_edge(src, dst, false)
    }

    pub fn progress_edge(&mut self, src: u32, dst: u32) -> &mut Self {
        self.push_edge(src, dst, true)
    }

    fn push_edge(&mut self, src: u32, dst: u32, progress: bool) -> &mut Self {
        debug_assert!((src as usize) < self.labels.len(), "unknown source s{}", src);
        debug_assert!((dst as usize) < self.labels.len(), "unknown target s{}", dst);
        if let Some(out) = self.edges.get_mut(src as usize) {
            out.push(Edge { dst, progress });
        }
        self
    }

    /// Restrict `state` to the successors flagged in `mask` until a worker
    /// asks for full expansion.
    pub fn reduce(&mut self, state: u32, mask: Vec<bool>) -> &mut Self {
        if let Some(slot) = self.reductions.get_mut(state as usize) {
            *slot = Some(mask);
        }
        self
    }

    pub fn initial(&mut self, state: u32) -> &mut Self {
        self.initial = state;
        self
    }

    pub fn build(self) -> ExplicitKripke {
        let avg_degree = if self.labels.is_empty() {
            4
        } else {
            (self.edges.iter().map(|e| e.len()).sum::<usize>() / self.labels.len()).max(4)
        };
        ExplicitKripke {
            aps: self.aps,
            labels: self.labels,
            edges: self.edges,
            reductions: self.reductions,
            initial: self.initial,
            pool: BufferPool::new(MAX_WORKERS, 64, avg_degree),
            reductions_computed: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(cursor: &mut ExplicitCursor) -> Vec<u32> {
        let mut out = Vec::new();
        while !cursor.done() {
            out.push(cursor.state());
            cursor.next();
        }
        out
    }

    #[test]
    fn test_successor_order_without_swarming() {
        let sys = ExplicitKripke::from_edges(3, &[(0, 1), (0, 2), (1, 1)]);
        let mut c = sys.succ(&0, 0, None);
        assert_eq!(c.enabled(), 2);
        assert_eq!(drain(&mut c), vec![1, 2]);
        sys.recycle(c, 0);
        let mut c = sys.succ(&2, 0, None);
        assert!(c.done());
        assert!(drain(&mut c).is_empty());
    }

    #[test]
    fn test_reduction_and_fire_all() {
        let mut b = ExplicitKripke::builder(Vec::new());
        for _ in 0..3 {
            b.add_state(0);
        }
        b.edge(0, 1).edge(0, 2).reduce(0, vec![true, false]);
        let sys = b.build();

        let mut c = sys.succ(&0, 0, None);
        assert!(!c.naturally_expanded());
        assert_eq!(c.reduced(), Some(vec![true, false]));
        assert_eq!(sys.reductions_computed(), 1);
        assert_eq!(c.state(), 1);
        c.next();
        assert!(c.done());
        c.fire_all();
        assert!(!c.done());
        assert_eq!(c.state(), 2);

        let hint = vec![true, false];
        let _ = sys.succ(&0, 1, Some(hint.as_slice()));
        assert_eq!(sys.reductions_computed(), 1);
    }

    #[test]
    fn test_progress_flag_and_labels() {
        let mut b = ExplicitKripke::builder(vec!["p".into()]);
        let s0 = b.add_state(0);
        let s1 = b.add_state(1);
        b.progress_edge(s0, s1).edge(s1, s0);
        let sys = b.build();
        let c = sys.succ(&s0, 0, None);
        assert!(c.is_progress());
        assert!(c.condition().is_false(0));
        assert!(sys.label(s1).is_true(0));
        assert_eq!(sys.state_to_string(&s1), "s1");
    }
}
