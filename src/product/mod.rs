//! Product exploration and sequential emptiness checking.
//!
//! [`ProductExplorer`] walks the synchronous product of a system and a
//! property automaton depth-first, numbering product states in discovery
//! order, and reports every push, pop and edge to an [`EmptinessCheck`].
//! The same product is exposed as a [`KripkeCube`] through
//! [`ProductKripke`] so that the swarmed SCC driver and the collaborative
//! nested search ([`CndfsExplorer`]) can run on it as well.

mod cndfs;
mod kripke;
mod scc_check;

pub use cndfs::CndfsExplorer;
pub use kripke::{ProductCursor, ProductKripke, ProductState};
pub use scc_check::SccEmptinessCheck;

use crate::automaton::{AccMark, Acceptance, Automaton};
use crate::error::{McError, McResult};
use crate::kripke::{KripkeCube, SuccCursor};
use crate::report::{McStatus, WorkerStats};
use ahash::AHashMap;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info};

/// Hooks of a sequential emptiness check driven by [`ProductExplorer`].
pub trait EmptinessCheck<S> {
    fn name(&self) -> &'static str;

    /// A new product state got `serial`. Returning false prunes it.
    fn on_push(&mut self, state: &S, serial: u32, incoming: AccMark) -> bool;

    /// `serial` is exhausted. `parent` is the frame below it, if any.
    fn on_pop(&mut self, state: &S, serial: u32, is_initial: bool, parent: Option<(&S, u32)>) -> bool;

    /// Edge to an already numbered state. Returning true reports a
    /// counterexample and halts the exploration.
    fn on_update(&mut self, src: &S, src_serial: u32, dst: &S, dst_serial: u32, mark: AccMark) -> bool;

    fn counterexample_found(&self) -> bool;

    /// Whether two serials belong to the same (candidate) component.
    fn same_component(&mut self, a: u32, b: u32) -> bool;

    fn acceptance(&self) -> &Acceptance;
}

struct Frame<S, C> {
    state: S,
    serial: u32,
    cursor: C,
}

pub struct ProductExplorer<'a, K: KripkeCube, A: Automaton, E> {
    product: ProductKripke<'a, K, A>,
    check: E,
    tid: usize,
    visited: AHashMap<ProductState<K::State>, u32>,
    todo: Vec<Frame<ProductState<K::State>, ProductCursor<K::Cursor>>>,
    stats: WorkerStats,
    max_states: Option<usize>,
    compute_trace: bool,
}

impl<'a, K, A, E> ProductExplorer<'a, K, A, E>
where
    K: KripkeCube,
    A: Automaton,
    E: EmptinessCheck<ProductState<K::State>>,
{
    pub fn new(sys: &'a K, twa: &'a A, check: E, tid: usize) -> Self {
        ProductExplorer {
            product: ProductKripke::new(sys, twa),
            check,
            tid,
            visited: AHashMap::new(),
            todo: Vec::with_capacity(1024),
            stats: WorkerStats::new(tid),
            max_states: None,
            compute_trace: false,
        }
    }

    pub fn with_trace(mut self, compute_trace: bool) -> Self {
        self.compute_trace = compute_trace;
        self
    }

    pub fn with_max_states(mut self, max_states: Option<usize>) -> Self {
        self.max_states = max_states;
        self
    }

    pub fn check(&self) -> &E {
        &self.check
    }

    fn push(&mut self, state: ProductState<K::State>, incoming: AccMark) -> McResult<()> {
        let serial = self.visited.len() as u32;
        if let Some(limit) = self.max_states {
            if self.visited.len() >= limit {
                return Err(McError::MemoryExhausted {
                    requested: self.visited.len() + 1,
                });
            }
        }
        self.visited.insert(state.clone(), serial);
        self.stats.inserted += 1;
        if !self.check.on_push(&state, serial, incoming) {
            return Ok(());
        }
        let cursor = self.product.succ(&state, self.tid, None);
        self.todo.push(Frame { state, serial, cursor });
        self.stats.states += 1;
        self.stats.observe_depth(self.todo.len());
        Ok(())
    }

    fn pop(&mut self) {
        let Some(frame) = self.todo.pop() else {
            return;
        };
        let parent = self.todo.last().map(|f| (&f.state, f.serial));
        self.check
            .on_pop(&frame.state, frame.serial, parent.is_none(), parent);
        self.product.recycle(frame.cursor, self.tid);
    }

    /// Explore until the check reports a counterexample or the product is
    /// exhausted. Returns whether a counterexample was found.
    pub fn run(&mut self) -> McResult<bool> {
        let initial = self.product.initial(self.tid);
        self.push(initial, AccMark::empty())?;

        while let Some(top) = self.todo.last_mut() {
            if top.cursor.done() {
                self.pop();
                continue;
            }
            let dst = top.cursor.state();
            let mark = top.cursor.acc();
            top.cursor.next();
            self.stats.transitions += 1;

            match self.visited.get(&dst).copied() {
                Some(dst_serial) => {
                    let Some(top) = self.todo.last() else {
                        break;
                    };
                    if self.check.on_update(&top.state, top.serial, &dst, dst_serial, mark) {
                        debug!(tid = self.tid, "accepting cycle closed");
                        return Ok(true);
                    }
                }
                None => self.push(dst, mark)?,
            }
        }
        Ok(self.check.counterexample_found())
    }

    fn release(&mut self) {
        while let Some(frame) = self.todo.pop() {
            self.product.recycle(frame.cursor, self.tid);
        }
    }

    /// Counterexample as a `Prefix:` (the DFS stack) followed by a `Cycle:`
    /// through the component of the stack top that sees every acceptance set.
    pub fn trace(&mut self) -> Option<String> {
        let (start, start_serial) = self.todo.last().map(|f| (f.state.clone(), f.serial))?;
        let mut out = String::from("Prefix:\n");
        for frame in &self.todo[..self.todo.len() - 1] {
            out.push_str("  ");
            out.push_str(&self.product.state_to_string(&frame.state));
            out.push('\n');
        }
        out.push_str("Cycle:\n");

        let acceptance = *self.check.acceptance();
        let mut collected = AccMark::empty();
        let mut current = start.clone();
        loop {
            let all = acceptance.accepting(collected);
            let wanted = collected;
            let path = self.bfs(&current, start_serial, |dst, mark| {
                if all {
                    dst == &start
                } else {
                    !mark.minus(wanted).is_empty()
                }
            })?;
            for (state, mark) in &path {
                out.push_str("  ");
                out.push_str(&self.product.state_to_string(&current));
                out.push('\n');
                collected |= *mark;
                current = state.clone();
            }
            if all {
                return Some(out);
            }
        }
    }

    /// Shortest path from `from` inside the component of `component`
    /// ending with an edge accepted by `target`; each step is the reached
    /// state with the mark of the edge leading to it.
    fn bfs(
        &mut self,
        from: &ProductState<K::State>,
        component: u32,
        target: impl Fn(&ProductState<K::State>, AccMark) -> bool,
    ) -> Option<Vec<(ProductState<K::State>, AccMark)>> {
        let mut parents: AHashMap<ProductState<K::State>, (ProductState<K::State>, AccMark)> = AHashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(from.clone());
        while let Some(u) = queue.pop_front() {
            let mut cursor = self.product.succ(&u, self.tid, None);
            let mut hit = None;
            while !cursor.done() {
                let v = cursor.state();
                let mark = cursor.acc();
                cursor.next();
                let Some(&serial) = self.visited.get(&v) else {
                    continue;
                };
                if !self.check.same_component(serial, component) {
                    continue;
                }
                if target(&v, mark) {
                    hit = Some((v, mark));
                    break;
                }
                if v != *from && !parents.contains_key(&v) {
                    parents.insert(v.clone(), (u.clone(), mark));
                    queue.push_back(v);
                }
            }
            self.product.recycle(cursor, self.tid);
            if let Some((v, mark)) = hit {
                let mut path = vec![(v, mark)];
                let mut cur = u;
                while cur != *from {
                    let (prev, m) = parents.get(&cur)?.clone();
                    path.push((cur, m));
                    cur = prev;
                }
                path.reverse();
                return Some(path);
            }
        }
        None
    }
}

/// Sequential emptiness check of `sys` against `twa` on worker `tid`.
pub fn modelcheck<K: KripkeCube, A: Automaton>(
    sys: &K,
    twa: &A,
    tid: usize,
    compute_trace: bool,
) -> McResult<WorkerStats> {
    let check = SccEmptinessCheck::new(twa.acceptance())?;
    let start = Instant::now();
    let mut explorer = ProductExplorer::new(sys, twa, check, tid).with_trace(compute_trace);
    let result = explorer.run();
    let found = match result {
        Ok(found) => found,
        Err(e) => {
            explorer.release();
            return Err(e);
        }
    };
    let trace = if found && explorer.compute_trace {
        explorer.trace()
    } else {
        None
    };
    explorer.release();

    let mut stats = explorer.stats.clone();
    stats.walltime_ms = start.elapsed().as_millis() as u64;
    stats.status = if found { McStatus::NotEmpty } else { McStatus::Empty };
    stats.trace = trace;
    info!(
        tid,
        states = stats.states,
        transitions = stats.transitions,
        status = stats.status.name(),
        "emptiness check finished"
    );
    Ok(stats)
}
