//! Swarming: every worker sees the successors of a state in its own seeded
//! order, so that independent depth-first workers spread over different
//! parts of the graph.

use super::{KripkeCube, SuccCursor};
use crate::automaton::{AccMark, Cube};
use crate::rng::DeterministicRng;

pub struct SwarmedKripke<'a, K> {
    inner: &'a K,
    seed: u64,
}

impl<'a, K: KripkeCube> SwarmedKripke<'a, K> {
    pub fn new(inner: &'a K, seed: u64) -> Self {
        SwarmedKripke { inner, seed }
    }

    fn rng_for(&self, tid: usize, state: &K::State) -> DeterministicRng {
        DeterministicRng::derived(self.seed, tid as u64, crate::bloom::state_hash(state))
    }
}

#[derive(Clone)]
struct Succ<S> {
    state: S,
    acc: AccMark,
    progress: bool,
}

pub struct SwarmCursor<S, C> {
    inner: C,
    items: Vec<Succ<S>>,
    pos: usize,
    rng: DeterministicRng,
}

impl<S: Clone, C: SuccCursor<S>> SwarmCursor<S, C> {
    fn collect(&mut self) {
        let start = self.items.len();
        while !self.inner.done() {
            self.items.push(Succ {
                state: self.inner.state(),
                acc: self.inner.acc(),
                progress: self.inner.is_progress(),
            });
            self.inner.next();
        }
        // Only the freshly collected tail is shuffled: already visited
        // successors keep their position.
        self.rng.shuffle(&mut self.items[start..]);
    }
}

impl<S: Clone, C: SuccCursor<S>> SuccCursor<S> for SwarmCursor<S, C> {
    fn done(&self) -> bool {
        self.pos >= self.items.len()
    }

    fn state(&self) -> S {
        self.items[self.pos].state.clone()
    }

    fn next(&mut self) {
        self.pos += 1;
    }

    fn condition(&self) -> Cube {
        self.inner.condition()
    }

    fn acc(&self) -> AccMark {
        self.items.get(self.pos).map(|s| s.acc).unwrap_or_default()
    }

    fn is_progress(&self) -> bool {
        self.items.get(self.pos).map(|s| s.progress).unwrap_or(false)
    }

    fn reduced(&self) -> Option<Vec<bool>> {
        self.inner.reduced()
    }

    fn enabled(&self) -> usize {
        self.inner.enabled()
    }

    fn naturally_expanded(&self) -> bool {
        self.inner.naturally_expanded()
    }

    fn fire_all(&mut self) {
        self.inner.fire_all();
        self.collect();
    }
}

impl<'a, K: KripkeCube> KripkeCube for SwarmedKripke<'a, K> {
    type State = K::State;
    type Cursor = SwarmCursor<K::State, K::Cursor>;

    fn initial(&self, tid: usize) -> K::State {
        self.inner.initial(tid)
    }

    fn succ(&self, state: &K::State, tid: usize, reduction: Option<&[bool]>) -> Self::Cursor {
        let mut cursor = SwarmCursor {
            inner: self.inner.succ(state, tid, reduction),
            items: Vec::new(),
            pos: 0,
            rng: self.rng_for(tid, state),
        };
        cursor.collect();
        cursor
    }

    fn recycle(&self, cursor: Self::Cursor, tid: usize) {
        self.inner.recycle(cursor.inner, tid);
    }

    fn state_to_string(&self, state: &K::State) -> String {
        self.inner.state_to_string(state)
    }

    fn ap(&self) -> Vec<String> {
        self.inner.ap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kripke::ExplicitKripke;

    fn drain<C: SuccCursor<u32>>(cursor: &mut C) -> Vec<u32> {
        let mut out = Vec::new();
        while !cursor.done() {
            out.push(cursor.state());
            cursor.next();
        }
        out
    }

    #[test]
    fn test_swarming_keeps_successor_set() {
        let edges: Vec<(u32, u32)> = (1..10).map(|d| (0, d)).collect();
        let sys = ExplicitKripke::from_edges(10, &edges);
        let swarm = SwarmedKripke::new(&sys, 42);

        let mut a = drain(&mut swarm.succ(&0, 0, None));
        let mut b = drain(&mut swarm.succ(&0, 1, None));
        let again = drain(&mut swarm.succ(&0, 1, None));
        assert_eq!(b, again);
        a.sort();
        b.sort();
        assert_eq!(a, (1..10).collect::<Vec<_>>());
        assert_eq!(a, b);
    }

    #[test]
    fn test_fire_all_appends_deferred() {
        let mut builder = ExplicitKripke::builder(Vec::new());
        for _ in 0..4 {
            builder.add_state(0);
        }
        builder
            .edge(0, 1)
            .edge(0, 2)
            .edge(0, 3)
            .reduce(0, vec![true, false, false]);
        let sys = builder.build();
        let swarm = SwarmedKripke::new(&sys, 7);

        let mut c = swarm.succ(&0, 3, None);
        assert_eq!(drain(&mut c), vec![1]);
        c.fire_all();
        let mut rest = drain(&mut c);
        rest.sort();
        assert_eq!(rest, vec![2, 3]);
        swarm.recycle(c, 3);
    }
}
