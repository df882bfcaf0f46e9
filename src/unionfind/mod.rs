//! Iterable union-find over the shared state store.
//!
//! Every node is a [`StoreEntry`](crate::store::StoreEntry); parent links are
//! atomic handles and all aggregate data (status, worker mask, acceptance
//! marks, leaving flag) lives on roots. Besides the tree, the members of a
//! set form a cyclic list through `next`. A member is `BUSY` until a worker
//! has finished all of its successors, then `DONE`; workers pick their next
//! job from the busy members of the set they are in.
//!
//! A set becomes dead only once its list holds no busy member, so dead sets
//! are exactly the strongly connected components. Dead roots are never
//! linked. `unite` locks the root it relinks and one busy member on each
//! side (its own side first), then splices the two lists.

mod int;

pub use int::IntUnionFind;

use crate::automaton::AccMark;
use crate::error::McResult;
use crate::store::{worker_bit, ClaimStatus, StateId, StateStore, BUSY, DEAD, DONE, LIST_LOCKED, LIVE, LOCKED};
use std::hash::Hash;
use std::sync::atomic::Ordering;

/// Result of [`SharedUnionFind::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub status: ClaimStatus,
    pub id: StateId,
    /// First insertion of the state in the store.
    pub fresh: bool,
}

/// Result of [`SharedUnionFind::pick_from_list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    /// A member of the set still waiting for its successors to be finished.
    Busy(StateId),
    /// Every member is done and the set is dead. `finalized` is true for
    /// exactly one caller per set.
    Done { finalized: bool },
}

pub struct SharedUnionFind<S> {
    store: StateStore<S>,
}

impl<S: Hash + Eq + Clone> SharedUnionFind<S> {
    pub fn new(store: StateStore<S>) -> Self {
        SharedUnionFind { store }
    }

    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Representative of `x`, halving the path on the way. A failed
    /// compression CAS only costs extra hops later.
    pub fn find(&self, x: StateId) -> StateId {
        let mut cur = x;
        loop {
            let parent = self.store.parent(cur);
            if parent == cur {
                return cur;
            }
            let grand = self.store.parent(parent);
            if grand != parent {
                let _ = self.store.cas_parent(cur, parent, grand);
            }
            cur = parent;
        }
    }

    fn status(&self, root: StateId) -> u8 {
        self.store.entry(root).status.load(Ordering::SeqCst)
    }

    /// Claim `state` for worker `tid`.
    ///
    /// `Dead` when its set is finished; `Found` when the set already holds
    /// this worker's bit, i.e. it contains a state open on this worker's
    /// stack; otherwise the bit is recorded on the root chain and `New` is
    /// returned.
    pub fn claim(&self, state: &S, tid: usize) -> McResult<Claim> {
        let inserted = self.store.insert(state)?;
        let mut claim = Claim {
            status: ClaimStatus::Dead,
            id: inserted.id,
            fresh: inserted.fresh,
        };
        let bit = worker_bit(tid);
        let mut root = self.find(inserted.id);
        let entry = self.store.entry(root);
        if self.status(root) == DEAD {
            return Ok(claim);
        }
        if entry.workers.load(Ordering::SeqCst) & bit != 0 {
            claim.status = ClaimStatus::Found;
            return Ok(claim);
        }
        entry.workers.fetch_or(bit, Ordering::SeqCst);
        while self.store.parent(root) != root {
            root = self.find(root);
            self.store.entry(root).workers.fetch_or(bit, Ordering::SeqCst);
        }
        claim.status = ClaimStatus::New;
        Ok(claim)
    }

    /// Merge the sets of `a` and `b`. Returns false, linking nothing, when
    /// either set is already dead.
    pub fn unite(&self, a: StateId, b: StateId) -> bool {
        loop {
            let ra = self.find(a);
            let rb = self.find(b);
            if ra == rb {
                return true;
            }
            if self.status(ra) == DEAD || self.status(rb) == DEAD {
                return false;
            }
            let (q, r) = if ra < rb { (ra, rb) } else { (rb, ra) };
            if !self.lock_root(q) {
                std::hint::spin_loop();
                continue;
            }
            let Some(lq) = self.lock_list(q) else {
                // Every member of q is done: it is about to die, or it was
                // merged into r's set under our feet.
                self.unlock_root(q);
                std::thread::yield_now();
                continue;
            };
            let Some(lr) = self.lock_list(r) else {
                self.unlock_list(lq);
                self.unlock_root(q);
                std::thread::yield_now();
                continue;
            };

            let next_q = self.store.next(lq);
            let next_r = self.store.next(lr);
            self.store.set_next(lq, next_r);
            self.store.set_next(lr, next_q);
            self.store.set_parent(q, r);

            let entry = self.store.entry(q);
            self.spread(
                r,
                entry.workers.load(Ordering::SeqCst),
                entry.acc.load(Ordering::SeqCst),
                entry.leaves.load(Ordering::SeqCst),
            );
            self.unlock_list(lr);
            self.unlock_list(lq);
            self.unlock_root(q);
            return true;
        }
    }

    fn lock_root(&self, q: StateId) -> bool {
        let entry = self.store.entry(q);
        if entry
            .status
            .compare_exchange(LIVE, LOCKED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if self.store.parent(q) == q {
            return true;
        }
        entry.status.store(LIVE, Ordering::SeqCst);
        false
    }

    fn unlock_root(&self, q: StateId) {
        self.store.entry(q).status.store(LIVE, Ordering::SeqCst);
    }

    /// Lock one busy member of the list through `x`.
    fn lock_list(&self, x: StateId) -> Option<StateId> {
        let mut a = x;
        loop {
            let busy = self.next_busy(a)?;
            if self
                .store
                .entry(busy)
                .list
                .compare_exchange(BUSY, LIST_LOCKED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Some(busy);
            }
            a = self.store.next(busy);
        }
    }

    fn unlock_list(&self, x: StateId) {
        self.store.entry(x).list.store(BUSY, Ordering::SeqCst);
    }

    /// Waits out a member locked by a `unite`, returning whether it is busy.
    fn wait_list(&self, x: StateId) -> bool {
        let list = &self.store.entry(x).list;
        loop {
            match list.load(Ordering::SeqCst) {
                BUSY => return true,
                DONE => return false,
                _ => std::hint::spin_loop(),
            }
        }
    }

    /// First busy member reachable from `x`, unlinking done members from
    /// the list on the way. `None` once the whole list is done.
    fn next_busy(&self, x: StateId) -> Option<StateId> {
        let mut a = x;
        loop {
            if self.wait_list(a) {
                return Some(a);
            }
            let b = self.store.next(a);
            if b == a {
                return None;
            }
            if self.wait_list(b) {
                return Some(b);
            }
            let c = self.store.next(b);
            self.store.set_next(a, c);
            a = c;
        }
    }

    /// Next job in the set of `x`, or its death once no member is busy.
    pub fn pick_from_list(&self, x: StateId) -> Pick {
        match self.next_busy(x) {
            Some(busy) => Pick::Busy(busy),
            None => Pick::Done {
                finalized: self.mark_dead(x),
            },
        }
    }

    /// Mark `x` done: all of its successors are finished.
    pub fn remove_from_list(&self, x: StateId) {
        let list = &self.store.entry(x).list;
        loop {
            match list.compare_exchange(BUSY, DONE, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) | Err(DONE) => return,
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    /// OR aggregates into the root of `from`, following it if it moves.
    fn spread(&self, from: StateId, workers: u64, acc: u32, leaves: bool) {
        let mut root = self.find(from);
        loop {
            let entry = self.store.entry(root);
            entry.workers.fetch_or(workers, Ordering::SeqCst);
            entry.acc.fetch_or(acc, Ordering::SeqCst);
            if leaves {
                entry.leaves.store(true, Ordering::SeqCst);
            }
            let next = self.find(root);
            if next == root {
                return;
            }
            root = next;
        }
    }

    /// Mark the set of `x` dead. Callers must have seen its whole list
    /// done. Returns true if this call finalized it.
    pub fn mark_dead(&self, x: StateId) -> bool {
        loop {
            let root = self.find(x);
            let status = &self.store.entry(root).status;
            match status.compare_exchange(LIVE, LOCKED, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => {
                    if self.store.parent(root) == root {
                        status.store(DEAD, Ordering::SeqCst);
                        return true;
                    }
                    status.store(LIVE, Ordering::SeqCst);
                }
                Err(DEAD) => return false,
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    pub fn is_dead(&self, x: StateId) -> bool {
        loop {
            let root = self.find(x);
            if self.status(root) == DEAD {
                return true;
            }
            if self.store.parent(root) == root {
                return false;
            }
        }
    }

    /// True only if both were in the same set at the instant both finds completed.
    pub fn same_set(&self, a: StateId, b: StateId) -> bool {
        loop {
            let ra = self.find(a);
            let rb = self.find(b);
            if ra == rb {
                return true;
            }
            if self.store.parent(ra) == ra {
                return false;
            }
        }
    }

    /// Add `mark` to the set of `x`; returns the set's accumulated marks.
    pub fn add_marks(&self, x: StateId, mark: AccMark) -> AccMark {
        loop {
            let root = self.find(x);
            let prev = self.store.entry(root).acc.fetch_or(mark.bits(), Ordering::SeqCst);
            if self.store.parent(root) == root {
                return AccMark::from_bits(prev | mark.bits());
            }
        }
    }

    pub fn marks(&self, x: StateId) -> AccMark {
        let root = self.find(x);
        AccMark::from_bits(self.store.entry(root).acc.load(Ordering::SeqCst))
    }

    /// Record that the set of `x` has an edge into another set.
    pub fn mark_leaving(&self, x: StateId) {
        loop {
            let root = self.find(x);
            self.store.entry(root).leaves.store(true, Ordering::SeqCst);
            if self.store.parent(root) == root {
                return;
            }
        }
    }

    pub fn leaves(&self, x: StateId) -> bool {
        let root = self.find(x);
        self.store.entry(root).leaves.load(Ordering::SeqCst)
    }

    pub fn workers(&self, x: StateId) -> u64 {
        let root = self.find(x);
        self.store.entry(root).workers.load(Ordering::SeqCst)
    }
}
