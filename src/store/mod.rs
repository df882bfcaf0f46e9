//! Concurrent state store.
//!
//! A state is inserted once; afterwards it is identified by a [`StateId`]
//! handle into a segment arena of [`StoreEntry`] records. Every mutation of
//! an entry is a single atomic operation on one field. The index from state
//! to handle is sharded; each shard is a `parking_lot::RwLock<AHashMap>`,
//! so the first insertion of a state is decided under exactly one write lock.

mod arena;

pub use arena::{SegmentArena, SEGMENTS};

use crate::error::McResult;
use ahash::{AHashMap, RandomState};
use parking_lot::{Mutex, RwLock};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

pub const SHARD_COUNT: usize = 64;

/// Union-find status of a root.
pub const LIVE: u8 = 0;
pub const DEAD: u8 = 1;
/// Root held by a `unite` in progress.
pub const LOCKED: u8 = 2;

/// Status of a state in its set's cyclic list.
pub const BUSY: u8 = 0;
pub const LIST_LOCKED: u8 = 1;
pub const DONE: u8 = 2;

/// Nested DFS colors, shared by all workers.
pub const BLUE: u8 = 1;
pub const RED: u8 = 2;

/// Handle of a stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl StateId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Outcome of claiming a state for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    /// First visit by this worker.
    New,
    /// Already visited by this worker and not finished.
    Found,
    /// Finished by some worker; never explore again.
    Dead,
}

/// Result of [`StateStore::insert`]. `fresh` is true for exactly one caller
/// per state over the lifetime of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
    pub id: StateId,
    pub fresh: bool,
}

// =============================================================================
// Reduced-successor cache
// =============================================================================

/// Per-state reduced successor mask, computed once and read lock-free.
/// The mutex only keeps two workers from computing at the same time; a
/// worker that loses `try_lock` recomputes instead of waiting.
#[derive(Default)]
pub struct ReducedCache {
    value: OnceLock<Vec<bool>>,
    computing: Mutex<()>,
}

impl ReducedCache {
    pub fn get(&self) -> Option<&[bool]> {
        self.value.get().map(|v| v.as_slice())
    }

    /// Publish `mask` unless another worker holds the lock or already did.
    pub fn try_publish(&self, mask: Vec<bool>) -> bool {
        match self.computing.try_lock() {
            Some(_guard) => self.value.set(mask).is_ok(),
            None => false,
        }
    }
}

// =============================================================================
// Entries
// =============================================================================

/// Metadata of one state. Union-find fields (`status`, `workers`, `acc`,
/// `leaves`) are only meaningful on the root of a set.
pub struct StoreEntry<S> {
    state: S,
    /// Union-find parent handle; `self` for roots.
    pub(crate) parent: AtomicU32,
    pub(crate) status: AtomicU8,
    /// Next state in the cyclic list of the set; `self` when alone.
    pub(crate) next: AtomicU32,
    /// `BUSY` until some worker finished every successor of this state.
    pub(crate) list: AtomicU8,
    /// Workers that visited this very state.
    pub(crate) claimed: AtomicU64,
    /// Workers having this state open (pushed and not yet finished).
    pub(crate) onstack: AtomicU64,
    /// Workers whose open stack intersects this set (roots only).
    pub(crate) workers: AtomicU64,
    /// Livelock frontier membership, per worker.
    pub(crate) frontier: AtomicU64,
    /// Accumulated acceptance marks of the set (roots only).
    pub(crate) acc: AtomicU32,
    /// The set has an edge into another set (roots only).
    pub(crate) leaves: AtomicBool,
    pub(crate) expanded: AtomicBool,
    pub(crate) reduced: ReducedCache,
    pub(crate) colors: AtomicU8,
    /// Workers whose current red search visited this state.
    pub(crate) red_path: AtomicU64,
}

impl<S> StoreEntry<S> {
    fn new(state: S) -> Self {
        StoreEntry {
            state,
            parent: AtomicU32::new(SELF_PARENT),
            status: AtomicU8::new(LIVE),
            next: AtomicU32::new(SELF_PARENT),
            list: AtomicU8::new(BUSY),
            claimed: AtomicU64::new(0),
            onstack: AtomicU64::new(0),
            workers: AtomicU64::new(0),
            frontier: AtomicU64::new(0),
            acc: AtomicU32::new(0),
            leaves: AtomicBool::new(false),
            expanded: AtomicBool::new(false),
            reduced: ReducedCache::default(),
            colors: AtomicU8::new(0),
            red_path: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn is_dead(&self) -> bool {
        self.status.load(Ordering::SeqCst) == DEAD
    }

    pub fn is_onstack(&self, tid: usize) -> bool {
        self.onstack.load(Ordering::Acquire) & worker_bit(tid) != 0
    }

    pub fn set_onstack(&self, tid: usize) {
        self.onstack.fetch_or(worker_bit(tid), Ordering::AcqRel);
    }

    pub fn clear_onstack(&self, tid: usize) {
        self.onstack.fetch_and(!worker_bit(tid), Ordering::AcqRel);
    }

    pub fn is_claimed_by(&self, tid: usize) -> bool {
        self.claimed.load(Ordering::Acquire) & worker_bit(tid) != 0
    }

    /// Set this worker's claim bit, returning whether it was already set.
    pub fn claim_for(&self, tid: usize) -> bool {
        let bit = worker_bit(tid);
        self.claimed.fetch_or(bit, Ordering::AcqRel) & bit != 0
    }

    pub fn claimed_mask(&self) -> u64 {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.load(Ordering::Acquire)
    }

    pub fn set_expanded(&self) {
        self.expanded.store(true, Ordering::Release);
    }

    pub fn reduced(&self) -> &ReducedCache {
        &self.reduced
    }

    pub fn is_blue(&self) -> bool {
        self.colors.load(Ordering::Acquire) & BLUE != 0
    }

    pub fn is_red(&self) -> bool {
        self.colors.load(Ordering::Acquire) & RED != 0
    }

    pub fn set_color(&self, color: u8) {
        self.colors.fetch_or(color, Ordering::AcqRel);
    }

    pub fn on_red_path(&self, tid: usize) -> bool {
        self.red_path.load(Ordering::Acquire) & worker_bit(tid) != 0
    }

    pub fn set_red_path(&self, tid: usize) {
        self.red_path.fetch_or(worker_bit(tid), Ordering::AcqRel);
    }

    pub fn clear_red_path(&self, tid: usize) {
        self.red_path.fetch_and(!worker_bit(tid), Ordering::AcqRel);
    }
}

pub fn worker_bit(tid: usize) -> u64 {
    debug_assert!(tid < 64, "worker id {} exceeds the 64-bit masks", tid);
    1u64 << (tid & 63)
}

// =============================================================================
// Store
// =============================================================================

pub struct StateStore<S> {
    shards: Box<[RwLock<AHashMap<S, StateId>>]>,
    arena: SegmentArena<StoreEntry<S>>,
    hasher: RandomState,
}

impl<S: Hash + Eq + Clone> StateStore<S> {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Store refusing more than `max_states` distinct states.
    pub fn with_limit(max_states: Option<usize>) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(AHashMap::new()))
            .collect();
        let arena = match max_states {
            Some(limit) => SegmentArena::with_limit(limit),
            None => SegmentArena::new(),
        };
        StateStore {
            shards,
            arena,
            hasher: RandomState::new(),
        }
    }

    fn shard_for(&self, state: &S) -> &RwLock<AHashMap<S, StateId>> {
        let h = self.hasher.hash_one(state);
        &self.shards[(h as usize) % SHARD_COUNT]
    }

    /// Insert `state` if absent. Exactly one concurrent caller gets `fresh`.
    pub fn insert(&self, state: &S) -> McResult<Inserted> {
        let shard = self.shard_for(state);
        if let Some(&id) = shard.read().get(state) {
            return Ok(Inserted { id, fresh: false });
        }

        let mut map = shard.write();
        if let Some(&id) = map.get(state) {
            return Ok(Inserted { id, fresh: false });
        }
        let id = StateId(self.arena.push(StoreEntry::new(state.clone()))?);
        map.insert(state.clone(), id);
        Ok(Inserted { id, fresh: true })
    }

    pub fn get(&self, state: &S) -> Option<StateId> {
        self.shard_for(state).read().get(state).copied()
    }

    /// Entry for a handle obtained from this store.
    pub fn entry(&self, id: StateId) -> &StoreEntry<S> {
        match self.arena.get(id.0) {
            Some(e) => e,
            None => unreachable_entry(id),
        }
    }

    pub fn state(&self, id: StateId) -> &S {
        self.entry(id).state()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Union-find parent of `id` (itself for roots).
    pub(crate) fn parent(&self, id: StateId) -> StateId {
        match self.entry(id).parent.load(Ordering::SeqCst) {
            SELF_PARENT => id,
            p => StateId(p),
        }
    }

    /// Atomically relink `child` from `expected` to `new_parent`.
    pub(crate) fn cas_parent(&self, child: StateId, expected: StateId, new_parent: StateId) -> bool {
        let current = if expected == child { SELF_PARENT } else { expected.0 };
        self.entry(child)
            .parent
            .compare_exchange(current, new_parent.0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Overwrite the parent of a root held locked by the caller.
    pub(crate) fn set_parent(&self, child: StateId, parent: StateId) {
        self.entry(child).parent.store(parent.0, Ordering::SeqCst);
    }

    /// Successor of `id` in its set's cyclic list.
    pub(crate) fn next(&self, id: StateId) -> StateId {
        match self.entry(id).next.load(Ordering::SeqCst) {
            SELF_PARENT => id,
            n => StateId(n),
        }
    }

    pub(crate) fn set_next(&self, id: StateId, next: StateId) {
        let raw = if next == id { SELF_PARENT } else { next.0 };
        self.entry(id).next.store(raw, Ordering::SeqCst);
    }

    /// Monotonic, idempotent. Returns true for the call that changed the status.
    pub fn mark_dead(&self, id: StateId) -> bool {
        self.entry(id)
            .status
            .compare_exchange(LIVE, DEAD, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_dead(&self, id: StateId) -> bool {
        self.entry(id).is_dead()
    }

    /// Per-worker claim used by the deadlock explorer: `Dead` once any
    /// worker finished the state, `Found` if it is open for this worker,
    /// otherwise the state is opened for this worker and `New` returned.
    pub fn claim(&self, state: &S, tid: usize) -> McResult<(ClaimStatus, Inserted)> {
        let inserted = self.insert(state)?;
        let entry = self.entry(inserted.id);
        if entry.is_dead() {
            return Ok((ClaimStatus::Dead, inserted));
        }
        let bit = worker_bit(tid);
        if entry.onstack.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            return Ok((ClaimStatus::Found, inserted));
        }
        Ok((ClaimStatus::New, inserted))
    }
}

impl<S: Hash + Eq + Clone> Default for StateStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Self link, for the parent of a root and the next of a lone state.
/// Handles never reach `u32::MAX`.
const SELF_PARENT: u32 = u32::MAX;

#[cold]
fn unreachable_entry(id: StateId) -> ! {
    panic!("state handle {} not published in this store", id.0)
}
