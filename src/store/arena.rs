//! Append-only concurrent arena addressed by `u32` handles.
//!
//! Storage is a fixed table of geometrically growing segments; segment `k`
//! holds `FIRST_SEGMENT << k` slots and is allocated the first time an index
//! inside it is handed out. Slots are written exactly once. Nothing is ever
//! removed: the whole arena is dropped at the end of a run.

use crate::error::{McError, McResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

pub const SEGMENTS: usize = 32;
const LOG_FIRST: u32 = 10;
const FIRST_SEGMENT: usize = 1 << LOG_FIRST;

pub struct SegmentArena<T> {
    segments: [OnceLock<Box<[OnceLock<T>]>>; SEGMENTS],
    next: AtomicUsize,
    limit: usize,
}

/// (segment, offset) of a global index.
fn locate(index: usize) -> (usize, usize) {
    let shifted = index + FIRST_SEGMENT;
    let msb = (usize::BITS - 1 - shifted.leading_zeros()) as usize;
    let segment = msb - LOG_FIRST as usize;
    (segment, shifted - (1 << msb))
}

impl<T> SegmentArena<T> {
    pub fn new() -> Self {
        Self::with_limit(u32::MAX as usize)
    }

    /// Arena refusing to hand out more than `limit` slots.
    pub fn with_limit(limit: usize) -> Self {
        SegmentArena {
            segments: std::array::from_fn(|_| OnceLock::new()),
            next: AtomicUsize::new(0),
            limit: limit.min(u32::MAX as usize),
        }
    }

    fn segment(&self, segment: usize) -> &[OnceLock<T>] {
        self.segments[segment].get_or_init(|| {
            (0..FIRST_SEGMENT << segment)
                .map(|_| OnceLock::new())
                .collect()
        })
    }

    /// Store `value` in a fresh slot and return its handle.
    pub fn push(&self, value: T) -> McResult<u32> {
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        if index >= self.limit {
            self.next.fetch_sub(1, Ordering::AcqRel);
            return Err(McError::MemoryExhausted { requested: index + 1 });
        }
        let (segment, offset) = locate(index);
        debug_assert!(segment < SEGMENTS);
        let slot = &self.segment(segment)[offset];
        let stored = slot.set(value);
        debug_assert!(stored.is_ok(), "arena slot {} written twice", index);
        Ok(index as u32)
    }

    /// Slot `handle`, or `None` while its writer has not published it yet.
    pub fn get(&self, handle: u32) -> Option<&T> {
        let (segment, offset) = locate(handle as usize);
        self.segments.get(segment)?.get()?.get(offset)?.get()
    }

    /// Number of handles given out so far.
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.limit)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SegmentArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
