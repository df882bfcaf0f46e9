//! Fixed-width wire records: `[hash, size, payload...]`.
//!
//! `size` is the payload length in words and is never zero for a present
//! record, so a zero size word marks an empty slot.

use crate::bloom::state_hash;
use std::hash::Hash;

pub const HEADER_WORDS: usize = 2;

/// States that can travel between ranks as integer words.
pub trait StateCodec: Sized + Hash {
    /// Payload length in words; identical for every state of a system.
    fn payload_words(&self) -> usize;

    fn encode(&self, out: &mut Vec<i32>);

    fn decode(payload: &[i32]) -> Option<Self>;
}

impl StateCodec for u32 {
    fn payload_words(&self) -> usize {
        1
    }

    fn encode(&self, out: &mut Vec<i32>) {
        out.push(*self as i32);
    }

    fn decode(payload: &[i32]) -> Option<Self> {
        payload.first().map(|&w| w as u32)
    }
}

impl StateCodec for Vec<i32> {
    fn payload_words(&self) -> usize {
        self.len()
    }

    fn encode(&self, out: &mut Vec<i32>) {
        out.extend_from_slice(self);
    }

    fn decode(payload: &[i32]) -> Option<Self> {
        Some(payload.to_vec())
    }
}

/// Words per record for states like `sample`.
pub fn record_words<S: StateCodec>(sample: &S) -> usize {
    HEADER_WORDS + sample.payload_words().max(1)
}

/// Append the record of `state` to `out`.
pub fn encode_record<S: StateCodec>(state: &S, out: &mut Vec<i32>) {
    let start = out.len();
    out.push(state_hash(state) as i32);
    out.push(0);
    state.encode(out);
    let size = out.len() - start - HEADER_WORDS;
    out[start + 1] = size as i32;
}

/// Decode the record at the start of `words`; `None` for an empty slot.
pub fn decode_record<S: StateCodec>(words: &[i32]) -> Option<S> {
    let size = *words.get(1)?;
    if size <= 0 {
        return None;
    }
    let payload = words.get(HEADER_WORDS..HEADER_WORDS + size as usize)?;
    S::decode(payload)
}
