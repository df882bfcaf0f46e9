//! Cooperative rank: buffered one-sided windows.
//!
//! States owned by another rank are batched per destination and flushed
//! into the sender's window, in the destination's region. A per-destination
//! "free" flag in the sender's region of the free window guards the batch:
//! the sender clears it before writing and the receiver sets it again once
//! it has copied the batch out, so an unconsumed batch is never overwritten.

use super::codec::{decode_record, encode_record, StateCodec};
use super::termination::TerminationDetector;
use super::window::RmaWindow;
use super::{Cluster, RankExplorer, RankStats};
use crate::bloom::state_hash;
use crate::config::DistributedConfig;
use crate::error::McResult;
use crate::kripke::{KripkeCube, SuccCursor};
use std::time::Duration;
use tracing::debug;

/// Windows shared by every rank of a cooperative run.
pub struct CepWindows {
    /// `free[sender][dest]` is 1 when `sender` may write to `dest`.
    free: RmaWindow,
    /// `bufs[sender]`, region `dest`: the batch in flight.
    bufs: Vec<RmaWindow>,
    finish: RmaWindow,
    batch: usize,
    record_words: usize,
}

impl CepWindows {
    pub fn new(world_size: usize, batch: usize, record_words: usize) -> Self {
        CepWindows {
            free: RmaWindow::new(world_size, world_size, 1),
            bufs: (0..world_size)
                .map(|_| RmaWindow::new(world_size, batch * record_words, 0))
                .collect(),
            finish: RmaWindow::new(world_size, world_size, 0),
            batch,
            record_words,
        }
    }

    fn batch_words(&self) -> usize {
        self.batch * self.record_words
    }
}

pub struct CepExplorer<'a, K: KripkeCube> {
    base: RankExplorer<'a, K>,
    windows: &'a CepWindows,
    term: TerminationDetector<'a>,
    /// Encoded outgoing records per destination.
    out: Vec<Vec<i32>>,
    out_len: Vec<usize>,
    incoming: Vec<i32>,
    check_all_buffers: usize,
}

impl<'a, K> CepExplorer<'a, K>
where
    K: KripkeCube,
    K::State: StateCodec,
{
    pub fn new(
        sys: &'a K,
        rank: usize,
        cluster: &'a Cluster,
        windows: &'a CepWindows,
        config: &DistributedConfig,
        invariant: &'a (dyn Fn(&K::State) -> bool + Sync),
    ) -> Self {
        let world = cluster.world_size();
        CepExplorer {
            base: RankExplorer::new(sys, rank, cluster, config.max_states_per_rank, invariant),
            windows,
            term: TerminationDetector::new(
                rank,
                &windows.finish,
                cluster,
                Duration::from_millis(config.idle_timeout_ms),
            ),
            out: vec![Vec::with_capacity(windows.batch_words()); world],
            out_len: vec![0; world],
            incoming: Vec::with_capacity(windows.batch_words()),
            check_all_buffers: config.check_all_buffers,
        }
    }

    /// Whether some other rank left a batch for us. Skipped while busy
    /// except every `check_all_buffers` processed states.
    fn incoming_states(&self, work: bool) -> bool {
        if work && self.base.stats.processed_states % self.check_all_buffers as u64 != 0 {
            return false;
        }
        let me = self.base.rank;
        (0..self.base.world)
            .filter(|&r| r != me)
            .any(|src| self.windows.bufs[src].get_one(me, 1) != 0)
    }

    fn process_in_states(&mut self) -> McResult<()> {
        let me = self.base.rank;
        let rw = self.windows.record_words;
        for src in 0..self.base.world {
            if src == me {
                continue;
            }
            self.windows.bufs[src].get_into(me, 0, &mut self.incoming);
            if self.incoming.get(1).copied().unwrap_or(0) == 0 {
                continue;
            }
            self.windows.bufs[src].put_one(me, 1, 0);
            self.windows.free.put_one(src, me, 1);
            self.term.wake();

            let batch = std::mem::take(&mut self.incoming);
            let mut count = 0;
            for record in batch.chunks(rw) {
                let Some(state) = decode_record::<K::State>(record) else {
                    break;
                };
                count += 1;
                self.base.discover(state)?;
            }
            self.incoming = batch;
            self.base.note_received(count);
        }
        Ok(())
    }

    fn process_out_state(&mut self, target: usize, state: &K::State) -> McResult<()> {
        encode_record(state, &mut self.out[target]);
        self.out_len[target] += 1;
        if self.out_len[target] == self.windows.batch {
            self.flush_out_buffer(target)?;
        }
        Ok(())
    }

    fn flush_out_buffers(&mut self) -> McResult<()> {
        for target in 0..self.base.world {
            if target != self.base.rank && self.out_len[target] > 0 {
                self.flush_out_buffer(target)?;
            }
        }
        Ok(())
    }

    fn flush_out_buffer(&mut self, target: usize) -> McResult<()> {
        let me = self.base.rank;
        while self.windows.free.get_one(me, target) == 0 {
            self.base.cluster.check_abort(me)?;
            self.process_in_states()?;
            std::thread::yield_now();
        }
        self.windows.free.put_one(me, target, 0);
        // Always write the whole region so no stale record survives behind
        // a shorter batch.
        let count = self.out_len[target];
        self.out[target].resize(self.windows.batch_words(), 0);
        self.base.note_sent(count);
        self.windows.bufs[me].put(target, 0, &self.out[target]);
        self.out[target].clear();
        self.out_len[target] = 0;
        debug!(rank = me, target, count, "batch flushed");
        Ok(())
    }

    fn process_queue(&mut self) -> McResult<()> {
        let Some(state) = self.base.queue.pop_front() else {
            return Ok(());
        };
        let sys = self.base.sys;
        let tid = self.base.rank;
        let mut cursor = sys.succ(&state, tid, None);
        let mut result = Ok(());
        while !cursor.done() {
            let next = cursor.state();
            cursor.next();
            self.base.stats.transitions += 1;
            if let Err(e) = self.base.check_invariant(&next) {
                result = Err(e);
                break;
            }
            let owner = (state_hash(&next) % self.base.world as u64) as usize;
            let step = if owner != self.base.rank {
                self.process_out_state(owner, &next)
            } else {
                self.base.discover(next)
            };
            if let Err(e) = step {
                result = Err(e);
                break;
            }
        }
        sys.recycle(cursor, tid);
        result
    }

    fn explore(&mut self) -> McResult<()> {
        self.base.seed_initial()?;
        let mut work = true;
        loop {
            self.base.cluster.check_abort(self.base.rank)?;
            if !work && self.term.idle() {
                return Ok(());
            }
            if self.incoming_states(work) {
                self.process_in_states()?;
            }
            work = !self.base.queue.is_empty();
            if work {
                self.process_queue()?;
                self.term.wake();
            } else {
                self.flush_out_buffers()?;
                std::thread::yield_now();
            }
        }
    }

    pub fn run(mut self) -> McResult<RankStats> {
        let result = self.explore();
        self.base.finish(result)
    }
}
