//! Synchronous rank: one message per remote state over point-to-point links,
//! with a non-blocking receive poll between two local expansions.

use super::codec::{decode_record, encode_record, StateCodec};
use super::termination::TerminationDetector;
use super::window::RmaWindow;
use super::{Cluster, RankExplorer, RankStats};
use crate::bloom::state_hash;
use crate::config::DistributedConfig;
use crate::error::McResult;
use crate::kripke::{KripkeCube, SuccCursor};
use crossbeam::channel::{Receiver, Sender, TryRecvError};
use std::time::Duration;

/// Full mesh of links: `senders[dest]` and one inbox per rank.
pub struct SyncLinks {
    senders: Vec<Sender<Vec<i32>>>,
    inboxes: Vec<Receiver<Vec<i32>>>,
    finish: RmaWindow,
}

impl SyncLinks {
    pub fn new(world_size: usize) -> Self {
        let (senders, inboxes) = (0..world_size).map(|_| crossbeam::channel::unbounded()).unzip();
        SyncLinks {
            senders,
            inboxes,
            finish: RmaWindow::new(world_size, world_size, 0),
        }
    }
}

pub struct SyncExplorer<'a, K: KripkeCube> {
    base: RankExplorer<'a, K>,
    links: &'a SyncLinks,
    term: TerminationDetector<'a>,
    record: Vec<i32>,
}

impl<'a, K> SyncExplorer<'a, K>
where
    K: KripkeCube,
    K::State: StateCodec,
{
    pub fn new(
        sys: &'a K,
        rank: usize,
        cluster: &'a Cluster,
        links: &'a SyncLinks,
        config: &DistributedConfig,
        invariant: &'a (dyn Fn(&K::State) -> bool + Sync),
    ) -> Self {
        SyncExplorer {
            base: RankExplorer::new(sys, rank, cluster, config.max_states_per_rank, invariant),
            links,
            term: TerminationDetector::new(
                rank,
                &links.finish,
                cluster,
                Duration::from_millis(config.idle_timeout_ms),
            ),
            record: Vec::new(),
        }
    }

    /// Drain the inbox without blocking.
    fn poll_incoming(&mut self) -> McResult<()> {
        loop {
            match self.links.inboxes[self.base.rank].try_recv() {
                Ok(record) => {
                    self.term.wake();
                    if let Some(state) = decode_record::<K::State>(&record) {
                        self.base.discover(state)?;
                    }
                    self.base.note_received(1);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn send(&mut self, target: usize, state: &K::State) {
        self.record.clear();
        encode_record(state, &mut self.record);
        self.base.note_sent(1);
        // Every inbox outlives the ranks, so the send cannot fail.
        let _ = self.links.senders[target].send(self.record.clone());
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
            if owner != self.base.rank {
                self.send(owner, &next);
            } else if let Err(e) = self.base.discover(next) {
                result = Err(e);
                break;
            }
        }
        sys.recycle(cursor, tid);
        result
    }

    fn explore(&mut self) -> McResult<()> {
        self.base.seed_initial()?;
        loop {
            self.base.cluster.check_abort(self.base.rank)?;
            self.poll_incoming()?;
            if self.base.queue.is_empty() {
                if self.term.idle() {
                    return Ok(());
                }
                std::thread::yield_now();
            } else {
                self.process_queue()?;
                self.term.wake();
            }
        }
    }

    pub fn run(mut self) -> McResult<RankStats> {
        let result = self.explore();
        self.base.finish(result)
    }
}
