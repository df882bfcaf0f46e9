//! Hash-partitioned exploration over a cluster of ranks.
//!
//! `owner(state) = hash(state) mod world_size`. Every rank explores the
//! states it owns from a local queue and ships the others to their owner,
//! either through buffered one-sided windows with cooperative termination
//! ([`CepExplorer`]) or through point-to-point messages ([`SyncExplorer`]).
//! Ranks are threads of one process that share nothing but the windows,
//! the links and the [`Cluster`] (abort status and record counters).

mod cep;
mod codec;
mod sync;
mod termination;
mod window;

pub use cep::{CepExplorer, CepWindows};
pub use codec::{decode_record, encode_record, record_words, StateCodec, HEADER_WORDS};
pub use sync::{SyncExplorer, SyncLinks};
pub use termination::TerminationDetector;
pub use window::RmaWindow;

use crate::bloom::state_hash;
use crate::config::{DistributedConfig, DistributedMode};
use crate::error::{McError, McResult};
use crate::kripke::KripkeCube;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Abort code used when a rank runs out of state storage.
pub const ABORT_MEMORY: i32 = 2;
/// Abort code used when the invariant hook rejects a state.
pub const ABORT_INVARIANT: i32 = 1;

// =============================================================================
// Cluster
// =============================================================================

/// What the ranks of one run share besides their windows.
#[derive(Debug)]
pub struct Cluster {
    world_size: usize,
    /// 0 while running, otherwise the code of the first abort.
    abort: AtomicI32,
    sent: AtomicU64,
    received: AtomicU64,
}

impl Cluster {
    pub fn new(world_size: usize) -> Self {
        Cluster {
            world_size,
            abort: AtomicI32::new(0),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Collective abort: every rank stops at its next check. The first code
    /// is kept.
    pub fn abort(&self, code: i32) {
        debug_assert!(code != 0);
        if self
            .abort
            .compare_exchange(0, code, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!(code, "collective abort");
        }
    }

    pub fn aborted(&self) -> Option<i32> {
        match self.abort.load(Ordering::SeqCst) {
            0 => None,
            code => Some(code),
        }
    }

    pub fn check_abort(&self, rank: usize) -> McResult<()> {
        match self.aborted() {
            None => Ok(()),
            Some(code) => Err(McError::Aborted { rank, code }),
        }
    }

    pub fn note_sent(&self, records: u64) {
        self.sent.fetch_add(records, Ordering::SeqCst);
    }

    pub fn note_received(&self, records: u64) {
        self.received.fetch_add(records, Ordering::SeqCst);
    }

    /// Global (sent, received) record counters.
    pub fn counters(&self) -> (u64, u64) {
        (self.sent.load(Ordering::SeqCst), self.received.load(Ordering::SeqCst))
    }
}

// =============================================================================
// Per-rank statistics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankStats {
    pub rank: usize,
    /// States owned and stored by this rank.
    pub unique_states: u64,
    /// States passed to the invariant hook.
    pub processed_states: u64,
    pub transitions: u64,
    pub sent: u64,
    pub received: u64,
    pub walltime_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedReport {
    pub mode: DistributedMode,
    pub world_size: usize,
    pub ranks: Vec<RankStats>,
}

impl DistributedReport {
    /// Owners partition the state space, so per-rank counts add up.
    pub fn unique_states(&self) -> u64 {
        self.ranks.iter().map(|r| r.unique_states).sum()
    }

    pub fn sent(&self) -> u64 {
        self.ranks.iter().map(|r| r.sent).sum()
    }

    pub fn received(&self) -> u64 {
        self.ranks.iter().map(|r| r.received).sum()
    }
}

// =============================================================================
// Shared rank logic
// =============================================================================

/// Queue, visited set and bookkeeping common to both rank flavours.
pub(crate) struct RankExplorer<'a, K: KripkeCube> {
    sys: &'a K,
    rank: usize,
    world: usize,
    cluster: &'a Cluster,
    queue: VecDeque<K::State>,
    visited: AHashSet<K::State>,
    max_states: Option<usize>,
    invariant: &'a (dyn Fn(&K::State) -> bool + Sync),
    stats: RankStats,
    start: Instant,
}

impl<'a, K: KripkeCube> RankExplorer<'a, K> {
    fn new(
        sys: &'a K,
        rank: usize,
        cluster: &'a Cluster,
        max_states: Option<usize>,
        invariant: &'a (dyn Fn(&K::State) -> bool + Sync),
    ) -> Self {
        RankExplorer {
            sys,
            rank,
            world: cluster.world_size(),
            cluster,
            queue: VecDeque::new(),
            visited: AHashSet::new(),
            max_states,
            invariant,
            stats: RankStats {
                rank,
                unique_states: 0,
                processed_states: 0,
                transitions: 0,
                sent: 0,
                received: 0,
                walltime_ms: 0,
            },
            start: Instant::now(),
        }
    }

    fn owns(&self, state: &K::State) -> bool {
        (state_hash(state) % self.world as u64) as usize == self.rank
    }

    fn seed_initial(&mut self) -> McResult<()> {
        let initial = self.sys.initial(self.rank);
        self.check_invariant(&initial)?;
        if self.owns(&initial) {
            self.discover(initial)?;
        }
        Ok(())
    }

    fn check_invariant(&mut self, state: &K::State) -> McResult<()> {
        self.stats.processed_states += 1;
        if (self.invariant)(state) {
            return Ok(());
        }
        self.cluster.abort(ABORT_INVARIANT);
        Err(McError::InvariantViolated {
            rank: self.rank,
            state: self.sys.state_to_string(state),
        })
    }

    /// Record an owned state, queueing it if new.
    fn discover(&mut self, state: K::State) -> McResult<()> {
        if self.visited.contains(&state) {
            return Ok(());
        }
        if let Some(limit) = self.max_states {
            if self.visited.len() >= limit {
                self.cluster.abort(ABORT_MEMORY);
                return Err(McError::MemoryExhausted {
                    requested: self.visited.len() + 1,
                });
            }
        }
        self.visited.insert(state.clone());
        self.queue.push_back(state);
        Ok(())
    }

    fn note_sent(&mut self, records: usize) {
        self.stats.sent += records as u64;
        self.cluster.note_sent(records as u64);
    }

    fn note_received(&mut self, records: usize) {
        self.stats.received += records as u64;
        self.cluster.note_received(records as u64);
    }

    fn finish(mut self, result: McResult<()>) -> McResult<RankStats> {
        result?;
        self.stats.unique_states = self.visited.len() as u64;
        self.stats.walltime_ms = self.start.elapsed().as_millis() as u64;
        info!(
            rank = self.rank,
            unique_states = self.stats.unique_states,
            sent = self.stats.sent,
            received = self.stats.received,
            "rank finished"
        );
        Ok(self.stats)
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Explore `sys` over `config.world_size` ranks.
pub fn run_distributed<K>(sys: &K, config: &DistributedConfig) -> McResult<DistributedReport>
where
    K: KripkeCube,
    K::State: StateCodec,
{
    run_distributed_with(sys, config, |_| true)
}

/// Like [`run_distributed`], checking `invariant` on every generated state;
/// a violation aborts every rank.
pub fn run_distributed_with<K, I>(sys: &K, config: &DistributedConfig, invariant: I) -> McResult<DistributedReport>
where
    K: KripkeCube,
    K::State: StateCodec,
    I: Fn(&K::State) -> bool + Sync,
{
    config.validate()?;
    let world = config.world_size;
    let cluster = Cluster::new(world);
    let invariant: &(dyn Fn(&K::State) -> bool + Sync) = &invariant;
    let words = record_words(&sys.initial(0));
    let batch = config.batch_size(words);
    info!(world, mode = ?config.mode, batch, "distributed run started");

    let results: Vec<thread::Result<McResult<RankStats>>> = match config.mode {
        DistributedMode::Cooperative => {
            let windows = CepWindows::new(world, batch, words);
            spawn_ranks(world, |rank| {
                CepExplorer::new(sys, rank, &cluster, &windows, config, invariant).run()
            })
        }
        DistributedMode::Synchronous => {
            let links = SyncLinks::new(world);
            spawn_ranks(world, |rank| {
                SyncExplorer::new(sys, rank, &cluster, &links, config, invariant).run()
            })
        }
    };

    let mut ranks = Vec::with_capacity(world);
    let mut cause = None;
    for result in results {
        match result {
            Ok(Ok(stats)) => ranks.push(stats),
            // Keep the error of the rank that triggered the abort.
            Ok(Err(e @ McError::Aborted { .. })) => {
                cause.get_or_insert(e);
            }
            Ok(Err(e)) => {
                if matches!(cause, None | Some(McError::Aborted { .. })) {
                    cause = Some(e);
                }
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
    if let Some(e) = cause {
        return Err(e);
    }
    ranks.sort_by_key(|r| r.rank);
    Ok(DistributedReport {
        mode: config.mode,
        world_size: world,
        ranks,
    })
}

fn spawn_ranks<F>(world: usize, body: F) -> Vec<thread::Result<McResult<RankStats>>>
where
    F: Fn(usize) -> McResult<RankStats> + Sync,
{
    thread::scope(|scope| {
        let handles: Vec<_> = (0..world)
            .map(|rank| {
                let body = &body;
                scope.spawn(move || {
                    let span = info_span!("rank", rank);
                    let _guard = span.enter();
                    body(rank)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kripke::ExplicitKripke;

    fn config(world_size: usize, mode: DistributedMode) -> DistributedConfig {
        DistributedConfig {
            world_size,
            mode,
            idle_timeout_ms: 10,
            ..DistributedConfig::default()
        }
    }

    #[test]
    fn test_single_rank_explores_everything() {
        let sys = ExplicitKripke::from_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        let report = run_distributed(&sys, &config(1, DistributedMode::Cooperative)).unwrap();
        assert_eq!(report.unique_states(), 4);
        assert_eq!(report.sent(), 0);
    }

    #[test]
    fn test_cluster_abort_keeps_first_code() {
        let cluster = Cluster::new(2);
        assert!(cluster.check_abort(0).is_ok());
        cluster.abort(ABORT_MEMORY);
        cluster.abort(ABORT_INVARIANT);
        assert_eq!(cluster.aborted(), Some(ABORT_MEMORY));
        assert!(matches!(
            cluster.check_abort(1),
            Err(McError::Aborted { rank: 1, code: ABORT_MEMORY })
        ));
    }
}
