//! Run entry point.
//!
//! [`ModelChecker::check`] validates the configuration against the system
//! and the property, builds the shared structures of the selected
//! algorithm, runs one explorer per worker and folds the per-worker
//! statistics into an [`McReport`].

mod pool;

pub use crate::config::McAlgorithm;
pub use pool::{run_workers, FnWorker};

use crate::automaton::Automaton;
use crate::bloom::BloomFilter;
use crate::config::McConfig;
use crate::dfs::{
    reachable_bitstate, reachable_exact, CondDestStrategy, CondSourceStrategy, DeadlockBitstateExplorer,
    DeadlockExplorer, EmptinessStrategy, LivelockExplorer, LivelockShared, OpenTable, PlainStrategy, SccExplorer,
    TerminalStrategy,
};
use crate::error::{McError, McResult};
use crate::kripke::{KripkeCube, SwarmedKripke};
use crate::product::{modelcheck, CndfsExplorer, ProductKripke};
use crate::report::{McReport, McStatus, Verdict, WorkerStats};
use crate::store::StateStore;
use crate::unionfind::SharedUnionFind;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::{info, warn};

pub struct ModelChecker {
    config: McConfig,
}

impl ModelChecker {
    pub fn new(config: McConfig) -> McResult<Self> {
        config.validate()?;
        Ok(ModelChecker { config })
    }

    pub fn config(&self) -> &McConfig {
        &self.config
    }

    /// Check `sys`, against `property` for the emptiness algorithms.
    pub fn check<K, A>(&self, sys: &K, property: Option<&A>) -> McResult<McReport>
    where
        K: KripkeCube,
        A: Automaton,
    {
        let algorithm = self.config.algorithm;
        if algorithm.needs_property() {
            let twa = property.ok_or(McError::MissingProperty)?;
            let system_aps = sys.ap();
            if system_aps.as_slice() != twa.ap() {
                return Err(McError::ApMismatch {
                    system: system_aps,
                    property: twa.ap().to_vec(),
                });
            }
        }

        let workers = if algorithm.is_sequential() { 1 } else { self.config.workers };
        info!(
            algorithm = algorithm.name(),
            workers,
            swarming = self.config.swarming,
            "model checking started"
        );
        let start = Instant::now();
        let (per_worker, unique_states) = if self.config.swarming {
            let swarmed = SwarmedKripke::new(sys, self.config.swarm_seed);
            self.dispatch(&swarmed, property, workers)?
        } else {
            self.dispatch(sys, property, workers)?
        };

        let report = McReport {
            algorithm: algorithm.name().to_string(),
            workers,
            verdict: verdict(&per_worker),
            unique_states,
            walltime_ms: start.elapsed().as_millis() as u64,
            per_worker,
        };
        info!(summary = %report.summary(), "model checking finished");
        Ok(report)
    }

    fn dispatch<K, A>(&self, sys: &K, property: Option<&A>, workers: usize) -> McResult<(Vec<WorkerStats>, u64)>
    where
        K: KripkeCube,
        A: Automaton,
    {
        let config = &self.config;
        let stop = AtomicBool::new(false);
        let stop = &stop;
        match config.algorithm {
            McAlgorithm::Deadlock => {
                let store = StateStore::with_limit(config.max_states);
                let stats = run_workers(workers, |tid| DeadlockExplorer::new(sys, &store, tid, stop))?;
                Ok((stats, store.len() as u64))
            }
            McAlgorithm::DeadlockBitstate => {
                let open = OpenTable::new();
                let bloom = BloomFilter::new(config.bloom.mem_bits, config.bloom.hash_count);
                let stats = run_workers(workers, |tid| {
                    DeadlockBitstateExplorer::new(sys, &open, &bloom, tid, stop)
                })?;
                Ok((stats, 0))
            }
            McAlgorithm::Livelock => {
                let shared = LivelockShared::new(StateStore::with_limit(config.max_states));
                let stats = run_workers(workers, |tid| LivelockExplorer::new(sys, &shared, tid, stop))?;
                Ok((stats, shared.store().len() as u64))
            }
            McAlgorithm::Scc => {
                let uf = SharedUnionFind::new(StateStore::with_limit(config.max_states));
                let stats = run_workers(workers, |tid| SccExplorer::new(sys, &uf, tid, stop, PlainStrategy))?;
                Ok((stats, uf.len() as u64))
            }
            McAlgorithm::TerminalScc => {
                let uf = SharedUnionFind::new(StateStore::with_limit(config.max_states));
                let stats = run_workers(workers, |tid| {
                    SccExplorer::new(sys, &uf, tid, stop, TerminalStrategy::default())
                })?;
                Ok((stats, uf.len() as u64))
            }
            McAlgorithm::CondDestScc => {
                let uf = SharedUnionFind::new(StateStore::with_limit(config.max_states));
                let stats = run_workers(workers, |tid| SccExplorer::new(sys, &uf, tid, stop, CondDestStrategy))?;
                Ok((stats, uf.len() as u64))
            }
            McAlgorithm::CondSourceScc => {
                let uf = SharedUnionFind::new(StateStore::with_limit(config.max_states));
                let stats = run_workers(workers, |tid| SccExplorer::new(sys, &uf, tid, stop, CondSourceStrategy))?;
                Ok((stats, uf.len() as u64))
            }
            McAlgorithm::SwarmedEmptiness => {
                let twa = property.ok_or(McError::MissingProperty)?;
                let acceptance = *twa.acceptance();
                if !acceptance.shape().is_generalized_buchi() {
                    return Err(McError::UnsupportedAcceptance {
                        strategy: "swarmed_emptiness",
                        shape: acceptance.shape(),
                    });
                }
                let product = ProductKripke::new(sys, twa);
                let uf = SharedUnionFind::new(StateStore::with_limit(config.max_states));
                let stats = run_workers(workers, |tid| {
                    SccExplorer::new(&product, &uf, tid, stop, EmptinessStrategy::new(acceptance))
                        .with_trace(config.compute_trace)
                })?;
                Ok((stats, uf.len() as u64))
            }
            McAlgorithm::Cndfs => {
                let twa = property.ok_or(McError::MissingProperty)?;
                CndfsExplorer::<K, A>::supports(twa.acceptance())?;
                let store = StateStore::with_limit(config.max_states);
                let stats = run_workers(workers, |tid| {
                    CndfsExplorer::new(sys, twa, &store, tid, stop).with_trace(config.compute_trace)
                })?;
                Ok((stats, store.len() as u64))
            }
            McAlgorithm::Emptiness => {
                let twa = property.ok_or(McError::MissingProperty)?;
                let stats = run_workers(workers, |tid| {
                    FnWorker(move || modelcheck(sys, twa, tid, config.compute_trace))
                })?;
                Ok((stats, 0))
            }
            McAlgorithm::Reachability => {
                let stats = run_workers(1, |tid| FnWorker(move || Ok(reachable_exact(sys, tid))))?;
                let unique = stats.first().map(|s| s.states).unwrap_or(0);
                Ok((stats, unique))
            }
            McAlgorithm::BitstateReachability => {
                let bits = config.bitstate_bits;
                let stats = run_workers(1, |tid| FnWorker(move || Ok(reachable_bitstate(sys, tid, bits))))?;
                let unique = stats.first().map(|s| s.states).unwrap_or(0);
                Ok((stats, unique))
            }
        }
    }
}

/// Fold per-worker outcomes into the run verdict. Traces come from the
/// first worker that produced one.
fn verdict(per_worker: &[WorkerStats]) -> Verdict {
    let with_status = |status: McStatus| per_worker.iter().filter(move |w| w.status == status);
    if let Some(w) = with_status(McStatus::Deadlock).next() {
        return Verdict::DeadlockFound {
            witness: w.trace.clone().unwrap_or_default(),
        };
    }
    if with_status(McStatus::Livelock).next().is_some() {
        return Verdict::LivelockFound;
    }
    if with_status(McStatus::NotEmpty).next().is_some() {
        let trace = with_status(McStatus::NotEmpty).find_map(|w| w.trace.clone());
        return Verdict::CounterexampleFound { trace };
    }
    if per_worker.iter().all(|w| w.status == McStatus::Interrupted) {
        warn!("every worker was interrupted before completion");
    }
    Verdict::Holds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::TwaCube;
    use crate::kripke::ExplicitKripke;

    fn checker(algorithm: McAlgorithm, workers: usize) -> ModelChecker {
        ModelChecker::new(McConfig::test().with_algorithm(algorithm).with_workers(workers)).unwrap()
    }

    #[test]
    fn test_missing_property_is_rejected() {
        let sys = ExplicitKripke::from_edges(1, &[(0, 0)]);
        let result = checker(McAlgorithm::Emptiness, 1).check::<_, TwaCube>(&sys, None);
        assert!(matches!(result, Err(McError::MissingProperty)));
    }

    #[test]
    fn test_ap_mismatch_is_rejected() {
        let sys = ExplicitKripke::from_edges(1, &[(0, 0)]);
        let twa = TwaCube::eventually(vec!["p".to_string()], 0);
        let result = checker(McAlgorithm::SwarmedEmptiness, 1).check(&sys, Some(&twa));
        assert!(matches!(result, Err(McError::ApMismatch { .. })));
    }

    #[test]
    fn test_property_ignored_by_system_algorithms() {
        let sys = ExplicitKripke::from_edges(2, &[(0, 1), (1, 0)]);
        let report = checker(McAlgorithm::Scc, 2).check::<_, TwaCube>(&sys, None).unwrap();
        assert_eq!(report.scc_count(), 1);
        assert_eq!(report.unique_states, 2);
        assert_eq!(report.verdict, Verdict::Holds);
    }

    #[test]
    fn test_sequential_algorithms_use_one_worker() {
        let sys = ExplicitKripke::from_edges(3, &[(0, 1), (1, 2)]);
        let report = checker(McAlgorithm::Reachability, 4).check::<_, TwaCube>(&sys, None).unwrap();
        assert_eq!(report.workers, 1);
        assert_eq!(report.unique_states, 3);
    }

    #[test]
    fn test_cndfs_rejects_generalized_buchi() {
        use crate::automaton::Acceptance;
        let sys = ExplicitKripke::from_edges(1, &[(0, 0)]);
        let twa = TwaCube::new(Vec::new(), Acceptance::generalized_buchi(2));
        let result = checker(McAlgorithm::Cndfs, 2).check(&sys, Some(&twa));
        assert!(matches!(result, Err(McError::UnsupportedAcceptance { strategy: "cndfs", .. })));
    }

    #[test]
    fn test_verdict_prefers_deadlock_witness() {
        let mut a = WorkerStats::new(0);
        a.status = McStatus::Interrupted;
        let mut b = WorkerStats::new(1);
        b.status = McStatus::Deadlock;
        b.trace = Some("s4".into());
        assert_eq!(
            verdict(&[a, b]),
            Verdict::DeadlockFound {
                witness: "s4".into()
            }
        );
    }
}
