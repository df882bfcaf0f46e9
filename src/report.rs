//! Run statistics and verdicts.
//!
//! Every worker returns a [`WorkerStats`]; the engine folds them into one
//! [`McReport`]. Reports serialize to JSON and to one CSV line per worker.

use serde::{Deserialize, Serialize};

/// Per-worker outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McStatus {
    Deadlock,
    NoDeadlock,
    Livelock,
    NoLivelock,
    Empty,
    NotEmpty,
    Success,
    /// Stopped before completion by another worker or by an error.
    Interrupted,
}

impl McStatus {
    pub fn name(&self) -> &'static str {
        match self {
            McStatus::Deadlock => "deadlock",
            McStatus::NoDeadlock => "no_deadlock",
            McStatus::Livelock => "livelock",
            McStatus::NoLivelock => "no_livelock",
            McStatus::Empty => "empty",
            McStatus::NotEmpty => "not_empty",
            McStatus::Success => "success",
            McStatus::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub tid: usize,
    pub states: u64,
    pub transitions: u64,
    pub sccs: u64,
    pub terminal_sccs: u64,
    pub max_dfs: u64,
    /// States this worker inserted first into the shared store.
    pub inserted: u64,
    pub walltime_ms: u64,
    pub status: McStatus,
    /// Deadlock witness or counterexample, if this worker produced one.
    pub trace: Option<String>,
}

impl WorkerStats {
    pub fn new(tid: usize) -> Self {
        WorkerStats {
            tid,
            states: 0,
            transitions: 0,
            sccs: 0,
            terminal_sccs: 0,
            max_dfs: 0,
            inserted: 0,
            walltime_ms: 0,
            status: McStatus::Interrupted,
            trace: None,
        }
    }

    pub fn observe_depth(&mut self, depth: usize) {
        self.max_dfs = self.max_dfs.max(depth as u64);
    }

    pub fn csv_header() -> &'static str {
        "algorithm,tid,status,states,transitions,sccs,terminal_sccs,max_dfs,inserted,walltime_ms"
    }

    pub fn csv_line(&self, algorithm: &str) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            algorithm,
            self.tid,
            self.status.name(),
            self.states,
            self.transitions,
            self.sccs,
            self.terminal_sccs,
            self.max_dfs,
            self.inserted,
            self.walltime_ms
        )
    }
}

/// Aggregated, user-visible outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    DeadlockFound { witness: String },
    LivelockFound,
    CounterexampleFound { trace: Option<String> },
    /// No deadlock, livelock or accepting run; statistics are in the report.
    Holds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McReport {
    pub algorithm: String,
    pub workers: usize,
    pub verdict: Verdict,
    /// Distinct states in the shared store (0 for per-worker exploration).
    pub unique_states: u64,
    pub walltime_ms: u64,
    pub per_worker: Vec<WorkerStats>,
}

impl McReport {
    pub fn has_deadlock(&self) -> bool {
        matches!(self.verdict, Verdict::DeadlockFound { .. })
    }

    pub fn has_livelock(&self) -> bool {
        matches!(self.verdict, Verdict::LivelockFound)
    }

    pub fn counterexample_found(&self) -> bool {
        matches!(self.verdict, Verdict::CounterexampleFound { .. })
    }

    pub fn witness(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::DeadlockFound { witness } => Some(witness),
            _ => None,
        }
    }

    pub fn trace(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::CounterexampleFound { trace } => trace.as_deref(),
            Verdict::DeadlockFound { witness } => Some(witness),
            _ => None,
        }
    }

    /// Components finalized over all workers; each is finalized exactly once.
    pub fn scc_count(&self) -> u64 {
        self.per_worker.iter().map(|w| w.sccs).sum()
    }

    pub fn terminal_scc_count(&self) -> u64 {
        self.per_worker.iter().map(|w| w.terminal_sccs).sum()
    }

    /// Distinct states of the run. Algorithms sharing a store report its
    /// size; per-worker explorations (`unique_states == 0`) report the
    /// largest number of states a single worker explored.
    pub fn states_visited(&self) -> u64 {
        if self.unique_states > 0 {
            return self.unique_states;
        }
        self.per_worker.iter().map(|w| w.states).max().unwrap_or(0)
    }

    pub fn transitions_visited(&self) -> u64 {
        self.per_worker.iter().map(|w| w.transitions).max().unwrap_or(0)
    }

    pub fn inserted(&self) -> u64 {
        self.per_worker.iter().map(|w| w.inserted).sum()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }

    /// Header plus one line per worker.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(WorkerStats::csv_header());
        out.push('\n');
        for w in &self.per_worker {
            out.push_str(&w.csv_line(&self.algorithm));
            out.push('\n');
        }
        out
    }

    pub fn summary(&self) -> String {
        let verdict = match &self.verdict {
            Verdict::DeadlockFound { witness } => format!("deadlock at {}", witness),
            Verdict::LivelockFound => "livelock".to_string(),
            Verdict::CounterexampleFound { .. } => "counterexample".to_string(),
            Verdict::Holds => "holds".to_string(),
        };
        format!(
            "{}: {} ({} workers, {} unique states, {} SCCs, {}ms)",
            self.algorithm,
            verdict,
            self.workers,
            self.unique_states,
            self.scc_count(),
            self.walltime_ms
        )
    }
}
