//! Run configuration.
//!
//! Loaded from environment variables:
//! - `MC_WORKERS`: number of worker threads (default: available parallelism, at most 64)
//! - `MC_ALGORITHM`: one of the [`McAlgorithm`] names, e.g. `deadlock`, `scc`, `emptiness`
//! - `MC_TRACE`: compute counterexample traces (`true`/`1`)
//! - `MC_SWARM_SEED`: seed for per-worker successor shuffling; setting it enables swarming
//! - `MC_MAX_STATES`: refuse to store more distinct states
//! - `MC_IDLE_TIMEOUT_MS`: distributed idle time before a rank posts "finished"
//! - `MC_WORLD_SIZE`: number of ranks of a distributed run
//!
//! or from a TOML document with the same field names.

use crate::error::{McError, McResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Worker and rank masks are 64-bit.
pub const MAX_WORKERS: usize = 64;

// =============================================================================
// Algorithm selection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McAlgorithm {
    /// Swarmed deadlock detection over the exact store.
    Deadlock,
    /// Deadlock detection keeping only open states exactly, closed ones in a Bloom filter.
    DeadlockBitstate,
    /// Non-progress cycle detection.
    Livelock,
    /// Swarmed SCC decomposition.
    Scc,
    /// SCC decomposition counting terminal (bottom) components.
    TerminalScc,
    /// SCC decomposition with the expanded-destination reduction proviso.
    CondDestScc,
    /// SCC decomposition with the expanded-source reduction proviso.
    CondSourceScc,
    /// Emptiness check through the swarmed SCC driver on the product graph.
    SwarmedEmptiness,
    /// Collaborative nested DFS on the product graph (Büchi only).
    Cndfs,
    /// One full sequential product emptiness check per worker.
    Emptiness,
    /// Sequential reachability with an exact visited set.
    Reachability,
    /// Sequential reachability with the bitstate table.
    BitstateReachability,
}

impl McAlgorithm {
    pub const ALL: [McAlgorithm; 12] = [
        McAlgorithm::Deadlock,
        McAlgorithm::DeadlockBitstate,
        McAlgorithm::Livelock,
        McAlgorithm::Scc,
        McAlgorithm::TerminalScc,
        McAlgorithm::CondDestScc,
        McAlgorithm::CondSourceScc,
        McAlgorithm::SwarmedEmptiness,
        McAlgorithm::Cndfs,
        McAlgorithm::Emptiness,
        McAlgorithm::Reachability,
        McAlgorithm::BitstateReachability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            McAlgorithm::Deadlock => "deadlock",
            McAlgorithm::DeadlockBitstate => "deadlock_bitstate",
            McAlgorithm::Livelock => "livelock",
            McAlgorithm::Scc => "scc",
            McAlgorithm::TerminalScc => "terminal_scc",
            McAlgorithm::CondDestScc => "cond_dest_scc",
            McAlgorithm::CondSourceScc => "cond_source_scc",
            McAlgorithm::SwarmedEmptiness => "swarmed_emptiness",
            McAlgorithm::Cndfs => "cndfs",
            McAlgorithm::Emptiness => "emptiness",
            McAlgorithm::Reachability => "reachability",
            McAlgorithm::BitstateReachability => "bitstate_reachability",
        }
    }

    pub fn needs_property(&self) -> bool {
        matches!(
            self,
            McAlgorithm::SwarmedEmptiness | McAlgorithm::Cndfs | McAlgorithm::Emptiness
        )
    }

    /// Sequential algorithms run on worker 0 only.
    pub fn is_sequential(&self) -> bool {
        matches!(self, McAlgorithm::Reachability | McAlgorithm::BitstateReachability)
    }
}

impl FromStr for McAlgorithm {
    type Err = McError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        McAlgorithm::ALL
            .iter()
            .copied()
            .find(|a| a.name() == normalized)
            .ok_or_else(|| McError::InvalidConfig(format!("unknown algorithm '{}'", s)))
    }
}

impl std::fmt::Display for McAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Bloom filter sizing for the deadlock-bitstate explorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    /// Number of bits.
    pub mem_bits: u64,
    /// Hash functions per element.
    pub hash_count: u32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        BloomConfig {
            mem_bits: 1 << 24,
            hash_count: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributedMode {
    /// Buffered one-sided windows with cooperative termination.
    Cooperative,
    /// Point-to-point sends and receive polls.
    Synchronous,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    pub world_size: usize,
    pub mode: DistributedMode,
    /// Outgoing buffer budget per destination, in bytes.
    pub mtu_bytes: usize,
    /// Idle time after which a rank posts "finished".
    pub idle_timeout_ms: u64,
    /// Local states processed between two full scans of incoming windows.
    pub check_all_buffers: usize,
    /// Per-rank limit on stored states; exceeding it aborts every rank.
    pub max_states_per_rank: Option<usize>,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        DistributedConfig {
            world_size: 2,
            mode: DistributedMode::Cooperative,
            mtu_bytes: 1500,
            idle_timeout_ms: 100,
            check_all_buffers: 10_000,
            max_states_per_rank: None,
        }
    }
}

impl DistributedConfig {
    pub fn validate(&self) -> McResult<()> {
        if self.world_size == 0 || self.world_size > MAX_WORKERS {
            return Err(McError::InvalidConfig(format!(
                "world_size must be in 1..={}, got {}",
                MAX_WORKERS, self.world_size
            )));
        }
        if self.mtu_bytes < 4 {
            return Err(McError::InvalidConfig("mtu_bytes must hold one word".into()));
        }
        if self.check_all_buffers == 0 {
            return Err(McError::InvalidConfig("check_all_buffers must be positive".into()));
        }
        if self.max_states_per_rank == Some(0) {
            return Err(McError::InvalidConfig("max_states_per_rank must be positive".into()));
        }
        Ok(())
    }

    /// States per outgoing batch for records of `record_words` 32-bit words.
    pub fn batch_size(&self, record_words: usize) -> usize {
        (self.mtu_bytes / (record_words.max(1) * 4)).max(1)
    }
}

// =============================================================================
// McConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McConfig {
    pub workers: usize,
    pub algorithm: McAlgorithm,
    pub compute_trace: bool,
    pub swarming: bool,
    pub swarm_seed: u64,
    pub bloom: BloomConfig,
    /// log2 of the bitstate table size.
    pub bitstate_bits: u32,
    /// Refuse to store more distinct states (shared-memory engines).
    pub max_states: Option<usize>,
    pub distributed: DistributedConfig,
}

impl Default for McConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_WORKERS);
        McConfig {
            workers,
            algorithm: McAlgorithm::Scc,
            compute_trace: false,
            swarming: false,
            swarm_seed: 0,
            bloom: BloomConfig::default(),
            bitstate_bits: 24,
            max_states: None,
            distributed: DistributedConfig::default(),
        }
    }
}

impl McConfig {
    /// Small single-worker configuration for tests.
    pub fn test() -> Self {
        McConfig {
            workers: 1,
            bitstate_bits: 16,
            bloom: BloomConfig {
                mem_bits: 1 << 16,
                hash_count: 3,
            },
            distributed: DistributedConfig {
                idle_timeout_ms: 20,
                ..DistributedConfig::default()
            },
            ..McConfig::default()
        }
    }

    pub fn from_env() -> McResult<Self> {
        let mut config = McConfig::default();
        if let Some(workers) = env_parse::<usize>("MC_WORKERS")? {
            config.workers = workers;
        }
        if let Ok(algorithm) = std::env::var("MC_ALGORITHM") {
            config.algorithm = algorithm.parse()?;
        }
        config.compute_trace = std::env::var("MC_TRACE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        if let Some(seed) = env_parse::<u64>("MC_SWARM_SEED")? {
            config.swarm_seed = seed;
            config.swarming = true;
        }
        config.max_states = env_parse::<usize>("MC_MAX_STATES")?;
        if let Some(timeout) = env_parse::<u64>("MC_IDLE_TIMEOUT_MS")? {
            config.distributed.idle_timeout_ms = timeout;
        }
        if let Some(world) = env_parse::<usize>("MC_WORLD_SIZE")? {
            config.distributed.world_size = world;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> McResult<Self> {
        let config: McConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> McResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_algorithm(mut self, algorithm: McAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_trace(mut self, compute_trace: bool) -> Self {
        self.compute_trace = compute_trace;
        self
    }

    pub fn with_swarming(mut self, seed: u64) -> Self {
        self.swarming = true;
        self.swarm_seed = seed;
        self
    }

    pub fn with_max_states(mut self, max_states: usize) -> Self {
        self.max_states = Some(max_states);
        self
    }

    pub fn with_world_size(mut self, world_size: usize) -> Self {
        self.distributed.world_size = world_size;
        self
    }

    pub fn with_distributed_mode(mut self, mode: DistributedMode) -> Self {
        self.distributed.mode = mode;
        self
    }

    pub fn validate(&self) -> McResult<()> {
        if self.workers == 0 {
            return Err(McError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.workers > MAX_WORKERS {
            return Err(McError::InvalidConfig(format!(
                "at most {} workers are supported, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        if !(1..=32).contains(&self.bitstate_bits) {
            return Err(McError::InvalidConfig(format!(
                "bitstate_bits must be in 1..=32, got {}",
                self.bitstate_bits
            )));
        }
        if self.bloom.mem_bits == 0 || self.bloom.hash_count == 0 {
            return Err(McError::InvalidConfig(
                "bloom filter needs at least one bit and one hash".into(),
            ));
        }
        if self.max_states == Some(0) {
            return Err(McError::InvalidConfig("max_states must be positive".into()));
        }
        self.distributed.validate()
    }
}

fn env_parse<T: FromStr>(key: &str) -> McResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| McError::InvalidConfig(format!("{}: cannot parse '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = McConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.workers >= 1 && config.workers <= MAX_WORKERS);
        assert_eq!(config.distributed.idle_timeout_ms, 100);
        assert_eq!(config.distributed.mtu_bytes, 1500);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(McConfig::test().with_workers(0).validate().is_err());
        assert!(McConfig::test().with_workers(65).validate().is_err());
        assert!(McConfig::test().with_world_size(0).validate().is_err());
        let mut c = McConfig::test();
        c.bitstate_bits = 40;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_algorithm_names_round_trip() {
        for a in McAlgorithm::ALL {
            assert_eq!(a.name().parse::<McAlgorithm>().unwrap(), a);
        }
        assert_eq!("deadlock-bitstate".parse::<McAlgorithm>().unwrap(), McAlgorithm::DeadlockBitstate);
        assert!("bogus".parse::<McAlgorithm>().is_err());
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            workers = 4
            algorithm = "livelock"
            compute_trace = true

            [distributed]
            world_size = 3
            mode = "synchronous"
            idle_timeout_ms = 25
        "#;
        let config = McConfig::from_toml_str(text).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.algorithm, McAlgorithm::Livelock);
        assert!(config.compute_trace);
        assert_eq!(config.distributed.world_size, 3);
        assert_eq!(config.distributed.mode, DistributedMode::Synchronous);
        assert_eq!(config.distributed.idle_timeout_ms, 25);
        assert_eq!(config.distributed.mtu_bytes, 1500);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(matches!(McConfig::from_toml_str("workers = 0"), Err(McError::InvalidConfig(_))));
        assert!(matches!(McConfig::from_toml_str("workers = ["), Err(McError::Config(_))));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mc.toml");
        std::fs::write(&path, "workers = 2\nalgorithm = \"deadlock\"\n").unwrap();
        let config = McConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.algorithm, McAlgorithm::Deadlock);
        assert!(matches!(
            McConfig::from_toml_file(dir.path().join("missing.toml")),
            Err(McError::Io(_))
        ));
    }

    #[test]
    fn test_batch_size() {
        let d = DistributedConfig::default();
        // 1500 bytes / (3 words * 4 bytes)
        assert_eq!(d.batch_size(3), 125);
        assert_eq!(d.batch_size(1_000), 1);
    }
}
