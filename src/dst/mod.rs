//! Deterministic simulation testing for the swarmed explorers.
//!
//! Seed-driven random graphs are explored by the shared-memory engines for
//! several worker counts and the verdicts are compared against a sequential
//! reference computed with `petgraph`:
//!
//! ```text
//! for seed in 0..100 {
//!     let result = GraphDstHarness::new(GraphDstConfig::new(seed)).run();
//!     assert!(result.is_success(), "{}", result.summary());
//! }
//! ```
//!
//! Thread interleavings are not controlled, so a failure is reproduced by
//! rerunning the seed, usually many times.

use crate::automaton::{AccMark, Acceptance, Cube, TwaCube};
use crate::config::{McAlgorithm, McConfig};
use crate::engine::ModelChecker;
use crate::kripke::ExplicitKripke;
use crate::rng::DeterministicRng;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GraphDstConfig {
    pub seed: u64,
    pub states: u32,
    /// Out-degree is drawn uniformly in `0..=max_degree`.
    pub max_degree: u32,
    /// Probability that a state is forced to be a sink.
    pub sink_probability: f64,
    pub worker_counts: Vec<usize>,
    pub swarming: bool,
}

impl Default for GraphDstConfig {
    fn default() -> Self {
        GraphDstConfig {
            seed: 0,
            states: 40,
            max_degree: 3,
            sink_probability: 0.05,
            worker_counts: vec![1, 2, 8],
            swarming: true,
        }
    }
}

impl GraphDstConfig {
    pub fn new(seed: u64) -> Self {
        GraphDstConfig {
            seed,
            ..Default::default()
        }
    }

    /// Few edges: long chains and many trivial components.
    pub fn sparse(seed: u64) -> Self {
        GraphDstConfig {
            seed,
            states: 60,
            max_degree: 2,
            sink_probability: 0.1,
            ..Default::default()
        }
    }

    /// Many edges and no forced sinks: a few large components.
    pub fn dense(seed: u64) -> Self {
        GraphDstConfig {
            seed,
            states: 30,
            max_degree: 6,
            sink_probability: 0.0,
            ..Default::default()
        }
    }

    /// Large graph explored by eight workers at once, so that merges and
    /// finalizations race on the shared store.
    pub fn large(seed: u64) -> Self {
        GraphDstConfig {
            seed,
            states: 1500,
            max_degree: 3,
            sink_probability: 0.02,
            worker_counts: vec![8],
            swarming: true,
        }
    }
}

/// Random edge list over `config.states` states.
pub fn random_edges(config: &GraphDstConfig) -> Vec<(u32, u32)> {
    let mut rng = DeterministicRng::new(config.seed);
    let mut edges = Vec::new();
    for src in 0..config.states {
        if rng.gen_bool(config.sink_probability) {
            continue;
        }
        let degree = rng.gen_range(0, u64::from(config.max_degree) + 1);
        for _ in 0..degree {
            let dst = rng.gen_range(0, u64::from(config.states)) as u32;
            edges.push((src, dst));
        }
    }
    edges
}

/// Sequential facts about the part of a graph reachable from state 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub reachable: u64,
    pub sccs: u64,
    pub terminal_sccs: u64,
    pub has_deadlock: bool,
}

impl Reference {
    pub fn compute(states: u32, edges: &[(u32, u32)]) -> Self {
        let mut adjacency = vec![Vec::new(); states as usize];
        for &(src, dst) in edges {
            adjacency[src as usize].push(dst);
        }
        let mut reachable = HashSet::new();
        let mut todo = vec![0u32];
        reachable.insert(0u32);
        while let Some(s) = todo.pop() {
            for &d in &adjacency[s as usize] {
                if reachable.insert(d) {
                    todo.push(d);
                }
            }
        }

        let mut graph: DiGraph<u32, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..states).map(|s| graph.add_node(s)).collect();
        for &(src, dst) in edges {
            if reachable.contains(&src) {
                graph.add_edge(nodes[src as usize], nodes[dst as usize], ());
            }
        }
        let components: Vec<Vec<NodeIndex>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|c| c.iter().any(|n| reachable.contains(&graph[*n])))
            .collect();

        let terminal_sccs = components
            .iter()
            .filter(|component| {
                let members: HashSet<NodeIndex> = component.iter().copied().collect();
                component
                    .iter()
                    .all(|&n| graph.neighbors(n).all(|m| members.contains(&m)))
            })
            .count() as u64;
        let has_deadlock = reachable.iter().any(|&s| adjacency[s as usize].is_empty());

        Reference {
            reachable: reachable.len() as u64,
            sccs: components.len() as u64,
            terminal_sccs,
            has_deadlock,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphDstResult {
    pub seed: u64,
    pub reference: Reference,
    /// Engine runs performed (algorithm x worker count).
    pub runs: u64,
    pub invariant_violations: Vec<String>,
}

impl GraphDstResult {
    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Seed {}: {} reachable, {} SCCs, {} terminal, deadlock={}, {} runs, {} violations",
            self.seed,
            self.reference.reachable,
            self.reference.sccs,
            self.reference.terminal_sccs,
            self.reference.has_deadlock,
            self.runs,
            self.invariant_violations.len()
        );
        for v in &self.invariant_violations {
            out.push_str("\n  ");
            out.push_str(v);
        }
        out
    }
}

pub struct GraphDstHarness {
    config: GraphDstConfig,
    sys: ExplicitKripke,
    result: GraphDstResult,
}

impl GraphDstHarness {
    pub fn new(config: GraphDstConfig) -> Self {
        let edges = random_edges(&config);
        let sys = ExplicitKripke::from_edges(config.states, &edges);
        let reference = Reference::compute(config.states, &edges);
        let result = GraphDstResult {
            seed: config.seed,
            reference,
            runs: 0,
            invariant_violations: Vec::new(),
        };
        GraphDstHarness { config, sys, result }
    }

    fn checker(&self, algorithm: McAlgorithm, workers: usize) -> Option<ModelChecker> {
        let mut config = McConfig::test().with_algorithm(algorithm).with_workers(workers);
        if self.config.swarming {
            config = config.with_swarming(self.config.seed);
        }
        ModelChecker::new(config).ok()
    }

    fn violation(&mut self, message: String) {
        debug!(seed = self.config.seed, %message, "invariant violated");
        self.result.invariant_violations.push(message);
    }

    pub fn run(mut self) -> GraphDstResult {
        let expected = self.result.reference.clone();
        for workers in self.config.worker_counts.clone() {
            for algorithm in [McAlgorithm::Scc, McAlgorithm::TerminalScc, McAlgorithm::Deadlock] {
                let Some(checker) = self.checker(algorithm, workers) else {
                    self.violation(format!("{algorithm} x{workers}: invalid configuration"));
                    continue;
                };
                self.result.runs += 1;
                let report = match checker.check::<_, TwaCube>(&self.sys, None) {
                    Ok(report) => report,
                    Err(e) => {
                        self.violation(format!("{algorithm} x{workers}: {e}"));
                        continue;
                    }
                };
                match algorithm {
                    McAlgorithm::Scc => {
                        if report.scc_count() != expected.sccs {
                            self.violation(format!(
                                "scc x{workers}: {} SCCs, expected {}",
                                report.scc_count(),
                                expected.sccs
                            ));
                        }
                        if report.unique_states != expected.reachable {
                            self.violation(format!(
                                "scc x{workers}: {} states stored, expected {}",
                                report.unique_states, expected.reachable
                            ));
                        }
                    }
                    McAlgorithm::TerminalScc => {
                        if report.terminal_scc_count() != expected.terminal_sccs {
                            self.violation(format!(
                                "terminal_scc x{workers}: {} terminal SCCs, expected {}",
                                report.terminal_scc_count(),
                                expected.terminal_sccs
                            ));
                        }
                    }
                    _ => {
                        if report.has_deadlock() != expected.has_deadlock {
                            self.violation(format!(
                                "deadlock x{workers}: reported {}, expected {}",
                                report.has_deadlock(),
                                expected.has_deadlock
                            ));
                        }
                    }
                }
            }
        }
        self.result
    }
}

pub fn run_graph_dst_batch(
    seeds: impl IntoIterator<Item = u64>,
    config_fn: impl Fn(u64) -> GraphDstConfig,
) -> Vec<GraphDstResult> {
    seeds
        .into_iter()
        .map(|seed| GraphDstHarness::new(config_fn(seed)).run())
        .collect()
}

pub fn summarize_batch(results: &[GraphDstResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let runs: u64 = results.iter().map(|r| r.runs).sum();
    let sccs: u64 = results.iter().map(|r| r.reference.sccs).sum();
    let failed: Vec<u64> = results.iter().filter(|r| !r.is_success()).map(|r| r.seed).collect();
    let mut summary = format!("Batch: {}/{} passed, {} engine runs, {} SCCs checked", passed, total, runs, sccs);
    if !failed.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed));
    }
    summary
}

// =============================================================================
// Emptiness
// =============================================================================

const DST_APS: [&str; 2] = ["a", "b"];

#[derive(Debug, Clone)]
pub struct EmptinessDstConfig {
    pub seed: u64,
    pub states: u32,
    pub max_degree: u32,
    pub automaton_states: u32,
    /// Number of acceptance sets: 1 is Büchi, more is generalized Büchi.
    pub acceptance_sets: u32,
    pub worker_counts: Vec<usize>,
}

impl Default for EmptinessDstConfig {
    fn default() -> Self {
        EmptinessDstConfig {
            seed: 0,
            states: 40,
            max_degree: 3,
            automaton_states: 3,
            acceptance_sets: 1,
            worker_counts: vec![1, 2, 8],
        }
    }
}

impl EmptinessDstConfig {
    pub fn new(seed: u64) -> Self {
        EmptinessDstConfig {
            seed,
            ..Default::default()
        }
    }

    pub fn generalized(seed: u64) -> Self {
        EmptinessDstConfig {
            seed,
            acceptance_sets: 2,
            ..Default::default()
        }
    }
}

/// Random Kripke structure over two propositions, labels drawn per state.
pub fn random_labelled_kripke(config: &EmptinessDstConfig) -> ExplicitKripke {
    let mut rng = DeterministicRng::derived(config.seed, 1, 0);
    let mut b = ExplicitKripke::builder(DST_APS.iter().map(|s| s.to_string()).collect());
    for _ in 0..config.states {
        b.add_state(rng.gen_range(0, 4));
    }
    for src in 0..config.states {
        let degree = rng.gen_range(0, u64::from(config.max_degree) + 1);
        for _ in 0..degree {
            let dst = rng.gen_range(0, u64::from(config.states)) as u32;
            b.edge(src, dst);
        }
    }
    b.build()
}

/// Random automaton with guards over single literals (or `true`) and
/// random acceptance marks.
pub fn random_automaton(config: &EmptinessDstConfig) -> TwaCube {
    let mut rng = DeterministicRng::derived(config.seed, 2, 0);
    let acceptance = if config.acceptance_sets == 1 {
        Acceptance::buchi()
    } else {
        Acceptance::generalized_buchi(config.acceptance_sets)
    };
    let mut twa = TwaCube::new(DST_APS.iter().map(|s| s.to_string()).collect(), acceptance);
    for _ in 0..config.automaton_states {
        twa.new_state();
    }
    twa.set_initial(0);
    for src in 0..config.automaton_states {
        let degree = rng.gen_range(1, 4);
        for _ in 0..degree {
            let dst = rng.gen_range(0, u64::from(config.automaton_states)) as u32;
            let guard = match rng.gen_range(0, 5) {
                0 => Cube::top(),
                1 => Cube::top().with_true(0),
                2 => Cube::top().with_false(0),
                3 => Cube::top().with_true(1),
                _ => Cube::top().with_false(1),
            };
            let sets: Vec<u32> = (0..config.acceptance_sets).filter(|_| rng.gen_bool(0.3)).collect();
            twa.create_transition(src, guard, AccMark::from_sets(&sets), dst);
        }
    }
    twa
}

#[derive(Debug, Clone)]
pub struct EmptinessDstResult {
    pub seed: u64,
    /// Verdict of the sequential check.
    pub expected_counterexample: bool,
    pub runs: u64,
    pub invariant_violations: Vec<String>,
}

impl EmptinessDstResult {
    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Seed {}: counterexample={}, {} runs, {} violations",
            self.seed,
            self.expected_counterexample,
            self.runs,
            self.invariant_violations.len()
        );
        for v in &self.invariant_violations {
            out.push_str("\n  ");
            out.push_str(v);
        }
        out
    }
}

/// Runs the swarmed emptiness check, and CNDFS when the automaton is
/// Büchi, against the sequential `Emptiness` verdict.
pub struct EmptinessDstHarness {
    config: EmptinessDstConfig,
    sys: ExplicitKripke,
    twa: TwaCube,
}

impl EmptinessDstHarness {
    pub fn new(config: EmptinessDstConfig) -> Self {
        let sys = random_labelled_kripke(&config);
        let twa = random_automaton(&config);
        EmptinessDstHarness { config, sys, twa }
    }

    fn verdict(&self, algorithm: McAlgorithm, workers: usize) -> Result<bool, String> {
        let config = McConfig::test()
            .with_algorithm(algorithm)
            .with_workers(workers)
            .with_swarming(self.config.seed);
        let checker = ModelChecker::new(config).map_err(|e| format!("{algorithm} x{workers}: {e}"))?;
        let report = checker
            .check(&self.sys, Some(&self.twa))
            .map_err(|e| format!("{algorithm} x{workers}: {e}"))?;
        Ok(report.counterexample_found())
    }

    pub fn run(self) -> EmptinessDstResult {
        let mut result = EmptinessDstResult {
            seed: self.config.seed,
            expected_counterexample: false,
            runs: 1,
            invariant_violations: Vec::new(),
        };
        match self.verdict(McAlgorithm::Emptiness, 1) {
            Ok(expected) => result.expected_counterexample = expected,
            Err(e) => {
                result.invariant_violations.push(e);
                return result;
            }
        }
        let mut algorithms = vec![McAlgorithm::SwarmedEmptiness];
        if self.config.acceptance_sets <= 1 {
            algorithms.push(McAlgorithm::Cndfs);
        }
        for &workers in &self.config.worker_counts {
            for &algorithm in &algorithms {
                result.runs += 1;
                let message = match self.verdict(algorithm, workers) {
                    Ok(found) if found == result.expected_counterexample => continue,
                    Ok(found) => format!(
                        "{algorithm} x{workers}: counterexample={found}, expected {}",
                        result.expected_counterexample
                    ),
                    Err(e) => e,
                };
                debug!(seed = self.config.seed, %message, "invariant violated");
                result.invariant_violations.push(message);
            }
        }
        result
    }
}

pub fn run_emptiness_dst_batch(
    seeds: impl IntoIterator<Item = u64>,
    config_fn: impl Fn(u64) -> EmptinessDstConfig,
) -> Vec<EmptinessDstResult> {
    seeds
        .into_iter()
        .map(|seed| EmptinessDstHarness::new(config_fn(seed)).run())
        .collect()
}
