//! Multi-seed simulation runs: random graphs explored with 1, 2 and 8
//! workers, every verdict compared against the sequential reference.
//! Emptiness batches compare the swarmed check and CNDFS against the
//! sequential emptiness check on random products.

use swarm_mc::dst::{
    run_emptiness_dst_batch, run_graph_dst_batch, summarize_batch, EmptinessDstConfig, EmptinessDstResult, GraphDstConfig,
};

fn assert_batch(results: &[swarm_mc::dst::GraphDstResult]) {
    let summary = summarize_batch(results);
    for r in results {
        assert!(r.is_success(), "{}", r.summary());
    }
    println!("{}", summary);
}

#[test]
fn test_graph_dst_50_seeds_default() {
    let results = run_graph_dst_batch(0..50, GraphDstConfig::new);
    assert_batch(&results);
}

#[test]
fn test_graph_dst_50_seeds_sparse() {
    let results = run_graph_dst_batch(100..150, GraphDstConfig::sparse);
    assert_batch(&results);
}

#[test]
fn test_graph_dst_50_seeds_dense() {
    let results = run_graph_dst_batch(200..250, GraphDstConfig::dense);
    assert_batch(&results);
}

#[test]
fn test_graph_dst_without_swarming() {
    let results = run_graph_dst_batch(300..320, |seed| GraphDstConfig {
        swarming: false,
        ..GraphDstConfig::new(seed)
    });
    assert_batch(&results);
}

#[test]
#[ignore] // Run with: cargo test graph_dst_1000 -- --ignored --nocapture
fn test_graph_dst_1000_seeds_large() {
    let results = run_graph_dst_batch(0..1000, |seed| GraphDstConfig {
        states: 400,
        ..GraphDstConfig::new(seed)
    });
    assert_batch(&results);
}

#[test]
fn test_graph_dst_large_graphs_8_workers() {
    let results = run_graph_dst_batch(400..410, GraphDstConfig::large);
    for r in &results {
        assert!(r.reference.reachable > 0);
    }
    assert_batch(&results);
}

// =============================================================================
// Emptiness
// =============================================================================

fn assert_emptiness_batch(results: &[EmptinessDstResult]) {
    for r in results {
        assert!(r.is_success(), "{}", r.summary());
    }
    let nonempty = results.iter().filter(|r| r.expected_counterexample).count();
    println!("Emptiness batch: {}/{} with counterexample", nonempty, results.len());
}

#[test]
fn test_emptiness_dst_buchi_matches_sequential() {
    let results = run_emptiness_dst_batch(0..40, |seed| EmptinessDstConfig {
        worker_counts: vec![2, 8],
        ..EmptinessDstConfig::new(seed)
    });
    assert_emptiness_batch(&results);
}

#[test]
fn test_emptiness_dst_generalized_buchi_matches_sequential() {
    let results = run_emptiness_dst_batch(100..140, |seed| EmptinessDstConfig {
        worker_counts: vec![2, 8],
        ..EmptinessDstConfig::generalized(seed)
    });
    assert_emptiness_batch(&results);
}

#[test]
fn test_emptiness_dst_larger_products() {
    let results = run_emptiness_dst_batch(200..210, |seed| EmptinessDstConfig {
        states: 400,
        automaton_states: 4,
        worker_counts: vec![8],
        ..EmptinessDstConfig::new(seed)
    });
    assert_emptiness_batch(&results);
}
