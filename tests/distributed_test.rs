//! Hash-partitioned exploration in both modes, checked against the
//! sequential reachability count.

use swarm_mc::dfs::reachable_exact;
use swarm_mc::dst::{random_edges, GraphDstConfig};
use swarm_mc::{run_distributed, run_distributed_with, DistributedConfig, DistributedMode, ExplicitKripke, McError};

const MODES: [DistributedMode; 2] = [DistributedMode::Cooperative, DistributedMode::Synchronous];

fn config(world_size: usize, mode: DistributedMode) -> DistributedConfig {
    DistributedConfig {
        world_size,
        mode,
        // Two records per batch, so flushes happen mid-exploration.
        mtu_bytes: 24,
        idle_timeout_ms: 10,
        check_all_buffers: 4,
        max_states_per_rank: None,
    }
}

fn ring(n: u32) -> ExplicitKripke {
    let edges: Vec<(u32, u32)> = (0..n).map(|s| (s, (s + 1) % n)).collect();
    ExplicitKripke::from_edges(n, &edges)
}

#[test]
fn test_ring_fully_explored_in_every_mode() {
    let sys = ring(50);
    for mode in MODES {
        for world in [1, 2, 4] {
            let report = run_distributed(&sys, &config(world, mode)).unwrap();
            assert_eq!(report.unique_states(), 50, "{:?} world={}", mode, world);
            assert_eq!(report.ranks.len(), world);
            assert_eq!(report.sent(), report.received());
        }
    }
}

#[test]
fn test_random_graphs_match_sequential_reachability() {
    for seed in 0..10 {
        let graph = GraphDstConfig::new(seed);
        let sys = ExplicitKripke::from_edges(graph.states, &random_edges(&graph));
        let expected = reachable_exact(&sys, 0).states;
        for mode in MODES {
            for world in [1, 2, 4] {
                let report = run_distributed(&sys, &config(world, mode)).unwrap();
                assert_eq!(
                    report.unique_states(),
                    expected,
                    "seed={} {:?} world={}",
                    seed,
                    mode,
                    world
                );
            }
        }
    }
}

#[test]
fn test_invariant_violation_aborts_every_rank() {
    let sys = ring(30);
    for mode in MODES {
        let result = run_distributed_with(&sys, &config(3, mode), |s: &u32| *s != 17);
        match result {
            Err(McError::InvariantViolated { state, .. }) => assert_eq!(state, "s17"),
            other => panic!("{:?}: expected an invariant violation, got {:?}", mode, other),
        }
    }
}

#[test]
fn test_state_limit_aborts_every_rank() {
    let sys = ring(40);
    for mode in MODES {
        let mut c = config(2, mode);
        c.max_states_per_rank = Some(5);
        let result = run_distributed(&sys, &c);
        assert!(
            matches!(result, Err(McError::MemoryExhausted { .. })),
            "{:?}: {:?}",
            mode,
            result.map(|r| r.unique_states())
        );
    }
}

#[test]
fn test_invalid_world_size_is_rejected() {
    let sys = ring(3);
    let result = run_distributed(&sys, &config(0, DistributedMode::Cooperative));
    assert!(matches!(result, Err(McError::InvalidConfig(_))));
}
