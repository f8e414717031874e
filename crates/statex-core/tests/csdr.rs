use proptest::prelude::*;
use statex_core::{
    csdr, ExplicitBuilder, ExplicitEdge, ExplicitGraph, NodeId, PropertyType, SearchConfig, Verdict,
    ViolationKind,
};
use std::collections::VecDeque;

fn goal_config(workers: usize, partitioned: bool) -> SearchConfig {
    SearchConfig {
        workers,
        partitioned,
        property: PropertyType::Goal,
        ..SearchConfig::default()
    }
}

fn builder(graph: &ExplicitGraph) -> ExplicitBuilder {
    ExplicitBuilder::new(graph).expect("valid graph")
}

/// 0 -switch-> 1 -switch-> 2
fn two_switches() -> ExplicitGraph {
    ExplicitGraph::new([0])
        .edge(ExplicitEdge::new(0, 1).switching())
        .edge(ExplicitEdge::new(1, 2).switching())
}

#[test]
fn goal_beyond_the_bound_is_inconclusive() {
    let graph = two_switches().goals(&[2]);
    let report = csdr(&builder(&graph), &goal_config(1, false), 1).expect("search");
    assert_eq!(report.verdict, Verdict::BoundExhausted);
}

#[test]
fn goal_within_the_bound_is_reported_with_its_trace() {
    let graph = two_switches().goals(&[2]);
    let report = csdr(&builder(&graph), &goal_config(2, false), 2).expect("search");
    let Verdict::Violated(witness) = report.verdict else {
        panic!("expected a violation, got {:?}", report.verdict);
    };
    assert_eq!(witness.kind, ViolationKind::Goal);
    assert_eq!(witness.trace, vec![0, 1, 2]);
}

#[test]
fn bound_covering_everything_holds() {
    let report = csdr(&builder(&two_switches()), &goal_config(1, false), 5).expect("search");
    assert_eq!(report.verdict, Verdict::Holds);
    assert_eq!(report.stored, 3);
}

#[test]
fn initial_goal_is_found_at_level_zero() {
    let graph = two_switches().goals(&[0]);
    let report = csdr(&builder(&graph), &goal_config(1, false), 0).expect("search");
    let Verdict::Violated(witness) = report.verdict else {
        panic!("expected a violation");
    };
    assert_eq!(witness.trace, vec![0]);
}

#[test]
fn error_edge_counts_its_own_switch() {
    let graph = ExplicitGraph::new([0])
        .edge(ExplicitEdge::new(0, 1))
        .edge(ExplicitEdge::new(1, 2).switching().erroneous());

    let report = csdr(&builder(&graph), &goal_config(1, false), 0).expect("search");
    assert_eq!(report.verdict, Verdict::BoundExhausted);

    let report = csdr(&builder(&graph), &goal_config(1, false), 1).expect("search");
    let Verdict::Violated(witness) = report.verdict else {
        panic!("expected a violation");
    };
    assert_eq!(witness.kind, ViolationKind::ErrorEdge);
    assert_eq!(witness.trace, vec![0, 1, 2]);
}

#[test]
fn deadlock_behind_a_switch() {
    let graph = ExplicitGraph::new([0])
        .edge(ExplicitEdge::new(0, 1))
        .edge(ExplicitEdge::new(1, 0))
        .edge(ExplicitEdge::new(1, 2).switching());
    let config = SearchConfig {
        property: PropertyType::Deadlock,
        ..goal_config(2, false)
    };

    let report = csdr(&builder(&graph), &config, 0).expect("search");
    assert_eq!(report.verdict, Verdict::BoundExhausted);

    let report = csdr(&builder(&graph), &config, 1).expect("search");
    let Verdict::Violated(witness) = report.verdict else {
        panic!("expected a deadlock");
    };
    assert_eq!(witness.kind, ViolationKind::Deadlock);
    assert_eq!(witness.trace, vec![0, 1, 2]);
}

#[test]
fn trace_follows_the_route_with_fewest_switches() {
    // 3 is first seen across the switch from 1, then without one from 2
    let graph = ExplicitGraph::new([0])
        .plain_edges(&[(0, 1), (0, 2), (2, 3)])
        .edge(ExplicitEdge::new(1, 3).switching())
        .goals(&[3]);
    for (workers, partitioned) in [(1, false), (2, false), (2, true)] {
        let report = csdr(&builder(&graph), &goal_config(workers, partitioned), 0).expect("search");
        let Verdict::Violated(witness) = report.verdict else {
            panic!("expected a violation, got {:?}", report.verdict);
        };
        assert_eq!(witness.trace, vec![0, 2, 3]);
    }
}

#[test]
fn no_initial_states() {
    let graph = ExplicitGraph::default();
    let report = csdr(&builder(&graph), &goal_config(1, false), 3).expect("search");
    assert_eq!(report.verdict, Verdict::NoStates);
}

/// 0 and 1 reduce to each other; the goal 2 is only reachable by a full
/// expansion.
fn hidden_goal() -> ExplicitGraph {
    ExplicitGraph::new([0])
        .plain_edges(&[(0, 1), (1, 0), (0, 2), (1, 2)])
        .goals(&[2])
        .ample(0, &[1])
        .ample(1, &[0])
}

#[test]
fn reduction_cycle_is_broken_to_reach_the_goal() {
    for (workers, partitioned) in [(1, false), (2, false), (2, true)] {
        let config = SearchConfig {
            por: true,
            ..goal_config(workers, partitioned)
        };
        let report = csdr(&builder(&hidden_goal()), &config, 0).expect("search");
        let Verdict::Violated(witness) = report.verdict else {
            panic!("expected a violation with {workers} workers, got {:?}", report.verdict);
        };
        assert_eq!(witness.kind, ViolationKind::Goal);
        assert_eq!(witness.trace.last(), Some(&2));
    }
}

#[test]
fn ample_sets_are_ignored_without_reduction() {
    let report = csdr(&builder(&hidden_goal()), &goal_config(1, false), 0).expect("search");
    assert!(matches!(report.verdict, Verdict::Violated(_)));
}

/// Context switches along `trace`, taking a plain edge wherever one exists.
fn switches_along(graph: &ExplicitGraph, trace: &[NodeId]) -> u32 {
    trace
        .windows(2)
        .map(|pair| {
            let plain = graph
                .edges
                .iter()
                .any(|e| e.from == pair[0] && e.to == pair[1] && !e.context_switch);
            u32::from(!plain)
        })
        .sum()
}

/// Fewest context switches from node 0 to each node (0-1 BFS).
fn switch_distances(graph: &ExplicitGraph, nodes: NodeId) -> Vec<Option<u32>> {
    let mut dist = vec![None; nodes as usize];
    let mut deque = VecDeque::new();
    dist[0] = Some(0);
    deque.push_back(0);
    while let Some(node) = deque.pop_front() {
        let here = dist[node as usize].unwrap_or_default();
        for edge in graph.edges.iter().filter(|e| e.from == node) {
            let cost = u32::from(edge.context_switch);
            let proposed = here + cost;
            if dist[edge.to as usize].map_or(true, |d| proposed < d) {
                dist[edge.to as usize] = Some(proposed);
                if cost == 0 {
                    deque.push_front(edge.to);
                } else {
                    deque.push_back(edge.to);
                }
            }
        }
    }
    dist
}

fn random_graph() -> impl Strategy<Value = (ExplicitGraph, NodeId)> {
    (2u32..9).prop_flat_map(|nodes| {
        let edges = prop::collection::vec((0..nodes, 0..nodes, any::<bool>()), 0..24);
        let goals = prop::collection::vec(0..nodes, 0..3);
        (edges, goals).prop_map(move |(edges, goals)| {
            let mut graph = ExplicitGraph::new([0]).goals(&goals);
            for (from, to, switch) in edges {
                let edge = ExplicitEdge::new(from, to);
                graph = graph.edge(if switch { edge.switching() } else { edge });
            }
            (graph, nodes)
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn finds_a_goal_exactly_when_it_is_within_the_bound(
        (graph, nodes) in random_graph(),
        bound in 0u32..4,
        workers in 1usize..3,
        partitioned in any::<bool>(),
    ) {
        let dist = switch_distances(&graph, nodes);
        let nearest_goal = graph.goals.iter().filter_map(|&g| dist[g as usize]).min();
        let farthest = dist.iter().flatten().copied().max().unwrap_or_default();

        let report = csdr(&builder(&graph), &goal_config(workers, partitioned), bound)
            .expect("search");
        match report.verdict {
            Verdict::Violated(witness) => {
                prop_assert!(nearest_goal.is_some_and(|d| d <= bound));
                prop_assert_eq!(witness.trace.first(), Some(&0));
                let last = witness.trace.last().copied().unwrap_or_default();
                prop_assert!(graph.goals.contains(&last));
                for pair in witness.trace.windows(2) {
                    prop_assert!(graph.edges.iter().any(|e| e.from == pair[0] && e.to == pair[1]));
                }
                prop_assert!(switches_along(&graph, &witness.trace) <= bound);
            }
            Verdict::BoundExhausted => {
                prop_assert!(nearest_goal.map_or(true, |d| d > bound));
                prop_assert!(farthest > bound);
            }
            Verdict::Holds => {
                prop_assert!(nearest_goal.map_or(true, |d| d > bound));
                prop_assert!(farthest <= bound);
            }
            Verdict::NoStates => prop_assert!(false, "graph has an initial state"),
        }
    }
}
