use statex_core::{
    explore, explore_partitioned, Action, Builder, EdgeFlags, ExplicitBuilder, ExplicitGraph,
    Exhaustive, Listener, PartitionedStore, SearchError, SearchOrder, Seeds, SharedStore,
    StateStore, VertexRef,
};

fn diamond() -> ExplicitBuilder {
    let graph = ExplicitGraph::new([1]).plain_edges(&[(1, 2), (2, 3), (1, 3), (3, 4)]);
    ExplicitBuilder::new(&graph).expect("valid graph")
}

#[derive(Debug, Default)]
struct Counter {
    states: usize,
    edges: usize,
    seeds: usize,
}

impl Listener<ExplicitBuilder, ()> for Counter {
    fn state(&mut self, _vertex: &VertexRef<u32, ()>) -> Action {
        self.states += 1;
        Action::Process
    }

    fn edge(
        &mut self,
        from: Option<&VertexRef<u32, ()>>,
        _to: &VertexRef<u32, ()>,
        _label: &EdgeFlags,
        _is_new: bool,
    ) -> Action {
        match from {
            Some(_) => self.edges += 1,
            None => self.seeds += 1,
        }
        Action::AsNeeded
    }
}

fn counters(workers: usize) -> Vec<Counter> {
    (0..workers).map(|_| Counter::default()).collect()
}

fn totals(listeners: &[Counter]) -> (usize, usize, usize) {
    listeners.iter().fold((0, 0, 0), |(s, e, i), c| {
        (s + c.states, e + c.edges, i + c.seeds)
    })
}

#[test]
fn every_engine_visits_each_state_and_edge_once() {
    let builder = diamond();
    let runs = [
        (SearchOrder::Dfs, 1),
        (SearchOrder::Bfs, 1),
        (SearchOrder::Bfs, 2),
        (SearchOrder::Bfs, 3),
    ];
    for (order, workers) in runs {
        let store: SharedStore<u32, ()> = SharedStore::new(None);
        let explored = explore(&builder, &store, Seeds::Initials, counters(workers), order)
            .expect("explore");
        assert!(!explored.terminated);
        assert_eq!(store.len(), 4, "{order:?} with {workers} workers");
        assert_eq!(explored.stats.states, 4);
        assert_eq!(explored.stats.edges, 4);
        assert_eq!(explored.stats.deadlocks, 1);
        assert_eq!(totals(&explored.listeners), (4, 4, 1));
    }
}

#[test]
fn partitioned_visitor_visits_each_state_and_edge_once() {
    let builder = diamond();
    for workers in 1..=3 {
        let mut store: PartitionedStore<u32, ()> = PartitionedStore::new(workers, None);
        let explored = explore_partitioned(&builder, &mut store, Seeds::Initials, counters(workers))
            .expect("explore");
        assert!(!explored.terminated);
        assert_eq!(store.len(), 4, "{workers} workers");
        assert_eq!(explored.stats.states, 4);
        assert_eq!(explored.stats.edges, 4);
        assert_eq!(totals(&explored.listeners), (4, 4, 1));
    }
}

#[test]
fn partitioned_store_places_states_with_their_owner() {
    let builder = diamond();
    let mut store: PartitionedStore<u32, ()> = PartitionedStore::new(3, None);
    explore_partitioned(&builder, &mut store, Seeds::Initials, vec![Exhaustive; 3])
        .expect("explore");
    for worker in 0..3 {
        for vertex in store.shard(worker).vertices() {
            assert_eq!(store.owner(builder.hash(vertex.state())), worker);
        }
    }
}

const N: u32 = 100;

/// `i -> i+1`, `i -> i+N+2` and `i+N+2 -> i+1` for `i` in `1..=N`.
fn ladder() -> ExplicitBuilder {
    let mut pairs = Vec::new();
    for i in 1..=N {
        pairs.push((i, i + 1));
        pairs.push((i, i + N + 2));
        pairs.push((i + N + 2, i + 1));
    }
    ExplicitBuilder::new(&ExplicitGraph::new([1]).plain_edges(&pairs)).expect("valid graph")
}

/// Follows edges out of odd states; out of even states only those that stay
/// at or below `N`.
#[derive(Debug, Default)]
struct Selective {
    states: usize,
}

impl Listener<ExplicitBuilder, ()> for Selective {
    fn state(&mut self, _vertex: &VertexRef<u32, ()>) -> Action {
        self.states += 1;
        Action::Process
    }

    fn edge(
        &mut self,
        from: Option<&VertexRef<u32, ()>>,
        to: &VertexRef<u32, ()>,
        _label: &EdgeFlags,
        _is_new: bool,
    ) -> Action {
        match from {
            Some(from) if from.state() % 2 == 0 && *to.state() > N => Action::Ignore,
            _ => Action::AsNeeded,
        }
    }
}

fn selective(workers: usize) -> Vec<Selective> {
    (0..workers).map(|_| Selective::default()).collect()
}

#[test]
fn ignored_edges_prune_the_search() {
    let builder = ladder();
    for workers in 1..=3 {
        let store: SharedStore<u32, ()> = SharedStore::new(None);
        let explored = explore(&builder, &store, Seeds::Initials, selective(workers), SearchOrder::Bfs)
            .expect("explore");
        let visited: usize = explored.listeners.iter().map(|l| l.states).sum();
        assert_eq!(visited, 150, "{workers} workers");
    }

    let store: SharedStore<u32, ()> = SharedStore::new(None);
    let explored = explore(&builder, &store, Seeds::Initials, selective(1), SearchOrder::Dfs)
        .expect("explore");
    assert_eq!(explored.listeners[0].states, 150);
}

#[test]
fn ignored_edges_prune_the_partitioned_search() {
    let builder = ladder();
    for workers in 1..=3 {
        let mut store: PartitionedStore<u32, ()> = PartitionedStore::new(workers, None);
        let explored = explore_partitioned(&builder, &mut store, Seeds::Initials, selective(workers))
            .expect("explore");
        let visited: usize = explored.listeners.iter().map(|l| l.states).sum();
        assert_eq!(visited, 150, "{workers} workers");
    }
}

#[derive(Debug, Clone)]
struct StopAt(u32);

impl Listener<ExplicitBuilder, ()> for StopAt {
    fn state(&mut self, vertex: &VertexRef<u32, ()>) -> Action {
        if *vertex.state() == self.0 {
            Action::Terminate
        } else {
            Action::Process
        }
    }
}

#[test]
fn terminate_stops_every_engine() {
    let builder = ladder();
    for (order, workers) in [(SearchOrder::Dfs, 1), (SearchOrder::Bfs, 1), (SearchOrder::Bfs, 3)] {
        let store: SharedStore<u32, ()> = SharedStore::new(None);
        let explored = explore(&builder, &store, Seeds::Initials, vec![StopAt(5); workers], order)
            .expect("explore");
        assert!(explored.terminated, "{order:?} with {workers} workers");
        assert!(explored.stats.states < 2 * u64::from(N) + 1);
    }

    let mut store: PartitionedStore<u32, ()> = PartitionedStore::new(2, None);
    let explored = explore_partitioned(&builder, &mut store, Seeds::Initials, vec![StopAt(5); 2])
        .expect("explore");
    assert!(explored.terminated);
}

#[test]
fn store_limit_is_reported_as_out_of_memory() {
    let builder = ladder();
    let store: SharedStore<u32, ()> = SharedStore::new(Some(10));
    let err = explore(&builder, &store, Seeds::Initials, vec![Exhaustive; 2], SearchOrder::Bfs)
        .expect_err("limit reached");
    assert!(matches!(err, SearchError::OutOfMemory { states } if states >= 10));

    let mut store: PartitionedStore<u32, ()> = PartitionedStore::new(2, Some(10));
    let err = explore_partitioned(&builder, &mut store, Seeds::Initials, vec![Exhaustive; 2])
        .expect_err("limit reached");
    assert!(matches!(err, SearchError::OutOfMemory { .. }));
}

#[test]
fn vertex_seeds_restart_from_stored_states() {
    let builder = diamond();
    let store: SharedStore<u32, ()> = SharedStore::new(None);
    explore(&builder, &store, Seeds::Initials, vec![Exhaustive], SearchOrder::Bfs).expect("explore");

    let three = store
        .find(builder.hash(&3), &3, |a, b| a == b)
        .expect("state 3 is stored");
    let explored = explore(
        &builder,
        &store,
        Seeds::Vertices(vec![three]),
        counters(2),
        SearchOrder::Bfs,
    )
    .expect("explore");
    // the seed is not new, so only an explicit Process would expand it
    assert_eq!(totals(&explored.listeners), (0, 0, 1));
    assert_eq!(store.len(), 4);
}
