use crate::check::{search_failure, CheckRequest, CheckResult, Checker};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::explore::{explore, ExploreStats, Seeds};
use crate::listener::Exhaustive;
use crate::lts::Builder;
use crate::partitioned::explore_partitioned;
use crate::store::StateStore;
use crate::store_partitioned::PartitionedStore;
use crate::store_shared::SharedStore;
use crate::types::{ReasonKind, Status};
use tracing::info;

/// Enumerates every reachable state. Returns the number of distinct states
/// and the run statistics.
pub fn state_space<B>(builder: &B, config: &SearchConfig) -> Result<(usize, ExploreStats), SearchError>
where
    B: Builder + Clone + Send,
{
    let workers = config.workers();
    let listeners = vec![Exhaustive; workers];
    let (stored, stats) = if config.partitioned {
        let mut store: PartitionedStore<B::State, ()> = PartitionedStore::new(workers, config.max_states);
        let explored = explore_partitioned(builder, &mut store, Seeds::Initials, listeners)?;
        (store.len(), explored.stats)
    } else {
        let store: SharedStore<B::State, ()> = SharedStore::new(config.max_states);
        let explored = explore(builder, &store, Seeds::Initials, listeners, config.order)?;
        (store.len(), explored.stats)
    };
    info!(states = stored, edges = stats.edges, "state space explored");
    Ok((stored, stats))
}

/// Exploration without a property: passes unless the search fails.
#[derive(Debug, Default)]
pub struct ExplorationChecker;

impl<B> Checker<B> for ExplorationChecker
where
    B: Builder + Clone + Send,
{
    fn check(&self, request: &CheckRequest, input: &B) -> CheckResult {
        let mut result = match state_space(input, &request.config) {
            Ok((0, stats)) => CheckResult::new(request, Status::Error)
                .with_reason(ReasonKind::NoInitialStates, "no initial states")
                .with_stats(0, stats),
            Ok((stored, stats)) => CheckResult::new(request, Status::Pass).with_stats(stored, stats),
            Err(err) => search_failure(request, &err),
        };
        result.name = "explore".to_string();
        result
    }
}
