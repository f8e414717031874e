//! Unbounded safety search: finds a goal state, an error edge, or a deadlock
//! (depending on the property) and reports the path to it.

use crate::config::{PropertyType, SearchConfig};
use crate::error::SearchError;
use crate::explore::{explore, ExploreStats, Explored, Seeds};
use crate::listener::{Action, Listener};
use crate::lts::{Builder, Label};
use crate::partitioned::explore_partitioned;
use crate::store::{StateStore, VertexRef};
use crate::store_partitioned::PartitionedStore;
use crate::store_shared::SharedStore;
use crate::trace::{parent_chain, ParentSlot};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct ReachExt {
    pub parent: ParentSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Goal,
    ErrorEdge,
    Deadlock,
}

/// Where a safety search stopped. For an error edge `via` is its source.
#[derive(Debug)]
pub struct Violation<S, E> {
    pub kind: ViolationKind,
    pub vertex: VertexRef<S, E>,
    pub via: Option<VertexRef<S, E>>,
}

impl<S, E> Violation<S, E> {
    /// The path from a seed to the violating state.
    pub fn trace<St, F>(&self, store: &St, parent_of: F) -> Vec<VertexRef<S, E>>
    where
        St: StateStore<S, E> + ?Sized,
        F: Fn(&E) -> &ParentSlot,
    {
        match &self.via {
            Some(source) => {
                let mut path = parent_chain(store, source, parent_of);
                path.push(Arc::clone(&self.vertex));
                path
            }
            None => parent_chain(store, &self.vertex, parent_of),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness<S> {
    pub kind: ViolationKind,
    pub trace: Vec<S>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<S> {
    Holds,
    Violated(Witness<S>),
    /// Context-switch-bounded search only: some state lies beyond the bound.
    BoundExhausted,
    NoStates,
}

#[derive(Debug, Clone)]
pub struct SafetyReport<S> {
    pub verdict: Verdict<S>,
    pub stats: ExploreStats,
    pub stored: usize,
}

pub(crate) fn is_violation<B: Builder>(
    builder: &B,
    property: PropertyType,
    to: &B::State,
    label: &B::Label,
    has_source: bool,
) -> Option<ViolationKind> {
    if property != PropertyType::Goal {
        return None;
    }
    if has_source && label.is_error() {
        Some(ViolationKind::ErrorEdge)
    } else if builder.is_goal(to) {
        Some(ViolationKind::Goal)
    } else {
        None
    }
}

struct ReachListener<'a, B: Builder> {
    builder: &'a B,
    property: PropertyType,
    found: Option<Violation<B::State, ReachExt>>,
}

impl<B: Builder> Listener<B, ReachExt> for ReachListener<'_, B> {
    fn edge(
        &mut self,
        from: Option<&VertexRef<B::State, ReachExt>>,
        to: &VertexRef<B::State, ReachExt>,
        label: &B::Label,
        is_new: bool,
    ) -> Action {
        match from {
            Some(source) => to.ext().parent.offer(source.handle()),
            None => to.ext().parent.set_root(),
        };
        let kind = is_violation(self.builder, self.property, to.state(), label, from.is_some());
        match kind {
            Some(ViolationKind::ErrorEdge) => {
                self.found = Some(Violation {
                    kind: ViolationKind::ErrorEdge,
                    vertex: Arc::clone(to),
                    via: from.cloned(),
                });
                Action::Terminate
            }
            Some(kind) if is_new => {
                self.found = Some(Violation {
                    kind,
                    vertex: Arc::clone(to),
                    via: None,
                });
                Action::Terminate
            }
            _ => Action::AsNeeded,
        }
    }

    fn deadlocked(&mut self, vertex: &VertexRef<B::State, ReachExt>) -> Action {
        if self.property != PropertyType::Deadlock {
            return Action::Ignore;
        }
        self.found = Some(Violation {
            kind: ViolationKind::Deadlock,
            vertex: Arc::clone(vertex),
            via: None,
        });
        Action::Terminate
    }
}

/// Searches the whole reachable state space for a violation of
/// `config.property` (deadlock or goal).
pub fn reachability<B>(builder: &B, config: &SearchConfig) -> Result<SafetyReport<B::State>, SearchError>
where
    B: Builder + Clone + Send + Sync,
{
    let workers = config.workers();
    let listeners = (0..workers)
        .map(|_| ReachListener {
            builder,
            property: config.property,
            found: None,
        })
        .collect::<Vec<_>>();

    let report = if config.partitioned {
        let mut store = PartitionedStore::new(workers, config.max_states);
        let explored = explore_partitioned(builder, &mut store, Seeds::Initials, listeners)?;
        summarize(&store, explored)
    } else {
        let store = SharedStore::new(config.max_states);
        let explored = explore(builder, &store, Seeds::Initials, listeners, config.order)?;
        summarize(&store, explored)
    };
    info!(
        states = report.stored,
        edges = report.stats.edges,
        holds = matches!(report.verdict, Verdict::Holds),
        "reachability finished"
    );
    Ok(report)
}

fn summarize<B, St>(store: &St, explored: Explored<ReachListener<'_, B>>) -> SafetyReport<B::State>
where
    B: Builder,
    St: StateStore<B::State, ReachExt>,
{
    let found = explored
        .listeners
        .into_iter()
        .find_map(|listener| listener.found);
    let verdict = match found {
        Some(violation) => Verdict::Violated(Witness {
            kind: violation.kind,
            trace: violation
                .trace(store, |ext| &ext.parent)
                .iter()
                .map(|v| v.state().clone())
                .collect(),
        }),
        None if store.is_empty() => Verdict::NoStates,
        None => Verdict::Holds,
    };
    debug!(collisions = store.collisions(), "fingerprint collisions");
    SafetyReport {
        verdict,
        stats: explored.stats,
        stored: store.len(),
    }
}
