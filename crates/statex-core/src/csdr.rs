//! Context-switch-bounded reachability.
//!
//! States are explored in levels. The level of a state is the least number
//! of context switches on any path to it found so far; level `L` is explored
//! only after every state of a lower level has been expanded, so a violation
//! found at level `L` is reachable with exactly `L` switches and no fewer.
//! States discovered at a higher level wait in the store until their round.
//! An error edge is reported as soon as it is crossed within the bound.
//! A state's parent is the predecessor that gave it its level, so a trace
//! never crosses more switches than the level it was found at.

use crate::config::{PropertyType, SearchConfig};
use crate::error::SearchError;
use crate::explore::{explore, ExploreStats, Explored, Seeds};
use crate::listener::{Action, Listener};
use crate::lts::{Builder, Label};
use crate::partitioned::explore_partitioned;
use crate::por;
use crate::reachability::{is_violation, SafetyReport, Verdict, Violation, ViolationKind, Witness};
use crate::store::{StateStore, VertexRef};
use crate::store_partitioned::PartitionedStore;
use crate::store_shared::SharedStore;
use crate::trace::{Parent, ParentSlot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-state bookkeeping. `level` is 0 while unset, `level + 1` while the
/// state waits for expansion and `-(level + 1)` once it has been expanded.
#[derive(Debug, Default)]
pub struct CsdrExt {
    level: AtomicI32,
    pub parent: ParentSlot,
    /// Level implied by the edge from the current parent.
    parent_level: Mutex<Option<u32>>,
    reduced: AtomicBool,
    full: AtomicBool,
}

impl CsdrExt {
    pub fn level(&self) -> Option<u32> {
        match self.level.load(Ordering::Acquire) {
            0 => None,
            raw => Some(raw.unsigned_abs() - 1),
        }
    }

    pub fn is_done(&self) -> bool {
        self.level.load(Ordering::Acquire) < 0
    }

    /// Expanded with an ample set rather than all successors.
    pub fn is_reduced(&self) -> bool {
        self.reduced.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    fn set_initial(&self) {
        let _ = self
            .level
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (raw == 0 || raw > 1).then_some(1)
            });
        self.adopt_parent(0, Parent::Root);
    }

    /// Points the parent at `parent` if its edge implies a strictly lower
    /// level than the current parent's.
    fn adopt_parent(&self, level: u32, parent: Parent) {
        let mut best = self.parent_level.lock();
        if best.is_some_and(|best| best <= level) {
            return;
        }
        *best = Some(level);
        self.parent.set(parent);
    }

    /// Marks the state expanded; returns whether it already was.
    fn set_done(&self) -> bool {
        match self
            .level
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| (raw > 0).then_some(-raw))
        {
            Ok(_) => false,
            Err(0) => panic!("expanding a state that has no level"),
            Err(_) => true,
        }
    }

    /// Lowers the level to what the edge from a state at `from_level`
    /// implies. Expanded states keep their level. Returns the resulting level.
    fn register_predecessor(&self, from_level: u32, context_switch: bool) -> u32 {
        let proposed = i32::try_from(u64::from(from_level) + 1 + u64::from(context_switch))
            .unwrap_or(i32::MAX);
        let _ = self
            .level
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (raw == 0 || (raw > 0 && proposed < raw)).then_some(proposed)
            });
        self.level().unwrap_or(u32::MAX)
    }

    fn set_reduced(&self) {
        self.reduced.store(true, Ordering::Release);
    }

    /// Reopens an expanded state so that it is expanded again, fully.
    fn expand_fully(&self) {
        self.full.store(true, Ordering::Release);
        self.reduced.store(false, Ordering::Release);
        let _ = self
            .level
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| (raw < 0).then_some(-raw));
    }

    fn expanded_level(&self) -> u32 {
        match self.level() {
            Some(level) => level,
            None => panic!("expanded state has no level"),
        }
    }
}

type Edge<S> = (VertexRef<S, CsdrExt>, VertexRef<S, CsdrExt>);

struct CsdrListener<'a, B: Builder> {
    builder: &'a B,
    level: u32,
    bound: u32,
    property: PropertyType,
    por: bool,
    found: Option<Violation<B::State, CsdrExt>>,
    reduced_edges: Vec<Edge<B::State>>,
}

impl<B: Builder> CsdrListener<'_, B> {
    fn report(
        &mut self,
        kind: ViolationKind,
        vertex: &VertexRef<B::State, CsdrExt>,
        via: Option<&VertexRef<B::State, CsdrExt>>,
    ) -> Action {
        self.found = Some(Violation {
            kind,
            vertex: Arc::clone(vertex),
            via: via.cloned(),
        });
        Action::Terminate
    }
}

impl<B: Builder> Listener<B, CsdrExt> for CsdrListener<'_, B> {
    fn state(&mut self, vertex: &VertexRef<B::State, CsdrExt>) -> Action {
        if vertex.ext().set_done() {
            Action::Ignore
        } else {
            Action::Process
        }
    }

    fn edge(
        &mut self,
        from: Option<&VertexRef<B::State, CsdrExt>>,
        to: &VertexRef<B::State, CsdrExt>,
        label: &B::Label,
        _is_new: bool,
    ) -> Action {
        let Some(source) = from else {
            // later rounds reseed states that already carry a level
            if self.level == 0 {
                to.ext().set_initial();
            }
            if is_violation(self.builder, self.property, to.state(), label, false).is_some() {
                return self.report(ViolationKind::Goal, to, None);
            }
            return Action::Process;
        };

        let switch = label.is_context_switch();
        let source_level = source.ext().expanded_level();
        if source_level + u32::from(switch) <= self.bound
            && is_violation(self.builder, self.property, to.state(), label, true)
                == Some(ViolationKind::ErrorEdge)
        {
            return self.report(ViolationKind::ErrorEdge, to, Some(source));
        }

        if self.por && source.ext().is_reduced() {
            self.reduced_edges.push((Arc::clone(source), Arc::clone(to)));
        }
        if to.ext().is_done() {
            return Action::Ignore;
        }
        to.ext()
            .adopt_parent(source_level + u32::from(switch), Parent::Vertex(source.handle()));
        if to.ext().register_predecessor(source_level, switch) > self.level {
            return Action::Ignore;
        }
        if is_violation(self.builder, self.property, to.state(), label, false).is_some() {
            return self.report(ViolationKind::Goal, to, None);
        }
        Action::Process
    }

    fn deadlocked(&mut self, vertex: &VertexRef<B::State, CsdrExt>) -> Action {
        if self.property != PropertyType::Deadlock {
            return Action::Ignore;
        }
        self.report(ViolationKind::Deadlock, vertex, None)
    }

    fn successors(
        &mut self,
        builder: &mut B,
        vertex: &VertexRef<B::State, CsdrExt>,
    ) -> Vec<(B::State, B::Label)> {
        if self.por && !vertex.ext().is_full() {
            if let Some(ample) = builder.ample_edges(vertex.state()).filter(|e| !e.is_empty()) {
                vertex.ext().set_reduced();
                return ample;
            }
        }
        builder.edges(vertex.state()).collect()
    }
}

enum LevelStore<S> {
    Shared(SharedStore<S, CsdrExt>),
    Partitioned(PartitionedStore<S, CsdrExt>),
}

impl<S> LevelStore<S> {
    fn view(&self) -> &dyn StateStore<S, CsdrExt> {
        match self {
            LevelStore::Shared(store) => store,
            LevelStore::Partitioned(store) => store,
        }
    }
}

/// Bounded reachability over at most `bound` context switches, per
/// `config.property` (deadlock or goal).
pub fn csdr<B>(builder: &B, config: &SearchConfig, bound: u32) -> Result<SafetyReport<B::State>, SearchError>
where
    B: Builder + Clone + Send + Sync,
{
    let workers = config.workers();
    let mut store = if config.partitioned {
        LevelStore::Partitioned(PartitionedStore::new(workers, config.max_states))
    } else {
        LevelStore::Shared(SharedStore::new(config.max_states))
    };

    let mut totals = ExploreStats::default();
    let mut reduced_edges: Vec<Edge<B::State>> = Vec::new();
    let mut found = None;
    let mut fully_explored = false;

    for level in 0..=bound {
        let seeds = if level == 0 {
            Seeds::Initials
        } else {
            Seeds::Vertices(waiting_at(store.view(), level))
        };
        let mut level_states = 0;
        let mut seeds = Some(seeds);
        while let Some(round) = seeds.take() {
            let listeners = (0..workers)
                .map(|_| CsdrListener {
                    builder,
                    level,
                    bound,
                    property: config.property,
                    por: config.por,
                    found: None,
                    reduced_edges: Vec::new(),
                })
                .collect::<Vec<_>>();
            let explored = run_round(builder, &mut store, round, listeners, config)?;
            totals += explored.stats;
            level_states += explored.stats.states;
            for listener in explored.listeners {
                reduced_edges.extend(listener.reduced_edges);
                if found.is_none() {
                    found = listener.found;
                }
            }
            if found.is_some() || !config.por {
                break;
            }

            reduced_edges.retain(|(from, _)| from.ext().is_reduced());
            let cyclic: Vec<Edge<B::State>> = reduced_edges
                .iter()
                .filter(|(_, to)| to.ext().is_reduced())
                .cloned()
                .collect();
            let marked = por::eliminate(&cyclic, workers)?;
            if !marked.is_empty() {
                debug!(level, marked = marked.len(), "fully expanding states on reduced cycles");
                marked.iter().for_each(|vertex| vertex.ext().expand_fully());
                seeds = Some(Seeds::Vertices(marked));
            }
        }

        info!(
            level,
            states = store.view().len(),
            edges = totals.edges,
            level_states,
            "context-switch level explored"
        );
        if found.is_some() {
            break;
        }
        if level_states == 0 {
            fully_explored = true;
            break;
        }
    }

    let view = store.view();
    let verdict = match found {
        Some(violation) => Verdict::Violated(Witness {
            kind: violation.kind,
            trace: violation
                .trace(view, |ext| &ext.parent)
                .iter()
                .map(|v| v.state().clone())
                .collect(),
        }),
        None if view.is_empty() => Verdict::NoStates,
        None if !fully_explored && beyond_bound(view, bound) => Verdict::BoundExhausted,
        None => Verdict::Holds,
    };
    info!(
        bound,
        states = view.len(),
        collisions = view.collisions(),
        verdict = verdict_name(&verdict),
        "csdr finished"
    );
    Ok(SafetyReport {
        verdict,
        stats: totals,
        stored: view.len(),
    })
}

fn run_round<'a, B>(
    builder: &'a B,
    store: &mut LevelStore<B::State>,
    seeds: Seeds<B::State, CsdrExt>,
    listeners: Vec<CsdrListener<'a, B>>,
    config: &SearchConfig,
) -> Result<Explored<CsdrListener<'a, B>>, SearchError>
where
    B: Builder + Clone + Send + Sync,
{
    match store {
        LevelStore::Shared(store) => explore(builder, store, seeds, listeners, config.order),
        LevelStore::Partitioned(store) => explore_partitioned(builder, store, seeds, listeners),
    }
}

fn waiting_at<S>(store: &dyn StateStore<S, CsdrExt>, level: u32) -> Vec<VertexRef<S, CsdrExt>> {
    let mut waiting = Vec::new();
    store.for_each_vertex(&mut |vertex| {
        if !vertex.ext().is_done() && vertex.ext().level() == Some(level) {
            waiting.push(Arc::clone(vertex));
        }
    });
    waiting
}

fn beyond_bound<S>(store: &dyn StateStore<S, CsdrExt>, bound: u32) -> bool {
    let mut beyond = false;
    store.for_each_vertex(&mut |vertex| {
        beyond |= vertex.ext().level().is_some_and(|level| level > bound);
    });
    beyond
}

fn verdict_name<S>(verdict: &Verdict<S>) -> &'static str {
    match verdict {
        Verdict::Holds => "holds",
        Verdict::Violated(_) => "violated",
        Verdict::BoundExhausted => "bound_exhausted",
        Verdict::NoStates => "no_states",
    }
}
