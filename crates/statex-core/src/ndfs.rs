//! Nested depth-first search for accepting cycles.
//!
//! The outer search is an ordinary DFS that keeps its stack marked. When an
//! accepting state is post-ordered, an inner DFS starts from it over states
//! no earlier inner search has visited; reaching the seed or any state still
//! on the outer stack closes a cycle through the seed.
//!
//! With partial-order reduction the outer search expands ample sets, except
//! where an ample successor is on the outer stack; such states are expanded
//! fully so that no cycle is closed by reduced states alone. The inner
//! search follows the same edges the outer search took.

use crate::config::{SearchConfig, SearchOrder};
use crate::error::SearchError;
use crate::explore::{explore_dfs, ExploreStats, Seeds};
use crate::listener::{Action, Listener};
use crate::lts::Builder;
use crate::store::{StateStore, VertexRef};
use crate::store_shared::SharedStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct NdfsExt {
    on_stack: AtomicBool,
    nested: AtomicBool,
    reduced: AtomicBool,
}

impl NdfsExt {
    pub fn on_stack(&self) -> bool {
        self.on_stack.load(Ordering::Relaxed)
    }

    /// The outer search expanded this state with an ample set.
    pub fn is_reduced(&self) -> bool {
        self.reduced.load(Ordering::Relaxed)
    }
}

/// An accepting cycle reachable from an initial state.
///
/// `tail ++ outer ++ inner` is a path from an initial state; its last state
/// has an edge back to the first state of `outer ++ inner`. `goal` is the
/// accepting state on the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lasso<S> {
    pub tail: Vec<S>,
    pub outer: Vec<S>,
    pub inner: Vec<S>,
    pub goal: S,
}

impl<S> Lasso<S> {
    pub fn cycle(&self) -> Vec<&S> {
        self.outer.iter().chain(&self.inner).collect()
    }

    pub fn path(&self) -> Vec<&S> {
        self.tail
            .iter()
            .chain(&self.outer)
            .chain(&self.inner)
            .collect()
    }

    /// Index into [`Lasso::path`] where the cycle starts.
    pub fn cycle_start(&self) -> usize {
        self.tail.len()
    }

    fn map<T>(self, f: impl Fn(S) -> T) -> Lasso<T> {
        Lasso {
            tail: self.tail.into_iter().map(&f).collect(),
            outer: self.outer.into_iter().map(&f).collect(),
            inner: self.inner.into_iter().map(&f).collect(),
            goal: f(self.goal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessVerdict<S> {
    Holds,
    Violated(Lasso<S>),
    NoStates,
}

#[derive(Debug, Clone)]
pub struct LivenessReport<S> {
    pub verdict: LivenessVerdict<S>,
    pub stats: ExploreStats,
    pub stored: usize,
}

type Vertex<S> = VertexRef<S, NdfsExt>;

struct InnerListener<S> {
    seed: Vertex<S>,
    stack: Vec<Vertex<S>>,
    closing: Option<Vertex<S>>,
}

impl<B: Builder> Listener<B, NdfsExt> for InnerListener<B::State> {
    fn state(&mut self, vertex: &Vertex<B::State>) -> Action {
        self.stack.push(Arc::clone(vertex));
        Action::Process
    }

    fn edge(
        &mut self,
        from: Option<&Vertex<B::State>>,
        to: &Vertex<B::State>,
        _label: &B::Label,
        _is_new: bool,
    ) -> Action {
        if from.is_some() && (to.handle() == self.seed.handle() || to.ext().on_stack()) {
            self.closing = Some(Arc::clone(to));
            return Action::Terminate;
        }
        if to.ext().nested.swap(true, Ordering::Relaxed) {
            Action::Ignore
        } else {
            Action::Process
        }
    }

    fn successors(
        &mut self,
        builder: &mut B,
        vertex: &Vertex<B::State>,
    ) -> Vec<(B::State, B::Label)> {
        if vertex.ext().is_reduced() {
            if let Some(ample) = builder.ample_edges(vertex.state()) {
                return ample;
            }
        }
        builder.edges(vertex.state()).collect()
    }

    fn closed(&mut self, vertex: &Vertex<B::State>) -> Action {
        let top = self.stack.pop();
        assert!(
            top.is_some_and(|top| top.handle() == vertex.handle()),
            "inner stack out of sync"
        );
        Action::Process
    }
}

struct OuterListener<'s, B: Builder> {
    builder: B,
    store: &'s SharedStore<B::State, NdfsExt>,
    stack: Vec<Vertex<B::State>>,
    por: bool,
    lasso: Option<Lasso<Vertex<B::State>>>,
    inner_stats: ExploreStats,
    inner_runs: u64,
    full_expansions: u64,
    failure: Option<SearchError>,
}

impl<B: Builder> OuterListener<'_, B> {
    fn position(&self, vertex: &Vertex<B::State>) -> usize {
        match self.stack.iter().position(|v| v.handle() == vertex.handle()) {
            Some(index) => index,
            None => panic!("closing state is not on the outer stack"),
        }
    }

    /// Runs the inner search from `seed` (the top of the outer stack).
    fn nested_search(&mut self, seed: &Vertex<B::State>) -> Result<Option<Lasso<Vertex<B::State>>>, SearchError> {
        let listener = InnerListener {
            seed: Arc::clone(seed),
            stack: Vec::new(),
            closing: None,
        };
        let explored = explore_dfs(
            &mut self.builder,
            self.store,
            Seeds::Vertices(vec![Arc::clone(seed)]),
            listener,
        )?;
        self.inner_stats += explored.stats;
        self.inner_runs += 1;

        let Some(inner) = explored.listeners.into_iter().next() else {
            return Ok(None);
        };
        let Some(closing) = inner.closing else {
            return Ok(None);
        };
        let at = self.position(&closing);
        let top = self.stack.len() - 1;
        Ok(Some(Lasso {
            tail: self.stack[..at].to_vec(),
            outer: self.stack[at..top].to_vec(),
            inner: inner.stack,
            goal: Arc::clone(seed),
        }))
    }

    /// Whether `state` is already on the outer stack.
    fn on_stack(&self, builder: &B, state: &B::State) -> bool {
        self.store
            .find(builder.hash(state), state, |a, b| builder.equal(a, b))
            .is_some_and(|vertex| vertex.ext().on_stack())
    }
}

impl<B: Builder> Listener<B, NdfsExt> for OuterListener<'_, B> {
    fn state(&mut self, vertex: &Vertex<B::State>) -> Action {
        vertex.ext().on_stack.store(true, Ordering::Relaxed);
        self.stack.push(Arc::clone(vertex));
        Action::Process
    }

    fn edge(
        &mut self,
        from: Option<&Vertex<B::State>>,
        to: &Vertex<B::State>,
        _label: &B::Label,
        _is_new: bool,
    ) -> Action {
        if from.is_some() && to.ext().on_stack() && self.builder.is_accepting(to.state()) {
            let at = self.position(to);
            self.lasso = Some(Lasso {
                tail: self.stack[..at].to_vec(),
                outer: self.stack[at..].to_vec(),
                inner: Vec::new(),
                goal: Arc::clone(to),
            });
            return Action::Terminate;
        }
        Action::AsNeeded
    }

    fn successors(
        &mut self,
        builder: &mut B,
        vertex: &Vertex<B::State>,
    ) -> Vec<(B::State, B::Label)> {
        if self.por {
            if let Some(ample) = builder.ample_edges(vertex.state()).filter(|e| !e.is_empty()) {
                let view: &B = builder;
                if !ample.iter().any(|(state, _)| self.on_stack(view, state)) {
                    vertex.ext().reduced.store(true, Ordering::Relaxed);
                    return ample;
                }
                self.full_expansions += 1;
            }
        }
        builder.edges(vertex.state()).collect()
    }

    fn closed(&mut self, vertex: &Vertex<B::State>) -> Action {
        if self.builder.is_accepting(vertex.state()) {
            match self.nested_search(vertex) {
                Ok(Some(lasso)) => {
                    self.lasso = Some(lasso);
                    return Action::Terminate;
                }
                Ok(None) => {}
                Err(err) => {
                    self.failure = Some(err);
                    return Action::Terminate;
                }
            }
        }
        vertex.ext().on_stack.store(false, Ordering::Relaxed);
        let top = self.stack.pop();
        assert!(
            top.is_some_and(|top| top.handle() == vertex.handle()),
            "outer stack out of sync"
        );
        Action::Process
    }
}

/// Searches for an accepting cycle. Always single-threaded and depth-first.
pub fn nested_dfs<B>(builder: &B, config: &SearchConfig) -> Result<LivenessReport<B::State>, SearchError>
where
    B: Builder + Clone,
{
    if config.workers() > 1 || config.partitioned {
        warn!(
            workers = config.workers(),
            partitioned = config.partitioned,
            "nested dfs runs on a single worker"
        );
    }
    if config.order != SearchOrder::Dfs {
        debug!("nested dfs ignores the configured search order");
    }

    let store: SharedStore<B::State, NdfsExt> = SharedStore::new(config.max_states);
    let mut outer_builder = builder.clone();
    let listener = OuterListener {
        builder: builder.clone(),
        store: &store,
        stack: Vec::new(),
        por: config.por,
        lasso: None,
        inner_stats: ExploreStats::default(),
        inner_runs: 0,
        full_expansions: 0,
        failure: None,
    };
    let explored = explore_dfs(&mut outer_builder, &store, Seeds::Initials, listener)?;
    let mut stats = explored.stats;
    let Some(outer) = explored.listeners.into_iter().next() else {
        panic!("depth-first run hands back its listener");
    };
    if let Some(err) = outer.failure {
        return Err(err);
    }
    stats += outer.inner_stats;

    let verdict = match outer.lasso {
        Some(lasso) => LivenessVerdict::Violated(lasso.map(|v| v.state().clone())),
        None if store.is_empty() => LivenessVerdict::NoStates,
        None => LivenessVerdict::Holds,
    };
    info!(
        states = store.len(),
        inner_runs = outer.inner_runs,
        full_expansions = outer.full_expansions,
        collisions = store.collisions(),
        violated = matches!(verdict, LivenessVerdict::Violated(_)),
        "nested dfs finished"
    );
    Ok(LivenessReport {
        verdict,
        stats,
        stored: store.len(),
    })
}
