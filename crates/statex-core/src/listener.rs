use crate::lts::Builder;
use crate::store::VertexRef;

/// What the engine should do after consulting a listener callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Edge: expand the target even if it was seen before. State: expand it.
    Process,
    /// Do not act on this edge or state.
    Ignore,
    /// Edge: expand the target only if this edge discovered it.
    AsNeeded,
    /// Stop the whole search; every worker observes it.
    Terminate,
}

/// Callbacks through which an algorithm steers the engine.
///
/// Each worker owns its own listener value. All callbacks for a vertex that
/// is being expanded run on the worker that expands it; callbacks for an edge
/// run on the worker that generated it (or, in the partitioned visitor, on
/// the owner of its target).
pub trait Listener<B: Builder, E> {
    /// Consulted right before `vertex` is queued for expansion.
    fn state(&mut self, _vertex: &VertexRef<B::State, E>) -> Action {
        Action::Process
    }

    /// Consulted for every edge after its target has been canonicalized.
    /// `from` is `None` for seeds.
    fn edge(
        &mut self,
        _from: Option<&VertexRef<B::State, E>>,
        _to: &VertexRef<B::State, E>,
        _label: &B::Label,
        _is_new: bool,
    ) -> Action {
        Action::AsNeeded
    }

    /// Post-order notification; only the DFS engine issues it.
    fn closed(&mut self, _vertex: &VertexRef<B::State, E>) -> Action {
        Action::Process
    }

    /// The expansion of `vertex` produced no successors.
    fn deadlocked(&mut self, _vertex: &VertexRef<B::State, E>) -> Action {
        Action::Ignore
    }

    fn successors(
        &mut self,
        builder: &mut B,
        vertex: &VertexRef<B::State, E>,
    ) -> Vec<(B::State, B::Label)> {
        builder.edges(vertex.state()).collect()
    }
}

/// Listener that accepts everything the engine proposes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Exhaustive;

impl<B: Builder, E> Listener<B, E> for Exhaustive {}
