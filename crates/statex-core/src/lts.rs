use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub type Fingerprint = u64;

/// Metadata carried by an edge of the transition system.
pub trait Label: Clone + Default + Debug + Send + Sync {
    /// The edge itself violates the safety property (an assertion failure,
    /// an error transition of the generator).
    fn is_error(&self) -> bool {
        false
    }

    /// The edge is taken by a different thread than the one that produced
    /// its source state.
    fn is_context_switch(&self) -> bool {
        false
    }
}

/// The label used by generators that only need the two standard flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeFlags {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub context_switch: bool,
}

impl EdgeFlags {
    pub fn context_switch() -> Self {
        Self {
            context_switch: true,
            ..Self::default()
        }
    }

    pub fn error() -> Self {
        Self {
            error: true,
            ..Self::default()
        }
    }
}

impl Label for EdgeFlags {
    fn is_error(&self) -> bool {
        self.error
    }

    fn is_context_switch(&self) -> bool {
        self.context_switch
    }
}

/// Lazy state-space generator consumed by every search in this crate.
///
/// Each worker thread runs its own clone of the builder, so implementations
/// should keep shared data behind an `Arc`. `hash` and `equal` are the only
/// operations the state store uses; they must be total and deterministic, and
/// equal states must have equal fingerprints.
pub trait Builder {
    type State: Clone + Debug + Send + Sync;
    type Label: Label;

    fn initials(&mut self) -> impl Iterator<Item = Self::State>;

    fn edges(&mut self, from: &Self::State) -> impl Iterator<Item = (Self::State, Self::Label)>;

    fn hash(&self, state: &Self::State) -> Fingerprint;

    fn equal(&self, left: &Self::State, right: &Self::State) -> bool;

    /// A reduced (ample) subset of `edges`, or `None` when the state has to be
    /// expanded fully. Only consulted by searches with partial-order reduction
    /// enabled.
    fn ample_edges(&mut self, _from: &Self::State) -> Option<Vec<(Self::State, Self::Label)>> {
        None
    }

    fn is_accepting(&self, _state: &Self::State) -> bool {
        false
    }

    fn is_goal(&self, _state: &Self::State) -> bool {
        false
    }
}
