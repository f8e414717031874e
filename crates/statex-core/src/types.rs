use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    /// The search stopped at its context-switch bound without a verdict.
    Inconclusive,
    OutOfMemory,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    InvalidInput,
    InternalError,
    OutOfMemory,
    BoundReached,
    NoInitialStates,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reason {
    pub kind: ReasonKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterexampleType {
    Trace,
    Deadlock,
    Lasso,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counterexample {
    #[serde(rename = "type")]
    pub kind: CounterexampleType,
    /// States along the path, rendered with the generator's `Debug`.
    pub states: Vec<String>,
    /// Index into `states` where the accepting cycle starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_start: Option<usize>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub states: Option<u64>,
    pub transitions: Option<u64>,
    pub expanded: Option<u64>,
    pub deadlocks: Option<u64>,
}
