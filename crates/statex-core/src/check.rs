use crate::config::{PropertyType, SearchConfig};
use crate::error::SearchError;
use crate::explore::ExploreStats;
use crate::types::{Counterexample, Reason, ReasonKind, Stats, Status};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRequest {
    pub property: PropertyType,
    pub target: Option<String>,
    pub config: SearchConfig,
}

impl CheckRequest {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            property: config.property,
            target: None,
            config,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub property: PropertyType,
    pub target: Option<String>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    pub counterexample: Option<Counterexample>,
    pub stats: Option<Stats>,
}

impl CheckResult {
    pub(crate) fn new(request: &CheckRequest, status: Status) -> Self {
        Self {
            name: "check".to_string(),
            property: request.property,
            target: request.target.clone(),
            status,
            reason: None,
            counterexample: None,
            stats: None,
        }
    }

    pub(crate) fn with_reason(mut self, kind: ReasonKind, message: impl Into<String>) -> Self {
        self.reason = Some(Reason {
            kind,
            message: Some(message.into()),
        });
        self
    }

    pub(crate) fn with_stats(mut self, stored: usize, stats: ExploreStats) -> Self {
        self.stats = Some(Stats {
            states: Some(stored as u64),
            transitions: Some(stats.edges),
            expanded: Some(stats.states),
            deadlocks: Some(stats.deadlocks),
        });
        self
    }
}

pub trait Checker<I> {
    fn check(&self, request: &CheckRequest, input: &I) -> CheckResult;
}

pub(crate) fn search_failure(request: &CheckRequest, err: &SearchError) -> CheckResult {
    match err {
        SearchError::OutOfMemory { .. } => CheckResult::new(request, Status::OutOfMemory)
            .with_reason(ReasonKind::OutOfMemory, err.to_string()),
        SearchError::ThreadPool(_) => CheckResult::new(request, Status::Error)
            .with_reason(ReasonKind::InternalError, err.to_string()),
    }
}

pub(crate) fn render<S: Debug>(states: impl IntoIterator<Item = S>) -> Vec<String> {
    states
        .into_iter()
        .map(|state| format!("{state:?}"))
        .collect()
}
