use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrder {
    /// Multi-threaded, approximately level-ordered.
    #[default]
    Bfs,
    /// Single-threaded depth-first with post-order notifications.
    Dfs,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    /// A state without successors is a violation.
    #[default]
    Deadlock,
    /// A goal state or an error edge is a violation.
    Goal,
    /// An accepting cycle is a violation.
    Liveness,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub workers: usize,
    pub order: SearchOrder,
    pub partitioned: bool,
    /// Enables context-switch-bounded reachability when set.
    pub context_switch_bound: Option<u32>,
    pub property: PropertyType,
    pub por: bool,
    pub max_states: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            order: SearchOrder::Bfs,
            partitioned: false,
            context_switch_bound: None,
            property: PropertyType::Deadlock,
            por: false,
            max_states: None,
        }
    }
}

impl SearchConfig {
    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }
}
