pub mod check;
pub mod check_explore;
pub mod check_liveness;
pub mod check_safety;
pub mod config;
pub mod csdr;
pub mod error;
pub mod explore;
pub mod listener;
pub mod lts;
pub mod lts_explicit;
pub mod ndfs;
pub mod partitioned;
pub mod por;
pub mod queue;
pub mod queue_shared;
pub mod reachability;
pub mod store;
pub mod store_partitioned;
pub mod store_shared;
pub mod trace;
pub mod types;

pub use check::{CheckRequest, CheckResult, Checker};
pub use check_explore::{state_space, ExplorationChecker};
pub use check_liveness::LivenessChecker;
pub use check_safety::SafetyChecker;
pub use config::{PropertyType, SearchConfig, SearchOrder};
pub use csdr::{csdr, CsdrExt};
pub use error::SearchError;
pub use explore::{explore, explore_bfs, explore_dfs, ExploreStats, Explored, Seeds};
pub use listener::{Action, Exhaustive, Listener};
pub use lts::{Builder, EdgeFlags, Fingerprint, Label};
pub use lts_explicit::{ExplicitBuilder, ExplicitEdge, ExplicitGraph, GraphError, NodeId};
pub use ndfs::{nested_dfs, Lasso, LivenessReport, LivenessVerdict, NdfsExt};
pub use partitioned::explore_partitioned;
pub use queue::{LocalQueue, WorkQueue};
pub use queue_shared::SharedQueue;
pub use reachability::{reachability, ReachExt, SafetyReport, Verdict, ViolationKind, Witness};
pub use store::{Handle, StateStore, StoreError, Vertex, VertexRef};
pub use store_partitioned::PartitionedStore;
pub use store_shared::SharedStore;
pub use types::{Counterexample, CounterexampleType, Reason, ReasonKind, Stats, Status};
