use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("out of memory: state store exhausted after {states} states")]
    OutOfMemory { states: usize },
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Exhausted { states } => SearchError::OutOfMemory { states },
        }
    }
}
