use crate::lts::Fingerprint;
use crate::store::{Budget, Handle, Shard, StateStore, StoreError, VertexRef};
use parking_lot::RwLock;
use std::sync::Arc;

const DEFAULT_SHARDS: usize = 64;

/// One logical table split into lock-guarded shards. Any worker may insert
/// any state; contention is limited to the shard a fingerprint falls into.
#[derive(Debug)]
pub struct SharedStore<S, E> {
    shards: Vec<RwLock<Shard<S, E>>>,
    budget: Budget,
}

impl<S, E: Default> SharedStore<S, E> {
    pub fn new(max_states: Option<usize>) -> Self {
        Self::with_shards(DEFAULT_SHARDS, max_states)
    }

    pub fn with_shards(shards: usize, max_states: Option<usize>) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards)
                .map(|id| RwLock::new(Shard::new(id as u32)))
                .collect(),
            budget: Budget::new(max_states),
        }
    }

    fn shard_of(&self, fingerprint: Fingerprint) -> usize {
        (fingerprint % self.shards.len() as u64) as usize
    }

    /// Returns the canonical vertex for `candidate` and whether this call
    /// created it. Exactly one concurrent caller observes `true` for each
    /// equivalence class.
    pub fn insert_or_get<F>(
        &self,
        fingerprint: Fingerprint,
        candidate: S,
        equal: F,
    ) -> Result<(VertexRef<S, E>, bool), StoreError>
    where
        F: Fn(&S, &S) -> bool,
    {
        let shard = &self.shards[self.shard_of(fingerprint)];
        if let Some(found) = shard.read().find(fingerprint, &candidate, &equal) {
            return Ok((Arc::clone(found), false));
        }
        shard
            .write()
            .insert_or_get(fingerprint, candidate, equal, &self.budget)
    }

    pub fn find<F>(&self, fingerprint: Fingerprint, state: &S, equal: F) -> Option<VertexRef<S, E>>
    where
        F: Fn(&S, &S) -> bool,
    {
        self.shards[self.shard_of(fingerprint)]
            .read()
            .find(fingerprint, state, equal)
            .cloned()
    }
}

impl<S, E: Default> StateStore<S, E> for SharedStore<S, E> {
    fn len(&self) -> usize {
        self.budget.used()
    }

    fn get(&self, handle: Handle) -> Option<VertexRef<S, E>> {
        self.shards
            .get(handle.shard() as usize)?
            .read()
            .get(handle)
            .cloned()
    }

    fn for_each_vertex(&self, f: &mut dyn FnMut(&VertexRef<S, E>)) {
        for shard in &self.shards {
            let snapshot = shard.read().vertices().to_vec();
            snapshot.iter().for_each(&mut *f);
        }
    }

    fn collisions(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().collisions()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn concurrent_inserts_have_one_winner_per_state() {
        let store: SharedStore<u64, ()> = SharedStore::with_shards(4, None);
        let winners = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for state in 0..500u64 {
                        // few distinct fingerprints so that chains get exercised
                        let (_, is_new) = store
                            .insert_or_get(state % 37, state, |a, b| a == b)
                            .expect("unbounded store");
                        if is_new {
                            winners.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::Relaxed), 500);
        assert_eq!(store.len(), 500);
        assert_eq!(store.collisions(), 500 - 37);

        let mut seen = Vec::new();
        store.for_each_vertex(&mut |vertex| seen.push(*vertex.state()));
        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn handles_resolve_to_their_vertex() {
        let store: SharedStore<u32, ()> = SharedStore::new(None);
        let (vertex, _) = store.insert_or_get(99, 7, |a, b| a == b).expect("insert");
        let again = store.get(vertex.handle()).expect("known handle");
        assert_eq!(*again.state(), 7);
        assert!(Arc::ptr_eq(&vertex, &again));
    }

    #[test]
    fn limit_applies_across_shards() {
        let store: SharedStore<u32, ()> = SharedStore::with_shards(8, Some(3));
        for state in 0..3 {
            store
                .insert_or_get(u64::from(state), state, |a, b| a == b)
                .expect("within limit");
        }
        assert!(matches!(
            store.insert_or_get(3, 3, |a, b| a == b),
            Err(StoreError::Exhausted { .. })
        ));
    }
}
