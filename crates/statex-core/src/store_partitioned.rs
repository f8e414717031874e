use crate::lts::Fingerprint;
use crate::store::{Budget, Handle, Shard, StateStore, VertexRef};

/// One unlocked shard per worker. Worker `i` owns every state whose
/// fingerprint maps to `i` and is the only one that ever touches shard `i`.
#[derive(Debug)]
pub struct PartitionedStore<S, E> {
    shards: Vec<Shard<S, E>>,
    budget: Budget,
}

impl<S, E: Default> PartitionedStore<S, E> {
    pub fn new(workers: usize, max_states: Option<usize>) -> Self {
        Self {
            shards: (0..workers.max(1)).map(|id| Shard::new(id as u32)).collect(),
            budget: Budget::new(max_states),
        }
    }

    pub fn workers(&self) -> usize {
        self.shards.len()
    }

    pub fn owner(&self, fingerprint: Fingerprint) -> usize {
        owner_of(fingerprint, self.shards.len())
    }

    /// Splits the store into the per-worker shards and the shared budget.
    pub fn parts_mut(&mut self) -> (&mut [Shard<S, E>], &Budget) {
        (&mut self.shards, &self.budget)
    }

    pub fn shard(&self, worker: usize) -> &Shard<S, E> {
        &self.shards[worker]
    }
}

pub fn owner_of(fingerprint: Fingerprint, workers: usize) -> usize {
    (fingerprint % workers as u64) as usize
}

impl<S, E: Default> StateStore<S, E> for PartitionedStore<S, E> {
    fn len(&self) -> usize {
        self.budget.used()
    }

    fn get(&self, handle: Handle) -> Option<VertexRef<S, E>> {
        self.shards.get(handle.shard() as usize)?.get(handle).cloned()
    }

    fn for_each_vertex(&self, f: &mut dyn FnMut(&VertexRef<S, E>)) {
        for shard in &self.shards {
            shard.vertices().iter().for_each(&mut *f);
        }
    }

    fn collisions(&self) -> usize {
        self.shards.iter().map(Shard::collisions).sum()
    }
}
