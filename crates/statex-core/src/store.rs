//! Canonical state storage shared by every search in the crate.
//!
//! A store hands out [`Vertex`] records: the canonical copy of a state, its
//! fingerprint, its [`Handle`], and an extension slot `E` that the running
//! algorithm uses for its own bookkeeping. Vertices live in per-shard arenas
//! behind `Arc`, so a handle (shard, slot) stays valid for the whole lifetime
//! of the store no matter how the index grows.

use crate::lts::Fingerprint;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("state store exhausted after {states} states")]
    Exhausted { states: usize },
}

/// Stable identity of a canonical state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub fn new(shard: u32, slot: u32) -> Self {
        Self((u64::from(shard) << 32) | u64::from(slot))
    }

    pub fn shard(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn slot(self) -> u32 {
        self.0 as u32
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.shard(), self.slot())
    }
}

#[derive(Debug)]
pub struct Vertex<S, E> {
    handle: Handle,
    fingerprint: Fingerprint,
    state: S,
    ext: E,
}

impl<S, E> Vertex<S, E> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn ext(&self) -> &E {
        &self.ext
    }
}

pub type VertexRef<S, E> = Arc<Vertex<S, E>>;

/// Read access common to the shared and the partitioned store.
pub trait StateStore<S, E> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, handle: Handle) -> Option<VertexRef<S, E>>;

    fn for_each_vertex(&self, f: &mut dyn FnMut(&VertexRef<S, E>));

    /// Distinct states that landed on an already used fingerprint.
    fn collisions(&self) -> usize;
}

/// Global count of canonical states, optionally capped.
#[derive(Debug, Default)]
pub struct Budget {
    used: AtomicUsize,
    limit: Option<usize>,
}

impl Budget {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            used: AtomicUsize::new(0),
            limit,
        }
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<(), StoreError> {
        let previous = self.used.fetch_add(1, Ordering::AcqRel);
        match self.limit {
            Some(limit) if previous >= limit => {
                self.used.fetch_sub(1, Ordering::AcqRel);
                Err(StoreError::Exhausted { states: previous })
            }
            _ => Ok(()),
        }
    }

    fn release(&self) {
        self.used.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
enum Bucket {
    One(u32),
    Many(Vec<u32>),
}

impl Bucket {
    fn slots(&self) -> &[u32] {
        match self {
            Bucket::One(slot) => std::slice::from_ref(slot),
            Bucket::Many(slots) => slots,
        }
    }

    fn push(&mut self, slot: u32) {
        match self {
            Bucket::One(first) => *self = Bucket::Many(vec![*first, slot]),
            Bucket::Many(slots) => slots.push(slot),
        }
    }
}

/// One arena plus its fingerprint index. A shard is not synchronized; the
/// shared store wraps each shard in a lock, the partitioned store gives each
/// worker exclusive ownership of one shard.
#[derive(Debug)]
pub struct Shard<S, E> {
    id: u32,
    index: FxHashMap<Fingerprint, Bucket>,
    vertices: Vec<VertexRef<S, E>>,
    collisions: usize,
}

impl<S, E: Default> Shard<S, E> {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            index: FxHashMap::default(),
            vertices: Vec::new(),
            collisions: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn get(&self, handle: Handle) -> Option<&VertexRef<S, E>> {
        if handle.shard() != self.id {
            return None;
        }
        self.vertices.get(handle.slot() as usize)
    }

    pub fn vertices(&self) -> &[VertexRef<S, E>] {
        &self.vertices
    }

    pub fn find<F>(&self, fingerprint: Fingerprint, state: &S, equal: F) -> Option<&VertexRef<S, E>>
    where
        F: Fn(&S, &S) -> bool,
    {
        let bucket = self.index.get(&fingerprint)?;
        bucket
            .slots()
            .iter()
            .map(|&slot| &self.vertices[slot as usize])
            .find(|vertex| equal(&vertex.state, state))
    }

    /// Adopt `candidate` unless an equal state is already present. A new
    /// state is charged against `budget`.
    pub fn insert_or_get<F>(
        &mut self,
        fingerprint: Fingerprint,
        candidate: S,
        equal: F,
        budget: &Budget,
    ) -> Result<(VertexRef<S, E>, bool), StoreError>
    where
        F: Fn(&S, &S) -> bool,
    {
        if let Some(existing) = self.find(fingerprint, &candidate, &equal) {
            return Ok((Arc::clone(existing), false));
        }

        budget.acquire()?;
        let exhausted = StoreError::Exhausted {
            states: budget.used(),
        };
        let reserved = u32::try_from(self.vertices.len()).is_ok()
            && self.vertices.try_reserve(1).is_ok()
            && self.index.try_reserve(1).is_ok();
        if !reserved {
            budget.release();
            return Err(exhausted);
        }
        let slot = self.vertices.len() as u32;

        let vertex = Arc::new(Vertex {
            handle: Handle::new(self.id, slot),
            fingerprint,
            state: candidate,
            ext: E::default(),
        });
        self.vertices.push(Arc::clone(&vertex));
        match self.index.get_mut(&fingerprint) {
            Some(bucket) => {
                self.collisions += 1;
                bucket.push(slot);
            }
            None => {
                self.index.insert(fingerprint, Bucket::One(slot));
            }
        }
        Ok((vertex, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_roundtrips_shard_and_slot() {
        let handle = Handle::new(7, 42);
        assert_eq!(handle.shard(), 7);
        assert_eq!(handle.slot(), 42);
        assert_eq!(Handle::from_raw(handle.to_raw()), handle);
    }

    #[test]
    fn shard_chains_colliding_fingerprints() {
        let budget = Budget::default();
        let mut shard: Shard<u32, ()> = Shard::new(0);
        let (a, new_a) = shard.insert_or_get(5, 1, |x, y| x == y, &budget).expect("insert");
        let (b, new_b) = shard.insert_or_get(5, 2, |x, y| x == y, &budget).expect("insert");
        let (c, new_c) = shard.insert_or_get(5, 1, |x, y| x == y, &budget).expect("insert");

        assert!(new_a && new_b && !new_c);
        assert_ne!(a.handle(), b.handle());
        assert_eq!(a.handle(), c.handle());
        assert_eq!(shard.len(), 2);
        assert_eq!(shard.collisions(), 1);
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn shard_reports_exhaustion_at_limit() {
        let budget = Budget::new(Some(1));
        let mut shard: Shard<u32, ()> = Shard::new(0);
        shard.insert_or_get(1, 1, |x, y| x == y, &budget).expect("insert");
        let err = shard
            .insert_or_get(2, 2, |x, y| x == y, &budget)
            .expect_err("limit reached");
        assert_eq!(err, StoreError::Exhausted { states: 1 });
        assert_eq!(budget.used(), 1);
        // lookups of known states still succeed at the limit
        assert!(!shard.insert_or_get(1, 1, |x, y| x == y, &budget).expect("hit").1);
    }
}
