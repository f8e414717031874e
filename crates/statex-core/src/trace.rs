use crate::store::{Handle, StateStore, VertexRef};
use std::sync::atomic::{AtomicU64, Ordering};

const UNSET: u64 = u64::MAX;
const ROOT: u64 = u64::MAX - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Unset,
    /// Reached as a seed.
    Root,
    Vertex(Handle),
}

/// Parent pointer kept in a vertex extension. `set_root` and `offer` are
/// write-once, which keeps the pointers a forest rooted at the seeds; `set`
/// overwrites and is left to callers that order their writes themselves.
#[derive(Debug)]
pub struct ParentSlot(AtomicU64);

impl Default for ParentSlot {
    fn default() -> Self {
        Self(AtomicU64::new(UNSET))
    }
}

impl ParentSlot {
    pub fn get(&self) -> Parent {
        match self.0.load(Ordering::Acquire) {
            UNSET => Parent::Unset,
            ROOT => Parent::Root,
            raw => Parent::Vertex(Handle::from_raw(raw)),
        }
    }

    pub fn set_root(&self) -> bool {
        self.claim(ROOT)
    }

    pub fn offer(&self, parent: Handle) -> bool {
        self.claim(parent.to_raw())
    }

    pub fn set(&self, parent: Parent) {
        let raw = match parent {
            Parent::Unset => UNSET,
            Parent::Root => ROOT,
            Parent::Vertex(handle) => handle.to_raw(),
        };
        self.0.store(raw, Ordering::Release);
    }

    fn claim(&self, raw: u64) -> bool {
        self.0
            .compare_exchange(UNSET, raw, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Follows parent pointers from `last` back to a seed and returns the path in
/// forward order.
pub fn parent_chain<S, E, St, F>(store: &St, last: &VertexRef<S, E>, parent_of: F) -> Vec<VertexRef<S, E>>
where
    St: StateStore<S, E> + ?Sized,
    F: Fn(&E) -> &ParentSlot,
{
    let mut path = vec![VertexRef::clone(last)];
    loop {
        let current = &path[path.len() - 1];
        match parent_of(current.ext()).get() {
            Parent::Root | Parent::Unset => break,
            Parent::Vertex(handle) => {
                let parent = store
                    .get(handle)
                    .unwrap_or_else(|| panic!("parent {handle:?} is not in the store"));
                path.push(parent);
            }
        }
        assert!(path.len() <= store.len(), "parent pointers form a cycle");
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_shared::SharedStore;

    #[test]
    fn first_offer_wins() {
        let slot = ParentSlot::default();
        assert_eq!(slot.get(), Parent::Unset);
        assert!(slot.offer(Handle::new(0, 3)));
        assert!(!slot.set_root());
        assert_eq!(slot.get(), Parent::Vertex(Handle::new(0, 3)));

        slot.set(Parent::Root);
        assert_eq!(slot.get(), Parent::Root);
    }

    #[test]
    fn chain_is_reported_from_the_root() {
        let store: SharedStore<u32, ParentSlot> = SharedStore::new(None);
        let insert = |state: u32| {
            store
                .insert_or_get(u64::from(state), state, |a, b| a == b)
                .expect("insert")
                .0
        };
        let a = insert(1);
        let b = insert(2);
        let c = insert(3);
        a.ext().set_root();
        b.ext().offer(a.handle());
        c.ext().offer(b.handle());

        let path: Vec<u32> = parent_chain(&store, &c, |ext| ext)
            .iter()
            .map(|v| *v.state())
            .collect();
        assert_eq!(path, vec![1, 2, 3]);
    }
}
