//! Cycle proviso for partial-order reduction.
//!
//! A cycle made only of reduced (ample-set) expansions may postpone an
//! action forever. [`eliminate`] finds the vertices that still sit on, or
//! downstream of, such a cycle and picks, among them, the source of every
//! edge that does not increase handle order. Every cycle contains at least
//! one such edge, so fully expanding the picked vertices breaks every
//! reduced cycle.
//!
//! The fixpoint is a distributed Kahn elimination: vertices are owned by
//! workers by fingerprint, a removed vertex decrements the in-degree of its
//! successors, and decrements for foreign vertices travel as channel
//! messages. Termination uses the same outstanding-work counting as the
//! partitioned visitor.

use crate::error::SearchError;
use crate::store::{Handle, VertexRef};
use crate::store_partitioned::owner_of;
use rayon::ThreadPoolBuilder;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

#[derive(Debug, Default)]
struct Part {
    /// Successors of owned vertices, with the owner of each successor.
    out: FxHashMap<Handle, Vec<(Handle, usize)>>,
    indegree: FxHashMap<Handle, usize>,
}

impl Part {
    fn decrement(&mut self, target: Handle, ready: &mut Vec<Handle>, outstanding: &AtomicUsize) {
        let degree = self
            .indegree
            .get_mut(&target)
            .unwrap_or_else(|| panic!("{target:?} is not owned by this partition"));
        *degree -= 1;
        if *degree == 0 {
            outstanding.fetch_add(1, Ordering::SeqCst);
            ready.push(target);
        }
    }

    fn run(&mut self, id: usize, inbox: Receiver<Handle>, outboxes: &[Sender<Handle>], outstanding: &AtomicUsize) {
        let mut ready: Vec<Handle> = self
            .indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(handle, _)| *handle)
            .collect();
        let mut finished = 0usize;
        loop {
            while let Ok(target) = inbox.try_recv() {
                self.decrement(target, &mut ready, outstanding);
                finished += 1;
            }
            if let Some(removed) = ready.pop() {
                let targets = self.out.get(&removed).cloned().unwrap_or_default();
                for (target, owner) in targets {
                    if owner == id {
                        self.decrement(target, &mut ready, outstanding);
                    } else {
                        outstanding.fetch_add(1, Ordering::SeqCst);
                        let _ = outboxes[owner].send(target);
                    }
                }
                finished += 1;
                continue;
            }
            if finished > 0 {
                outstanding.fetch_sub(finished, Ordering::SeqCst);
                finished = 0;
            }
            if outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            std::thread::yield_now();
        }
    }
}

/// Returns the vertices of the reduced subgraph given by `edges` that must be
/// expanded fully. Both endpoints of every edge must be reduced vertices.
pub fn eliminate<S, E>(
    edges: &[(VertexRef<S, E>, VertexRef<S, E>)],
    workers: usize,
) -> Result<Vec<VertexRef<S, E>>, SearchError> {
    if edges.is_empty() {
        return Ok(Vec::new());
    }
    let workers = workers.max(1);
    let mut parts: Vec<Part> = (0..workers).map(|_| Part::default()).collect();
    for (from, to) in edges {
        let from_owner = owner_of(from.fingerprint(), workers);
        let to_owner = owner_of(to.fingerprint(), workers);
        parts[from_owner].indegree.entry(from.handle()).or_insert(0);
        *parts[to_owner].indegree.entry(to.handle()).or_insert(0) += 1;
        parts[from_owner]
            .out
            .entry(from.handle())
            .or_default()
            .push((to.handle(), to_owner));
    }

    let sources = parts
        .iter()
        .map(|part| part.indegree.values().filter(|degree| **degree == 0).count())
        .sum::<usize>();
    let outstanding = AtomicUsize::new(sources);
    let (outboxes, inboxes): (Vec<Sender<Handle>>, Vec<Receiver<Handle>>) =
        (0..workers).map(|_| mpsc::channel()).unzip();

    let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;
    {
        let outboxes = &outboxes;
        let outstanding = &outstanding;
        let parts = &mut parts;
        pool.scope(move |scope| {
            for (id, (part, inbox)) in parts.iter_mut().zip(inboxes).enumerate() {
                scope.spawn(move |_| part.run(id, inbox, outboxes, outstanding));
            }
        });
    }

    let remaining: FxHashSet<Handle> = parts
        .iter()
        .flat_map(|part| part.indegree.iter())
        .filter(|(_, degree)| **degree > 0)
        .map(|(handle, _)| *handle)
        .collect();

    let mut picked = FxHashSet::default();
    let mut marked = Vec::new();
    for (from, to) in edges {
        let on_cycle = remaining.contains(&from.handle()) && remaining.contains(&to.handle());
        if on_cycle && to.handle() <= from.handle() && picked.insert(from.handle()) {
            marked.push(VertexRef::clone(from));
        }
    }
    debug!(
        edges = edges.len(),
        remaining = remaining.len(),
        marked = marked.len(),
        "reduced-cycle elimination"
    );
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_shared::SharedStore;

    fn vertices(count: u32) -> (SharedStore<u32, ()>, Vec<VertexRef<u32, ()>>) {
        let store = SharedStore::new(None);
        let vertices = (0..count)
            .map(|state| {
                store
                    .insert_or_get(u64::from(state), state, |a, b| a == b)
                    .expect("insert")
                    .0
            })
            .collect();
        (store, vertices)
    }

    #[test]
    fn acyclic_subgraph_marks_nothing() {
        let (_store, v) = vertices(4);
        let edges = vec![
            (v[0].clone(), v[1].clone()),
            (v[1].clone(), v[2].clone()),
            (v[0].clone(), v[3].clone()),
            (v[3].clone(), v[2].clone()),
        ];
        for workers in 1..=3 {
            assert!(eliminate(&edges, workers).expect("pool").is_empty());
        }
    }

    #[test]
    fn every_cycle_gets_a_marked_vertex() {
        let (_store, v) = vertices(6);
        // 0 -> 1 -> 2 -> 0 and 3 -> 4 -> 3, with 5 hanging off the second
        let edges = vec![
            (v[0].clone(), v[1].clone()),
            (v[1].clone(), v[2].clone()),
            (v[2].clone(), v[0].clone()),
            (v[3].clone(), v[4].clone()),
            (v[4].clone(), v[3].clone()),
            (v[4].clone(), v[5].clone()),
        ];
        for workers in 1..=3 {
            let marked: FxHashSet<u32> = eliminate(&edges, workers)
                .expect("pool")
                .iter()
                .map(|vertex| *vertex.state())
                .collect();
            assert!([0, 1, 2].iter().any(|s| marked.contains(s)));
            assert!([3, 4].iter().any(|s| marked.contains(s)));
            assert!(!marked.contains(&5));
        }
    }
}
