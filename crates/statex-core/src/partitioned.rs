//! Visitor that partitions state ownership among workers.
//!
//! Each worker owns one shard of a [`PartitionedStore`] and is the only one
//! that canonicalizes, expands, or consults a listener about the states in
//! it. A successor owned by another worker travels to that worker as a
//! message over its inbound channel.

use crate::error::SearchError;
use crate::explore::{expansion, follow, ExploreStats, Explored, Halt, Seeds, Step};
use crate::listener::Listener;
use crate::lts::Builder;
use crate::queue::{LocalQueue, WorkQueue};
use crate::store::{Budget, Shard, StoreError, VertexRef};
use crate::store_partitioned::{owner_of, PartitionedStore};
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// A cross-partition edge: the target is not yet canonical.
struct Message<S, E, L> {
    from: Option<VertexRef<S, E>>,
    to: S,
    label: L,
}

struct Context<'a, S, E, L> {
    outboxes: &'a [Sender<Message<S, E, L>>],
    budget: &'a Budget,
    /// Queued vertices plus in-flight messages, never under-counted.
    outstanding: AtomicUsize,
    interrupt: AtomicBool,
    failure: Mutex<Option<StoreError>>,
}

impl<S, E, L> Context<'_, S, E, L> {
    fn halt(&self, halt: Halt) {
        if let Halt::Store(err) = halt {
            self.failure.lock().get_or_insert(err);
        }
        self.interrupt.store(true, Ordering::SeqCst);
    }

    fn send(&self, owner: usize, message: Message<S, E, L>) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        // a closed inbox means its worker already stopped on an interrupt
        let _ = self.outboxes[owner].send(message);
    }
}

/// Explores with one worker per partition of `store`. The store keeps every
/// state discovered, so later rounds can reuse it.
pub fn explore_partitioned<B, E, L>(
    builder: &B,
    store: &mut PartitionedStore<B::State, E>,
    seeds: Seeds<B::State, E>,
    mut listeners: Vec<L>,
) -> Result<Explored<L>, SearchError>
where
    B: Builder + Clone + Send,
    E: Default + Send + Sync,
    L: Listener<B, E> + Send,
{
    let workers = store.workers();
    assert_eq!(listeners.len(), workers, "one listener per partition");
    let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;

    let (outboxes, inboxes): (Vec<_>, Vec<Receiver<Message<B::State, E, B::Label>>>) =
        (0..workers).map(|_| mpsc::channel()).unzip();
    let (shards, budget) = store.parts_mut();
    let ctx = Context {
        outboxes: &outboxes,
        budget,
        outstanding: AtomicUsize::new(0),
        interrupt: AtomicBool::new(false),
        failure: Mutex::new(None),
    };

    let mut seed_builder = builder.clone();
    let seeds: Vec<B::State> = match seeds {
        Seeds::Initials => seed_builder.initials().collect(),
        Seeds::Vertices(vertices) => vertices.iter().map(|v| v.state().clone()).collect(),
    };
    debug!(workers, seeds = seeds.len(), "partitioned run");
    for state in seeds {
        let owner = owner_of(builder.hash(&state), workers);
        ctx.send(
            owner,
            Message {
                from: None,
                to: state,
                label: B::Label::default(),
            },
        );
    }

    let mut stats = vec![ExploreStats::default(); workers];
    {
        let builders: Vec<B> = (0..workers).map(|_| builder.clone()).collect();
        let ctx = &ctx;
        let listeners = &mut listeners;
        let stats = &mut stats;
        pool.scope(move |scope| {
            let lanes = listeners
                .iter_mut()
                .zip(stats.iter_mut())
                .zip(shards.iter_mut())
                .zip(builders.into_iter().zip(inboxes));
            for (id, (((listener, slot), shard), (builder, inbox))) in lanes.enumerate() {
                scope.spawn(move |_| {
                    let mut worker = PartitionWorker {
                        id,
                        builder,
                        shard,
                        local: LocalQueue::new(),
                        finished: 0,
                        stats: ExploreStats::default(),
                    };
                    worker.run(listener, inbox, ctx);
                    *slot = worker.stats;
                });
            }
        });
    }

    let terminated = ctx.interrupt.load(Ordering::SeqCst);
    if let Some(err) = ctx.failure.into_inner() {
        return Err(err.into());
    }
    let stats = stats.into_iter().fold(ExploreStats::default(), |mut acc, s| {
        acc += s;
        acc
    });
    debug!(
        states = stats.states,
        edges = stats.edges,
        terminated,
        "partitioned run finished"
    );
    Ok(Explored {
        listeners,
        terminated,
        stats,
    })
}

struct PartitionWorker<'s, B: Builder, E> {
    id: usize,
    builder: B,
    shard: &'s mut Shard<B::State, E>,
    local: LocalQueue<VertexRef<B::State, E>>,
    /// Work items handled since the last flush of `outstanding`.
    finished: usize,
    stats: ExploreStats,
}

impl<B, E> PartitionWorker<'_, B, E>
where
    B: Builder,
    E: Default,
{
    fn run<L>(
        &mut self,
        listener: &mut L,
        inbox: Receiver<Message<B::State, E, B::Label>>,
        ctx: &Context<'_, B::State, E, B::Label>,
    ) where
        L: Listener<B, E>,
    {
        loop {
            if ctx.interrupt.load(Ordering::Relaxed) {
                return;
            }
            while let Ok(message) = inbox.try_recv() {
                let outcome = self.accept(listener, message.from.as_ref(), message.to, &message.label, ctx);
                self.finished += 1;
                if let Err(halt) = outcome {
                    ctx.halt(halt);
                    return;
                }
            }
            if let Some(vertex) = self.local.pop() {
                let outcome = self.expand(listener, &vertex, ctx);
                self.finished += 1;
                if let Err(halt) = outcome {
                    ctx.halt(halt);
                    return;
                }
                continue;
            }
            if self.finished > 0 {
                ctx.outstanding.fetch_sub(self.finished, Ordering::SeqCst);
                self.finished = 0;
            }
            if ctx.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            std::thread::yield_now();
        }
    }

    fn expand<L>(
        &mut self,
        listener: &mut L,
        vertex: &VertexRef<B::State, E>,
        ctx: &Context<'_, B::State, E, B::Label>,
    ) -> Result<(), Halt>
    where
        L: Listener<B, E>,
    {
        let successors =
            expansion(listener, &mut self.builder, vertex, &mut self.stats).ok_or(Halt::Terminate)?;
        let workers = ctx.outboxes.len();
        for (state, label) in successors {
            let owner = owner_of(self.builder.hash(&state), workers);
            if owner == self.id {
                self.accept(listener, Some(vertex), state, &label, ctx)?;
            } else {
                ctx.send(
                    owner,
                    Message {
                        from: Some(VertexRef::clone(vertex)),
                        to: state,
                        label,
                    },
                );
            }
        }
        Ok(())
    }

    /// Canonicalizes an edge target owned by this worker and queues it if
    /// the listener wants it expanded.
    fn accept<L>(
        &mut self,
        listener: &mut L,
        from: Option<&VertexRef<B::State, E>>,
        to: B::State,
        label: &B::Label,
        ctx: &Context<'_, B::State, E, B::Label>,
    ) -> Result<(), Halt>
    where
        L: Listener<B, E>,
    {
        let fingerprint = self.builder.hash(&to);
        let builder = &self.builder;
        let (to, is_new) = self.shard.insert_or_get(
            fingerprint,
            to,
            |left, right| builder.equal(left, right),
            ctx.budget,
        )?;
        match follow::<B, E, L>(listener, from, &to, label, is_new) {
            Step::Expand => {
                ctx.outstanding.fetch_add(1, Ordering::SeqCst);
                self.local.push(to);
                Ok(())
            }
            Step::Skip => Ok(()),
            Step::Stop => Err(Halt::Terminate),
        }
    }
}
