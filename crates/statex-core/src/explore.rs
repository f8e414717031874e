use crate::config::SearchOrder;
use crate::error::SearchError;
use crate::listener::{Action, Listener};
use crate::lts::Builder;
use crate::queue::WorkQueue;
use crate::queue_shared::{QueueHandle, SharedQueue, DEFAULT_CHUNK};
use crate::store::{StoreError, VertexRef};
use crate::store_shared::SharedStore;
use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a run starts.
#[derive(Debug)]
pub enum Seeds<S, E> {
    Initials,
    /// Vertices already canonical in the store the run uses.
    Vertices(Vec<VertexRef<S, E>>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExploreStats {
    /// Expanded vertices.
    pub states: u64,
    pub edges: u64,
    pub deadlocks: u64,
}

impl AddAssign for ExploreStats {
    fn add_assign(&mut self, other: Self) {
        self.states += other.states;
        self.edges += other.edges;
        self.deadlocks += other.deadlocks;
    }
}

/// Result of a run: the listeners handed back in worker order.
#[derive(Debug)]
pub struct Explored<L> {
    pub listeners: Vec<L>,
    pub terminated: bool,
    pub stats: ExploreStats,
}

pub(crate) enum Step {
    Expand,
    Skip,
    Stop,
}

pub(crate) enum Halt {
    Terminate,
    Store(StoreError),
}

impl From<StoreError> for Halt {
    fn from(err: StoreError) -> Self {
        Halt::Store(err)
    }
}

/// Offers an edge, then (if the edge is followed) its target, to the
/// listener.
pub(crate) fn follow<B, E, L>(
    listener: &mut L,
    from: Option<&VertexRef<B::State, E>>,
    to: &VertexRef<B::State, E>,
    label: &B::Label,
    is_new: bool,
) -> Step
where
    B: Builder,
    L: Listener<B, E>,
{
    match listener.edge(from, to, label, is_new) {
        Action::Terminate => return Step::Stop,
        Action::Ignore => return Step::Skip,
        Action::AsNeeded if !is_new => return Step::Skip,
        Action::AsNeeded | Action::Process => {}
    }
    match listener.state(to) {
        Action::Terminate => Step::Stop,
        Action::Ignore => Step::Skip,
        Action::AsNeeded | Action::Process => Step::Expand,
    }
}

/// Generates the successors of `vertex`. `None` means the listener asked to
/// terminate on a deadlock.
pub(crate) fn expansion<B, E, L>(
    listener: &mut L,
    builder: &mut B,
    vertex: &VertexRef<B::State, E>,
    stats: &mut ExploreStats,
) -> Option<Vec<(B::State, B::Label)>>
where
    B: Builder,
    L: Listener<B, E>,
{
    stats.states += 1;
    let successors = listener.successors(builder, vertex);
    stats.edges += successors.len() as u64;
    if successors.is_empty() {
        stats.deadlocks += 1;
        if listener.deadlocked(vertex) == Action::Terminate {
            return None;
        }
    }
    Some(successors)
}

pub(crate) fn canonicalize<B, E>(
    builder: &B,
    store: &SharedStore<B::State, E>,
    state: B::State,
) -> Result<(VertexRef<B::State, E>, bool), StoreError>
where
    B: Builder,
    E: Default,
{
    let fingerprint = builder.hash(&state);
    store.insert_or_get(fingerprint, state, |left, right| builder.equal(left, right))
}

fn resolve_seeds<B, E>(
    builder: &mut B,
    store: &SharedStore<B::State, E>,
    seeds: Seeds<B::State, E>,
) -> Result<Vec<(VertexRef<B::State, E>, bool)>, StoreError>
where
    B: Builder,
    E: Default,
{
    match seeds {
        Seeds::Initials => {
            let initials: Vec<B::State> = builder.initials().collect();
            initials
                .into_iter()
                .map(|state| canonicalize(builder, store, state))
                .collect()
        }
        Seeds::Vertices(vertices) => Ok(vertices.into_iter().map(|v| (v, false)).collect()),
    }
}

/// Runs either engine over a shared store. DFS uses the first listener only;
/// the others are handed back untouched.
pub fn explore<B, E, L>(
    builder: &B,
    store: &SharedStore<B::State, E>,
    seeds: Seeds<B::State, E>,
    listeners: Vec<L>,
    order: SearchOrder,
) -> Result<Explored<L>, SearchError>
where
    B: Builder + Clone + Send,
    E: Default + Send + Sync,
    L: Listener<B, E> + Send,
{
    match order {
        SearchOrder::Bfs => explore_bfs(builder, store, seeds, listeners),
        SearchOrder::Dfs => {
            let mut rest = listeners;
            assert!(!rest.is_empty(), "a search needs at least one listener");
            if rest.len() > 1 {
                warn!(
                    workers = rest.len(),
                    "depth-first search is single-threaded; extra workers stay idle"
                );
            }
            let first = rest.remove(0);
            let mut builder = builder.clone();
            let mut explored = explore_dfs(&mut builder, store, seeds, first)?;
            explored.listeners.extend(rest);
            Ok(explored)
        }
    }
}

struct Context<'a, S, E> {
    store: &'a SharedStore<S, E>,
    queue: SharedQueue<VertexRef<S, E>>,
    interrupt: AtomicBool,
    failure: Mutex<Option<StoreError>>,
}

impl<S, E> Context<'_, S, E> {
    fn halt(&self, halt: Halt) {
        if let Halt::Store(err) = halt {
            self.failure.lock().get_or_insert(err);
        }
        self.interrupt.store(true, Ordering::SeqCst);
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }
}

/// Pseudo-BFS with one worker per listener.
pub fn explore_bfs<B, E, L>(
    builder: &B,
    store: &SharedStore<B::State, E>,
    seeds: Seeds<B::State, E>,
    mut listeners: Vec<L>,
) -> Result<Explored<L>, SearchError>
where
    B: Builder + Clone + Send,
    E: Default + Send + Sync,
    L: Listener<B, E> + Send,
{
    let workers = listeners.len();
    assert!(workers > 0, "a search needs at least one listener");
    let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;

    let ctx = Context {
        store,
        queue: SharedQueue::new(DEFAULT_CHUNK),
        interrupt: AtomicBool::new(false),
        failure: Mutex::new(None),
    };

    let mut seed_builder = builder.clone();
    let seeds = resolve_seeds(&mut seed_builder, store, seeds)?;
    debug!(workers, seeds = seeds.len(), "pseudo-bfs run");

    let mut terminated = false;
    {
        let mut queue = ctx.queue.handle();
        for (index, (vertex, is_new)) in seeds.into_iter().enumerate() {
            let listener = &mut listeners[index % workers];
            match follow::<B, E, L>(listener, None, &vertex, &B::Label::default(), is_new) {
                Step::Expand => queue.push(vertex),
                Step::Skip => {}
                Step::Stop => {
                    terminated = true;
                    break;
                }
            }
        }
        queue.flush();
    }

    let mut stats = vec![ExploreStats::default(); workers];
    if !terminated {
        let builders: Vec<B> = (0..workers).map(|_| builder.clone()).collect();
        let ctx = &ctx;
        let listeners = &mut listeners;
        let stats = &mut stats;
        pool.scope(move |scope| {
            for ((listener, slot), builder) in listeners
                .iter_mut()
                .zip(stats.iter_mut())
                .zip(builders)
            {
                scope.spawn(move |_| *slot = bfs_worker(builder, listener, ctx));
            }
        });
    }

    terminated |= ctx.interrupt.load(Ordering::SeqCst);
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
        "pseudo-bfs run finished"
    );
    Ok(Explored {
        listeners,
        terminated,
        stats,
    })
}

fn bfs_worker<B, E, L>(mut builder: B, listener: &mut L, ctx: &Context<'_, B::State, E>) -> ExploreStats
where
    B: Builder,
    E: Default,
    L: Listener<B, E>,
{
    let mut queue = ctx.queue.handle();
    let mut stats = ExploreStats::default();
    loop {
        if ctx.interrupted() {
            break;
        }
        let Some(vertex) = queue.pop() else {
            if queue.is_finished() {
                break;
            }
            std::thread::yield_now();
            continue;
        };
        let outcome = expand_into(&mut builder, listener, ctx.store, &vertex, &mut queue, &mut stats);
        queue.done();
        if let Err(halt) = outcome {
            ctx.halt(halt);
            break;
        }
    }
    queue.flush();
    stats
}

fn expand_into<B, E, L>(
    builder: &mut B,
    listener: &mut L,
    store: &SharedStore<B::State, E>,
    vertex: &VertexRef<B::State, E>,
    queue: &mut QueueHandle<'_, VertexRef<B::State, E>>,
    stats: &mut ExploreStats,
) -> Result<(), Halt>
where
    B: Builder,
    E: Default,
    L: Listener<B, E>,
{
    let successors = expansion(listener, builder, vertex, stats).ok_or(Halt::Terminate)?;
    for (state, label) in successors {
        let (to, is_new) = canonicalize(builder, store, state)?;
        match follow::<B, E, L>(listener, Some(vertex), &to, &label, is_new) {
            Step::Expand => queue.push(to),
            Step::Skip => {}
            Step::Stop => return Err(Halt::Terminate),
        }
    }
    Ok(())
}

struct Frame<S, E, L> {
    vertex: VertexRef<S, E>,
    successors: std::vec::IntoIter<(S, L)>,
}

fn open<B, E, L>(
    listener: &mut L,
    builder: &mut B,
    vertex: &VertexRef<B::State, E>,
    stats: &mut ExploreStats,
) -> Option<Frame<B::State, E, B::Label>>
where
    B: Builder,
    L: Listener<B, E>,
{
    expansion(listener, builder, vertex, stats).map(|successors| Frame {
        vertex: Arc::clone(vertex),
        successors: successors.into_iter(),
    })
}

/// Single-threaded depth-first search on an explicit stack. `closed` fires
/// when a vertex's last successor has been handled.
pub fn explore_dfs<B, E, L>(
    builder: &mut B,
    store: &SharedStore<B::State, E>,
    seeds: Seeds<B::State, E>,
    mut listener: L,
) -> Result<Explored<L>, SearchError>
where
    B: Builder,
    E: Default,
    L: Listener<B, E>,
{
    let mut stats = ExploreStats::default();
    let seeds = resolve_seeds(builder, store, seeds)?;
    let mut stack: Vec<Frame<B::State, E, B::Label>> = Vec::new();
    let mut terminated = false;

    'seeds: for (seed, is_new) in seeds {
        match follow::<B, E, L>(&mut listener, None, &seed, &B::Label::default(), is_new) {
            Step::Expand => {}
            Step::Skip => continue,
            Step::Stop => {
                terminated = true;
                break;
            }
        }
        let Some(frame) = open(&mut listener, builder, &seed, &mut stats) else {
            terminated = true;
            break;
        };
        stack.push(frame);

        while let Some(top) = stack.last_mut() {
            let Some((state, label)) = top.successors.next() else {
                if let Some(done) = stack.pop() {
                    if listener.closed(&done.vertex) == Action::Terminate {
                        terminated = true;
                        break 'seeds;
                    }
                }
                continue;
            };
            let from = Arc::clone(&top.vertex);
            let (to, is_new) = canonicalize(builder, store, state)?;
            match follow::<B, E, L>(&mut listener, Some(&from), &to, &label, is_new) {
                Step::Expand => match open(&mut listener, builder, &to, &mut stats) {
                    Some(frame) => stack.push(frame),
                    None => {
                        terminated = true;
                        break 'seeds;
                    }
                },
                Step::Skip => {}
                Step::Stop => {
                    terminated = true;
                    break 'seeds;
                }
            }
        }
    }

    debug!(
        states = stats.states,
        edges = stats.edges,
        terminated,
        "depth-first run finished"
    );
    Ok(Explored {
        listeners: vec![listener],
        terminated,
        stats,
    })
}
