//! Lazy, reusable stream pipelines.
//!
//! A [Stream] stores how to produce its items rather than the items themselves. Adding a
//! stage returns a new [Stream] sharing the old source and stages, so earlier values stay
//! usable. Nothing runs until a terminal operation such as [collect()](Stream::collect)
//! is awaited. At that point every stage is spawned as its own task, connected to its
//! neighbours by channels.
//!
//! A stage stops as soon as either side goes away. When its upstream closes it closes its
//! own output. Before every receive it checks whether its consumer dropped the receiving
//! end, and if so it returns and drops its input in turn. This is what lets
//! [take()](Stream::take), [any_match()](Stream::any_match) and
//! [find_first()](Stream::find_first) stop an infinite source, even behind stages that
//! forward only some items.
//!
//! A panic inside a stage or a worker ends the run. The async terminals and
//! [spawned()](Stream::spawned) resume it in the consuming task once the remaining items
//! are delivered.

use crate::{
    common::*,
    context::Context,
    index_stream::IndexedStreamExt as _,
    rt, utils,
};
use futures::stream::{self, BoxStream};
use std::{any::Any, panic::AssertUnwindSafe};

type Panic = Box<dyn Any + Send>;
type Materialize<T> = Arc<dyn Fn(&Run) -> flume::Receiver<T> + Send + Sync>;

/// Output ordering of the [parallel()](Stream::parallel) stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputOrder {
    /// Items are emitted in input order. Early finishers wait for their predecessors.
    Preserved,
    /// Items are emitted in completion order.
    Unordered,
}

/// State shared by the tasks of one run.
struct Run {
    panics: flume::Sender<Panic>,
}

impl Run {
    /// Spawns a task writing to `output`. A panic is reported before `output` closes.
    fn spawn<U, Fut>(&self, output: flume::Sender<U>, task: Fut)
    where
        U: 'static + Send,
        Fut: 'static + Future<Output = ()> + Send,
    {
        let panics = self.panics.clone();

        rt::spawn(async move {
            if let Err(payload) = AssertUnwindSafe(task).catch_unwind().await {
                debug!("stream stage panicked");
                let _ = panics.send(payload);
            }
            drop(output);
        });
    }
}

/// Receiving end of a run.
struct Output<T> {
    items: flume::Receiver<T>,
    panics: flume::Receiver<Panic>,
}

impl<T> Output<T> {
    /// Returns the next item, or resumes a stage panic once the items run out.
    async fn next(&self) -> Option<T> {
        match self.items.recv_async().await {
            Ok(item) => Some(item),
            Err(_) => {
                resume_panic(&self.panics);
                None
            }
        }
    }
}

fn resume_panic(panics: &flume::Receiver<Panic>) {
    if let Ok(payload) = panics.try_recv() {
        std::panic::resume_unwind(payload);
    }
}

/// Receives the next upstream item unless the consumer of `output` is gone.
async fn next_item<T, U>(input: &flume::Receiver<T>, output: &flume::Sender<U>) -> Option<T> {
    if output.is_disconnected() {
        return None;
    }
    input.recv_async().await.ok()
}

/// A lazy pipeline of stages over a source of items.
///
/// ```rust
/// # tokio::runtime::Runtime::new().unwrap().block_on(async move {
/// use par_fp::Stream;
///
/// let squares = Stream::range(1, 11)
///     .filter(|value| value % 2 == 0)
///     .map(|value| value * value)
///     .take(3)
///     .collect()
///     .await;
/// assert_eq!(squares, vec![4, 16, 36]);
/// # })
/// ```
#[derive(Derivative)]
#[derivative(Debug, Clone(bound = ""))]
pub struct Stream<T> {
    #[derivative(Debug = "ignore")]
    materialize: Materialize<T>,
    num_stages: usize,
}

impl<T> Stream<T>
where
    T: 'static + Send,
{
    fn from_source<F>(source: F) -> Self
    where
        F: 'static + Fn(&Run) -> flume::Receiver<T> + Send + Sync,
    {
        Self {
            materialize: Arc::new(source),
            num_stages: 0,
        }
    }

    /// Creates a stream over the items of a vector. Each run sends clones of the items.
    pub fn from_vec(items: Vec<T>) -> Self
    where
        T: Clone + Sync,
    {
        let items = Arc::new(items);

        Self::from_source(move |run: &Run| {
            let items = items.clone();
            let len = items.len();
            spawn_source(run, (0..len).map(move |index| items[index].clone()), len)
        })
    }

    /// Creates a stream reading from an existing channel.
    ///
    /// The channel is shared by every run, so a second run only sees the items the first
    /// one left behind.
    pub fn from_channel(receiver: flume::Receiver<T>) -> Self {
        Self::from_source(move |_: &Run| receiver.clone())
    }

    /// Creates a stream from a generator that opens a fresh channel on every run.
    pub fn from_fn<F>(generator: F) -> Self
    where
        F: 'static + Fn() -> flume::Receiver<T> + Send + Sync,
    {
        Self::from_source(move |_: &Run| generator())
    }

    /// Creates a stream yielding `value` `count` times.
    pub fn repeat(value: T, count: usize) -> Self
    where
        T: Clone + Sync,
    {
        Self::from_source(move |run: &Run| {
            spawn_source(run, iter::repeat(value.clone()).take(count), 0)
        })
    }

    /// Creates an endless stream calling `generator` for every item.
    ///
    /// Generation stops once the consumer goes away, for example behind [take()](Stream::take).
    pub fn infinite<F>(generator: F) -> Self
    where
        F: 'static + Fn() -> T + Send + Sync,
    {
        let generator = Arc::new(generator);

        Self::from_source(move |run: &Run| {
            let generator = generator.clone();
            spawn_source(run, iter::repeat_with(move || generator()), 0)
        })
    }

    /// The number of stages appended to the source.
    pub fn num_stages(&self) -> usize {
        self.num_stages
    }

    fn stage<U, F, Fut>(&self, capacity: usize, body: F) -> Stream<U>
    where
        U: 'static + Send,
        F: 'static + Fn(flume::Receiver<T>, flume::Sender<U>) -> Fut + Send + Sync,
        Fut: 'static + Future<Output = ()> + Send,
    {
        let upstream = self.materialize.clone();

        Stream {
            materialize: Arc::new(move |run: &Run| {
                let input = upstream(run);
                let (output_tx, output_rx) = utils::conduit(capacity);
                run.spawn(output_tx.clone(), body(input, output_tx));
                output_rx
            }),
            num_stages: self.num_stages + 1,
        }
    }

    /// Transforms each item with `f`.
    pub fn map<U, F>(&self, f: F) -> Stream<U>
    where
        U: 'static + Send,
        F: 'static + Fn(T) -> U + Send + Sync,
    {
        let f = Arc::new(f);

        self.stage(0, move |input, output| {
            let f = f.clone();

            async move {
                while let Some(item) = next_item(&input, &output).await {
                    if output.send_async(f(item)).await.is_err() {
                        break;
                    }
                }
            }
        })
    }

    /// Keeps the items satisfying `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: 'static + Fn(&T) -> bool + Send + Sync,
    {
        let predicate = Arc::new(predicate);

        self.stage(0, move |input, output| {
            let predicate = predicate.clone();

            async move {
                while let Some(item) = next_item(&input, &output).await {
                    if predicate(&item) && output.send_async(item).await.is_err() {
                        break;
                    }
                }
            }
        })
    }

    /// Forwards the first `n` items, then stops reading upstream.
    pub fn take(&self, n: usize) -> Self {
        self.stage(0, move |input, output| async move {
            let mut remaining = n;

            while remaining > 0 {
                let item = match next_item(&input, &output).await {
                    Some(item) => item,
                    None => break,
                };
                if output.send_async(item).await.is_err() {
                    break;
                }
                remaining -= 1;
            }
        })
    }

    /// Discards the first `n` items.
    pub fn skip(&self, n: usize) -> Self {
        self.stage(0, move |input, output| async move {
            let mut skipped = 0;

            while let Some(item) = next_item(&input, &output).await {
                if skipped < n {
                    skipped += 1;
                    continue;
                }
                if output.send_async(item).await.is_err() {
                    break;
                }
            }
        })
    }

    /// Drops items equal to an earlier one under `eq`.
    ///
    /// Every item is compared with all distinct items seen so far. Prefer
    /// [distinct_comparable()](Stream::distinct_comparable) for hashable items.
    pub fn distinct<F>(&self, eq: F) -> Self
    where
        T: Clone,
        F: 'static + Fn(&T, &T) -> bool + Send + Sync,
    {
        let eq = Arc::new(eq);

        self.stage(0, move |input, output| {
            let eq = eq.clone();

            async move {
                let mut seen: Vec<T> = vec![];

                while let Some(item) = next_item(&input, &output).await {
                    if seen.iter().any(|prev| eq(&item, prev)) {
                        continue;
                    }
                    seen.push(item.clone());

                    if output.send_async(item).await.is_err() {
                        break;
                    }
                }
            }
        })
    }

    /// Drops items already seen, using a hash set.
    pub fn distinct_comparable(&self) -> Self
    where
        T: Clone + Hash + Eq,
    {
        self.stage(0, |input, output| async move {
            let mut seen = HashSet::new();

            while let Some(item) = next_item(&input, &output).await {
                if !seen.insert(item.clone()) {
                    continue;
                }
                if output.send_async(item).await.is_err() {
                    break;
                }
            }
        })
    }

    /// Inserts a channel of `size` items between the upstream and downstream stages.
    pub fn buffer(&self, size: usize) -> Self {
        self.stage(size, |input, output| async move {
            let _ = input.into_stream().map(Ok).forward(output.into_sink()).await;
        })
    }

    /// Transforms items with `f` on `worker_count` blocking workers.
    ///
    /// With [OutputOrder::Unordered] items are emitted as soon as a worker finishes them,
    /// so the output order may differ from the input order. [OutputOrder::Preserved]
    /// tags items with their position and emits them in input order.
    ///
    /// A panic in `f` ends the stream after the items emitted before it.
    ///
    /// # Panics
    /// Panics if `worker_count` is zero.
    pub fn parallel<U, F>(&self, worker_count: usize, order: OutputOrder, f: F) -> Stream<U>
    where
        U: 'static + Send,
        F: 'static + Fn(T) -> U + Send + Sync,
    {
        assert!(worker_count > 0, "worker count must be positive");
        let f = Arc::new(f);

        self.stage(0, move |input, output| {
            let f = f.clone();

            async move {
                let (job_tx, job_rx) = utils::conduit(worker_count * 2);
                let (result_tx, result_rx) = utils::conduit(worker_count * 2);

                rt::spawn(async move {
                    let mut index: usize = 0;

                    while let Ok(item) = input.recv_async().await {
                        if job_tx.send_async((index, item)).await.is_err() {
                            break;
                        }
                        index += 1;
                    }
                });

                for _ in 0..worker_count {
                    let job_rx = job_rx.clone();
                    let result_tx = result_tx.clone();
                    let f = f.clone();

                    rt::spawn_blocking(move || {
                        while let Ok((index, item)) = job_rx.recv() {
                            let result = std::panic::catch_unwind(AssertUnwindSafe(|| f(item)));
                            let failed = result.is_err();

                            if result_tx.send((index, result)).is_err() || failed {
                                break;
                            }
                        }
                    });
                }
                drop(job_rx);
                drop(result_tx);

                let results = result_rx.into_stream();
                let results = match order {
                    OutputOrder::Preserved => results.reorder_by_index().left_stream(),
                    OutputOrder::Unordered => results.map(|(_, result)| result).right_stream(),
                };

                // the panic is caught by the stage task and resumed by the terminal
                let _ = results
                    .map(|result| match result {
                        Ok(item) => Ok(item),
                        Err(payload) => std::panic::resume_unwind(payload),
                    })
                    .boxed()
                    .forward(output.into_sink())
                    .await;
            }
        })
    }

    /// Stops the stream as soon as `ctx` is done. Items in flight are dropped.
    pub fn with_context(&self, ctx: &Context) -> Self {
        let ctx = ctx.clone();

        self.stage(0, move |input, output| {
            let ctx = ctx.clone();

            async move {
                loop {
                    let item = tokio::select! {
                        biased;
                        _ = ctx.done() => break,
                        item = next_item(&input, &output) => match item {
                            Some(item) => item,
                            None => break,
                        },
                    };

                    tokio::select! {
                        biased;
                        _ = ctx.done() => break,
                        result = output.send_async(item) => {
                            if result.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    fn open(&self) -> Output<T> {
        trace!(stages = self.num_stages, "materializing stream");

        let (panic_tx, panic_rx) = utils::conduit(None);
        let run = Run { panics: panic_tx };

        Output {
            items: (self.materialize)(&run),
            panics: panic_rx,
        }
    }

    /// Starts a run and returns the channel carrying the output of the last stage.
    ///
    /// It must be called inside a tokio runtime. A panic inside a stage only closes the
    /// channel early. Use [spawned()](Stream::spawned) to have it resumed by the consumer.
    pub fn collect_to_channel(&self) -> flume::Receiver<T> {
        self.open().items
    }

    /// Starts a run and returns its output as a [futures::Stream].
    ///
    /// A panic inside a stage is resumed when the stream is polled past its last item.
    pub fn spawned(&self) -> BoxStream<'static, T> {
        let Output { items, panics } = self.open();

        items
            .into_stream()
            .chain(stream::poll_fn(move |_| {
                resume_panic(&panics);
                Ready(None)
            }))
            .boxed()
    }

    pub async fn collect(&self) -> Vec<T> {
        let output = self.open();
        let mut items = vec![];

        while let Some(item) = output.next().await {
            items.push(item);
        }

        items
    }

    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(T),
    {
        let output = self.open();

        while let Some(item) = output.next().await {
            f(item);
        }
    }

    /// Folds the items from `init` in stream order.
    pub async fn reduce<A, F>(&self, init: A, mut f: F) -> A
    where
        F: FnMut(A, T) -> A,
    {
        let output = self.open();
        let mut acc = init;

        while let Some(item) = output.next().await {
            acc = f(acc, item);
        }

        acc
    }

    pub async fn count(&self) -> usize {
        let output = self.open();
        let mut count = 0;

        while output.next().await.is_some() {
            count += 1;
        }

        count
    }

    /// Tells whether some item satisfies `predicate`, stopping at the first match.
    pub async fn any_match<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.find_first(predicate).await.is_some()
    }

    /// Tells whether every item satisfies `predicate`, stopping at the first mismatch.
    pub async fn all_match<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.find_first(|item| !predicate(item)).await.is_none()
    }

    /// Returns the first item satisfying `predicate`.
    pub async fn find_first<F>(&self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let output = self.open();

        while let Some(item) = output.next().await {
            if predicate(&item) {
                return Some(item);
            }
        }

        None
    }
}

impl Stream<i64> {
    /// Creates a stream of integers from `start` up to but excluding `end`.
    pub fn range(start: i64, end: i64) -> Self {
        Self::from_source(move |run: &Run| spawn_source(run, start..end, 0))
    }
}

/// Spawns a task feeding `iter` to a new channel of `capacity`.
fn spawn_source<I>(run: &Run, iter: I, capacity: usize) -> flume::Receiver<I::Item>
where
    I: 'static + Iterator + Send,
    I::Item: 'static + Send,
{
    let (tx, rx) = utils::conduit(capacity);

    run.spawn(tx.clone(), async move {
        for item in iter {
            if tx.send_async(item).await.is_err() {
                break;
            }
        }
    });

    rx
}

/// Collects items one by one before building a [Stream].
#[derive(Debug, Clone)]
pub struct StreamBuilder<T> {
    items: Vec<T>,
}

impl<T> StreamBuilder<T>
where
    T: 'static + Send + Sync + Clone,
{
    pub fn new() -> Self {
        Self { items: vec![] }
    }

    pub fn add(&mut self, item: T) -> &mut Self {
        self.items.push(item);
        self
    }

    pub fn add_all<I>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
    {
        self.items.extend(items);
        self
    }

    pub fn build(&self) -> Stream<T> {
        Stream::from_vec(self.items.clone())
    }
}

impl<T> Default for StreamBuilder<T>
where
    T: 'static + Send + Sync + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
