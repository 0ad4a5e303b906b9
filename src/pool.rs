//! Worker pool executor behind the parallel map, filter, reduce and for-each primitives.
//!
//! Every primitive has the same shape: a producer task enqueues `(index, item)` jobs,
//! a fixed set of blocking workers drains the queue, and the calling task collects
//! the index-tagged outputs. Outputs are assembled in one ordered pass after all
//! workers finish, so completion order never leaks into the result.

use crate::{common::*, config::ParallelConfig, rt, seq, utils};

/// Spawns a producer that feeds the enumerated items of `data` to a job queue of `buffer_size`.
fn enqueue<T>(
    data: Vec<T>,
    buffer_size: usize,
) -> (flume::Receiver<(usize, T)>, rt::JoinHandle<()>)
where
    T: 'static + Send,
{
    let (job_tx, job_rx) = utils::conduit(buffer_size);

    let producer = rt::spawn(async move {
        for job in data.into_iter().enumerate() {
            // all workers are gone
            if job_tx.send_async(job).await.is_err() {
                break;
            }
        }
    });

    (job_rx, producer)
}

/// Runs `f` over `data` on `worker_count` blocking workers.
///
/// It returns the receiver of `(index, output)` pairs in completion order, and a future
/// that joins the producer and the workers. The receiver closes once every worker exits.
fn spawn_pool<T, O, F>(
    data: Vec<T>,
    config: ParallelConfig,
    f: F,
) -> (flume::Receiver<(usize, O)>, BoxFuture<'static, ()>)
where
    T: 'static + Send,
    O: 'static + Send,
    F: 'static + Fn(T) -> O + Send + Sync,
{
    let ParallelConfig {
        worker_count,
        buffer_size,
    } = config;
    debug!(workers = worker_count, items = data.len(), "spawning worker pool");

    let f = Arc::new(f);
    let (job_rx, producer) = enqueue(data, buffer_size);
    let (output_tx, output_rx) = utils::conduit(buffer_size);

    let workers: Vec<_> = (0..worker_count)
        .map(|_| {
            let job_rx = job_rx.clone();
            let output_tx = output_tx.clone();
            let f = f.clone();

            rt::spawn_blocking(move || {
                while let Ok((index, item)) = job_rx.recv() {
                    if output_tx.send((index, f(item))).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();

    let join = async move {
        let ((), _) = futures::join!(producer, future::join_all(workers));
    }
    .boxed();

    (output_rx, join)
}

/// Maps every item with `f` on a worker pool. The output keeps the input order.
///
/// Inputs shorter than the worker count are mapped sequentially on the calling task.
///
/// ```rust
/// # tokio::runtime::Runtime::new().unwrap().block_on(async move {
/// let squares = par_fp::par_map((0..1000).collect(), 4, |x: u64| x * x).await;
/// itertools::assert_equal(squares, (0..1000).map(|x| x * x));
/// # })
/// ```
pub async fn par_map<T, R, C, F>(data: Vec<T>, config: C, f: F) -> Vec<R>
where
    T: 'static + Send,
    R: 'static + Send,
    C: Into<ParallelConfig>,
    F: 'static + Fn(T) -> R + Send + Sync,
{
    let config = config.into();
    let len = data.len();

    if len < config.worker_count {
        trace!(items = len, "input is smaller than the pool, mapping sequentially");
        return seq::map(data, f);
    }

    let (output_rx, join) = spawn_pool(data, config, f);
    let mut slots: Vec<Option<R>> = iter::repeat_with(|| None).take(len).collect();

    while let Ok((index, output)) = output_rx.recv_async().await {
        debug_assert!(slots[index].is_none(), "index {} is mapped twice", index);
        slots[index] = Some(output);
    }
    join.await;

    slots.into_iter().flatten().collect()
}

/// Keeps the items satisfying `predicate`, evaluated on a worker pool. Survivors keep the input order.
pub async fn par_filter<T, C, F>(data: Vec<T>, config: C, predicate: F) -> Vec<T>
where
    T: 'static + Send,
    C: Into<ParallelConfig>,
    F: 'static + Fn(&T) -> bool + Send + Sync,
{
    let config = config.into();
    let len = data.len();

    if len < config.worker_count {
        trace!(items = len, "input is smaller than the pool, filtering sequentially");
        return seq::filter(data, predicate);
    }

    let (output_rx, join) = spawn_pool(data, config, move |item| {
        let keep = predicate(&item);
        (item, keep)
    });

    let mut results = HashMap::with_capacity(len);
    while let Ok((index, result)) = output_rx.recv_async().await {
        results.insert(index, result);
    }
    join.await;

    (0..len)
        .filter_map(|index| match results.remove(&index) {
            Some((item, true)) => Some(item),
            _ => None,
        })
        .collect()
}

/// Reduces the items with an associative operator.
///
/// The input is split into at most `worker_count` contiguous chunks. Each chunk is folded
/// from `identity` in parallel, then the partial results are folded in chunk order.
/// `f` must be associative and `identity` must be its neutral element, otherwise the
/// result depends on the worker count.
pub async fn par_reduce<T, C, F>(data: Vec<T>, config: C, identity: T, f: F) -> T
where
    T: 'static + Send + Clone,
    C: Into<ParallelConfig>,
    F: 'static + Fn(T, T) -> T + Send + Sync,
{
    let ParallelConfig { worker_count, .. } = config.into();
    let mut data = data;

    if data.len() == 1 {
        if let Some(item) = data.pop() {
            return item;
        }
    }

    if data.len() < worker_count {
        trace!(items = data.len(), "input is smaller than the pool, folding sequentially");
        return seq::fold(data, identity, f);
    }

    let chunk_size = (data.len() + worker_count - 1) / worker_count;
    debug!(workers = worker_count, chunk_size, "reducing chunks in parallel");

    let f = Arc::new(f);
    let partial_futures = seq::chunk(data, chunk_size).into_iter().map(|chunk| {
        let f = f.clone();
        let identity = identity.clone();
        rt::spawn_blocking(move || seq::fold(chunk, identity, |lhs, rhs| f(lhs, rhs)))
    });
    let partials = future::join_all(partial_futures).await;

    seq::fold(partials, identity, |lhs, rhs| f(lhs, rhs))
}

/// Runs `f` on every item on a worker pool and waits until all items are consumed.
pub async fn par_for_each<T, C, F>(data: Vec<T>, config: C, f: F)
where
    T: 'static + Send,
    C: Into<ParallelConfig>,
    F: 'static + Fn(T) + Send + Sync,
{
    if data.is_empty() {
        return;
    }

    let ParallelConfig {
        worker_count,
        buffer_size,
    } = config.into();
    debug!(workers = worker_count, items = data.len(), "spawning worker pool");

    let f = Arc::new(f);
    let (job_rx, producer) = enqueue(data, buffer_size);

    let workers: Vec<_> = (0..worker_count)
        .map(|_| {
            let job_rx = job_rx.clone();
            let f = f.clone();

            rt::spawn_blocking(move || {
                while let Ok((_, item)) = job_rx.recv() {
                    f(item);
                }
            })
        })
        .collect();
    drop(job_rx);

    let ((), _) = futures::join!(producer, future::join_all(workers));
}
