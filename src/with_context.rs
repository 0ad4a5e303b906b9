//! Fallible, cancellable parallel map.

use crate::{
    common::*,
    config::ParallelConfig,
    context::Context,
    error::{ContextError, Error, Result},
    rt, utils,
};

/// Maps every item with the asynchronous, fallible `f` on a worker pool, observing `ctx`.
///
/// The call succeeds only when every item succeeds and `ctx` stays live. The output keeps
/// the input order. On the first failure no further job is dispatched, and items already
/// running on other workers are left to finish in the background. When several workers fail,
/// or a failure races with cancellation, any one of the errors is returned.
///
/// ```rust
/// # tokio::runtime::Runtime::new().unwrap().block_on(async move {
/// use par_fp::{par_map_with_context, Context};
///
/// let ctx = Context::background();
/// let doubled = par_map_with_context(&ctx, vec![1, 2, 3], 2, |_ctx, value: u32| async move {
///     Ok::<_, String>(value * 2)
/// })
/// .await
/// .unwrap();
/// assert_eq!(doubled, vec![2, 4, 6]);
/// # })
/// ```
pub async fn par_map_with_context<T, R, E, C, F, Fut>(
    ctx: &Context,
    data: Vec<T>,
    config: C,
    f: F,
) -> Result<Vec<R>, E>
where
    T: 'static + Send,
    R: 'static + Send,
    E: 'static + Send,
    C: Into<ParallelConfig>,
    F: 'static + Fn(Context, T) -> Fut + Send + Sync,
    Fut: 'static + Future<Output = std::result::Result<R, E>> + Send,
{
    if data.is_empty() {
        return Ok(vec![]);
    }
    if let Some(err) = ctx.err() {
        return Err(err.into());
    }

    let ParallelConfig {
        worker_count,
        buffer_size,
    } = config.into();
    let len = data.len();
    debug!(workers = worker_count, items = len, "spawning cancellable worker pool");

    // cancelled on the first failure so that no new job starts
    let abort = ctx.with_cancel();
    let f = Arc::new(f);
    let (job_tx, job_rx) = utils::conduit(buffer_size);
    let (output_tx, output_rx) = utils::conduit(buffer_size);
    let (error_tx, error_rx) = utils::conduit(None);

    let producer = rt::spawn({
        let abort = abort.clone();

        async move {
            for job in data.into_iter().enumerate() {
                tokio::select! {
                    biased;
                    _ = abort.done() => break,
                    result = job_tx.send_async(job) => {
                        if result.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    let workers: Vec<_> = (0..worker_count)
        .map(|_| {
            let ctx = ctx.clone();
            let abort = abort.clone();
            let f = f.clone();
            let job_rx = job_rx.clone();
            let output_tx = output_tx.clone();
            let error_tx = error_tx.clone();

            rt::spawn(async move {
                loop {
                    let (index, item) = tokio::select! {
                        biased;
                        _ = abort.done() => {
                            // a failed sibling is reported by the sibling itself
                            if let Some(err) = ctx.err() {
                                let _ = error_tx.send(Error::Context(err));
                            }
                            break;
                        }
                        job = job_rx.recv_async() => match job {
                            Ok(job) => job,
                            Err(_) => break,
                        },
                    };

                    match f(ctx.clone(), item).await {
                        Ok(output) => {
                            if output_tx.send_async((index, output)).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            debug!(index, "worker stopped on a failed item");
                            let _ = error_tx.send(Error::Task(err));
                            abort.cancel();
                            break;
                        }
                    }
                }
            })
        })
        .collect();
    drop(job_rx);
    drop(output_tx);
    drop(error_tx);

    let mut slots: Vec<Option<R>> = iter::repeat_with(|| None).take(len).collect();
    let collect = async {
        while let Ok((index, output)) = output_rx.recv_async().await {
            slots[index] = Some(output);
        }
    };

    let failure = tokio::select! {
        () = collect => None,
        Ok(err) = error_rx.recv_async() => Some(err),
        reason = ctx.done() => Some(Error::Context(reason)),
    };

    if let Some(err) = failure {
        abort.cancel();
        return Err(err);
    }

    let ((), _) = futures::join!(producer, future::join_all(workers));

    if let Ok(err) = error_rx.try_recv() {
        return Err(err);
    }

    slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::Context(ctx.err().unwrap_or(ContextError::Cancelled)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

    #[tokio::test(flavor = "multi_thread")]
    async fn output_is_ordered_test() {
        let ctx = Context::background();
        let output = par_map_with_context(&ctx, (0..200u64).collect(), 8, |_, value: u64| async move {
            let millis = rand::thread_rng().gen_range(0..5);
            rt::sleep(Duration::from_millis(millis)).await;
            Ok::<_, String>(value + 1)
        })
        .await
        .unwrap();
        itertools::assert_equal(output, 1..=200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_input_test() {
        let ctx = Context::background();
        let output: Vec<u8> = par_map_with_context(&ctx, vec![], 4, |_, value: u8| async move {
            Ok::<_, String>(value)
        })
        .await
        .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn item_failure_test() {
        let ctx = Context::background();
        let result = par_map_with_context(&ctx, (0..8u32).collect(), 8, |_, value: u32| async move {
            if value == 3 {
                Err(format!("bad item {}", value))
            } else {
                Ok(value)
            }
        })
        .await;

        match result {
            Err(Error::Task(message)) => assert_eq!(message, "bad item 3"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_dispatch_after_failure_test() {
        let ctx = Context::background();
        let started = Arc::new(AtomicUsize::new(0));

        let result = par_map_with_context(&ctx, (0..100u32).collect(), (1, 10), {
            let started = started.clone();
            move |_, value: u32| {
                started.fetch_add(1, SeqCst);
                async move { Err::<u32, _>(value) }
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Task(0))));
        rt::sleep(Duration::from_millis(20)).await;
        assert_eq!(started.load(SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_test() {
        let ctx = Context::background().with_cancel();

        rt::spawn({
            let ctx = ctx.clone();
            async move {
                rt::sleep(Duration::from_millis(10)).await;
                ctx.cancel();
            }
        });

        let result = par_map_with_context(&ctx, (0..4u32).collect(), 4, |_, value: u32| async move {
            rt::sleep(Duration::from_secs(5)).await;
            Ok::<_, String>(value)
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Context(ContextError::Cancelled))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn already_cancelled_test() {
        let ctx = Context::background();
        ctx.cancel();

        let result = par_map_with_context(&ctx, vec![1u32], 1, |_, value: u32| async move {
            Ok::<_, String>(value)
        })
        .await;
        assert!(result.unwrap_err().is_cancellation());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timeout_test() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));

        let result = par_map_with_context(&ctx, (0..4u32).collect(), 2, |ctx: Context, value: u32| async move {
            tokio::select! {
                reason = ctx.done() => Err(reason.to_string()),
                _ = rt::sleep(Duration::from_secs(5)) => Ok(value),
            }
        })
        .await;

        // the deadline either stops the call directly or surfaces through a worker
        assert!(result.is_err());
    }
}
