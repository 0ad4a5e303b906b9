use crate::{
    common::*, config::ParallelConfig, context::Context, error::Result, rt, seq,
    with_context::par_map_with_context,
};

/// Splits inputs into fixed-size batches and transforms them on a bounded worker pool.
///
/// The batch transform runs on blocking workers. Outputs are concatenated in batch order,
/// so the result keeps the input order whatever order the batches complete in.
///
/// ```rust
/// # tokio::runtime::Runtime::new().unwrap().block_on(async move {
/// use par_fp::{BatchProcessor, Context};
///
/// let processor = BatchProcessor::new(3, |batch: Vec<u32>| {
///     Ok::<_, String>(batch.into_iter().map(|value| value * 2).collect::<Vec<_>>())
/// });
/// let output = processor
///     .process(&Context::background(), (0..7).collect())
///     .await
///     .unwrap();
/// assert_eq!(output, vec![0, 2, 4, 6, 8, 10, 12]);
/// # })
/// ```
#[derive(Derivative)]
#[derivative(Debug, Clone(bound = ""))]
pub struct BatchProcessor<T, R, E> {
    batch_size: usize,
    parallelism: usize,
    #[derivative(Debug = "ignore")]
    transform: Arc<dyn Fn(Vec<T>) -> std::result::Result<Vec<R>, E> + Send + Sync>,
}

impl<T, R, E> BatchProcessor<T, R, E>
where
    T: 'static + Send,
    R: 'static + Send,
    E: 'static + Send,
{
    /// Creates a processor with one worker per system processor.
    ///
    /// # Panics
    /// Panics if `batch_size` is zero.
    pub fn new<F>(batch_size: usize, transform: F) -> Self
    where
        F: 'static + Fn(Vec<T>) -> std::result::Result<Vec<R>, E> + Send + Sync,
    {
        assert!(batch_size > 0, "batch size must be positive");

        Self {
            batch_size,
            parallelism: ParallelConfig::default().worker_count(),
            transform: Arc::new(transform),
        }
    }

    /// Sets the maximum number of batches transformed at once.
    ///
    /// # Panics
    /// Panics if `parallelism` is zero.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        assert!(parallelism > 0, "parallelism must be positive");
        self.parallelism = parallelism;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Transforms `data` batch by batch and concatenates the outputs.
    ///
    /// The first failed batch or the cancellation of `ctx` aborts the call, and no partial
    /// output is returned.
    pub async fn process(&self, ctx: &Context, data: Vec<T>) -> Result<Vec<R>, E> {
        if data.is_empty() {
            return Ok(vec![]);
        }

        let batches = seq::chunk(data, self.batch_size);
        let num_batches = batches.len();
        let config = ParallelConfig::new(self.parallelism.min(num_batches), num_batches);
        trace!(batches = num_batches, batch_size = self.batch_size, "processing batches");

        let transform = self.transform.clone();
        let outputs = par_map_with_context(ctx, batches, config, move |_, batch| {
            let transform = transform.clone();
            rt::spawn_blocking(move || transform(batch))
        })
        .await?;

        Ok(outputs.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ContextError, Error};
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

    fn recording_processor(
        batch_size: usize,
        sizes: Arc<parking_lot::Mutex<Vec<usize>>>,
    ) -> BatchProcessor<u32, u32, String> {
        BatchProcessor::new(batch_size, move |batch: Vec<u32>| {
            sizes.lock().push(batch.len());
            Ok(batch)
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_sizes_test() {
        let ctx = Context::background();

        for (len, expect) in [
            (0, vec![]),
            (1, vec![1]),
            (3, vec![3]),
            (4, vec![1, 3]),
            (7, vec![1, 3, 3]),
        ] {
            let sizes = Arc::new(parking_lot::Mutex::new(vec![]));
            let processor = recording_processor(3, sizes.clone()).with_parallelism(2);

            let output = processor.process(&ctx, (0..len).collect()).await.unwrap();
            itertools::assert_equal(output, 0..len);

            let mut sizes = sizes.lock().clone();
            sizes.sort_unstable();
            assert_eq!(sizes, expect);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_order_test() {
        let processor = BatchProcessor::new(10, |batch: Vec<u64>| {
            // later batches finish first
            let delay = 50u64.saturating_sub(batch[0]);
            std::thread::sleep(Duration::from_millis(delay));
            Ok::<_, String>(batch.into_iter().map(|value| value * value).collect())
        })
        .with_parallelism(5);

        let output = processor
            .process(&Context::background(), (0..50).collect())
            .await
            .unwrap();
        itertools::assert_equal(output, (0..50).map(|value| value * value));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_failure_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = BatchProcessor::new(2, {
            let calls = calls.clone();
            move |batch: Vec<u32>| {
                calls.fetch_add(1, SeqCst);
                if batch.contains(&5) {
                    Err("batch with 5".to_string())
                } else {
                    Ok(batch)
                }
            }
        })
        .with_parallelism(1);

        let result = processor
            .process(&Context::background(), (0..20).collect())
            .await;
        assert_eq!(result.unwrap_err().into_task().as_deref(), Some("batch with 5"));

        // the failed batch is the third one and nothing starts after it
        rt::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_cancellation_test() {
        let ctx = Context::background().with_cancel();
        ctx.cancel();

        let processor = BatchProcessor::new(2, |batch: Vec<u32>| Ok::<_, String>(batch));
        let result = processor.process(&ctx, vec![1, 2, 3]).await;
        assert!(matches!(
            result,
            Err(Error::Context(ContextError::Cancelled))
        ));
    }

    #[test]
    #[should_panic(expected = "batch size must be positive")]
    fn zero_batch_size_test() {
        BatchProcessor::new(0, |batch: Vec<u32>| Ok::<_, String>(batch));
    }
}
