use crate::{
    common::*,
    context::Context,
    error::{ContextError, Error, Result},
    rt,
};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Token bucket admitting at most `rps` callers per second.
///
/// The bucket holds up to `rps` tokens and starts full, so the first `rps` callers pass
/// immediately. A background task adds one token every `1/rps` seconds and drops the
/// token when the bucket is full. The task stops when the limiter is dropped.
///
/// The limiter must be created inside a tokio runtime.
#[derive(Debug)]
pub struct RateLimiter {
    rps: usize,
    tokens: flume::Receiver<()>,
    stop: CancellationToken,
}

impl RateLimiter {
    /// # Panics
    /// Panics if `rps` is zero.
    pub fn new(rps: usize) -> Self {
        assert!(rps > 0, "requests per second must be positive");

        let (token_tx, token_rx) = flume::bounded(rps);
        for _ in 0..rps {
            let _ = token_tx.try_send(());
        }

        let stop = CancellationToken::new();
        let period = Duration::from_nanos((1_000_000_000 / rps as u64).max(1));

        rt::spawn({
            let stop = stop.clone();

            async move {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticker.tick() => {
                            // a full bucket drops the token
                            let _ = token_tx.try_send(());
                        }
                    }
                }

                trace!(rps, "rate limiter refill stopped");
            }
        });

        Self {
            rps,
            tokens: token_rx,
            stop,
        }
    }

    pub fn rps(&self) -> usize {
        self.rps
    }

    /// Number of tokens currently in the bucket.
    pub fn available(&self) -> usize {
        self.tokens.len()
    }

    /// Takes a token if one is available, without waiting.
    pub fn try_acquire(&self) -> bool {
        self.tokens.try_recv().is_ok()
    }

    /// Waits until a token is available or `ctx` is done.
    pub async fn wait(&self, ctx: &Context) -> std::result::Result<(), ContextError> {
        tokio::select! {
            token = self.tokens.recv_async() => {
                // the refill task only goes away with its runtime
                token.map_err(|_| ContextError::Cancelled)
            }
            reason = ctx.done() => Err(reason),
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Maps the items sequentially, waiting on a fresh [RateLimiter] of `rps` before each item.
///
/// The first failure or the cancellation of `ctx` aborts the call.
pub async fn map_with_rate_limit<T, R, E, F>(
    ctx: &Context,
    data: Vec<T>,
    rps: usize,
    mut f: F,
) -> Result<Vec<R>, E>
where
    F: FnMut(T) -> std::result::Result<R, E>,
{
    if data.is_empty() {
        return Ok(vec![]);
    }

    let limiter = RateLimiter::new(rps);
    let mut outputs = Vec::with_capacity(data.len());

    for item in data {
        limiter.wait(ctx).await?;
        outputs.push(f(item).map_err(Error::Task)?);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn initial_burst_test() {
        let ctx = Context::background();
        let limiter = RateLimiter::new(5);
        assert_eq!(limiter.available(), 5);

        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait(&ctx).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!limiter.try_acquire());

        // the sixth caller waits for a refill tick
        limiter.wait(&ctx).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_wait_test() {
        let ctx = Context::background();
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());

        let blocked = time::timeout(Duration::from_millis(100), limiter.wait(&ctx)).await;
        assert!(blocked.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn refill_caps_at_capacity_test() {
        let limiter = RateLimiter::new(4);
        assert!(limiter.try_acquire());

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(limiter.available(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_cancellation_test() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire());

        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        assert_eq!(
            limiter.wait(&ctx).await,
            Err(ContextError::DeadlineExceeded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn map_with_rate_limit_test() {
        let ctx = Context::background();
        let start = Instant::now();

        let output = map_with_rate_limit(&ctx, (0..6u32).collect(), 4, |value: u32| {
            Ok::<_, String>(value * 3)
        })
        .await
        .unwrap();

        assert_eq!(output, vec![0, 3, 6, 9, 12, 15]);
        // four from the initial burst, two from refills at 250ms and 500ms
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn map_with_rate_limit_failure_test() {
        let ctx = Context::background();
        let result = map_with_rate_limit(&ctx, (0..6u32).collect(), 10, |value: u32| {
            if value < 2 {
                Ok(value)
            } else {
                Err(value)
            }
        })
        .await;
        assert!(matches!(result, Err(Error::Task(2))));
    }
}
