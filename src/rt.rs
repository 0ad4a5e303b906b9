//! Runtime shims over [tokio].

use crate::common::*;

/// Spawns an asynchronous task on the tokio runtime.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: 'static + Future + Send,
    F::Output: 'static + Send,
{
    JoinHandle(tokio::spawn(future))
}

/// Runs a blocking closure on the runtime's blocking thread pool.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: 'static + Send + FnOnce() -> R,
    R: 'static + Send,
{
    JoinHandle(tokio::task::spawn_blocking(f))
}

/// Suspends the current task for `duration` on the tokio timer.
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Awaits the spawned task. A panic inside the task is resumed in the awaiting task.
#[derive(Debug)]
pub struct JoinHandle<T>(tokio::task::JoinHandle<T>);

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| match result {
            Ok(output) => output,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => panic!("worker task was aborted: {}", err),
        })
    }
}
