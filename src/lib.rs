//! Lazy concurrent streams and parallel map/filter/reduce primitives on [tokio].
//!
//! # Parallel Primitives
//!
//! - [`par_map(data, config, fn)`](par_map) maps items on a pool of blocking workers and keeps the input order.
//! - [`par_filter()`](par_filter), [`par_reduce()`](par_reduce) and [`par_for_each()`](par_for_each)
//!   are the filtering, reducing and side-effect variances.
//! - [`par_map_with_context(ctx, data, config, fn)`](par_map_with_context) maps items with fallible futures,
//!   aborting on the first failure or when the [Context] is done.
//! - [`BatchProcessor`] transforms fixed-size batches on a bounded pool.
//! - [`map_with_rate_limit()`](map_with_rate_limit) maps items sequentially behind a [RateLimiter].
//! - [`Pipeline`] chains eager parallel stages over an owned vector.
//!
//! Small inputs fall back to the sequential versions in [`seq`].
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async move {
//! let data: Vec<u64> = (1..=10).collect();
//! let large = par_fp::par_filter(data, 4, |&value| value > 5).await;
//! let squares = par_fp::par_map(large, 4, |value| value * value).await;
//! let sum = par_fp::par_reduce(squares, 4, 0, |lhs, rhs| lhs + rhs).await;
//! assert_eq!(sum, 330);
//! # })
//! ```
//!
//! # Streams
//!
//! A [`Stream`] is a lazy description of a source followed by stages. It runs once per
//! terminal operation, each stage on its own task.
//!
//! - Sources: [`from_vec()`](Stream::from_vec), [`from_channel()`](Stream::from_channel),
//!   [`from_fn()`](Stream::from_fn), [`range()`](Stream::range), [`repeat()`](Stream::repeat),
//!   [`infinite()`](Stream::infinite) and [`StreamBuilder`].
//! - Stages: [`map()`](Stream::map), [`filter()`](Stream::filter), [`take()`](Stream::take),
//!   [`skip()`](Stream::skip), [`distinct()`](Stream::distinct), [`buffer()`](Stream::buffer),
//!   [`parallel()`](Stream::parallel) and [`with_context()`](Stream::with_context).
//! - Terminals: [`collect()`](Stream::collect), [`reduce()`](Stream::reduce), [`count()`](Stream::count),
//!   [`any_match()`](Stream::any_match), [`find_first()`](Stream::find_first) and friends.
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async move {
//! use par_fp::{OutputOrder, Stream};
//!
//! let evens = Stream::infinite(|| 2u32)
//!     .parallel(4, OutputOrder::Unordered, |value| value * 10)
//!     .take(3)
//!     .collect()
//!     .await;
//! assert_eq!(evens, vec![20, 20, 20]);
//! # })
//! ```
//!
//! # Configure Number of Workers
//!
//! The `config` parameter of [`par_map(data, config, fn)`](par_map) controls
//! the number of workers and the internal buffer size. It accepts the following values.
//!
//! - `None`: The number of workers defaults to the number of system processors.
//! - `10` or non-zero integers: 10 workers.
//! - `2.5` or non-zero floating points: The number of worker is 2.5 times the system processors.
//! - `(10, 15)`: 10 workers and internal buffer size 15.
//!
//! If the buffer size is not specified, the default is [`ParallelConfig::DEFAULT_BUFFER_SIZE`].

/// Commonly used types.
pub mod prelude {
    pub use super::{
        batch::BatchProcessor,
        context::Context,
        error::{ContextError, Error},
        pipeline::Pipeline,
        stream::{OutputOrder, Stream, StreamBuilder},
    };
}

mod batch;
mod common;
mod config;
mod context;
mod error;
mod index_stream;
mod pipeline;
mod pool;
mod rate_limit;
pub mod rt;
pub mod seq;
mod stream;
mod utils;
mod with_context;

pub use batch::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use pipeline::*;
pub use pool::*;
pub use rate_limit::*;
pub use stream::*;
pub use with_context::*;
