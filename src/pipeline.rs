use crate::{
    common::*,
    config::ParallelConfig,
    pool::{par_filter, par_map, par_reduce},
};

/// Eager chain of parallel stages over an owned vector.
///
/// Unlike [Stream](crate::Stream), every stage runs to completion when it is awaited
/// and replaces the held data with its output.
///
/// ```rust
/// # tokio::runtime::Runtime::new().unwrap().block_on(async move {
/// use par_fp::Pipeline;
///
/// let mut pipeline = Pipeline::new((1..=10).collect::<Vec<u64>>());
/// pipeline.filter(|&value| value > 5).await.map(|value| value * value).await;
/// assert_eq!(pipeline.reduce(0, |lhs, rhs| lhs + rhs).await, 330);
/// # })
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline<T> {
    data: Vec<T>,
    config: ParallelConfig,
}

impl<T> Pipeline<T>
where
    T: 'static + Send,
{
    /// Creates a pipeline running with the default [ParallelConfig].
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            config: ParallelConfig::default(),
        }
    }

    pub fn with_config<C>(&mut self, config: C) -> &mut Self
    where
        C: Into<ParallelConfig>,
    {
        self.config = config.into();
        self
    }

    pub fn config(&self) -> ParallelConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Replaces the data with `f` applied to every item, keeping the order.
    pub async fn map<F>(&mut self, f: F) -> &mut Self
    where
        F: 'static + Fn(T) -> T + Send + Sync,
    {
        let data = mem::take(&mut self.data);
        self.data = par_map(data, self.config, f).await;
        self
    }

    /// Keeps the items satisfying `predicate`, in their original order.
    pub async fn filter<F>(&mut self, predicate: F) -> &mut Self
    where
        F: 'static + Fn(&T) -> bool + Send + Sync,
    {
        let data = mem::take(&mut self.data);
        self.data = par_filter(data, self.config, predicate).await;
        self
    }

    /// Reduces a copy of the data. The pipeline keeps its data.
    pub async fn reduce<F>(&self, identity: T, f: F) -> T
    where
        T: Clone,
        F: 'static + Fn(T, T) -> T + Send + Sync,
    {
        par_reduce(self.data.clone(), self.config, identity, f).await
    }

    pub fn collect(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.data.clone()
    }

    pub fn into_inner(self) -> Vec<T> {
        self.data
    }
}
