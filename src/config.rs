use once_cell::sync::Lazy;

static NUM_CPUS: Lazy<usize> = Lazy::new(num_cpus::get);

/// Worker pool configuration shared by the parallel primitives.
///
/// Wherever a configuration is expected, the following values are accepted.
///
/// - `None`: the number of workers defaults to the number of system processors.
/// - `10` or non-zero integers: 10 workers.
/// - `2.5` or positive floating points: the number of workers is 2.5 times the system processors.
/// - `(10, 15)`: 10 workers and internal buffer size 15.
///
/// If the buffer size is not specified, it defaults to [`DEFAULT_BUFFER_SIZE`](Self::DEFAULT_BUFFER_SIZE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelConfig {
    pub(crate) worker_count: usize,
    pub(crate) buffer_size: usize,
}

impl ParallelConfig {
    pub const DEFAULT_BUFFER_SIZE: usize = 100;

    /// Creates a configuration.
    ///
    /// # Panics
    /// Panics if `worker_count` is zero. A pool without workers would never drain its queue.
    pub fn new(worker_count: usize, buffer_size: usize) -> Self {
        assert!(worker_count > 0, "worker count must be positive");
        Self {
            worker_count,
            buffer_size,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self::new(Count::Auto.to_absolute(), Self::DEFAULT_BUFFER_SIZE)
    }
}

impl From<Option<usize>> for ParallelConfig {
    fn from(workers: Option<usize>) -> Self {
        match workers {
            Some(workers) => workers.into(),
            None => Self::default(),
        }
    }
}

impl From<usize> for ParallelConfig {
    fn from(workers: usize) -> Self {
        Self::new(
            Count::Absolute(workers).to_absolute(),
            Self::DEFAULT_BUFFER_SIZE,
        )
    }
}

impl From<f64> for ParallelConfig {
    fn from(scale: f64) -> Self {
        Self::new(Count::Scale(scale).to_absolute(), Self::DEFAULT_BUFFER_SIZE)
    }
}

impl From<(usize, usize)> for ParallelConfig {
    fn from((workers, buffer_size): (usize, usize)) -> Self {
        Self::new(Count::Absolute(workers).to_absolute(), buffer_size)
    }
}

impl From<(f64, usize)> for ParallelConfig {
    fn from((scale, buffer_size): (f64, usize)) -> Self {
        Self::new(Count::Scale(scale).to_absolute(), buffer_size)
    }
}

/// Sum type of absolute value and scaling value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Count {
    Auto,
    Absolute(usize),
    Scale(f64),
}

impl Count {
    pub fn to_absolute(&self) -> usize {
        match *self {
            Self::Auto => *NUM_CPUS,
            Self::Absolute(val) => {
                assert!(val > 0, "absolute value must be positive");
                val
            }
            Self::Scale(scale) => {
                assert!(
                    scale.is_finite() && scale > 0.0,
                    "scaling value must be positive finite"
                );
                (*NUM_CPUS as f64 * scale).ceil() as usize
            }
        }
    }
}
