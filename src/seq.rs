//! Sequential counterparts of the parallel primitives.
//!
//! They serve as the fallback when the input is too small to pay for a worker pool.

pub fn map<T, R, F>(data: Vec<T>, f: F) -> Vec<R>
where
    F: FnMut(T) -> R,
{
    data.into_iter().map(f).collect()
}

pub fn filter<T, F>(data: Vec<T>, mut predicate: F) -> Vec<T>
where
    F: FnMut(&T) -> bool,
{
    data.into_iter().filter(|item| predicate(item)).collect()
}

/// Left fold starting from `init`.
pub fn fold<T, A, F>(data: Vec<T>, init: A, f: F) -> A
where
    F: FnMut(A, T) -> A,
{
    data.into_iter().fold(init, f)
}

/// Splits `data` into consecutive chunks of `size` items. The last chunk may be shorter.
///
/// # Panics
/// Panics if `size` is zero.
pub fn chunk<T>(data: Vec<T>, size: usize) -> Vec<Vec<T>> {
    assert!(size > 0, "chunk size must be positive");

    let mut chunks = Vec::with_capacity((data.len() + size - 1) / size);
    let mut iter = data.into_iter().peekable();

    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_test() {
        let chunks = chunk((0..7).collect(), 3);
        assert_eq!(chunks, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
        assert!(chunk(Vec::<u8>::new(), 3).is_empty());
    }

    #[test]
    fn scenario_test() {
        let data: Vec<u64> = (1..=10).collect();
        let filtered = filter(data, |&x| x > 5);
        assert_eq!(filtered, vec![6, 7, 8, 9, 10]);

        let squared = map(filtered, |x| x * x);
        assert_eq!(squared, vec![36, 49, 64, 81, 100]);
        assert_eq!(fold(squared, 0, |acc, x| acc + x), 330);
    }
}
