/// Opens a conduit between two tasks.
///
/// `Some(0)` gives a rendezvous channel where every send waits for the receiver,
/// `Some(n)` a channel holding up to `n` items and `None` an unbounded one.
pub(crate) fn conduit<T>(
    capacity: impl Into<Option<usize>>,
) -> (flume::Sender<T>, flume::Receiver<T>) {
    match capacity.into() {
        Some(capacity) => flume::bounded(capacity),
        None => flume::unbounded(),
    }
}
