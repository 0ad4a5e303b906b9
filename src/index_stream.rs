use crate::common::*;
use futures::Stream;

/// Restores input order on a stream of `(index, item)` pairs produced out of order.
pub(crate) trait IndexedStreamExt
where
    Self: Stream<Item = (usize, Self::IndexedItem)>,
{
    type IndexedItem;

    /// Emits items by ascending index starting from zero.
    ///
    /// Items arriving ahead of their turn are held back until every smaller index is emitted.
    fn reorder_by_index(self) -> ReorderByIndex<Self, Self::IndexedItem>
    where
        Self: Sized,
    {
        ReorderByIndex {
            next: 0,
            pending: HashMap::new(),
            stream: self,
        }
    }
}

impl<S, T> IndexedStreamExt for S
where
    S: Stream<Item = (usize, T)>,
{
    type IndexedItem = T;
}

/// Stream for the [reorder_by_index()](IndexedStreamExt::reorder_by_index) method.
#[derive(Derivative)]
#[derivative(Debug)]
#[pin_project]
pub(crate) struct ReorderByIndex<S, T> {
    next: usize,
    #[derivative(Debug = "ignore")]
    pending: HashMap<usize, T>,
    #[derivative(Debug = "ignore")]
    #[pin]
    stream: S,
}

impl<S, T> Stream for ReorderByIndex<S, T>
where
    S: Stream<Item = (usize, T)>,
{
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        Ready(loop {
            if let Some(item) = this.pending.remove(&*this.next) {
                *this.next += 1;
                break Some(item);
            }

            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some((index, item)) => match index.cmp(&*this.next) {
                    Greater => {
                        let prev = this.pending.insert(index, item);
                        assert!(prev.is_none(), "index {} appears more than once", index);
                    }
                    Equal => {
                        *this.next += 1;
                        break Some(item);
                    }
                    Less => panic!("index {} appears more than once", index),
                },
                None => {
                    assert!(
                        this.pending.is_empty(),
                        "the item for index {} is missing",
                        this.next
                    );
                    break None;
                }
            }
        })
    }
}
