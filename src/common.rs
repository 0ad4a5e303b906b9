pub use derivative::Derivative;
pub use futures::{
    future::{self, BoxFuture},
    ready,
    stream::{Stream as _, StreamExt as _},
    FutureExt as _,
};
pub use pin_project::pin_project;
pub use std::{
    cmp::Ordering::{Equal, Greater, Less},
    collections::{HashMap, HashSet},
    future::Future,
    hash::Hash,
    iter,
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context as TaskContext, Poll, Poll::*},
    time::Duration,
};
pub use tracing::{debug, trace};
