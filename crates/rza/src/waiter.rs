//! First-in, first-out queues of futures waiting on a value.
//!
//! These back [`Gizmo::wait_for`](crate::gizmo::Gizmo::wait_for) and
//! [`Gizmo::next_render`](crate::gizmo::Gizmo::next_render). A queue is drained
//! all at once: every waiter registered before the value arrives gets a clone of
//! it, in registration order.
use std::{collections::VecDeque, future::Future};

use futures::channel::oneshot;
use indexmap::IndexMap;

use crate::{Error, Str};

type Resolver<T> = oneshot::Sender<Result<T, Error>>;

/// Waiters for one value.
pub struct WaitQueue<T> {
    pending: VecDeque<Resolver<T>>,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

impl<T: Clone + 'static> WaitQueue<T> {
    /// Queue a waiter.
    pub fn wait(&mut self) -> impl Future<Output = Result<T, Error>> + use<T> {
        let (tx, rx) = oneshot::channel();
        self.pending.push_back(tx);
        async move { rx.await.unwrap_or(Err(Error::Disconnected)) }
    }

    /// Resolve every queued waiter with `value`, oldest first.
    ///
    /// Returns how many were still listening.
    pub fn resolve(&mut self, value: &T) -> usize {
        self.pending
            .drain(..)
            .filter_map(|tx| tx.send(Ok(value.clone())).ok())
            .count()
    }

    /// Reject every queued waiter.
    pub fn reject(&mut self, err: impl Fn() -> Error) {
        for tx in self.pending.drain(..) {
            let _ = tx.send(Err(err()));
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Waiters keyed by setting name.
pub struct Waiters<T> {
    queues: IndexMap<Str, WaitQueue<T>>,
}

impl<T> Default for Waiters<T> {
    fn default() -> Self {
        Self {
            queues: IndexMap::new(),
        }
    }
}

impl<T: Clone + 'static> Waiters<T> {
    pub fn wait(&mut self, name: Str) -> impl Future<Output = Result<T, Error>> + use<T> {
        self.queues.entry(name).or_default().wait()
    }

    /// Resolve and forget the waiters for `name`.
    pub fn resolve(&mut self, name: &str, value: &T) -> usize {
        self.queues
            .shift_remove(name)
            .map(|mut queue| queue.resolve(value))
            .unwrap_or_default()
    }

    pub fn reject_all(&mut self, err: impl Fn() -> Error) {
        for (_, mut queue) in self.queues.drain(..) {
            queue.reject(&err);
        }
    }

    /// Number of waiters queued for `name`.
    pub fn waiting(&self, name: &str) -> usize {
        self.queues.get(name).map(WaitQueue::len).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use futures_lite::future::block_on;

    use super::*;

    #[test]
    fn resolves_in_registration_order() {
        let mut queue = WaitQueue::<u32>::default();
        let first = queue.wait();
        let second = queue.wait();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.resolve(&7), 2);
        assert!(queue.is_empty());
        assert_eq!(block_on(first).unwrap(), 7);
        assert_eq!(block_on(second).unwrap(), 7);
        // later values only reach later waiters
        let third = queue.wait();
        queue.resolve(&8);
        assert_eq!(block_on(third).unwrap(), 8);
    }

    #[test]
    fn dropped_waiters_are_skipped() {
        let mut queue = WaitQueue::<u32>::default();
        drop(queue.wait());
        let kept = queue.wait();
        assert_eq!(queue.resolve(&1), 1);
        assert_eq!(block_on(kept).unwrap(), 1);
    }

    #[test]
    fn named_waiters_resolve_once() {
        let mut waiters = Waiters::<&'static str>::default();
        let a = waiters.wait("a".into());
        let b = waiters.wait("b".into());
        assert_eq!(waiters.waiting("a"), 1);
        assert_eq!(waiters.resolve("a", &"first"), 1);
        assert_eq!(waiters.resolve("a", &"second"), 0);
        assert_eq!(block_on(a).unwrap(), "first");

        waiters.reject_all(|| Error::Disconnected);
        assert!(matches!(block_on(b), Err(Error::Disconnected)));
    }

    #[test]
    fn forgotten_queue_is_a_disconnect() {
        let mut queue = WaitQueue::<u32>::default();
        let waiting = queue.wait();
        drop(queue);
        assert!(matches!(block_on(waiting), Err(Error::Disconnected)));
    }
}
