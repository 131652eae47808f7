// ABOUTME: A typed, bounded, closable FIFO queue with blocking and non-blocking
// ABOUTME: send/receive, including depth-zero rendezvous semantics (spec.md §4.2)

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// Outcome of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrySendError {
    Full,
    Closed,
}

/// Outcome of a non-blocking receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    Empty,
    Closed,
}

/// Error from a blocking send: the queue was closed before room became
/// available. The value is handed back so the caller retains ownership,
/// matching the "caller frees on failure" contract in spec.md §9.
#[derive(Debug)]
pub struct SendError<T>(pub T);

struct Inner<T> {
    items: VecDeque<T>,
    depth: usize,
    closed: bool,
    /// Number of receivers currently parked waiting for an item, used only
    /// to implement the depth-zero rendezvous: a `send` on a zero-depth
    /// queue may only place its item once a receiver is known to be
    /// waiting for it.
    waiting_receivers: usize,
}

/// A bounded, closable, typed FIFO.
///
/// `depth == 0` makes this a rendezvous queue: `send` blocks until a
/// paired `recv` is already waiting, and vice versa.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
    closed_notify: Notify,
}

impl<T> BoundedQueue<T> {
    pub fn new(depth: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                depth,
                closed: false,
                waiting_receivers: 0,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            closed_notify: Notify::new(),
        })
    }

    fn has_room(inner: &Inner<T>) -> bool {
        if inner.depth == 0 {
            inner.waiting_receivers > 0 && inner.items.is_empty()
        } else {
            inner.items.len() < inner.depth
        }
    }

    /// Blocks until there is room for `value`, or the queue closes.
    ///
    /// The `Notified` future is created before the room check (the same
    /// check-then-wait idiom `peer::wait_for_connection` uses), not after
    /// a failed check: `Notify::notify_waiters` stores no permit, so a
    /// `recv` freeing a slot in the gap between our check and registering
    /// as a waiter would otherwise be missed and park us forever.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        let mut value = Some(value);
        loop {
            let notified = self.not_full.notified();
            {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    return Err(SendError(value.take().unwrap()));
                }
                if Self::has_room(&inner) {
                    inner.items.push_back(value.take().unwrap());
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Non-blocking send.
    pub fn try_send(&self, value: T) -> Result<(), (T, TrySendError)> {
        let Ok(mut inner) = self.inner.try_lock() else {
            return Err((value, TrySendError::Full));
        };
        if inner.closed {
            return Err((value, TrySendError::Closed));
        }
        if Self::has_room(&inner) {
            inner.items.push_back(value);
            self.not_empty.notify_one();
            Ok(())
        } else {
            Err((value, TrySendError::Full))
        }
    }

    /// Blocks until an element is available or the queue closes and
    /// drains, matching spec.md: "receives continue to drain remaining
    /// elements and then return CLOSED".
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(v) = inner.items.pop_front() {
                    self.not_full.notify_waiters();
                    return Some(v);
                }
                if inner.closed {
                    return None;
                }
                inner.waiting_receivers += 1;
                // A zero-depth queue needs a sender to notice a receiver
                // arrived; wake any sender blocked in `send`.
                self.not_full.notify_waiters();
            }
            self.not_empty.notified().await;
            let mut inner = self.inner.lock().await;
            inner.waiting_receivers = inner.waiting_receivers.saturating_sub(1);
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let Ok(mut inner) = self.inner.try_lock() else {
            return Err(TryRecvError::Empty);
        };
        if let Some(v) = inner.items.pop_front() {
            self.not_full.notify_waiters();
            Ok(v)
        } else if inner.closed {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Idempotently marks the queue closed and wakes every waiter.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
        self.closed_notify.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_then_recv_fifo_order() {
        let q = BoundedQueue::new(4);
        q.send(1).await.unwrap();
        q.send(2).await.unwrap();
        q.send(3).await.unwrap();
        assert_eq!(q.recv().await, Some(1));
        assert_eq!(q.recv().await, Some(2));
        assert_eq!(q.recv().await, Some(3));
    }

    #[tokio::test]
    async fn try_send_full_reports_full() {
        let q = BoundedQueue::new(1);
        q.try_send(1).unwrap();
        let err = q.try_send(2).unwrap_err();
        assert_eq!(err.1, TrySendError::Full);
    }

    #[tokio::test]
    async fn try_recv_empty_reports_empty() {
        let q: Arc<BoundedQueue<i32>> = BoundedQueue::new(1);
        assert_eq!(q.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test]
    async fn close_wakes_blocked_recv_with_none() {
        let q: Arc<BoundedQueue<i32>> = BoundedQueue::new(1);
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close().await;
        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_lets_remaining_elements_drain_before_closed() {
        let q = BoundedQueue::new(4);
        q.send(1).await.unwrap();
        q.send(2).await.unwrap();
        q.close().await;
        assert_eq!(q.recv().await, Some(1));
        assert_eq!(q.recv().await, Some(2));
        assert_eq!(q.recv().await, None);
    }

    #[tokio::test]
    async fn send_after_close_fails_and_returns_value() {
        let q = BoundedQueue::new(4);
        q.close().await;
        let err = q.send(42).await.unwrap_err();
        assert_eq!(err.0, 42);
    }

    #[tokio::test]
    async fn zero_depth_is_a_rendezvous() {
        let q: Arc<BoundedQueue<i32>> = BoundedQueue::new(0);
        assert_eq!(q.try_send(1), Err((1, TrySendError::Full)));

        let q2 = q.clone();
        let receiver = tokio::spawn(async move { q2.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.send(7).await.unwrap();
        assert_eq!(receiver.await.unwrap(), Some(7));
    }
}
