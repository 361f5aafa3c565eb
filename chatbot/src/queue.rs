use std::{
    mem,
    sync::{Mutex, MutexGuard},
};

use tokio::sync::Notify;

use crate::{conn::Error, tmi::Message};

/// Why a queue stopped accepting messages.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CloseReason {
    /// Peer went away, a write failed, or the session was closed locally
    Disconnected,
    /// Server sent RECONNECT
    Reconnect,
}

impl From<CloseReason> for Error {
    fn from(reason: CloseReason) -> Error {
        match reason {
            CloseReason::Disconnected => Error::ConnectionClosed,
            CloseReason::Reconnect => Error::ReconnectRequested,
        }
    }
}

struct Inner<T> {
    items: Vec<T>,
    closed: Option<CloseReason>,
}

/// Unbounded queue between the read task and the consumer.
///
/// [`drain`](EventQueue::drain) waits until at least one item is queued and
/// then takes *all* of them at once.
pub struct EventQueue<T = Message> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self { EventQueue::new() }
}

impl<T> EventQueue<T> {
    pub fn new() -> EventQueue<T> {
        EventQueue {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                closed: None,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // nothing in here can leave the state half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `item`. Hands it back if the queue was closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        {
            let mut inner = self.lock();
            if inner.closed.is_some() {
                return Err(item);
            }
            inner.items.push(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Waits until the queue is non-empty, then removes and returns every
    /// queued item in arrival order.
    ///
    /// Items pushed before [`close`](EventQueue::close) are still handed out;
    /// after that, draining fails with the close reason.
    pub async fn drain(&self) -> Result<Vec<T>, Error> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if !inner.items.is_empty() {
                    return Ok(mem::take(&mut inner.items));
                }
                if let Some(reason) = inner.closed {
                    return Err(reason.into());
                }
            }
            notified.await;
        }
    }

    /// Stops accepting items and wakes every pending drain. Only the first
    /// reason sticks.
    pub fn close(&self, reason: CloseReason) {
        {
            let mut inner = self.lock();
            if inner.closed.is_none() {
                inner.closed = Some(reason);
            }
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool { self.lock().closed.is_some() }

    pub fn len(&self) -> usize { self.lock().items.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use tokio_test::{assert_pending, assert_ready, assert_ready_ok, task};

    use super::*;

    #[test]
    fn drain_returns_everything_in_order() {
        let queue = EventQueue::new();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        assert_eq!(5, queue.len());

        let mut drain = task::spawn(queue.drain());
        assert_eq!(vec![0, 1, 2, 3, 4], assert_ready_ok!(drain.poll()));
        drop(drain);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_waits_for_push() {
        let queue = EventQueue::new();
        let mut drain = task::spawn(queue.drain());
        assert_pending!(drain.poll());

        queue.push("hello").unwrap();
        assert!(drain.is_woken());
        assert_eq!(vec!["hello"], assert_ready_ok!(drain.poll()));
    }

    #[test]
    fn close_wakes_pending_drain() {
        let queue = EventQueue::<u32>::new();
        let mut drain = task::spawn(queue.drain());
        assert_pending!(drain.poll());

        queue.close(CloseReason::Disconnected);
        assert!(drain.is_woken());
        assert!(matches!(assert_ready!(drain.poll()), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn queued_items_outlive_close() {
        let queue = EventQueue::new();
        queue.push(1).unwrap();
        queue.close(CloseReason::Reconnect);
        queue.close(CloseReason::Disconnected);
        assert_eq!(Err(2), queue.push(2));

        let mut drain = task::spawn(queue.drain());
        assert_eq!(vec![1], assert_ready_ok!(drain.poll()));
        drop(drain);
        let mut drain = task::spawn(queue.drain());
        assert!(matches!(assert_ready!(drain.poll()), Err(Error::ReconnectRequested)));
    }

    #[tokio::test]
    async fn concurrent_pushes_are_never_lost() {
        let queue = Arc::new(EventQueue::new());
        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                for i in 0..1000u32 {
                    queue.push(i).unwrap();
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < 1000 {
            received.extend(queue.drain().await.unwrap());
        }
        producer.await.unwrap();
        assert_eq!((0..1000).collect::<Vec<_>>(), received);
    }
}
