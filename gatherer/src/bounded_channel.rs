//! A bounded multi-producer single-consumer queue with explicit
//! full-channel policies.
//!
//! `tokio::sync::mpsc` always blocks (or rejects via `try_send`) when full;
//! every fan-in boundary in this crate instead wants either "drop the
//! oldest queued item to make room" or "drop this new item", never
//! backpressure the producer. This wraps a `VecDeque` behind a mutex and a
//! notify rather than reaching for an external crate for two policies.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
    DropNewest,
}

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    senders: AtomicUsize,
}

pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

pub fn bounded<T>(capacity: usize, policy: OverflowPolicy) -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Inner {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        notify: Notify::new(),
        capacity,
        policy,
        senders: AtomicUsize::new(1),
    });
    (Sender { inner: inner.clone() }, Receiver { inner })
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.inner.senders.fetch_add(1, Ordering::AcqRel);
        Sender { inner: self.inner.clone() }
    }
}

/// Wakes a parked `recv()` once the last sender goes away, so it returns
/// `None` instead of waiting on a `notify` nothing will ever signal again.
impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if self.inner.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

impl<T> Sender<T> {
    /// Push `value`. Returns the evicted item, if the channel was full and
    /// the policy discarded something to make room (or discarded `value`
    /// itself, under `DropNewest`).
    pub async fn send(&self, value: T) -> Option<T> {
        let mut queue = self.inner.queue.lock().await;
        if queue.len() >= self.inner.capacity {
            match self.inner.policy {
                OverflowPolicy::DropOldest => {
                    let evicted = queue.pop_front();
                    queue.push_back(value);
                    self.inner.notify.notify_one();
                    evicted
                }
                OverflowPolicy::DropNewest => Some(value),
            }
        } else {
            queue.push_back(value);
            self.inner.notify.notify_one();
            None
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.queue.lock().await.len()
    }
}

impl<T> Receiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut queue = self.inner.queue.lock().await;
                if let Some(value) = queue.pop_front() {
                    return Some(value);
                }
                if Arc::strong_count(&self.inner) == 1 {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}
