// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-client pull queue for the Web Profile.
//!
//! Browser clients cannot expose an HTTP endpoint, so the hub enqueues
//! outbound deliveries here and `pullCallbacks` drains them. The queue is
//! bounded: overflow drops the oldest items and marks the client lagging.

use crate::transport::Callback;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::warn;

/// Bounded FIFO of pending callbacks awaiting a pull.
pub struct PullQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    bound: usize,
    /// The client asked the hub to push callbacks (accepted, recorded;
    /// deliveries still go through the pull queue).
    reverse_callbacks: AtomicBool,
}

struct Inner {
    items: VecDeque<Callback>,
    lagging: bool,
    client_id: String,
}

impl PullQueue {
    pub fn new(client_id: impl Into<String>, bound: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                lagging: false,
                client_id: client_id.into(),
            }),
            notify: Notify::new(),
            bound,
            reverse_callbacks: AtomicBool::new(false),
        }
    }

    /// Append one callback, dropping the oldest on overflow.
    pub fn push(&self, callback: Callback) {
        {
            let mut inner = self.inner.lock().expect("pull queue poisoned");
            if inner.items.len() >= self.bound {
                inner.items.pop_front();
                if !inner.lagging {
                    warn!(client = %inner.client_id, "pull queue overflow; client lagging");
                }
                inner.lagging = true;
            }
            inner.items.push_back(callback);
        }
        self.notify.notify_one();
    }

    /// Block up to `timeout` for at least one pending callback, then return
    /// the entire pending batch. An idle timeout returns an empty list.
    pub async fn pull(&self, timeout: Duration) -> Vec<Callback> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inner = self.inner.lock().expect("pull queue poisoned");
                if !inner.items.is_empty() {
                    return inner.items.drain(..).collect();
                }
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }

    /// Has the queue ever overflowed?
    pub fn is_lagging(&self) -> bool {
        self.inner.lock().expect("pull queue poisoned").lagging
    }

    pub fn set_reverse_callbacks(&self, allow: bool) {
        self.reverse_callbacks.store(allow, Ordering::Relaxed);
    }

    pub fn reverse_callbacks(&self) -> bool {
        self.reverse_callbacks.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("pull queue poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{SampMap, SampValue};

    fn cb(tag: &str) -> Callback {
        Callback::notification(tag, SampValue::Map(SampMap::new()))
    }

    #[tokio::test]
    async fn test_pull_returns_whole_batch() {
        let queue = PullQueue::new("c1", 8);
        queue.push(cb("a"));
        queue.push(cb("b"));

        let batch = queue.pull(Duration::from_millis(10)).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].params[0].as_str(), Some("a"));
        assert_eq!(batch[1].params[0].as_str(), Some("b"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_idle_pull_times_out_empty() {
        let queue = PullQueue::new("c1", 8);
        let batch = queue.pull(Duration::from_millis(20)).await;
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_pull_wakes_on_push() {
        let queue = std::sync::Arc::new(PullQueue::new("c1", 8));
        let pusher = {
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                queue.push(cb("late"));
            })
        };
        let batch = queue.pull(Duration::from_secs(5)).await;
        pusher.await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_overflow_drops_oldest_and_sets_lagging() {
        let queue = PullQueue::new("c1", 3);
        for tag in ["a", "b", "c", "d", "e"] {
            queue.push(cb(tag));
        }
        assert!(queue.is_lagging());

        let batch = queue.pull(Duration::from_millis(10)).await;
        let tags: Vec<_> = batch
            .iter()
            .map(|c| c.params[0].as_str().unwrap())
            .collect();
        assert_eq!(tags, ["c", "d", "e"]);
    }

    #[test]
    fn test_reverse_callbacks_flag() {
        let queue = PullQueue::new("c1", 4);
        assert!(!queue.reverse_callbacks());
        queue.set_reverse_callbacks(true);
        assert!(queue.reverse_callbacks());
    }
}
