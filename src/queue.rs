//! Bounded event queue merging chat messages and transcribed phrases.
//!
//! Producers never wait: when the buffer is full the newly offered event is
//! dropped with a warning. A single consumer drains the queue in FIFO order.

use crate::defaults;
use log::warn;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// One chat message or transcribed phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub username: String,
    pub text: String,
}

impl Event {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
        }
    }
}

/// Bounded FIFO of [`Event`]s.
pub struct EventQueue {
    tx: mpsc::Sender<Event>,
    rx: Mutex<mpsc::Receiver<Event>>,
    capacity: usize,
    closed: CancellationToken,
    dropped: AtomicU64,
}

impl EventQueue {
    /// Creates a queue with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(defaults::EVENT_QUEUE_CAPACITY)
    }

    /// Creates a queue holding at most `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
            closed: CancellationToken::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offers an event without blocking.
    ///
    /// Returns false if the event was dropped because the queue is full or
    /// closed. Events already queued are never displaced.
    pub fn enqueue(&self, event: Event) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }

        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Event queue is full, dropping event username={} text={:?}",
                    event.username, event.text
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Convenience wrapper around [`EventQueue::enqueue`].
    pub fn add(&self, username: &str, text: &str) -> bool {
        self.enqueue(Event::new(username, text))
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<Event> {
        if self.closed.is_cancelled() {
            return None;
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            event = rx.recv() => event,
        }
    }

    /// Like [`EventQueue::dequeue`] but also gives up when `cancel` fires.
    pub async fn dequeue_until(&self, cancel: &CancellationToken) -> Option<Event> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            event = self.dequeue() => event,
        }
    }

    /// Closes the queue. Pending and future `dequeue` calls return `None`.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_default_capacity() {
        let queue = EventQueue::new();
        assert_eq!(queue.capacity(), 64);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_overflow_drops_newest() {
        let queue = EventQueue::with_capacity(2);

        assert!(queue.enqueue(Event::new("u", "a")));
        assert!(queue.enqueue(Event::new("u", "b")));
        assert!(!queue.enqueue(Event::new("u", "c")));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.dequeue().await, Some(Event::new("u", "a")));
        assert_eq!(queue.dequeue().await, Some(Event::new("u", "b")));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_never_exceeds_capacity() {
        let queue = EventQueue::new();
        for i in 0..200 {
            queue.enqueue(Event::new("u", i.to_string()));
            assert!(queue.len() <= 64);
        }
        assert_eq!(queue.len(), 64);
        assert_eq!(queue.dropped(), 136);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = EventQueue::with_capacity(8);
        for text in ["one", "two", "three"] {
            queue.add("viewer", text);
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(queue.dequeue().await.unwrap().text);
        }
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue = Arc::new(EventQueue::with_capacity(4));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_enqueue_after_close_is_rejected() {
        let queue = EventQueue::with_capacity(4);
        queue.close();
        assert!(!queue.add("u", "late"));
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn test_dequeue_until_cancelled() {
        let queue = EventQueue::with_capacity(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(queue.dequeue_until(&cancel).await, None);
        assert!(!queue.is_closed());
    }
}
