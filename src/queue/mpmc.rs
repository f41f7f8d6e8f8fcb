//! Thread-safe message queue (C2): a [`super::chunk::ChunkQueue`] guarded by
//! a `Mutex`, with an [`super::counter::EventCounter`] tracking how many
//! items are available so dequeuers can block, poll, or wait with a
//! deadline instead of spinning on the lock.

use super::chunk::{ChunkQueue, DEFAULT_CHUNK_CAP};
use super::counter::EventCounter;
use crate::error::{Error, Result};
use std::sync::Mutex;
use std::time::Duration;

/// A bounded-chunk-size, unbounded-length FIFO queue safe to share across
/// threads. Producers never block; consumers choose blocking, polling, or
/// timed waits.
pub struct MessageQueue<T> {
    queue: Mutex<ChunkQueue<T>>,
    available: EventCounter,
}

impl<T> MessageQueue<T> {
    pub fn new() -> Result<Self> {
        Self::with_chunk_capacity(DEFAULT_CHUNK_CAP)
    }

    pub fn with_chunk_capacity(chunk_cap: usize) -> Result<Self> {
        if chunk_cap == 0 {
            return Err(Error::BadConf);
        }
        Ok(Self {
            queue: Mutex::new(ChunkQueue::new(chunk_cap)),
            available: EventCounter::new()?,
        })
    }

    /// Enqueues `item` and wakes one waiting consumer. Fails with
    /// [`Error::Shutdown`] once [`Self::shutdown`] has been called.
    pub fn enqueue(&self, item: T) -> Result<()> {
        if self.available.is_shutdown() {
            return Err(Error::Shutdown);
        }
        let mut guard = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        guard.enqueue(item);
        drop(guard);
        self.available.post();
        Ok(())
    }

    /// Non-blocking dequeue. `Ok(None)` means the queue is empty right now.
    pub fn try_dequeue(&self) -> Result<Option<T>> {
        if !self.available.try_wait()? {
            return Ok(None);
        }
        let mut guard = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Some(
            guard
                .dequeue()
                .expect("event counter accounted for an item"),
        ))
    }

    /// Blocks until an item is available, then returns it. Fails with
    /// [`Error::Shutdown`] if the queue is shut down while waiting.
    pub fn dequeue(&self) -> Result<T> {
        self.available.wait_blocking()?;
        let mut guard = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard
            .dequeue()
            .expect("event counter accounted for an item"))
    }

    /// Blocks until an item is available or `timeout` elapses, whichever is
    /// first. `Ok(None)` means the deadline passed with nothing available.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        if !self.available.wait_timeout(timeout)? {
            return Ok(None);
        }
        let mut guard = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Some(
            guard
                .dequeue()
                .expect("event counter accounted for an item"),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Wakes every current and future waiter with [`Error::Shutdown`] and
    /// stops accepting new items. Already-enqueued items remain available
    /// through [`Self::try_dequeue`] only — [`Self::dequeue`] and
    /// [`Self::dequeue_timeout`] report shutdown immediately once called.
    pub fn shutdown(&self) {
        log::debug!("queue: shutting down, releasing all waiters");
        self.available.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.available.is_shutdown()
    }

    /// True once the queue is shut down and has no items left to drain.
    /// Mirrors the original's destroy precondition without reproducing its
    /// destroy-time use-after-free: this crate never calls into the
    /// condvar/eventfd after reporting shutdown.
    pub fn is_drained(&self) -> bool {
        self.is_shutdown()
            && self
                .queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .is_drained()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn enqueue_dequeue_roundtrip() {
        let q: MessageQueue<i32> = MessageQueue::new().unwrap();
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert_eq!(q.dequeue().unwrap(), 1);
        assert_eq!(q.dequeue().unwrap(), 2);
    }

    #[test]
    fn try_dequeue_empty_is_none() {
        let q: MessageQueue<i32> = MessageQueue::new().unwrap();
        assert_eq!(q.try_dequeue().unwrap(), None);
    }

    #[test]
    fn dequeue_timeout_expires() {
        let q: MessageQueue<i32> = MessageQueue::new().unwrap();
        assert_eq!(q.dequeue_timeout(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn blocking_consumer_wakes_on_enqueue() {
        let q = Arc::new(MessageQueue::<i32>::new().unwrap());
        let consumer = q.clone();
        let handle = thread::spawn(move || consumer.dequeue());
        thread::sleep(Duration::from_millis(20));
        q.enqueue(42).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), 42);
    }

    #[test]
    fn shutdown_wakes_blocked_consumer_with_error() {
        let q = Arc::new(MessageQueue::<i32>::new().unwrap());
        let consumer = q.clone();
        let handle = thread::spawn(move || consumer.dequeue());
        thread::sleep(Duration::from_millis(20));
        q.shutdown();
        assert!(matches!(handle.join().unwrap(), Err(Error::Shutdown)));
    }

    #[test]
    fn enqueue_after_shutdown_fails() {
        let q: MessageQueue<i32> = MessageQueue::new().unwrap();
        q.shutdown();
        assert!(matches!(q.enqueue(1), Err(Error::Shutdown)));
    }

    #[test]
    fn is_drained_after_shutdown_and_drain() {
        let q: MessageQueue<i32> = MessageQueue::new().unwrap();
        q.enqueue(1).unwrap();
        q.shutdown();
        assert!(!q.is_drained());
        q.try_dequeue().unwrap();
        assert!(q.is_drained());
    }
}
