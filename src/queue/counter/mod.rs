//! Counting-semaphore-style wakeup primitive used by [`super::mpmc`] to
//! implement blocking, non-blocking, and timed dequeue. Dispatches to a
//! Linux `eventfd` implementation where available and a portable
//! `Mutex`+`Condvar` fallback everywhere else.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod portable;

use crate::error::Result;
use std::time::Duration;

pub struct EventCounter {
    #[cfg(target_os = "linux")]
    inner: linux::Inner,
    #[cfg(not(target_os = "linux"))]
    inner: portable::Inner,
}

impl EventCounter {
    pub fn new() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self {
                inner: linux::Inner::new()?,
            })
        }
        #[cfg(not(target_os = "linux"))]
        {
            Ok(Self {
                inner: portable::Inner::new(),
            })
        }
    }

    /// Increments the counter by one and wakes a waiter.
    pub fn post(&self) {
        self.inner.post()
    }

    /// Non-blocking decrement. `Ok(false)` means it would have blocked.
    pub fn try_wait(&self) -> Result<bool> {
        self.inner.try_wait()
    }

    /// Blocks until the counter is nonzero, then decrements it.
    pub fn wait_blocking(&self) -> Result<()> {
        self.inner.wait_blocking()
    }

    /// Blocks until the counter is nonzero or `timeout` elapses.
    /// `Ok(false)` means the deadline passed first.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        self.inner.wait_timeout(timeout)
    }

    /// Releases every waiter (current and future) with `Error::Shutdown`.
    pub fn shutdown(&self) {
        self.inner.shutdown()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn post_then_wait_succeeds() {
        let counter = EventCounter::new().unwrap();
        counter.post();
        assert!(counter.try_wait().unwrap());
        assert!(!counter.try_wait().unwrap());
    }

    #[test]
    fn wait_timeout_expires_when_empty() {
        let counter = EventCounter::new().unwrap();
        let got = counter.wait_timeout(Duration::from_millis(20)).unwrap();
        assert!(!got);
    }

    #[test]
    fn blocking_wait_wakes_on_post() {
        let counter = Arc::new(EventCounter::new().unwrap());
        let waiter = counter.clone();
        let handle = thread::spawn(move || waiter.wait_blocking());
        thread::sleep(Duration::from_millis(20));
        counter.post();
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn shutdown_releases_blocked_waiter() {
        let counter = Arc::new(EventCounter::new().unwrap());
        let waiter = counter.clone();
        let handle = thread::spawn(move || waiter.wait_blocking());
        thread::sleep(Duration::from_millis(20));
        counter.shutdown();
        assert!(matches!(
            handle.join().unwrap(),
            Err(crate::error::Error::Shutdown)
        ));
    }
}
