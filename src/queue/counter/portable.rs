//! Portable event counter fallback built on `Mutex` + `Condvar`, for
//! targets without an `eventfd`-style primitive.

use crate::error::{Error, Result};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct State {
    count: u64,
    shutdown: bool,
}

pub(crate) struct Inner {
    state: Mutex<State>,
    cv: Condvar,
}

impl Inner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                count: 0,
                shutdown: false,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.count += 1;
        self.cv.notify_one();
    }

    pub fn try_wait(&self) -> Result<bool> {
        let mut guard = self.state.lock().unwrap();
        if guard.count > 0 {
            guard.count -= 1;
            return Ok(true);
        }
        if guard.shutdown {
            return Err(Error::Shutdown);
        }
        Ok(false)
    }

    pub fn wait_blocking(&self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        loop {
            if guard.shutdown {
                return Err(Error::Shutdown);
            }
            if guard.count > 0 {
                guard.count -= 1;
                return Ok(());
            }
            guard = self.cv.wait(guard).unwrap();
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let mut guard = self.state.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if guard.shutdown {
                return Err(Error::Shutdown);
            }
            if guard.count > 0 {
                guard.count -= 1;
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            let (next, result) = self.cv.wait_timeout(guard, remaining).unwrap();
            guard = next;
            if result.timed_out() && guard.count == 0 && !guard.shutdown {
                return Ok(false);
            }
        }
    }

    pub fn shutdown(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.shutdown = true;
        self.cv.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }
}
