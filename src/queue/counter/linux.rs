//! Linux event counter backed by an `eventfd` in `EFD_SEMAPHORE` mode:
//! each `post` increments the kernel-held counter by one, each successful
//! read decrements it by one and blocks (or fails `EAGAIN`) when zero.

use crate::error::{self, Error, Result};
use std::ffi::c_void;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub(crate) struct Inner {
    fd: RawFd,
    shutdown: AtomicBool,
}

impl Inner {
    pub fn new() -> Result<Self> {
        let fd = unsafe {
            libc::eventfd(0, libc::EFD_SEMAPHORE | libc::EFD_NONBLOCK | libc::EFD_CLOEXEC)
        };
        if fd < 0 {
            return Err(error::from_errno(error::last_errno()));
        }
        Ok(Self {
            fd,
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn post(&self) {
        let val: u64 = 1;
        unsafe {
            libc::write(self.fd, &val as *const u64 as *const c_void, 8);
        }
    }

    pub fn try_wait(&self) -> Result<bool> {
        if self.read_one()?.is_some() {
            return Ok(true);
        }
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        Ok(false)
    }

    pub fn wait_blocking(&self) -> Result<()> {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(Error::Shutdown);
            }
            if self.read_one()?.is_some() {
                return Ok(());
            }
            self.poll_fd(-1)?;
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(Error::Shutdown);
            }
            if self.read_one()?.is_some() {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            let ms = remaining.as_millis().min(i32::MAX as u128) as i32;
            if !self.poll_fd(ms)? {
                return Ok(false);
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        // Wake any thread parked in poll(); the shutdown flag above is
        // what actually stops them from re-blocking.
        let val: u64 = 1 << 32;
        unsafe {
            libc::write(self.fd, &val as *const u64 as *const c_void, 8);
        }
    }

    fn read_one(&self) -> Result<Option<()>> {
        let mut val: u64 = 0;
        loop {
            let n = unsafe { libc::read(self.fd, &mut val as *mut u64 as *mut c_void, 8) };
            if n == 8 {
                return Ok(Some(()));
            }
            let errno = error::last_errno();
            if errno == libc::EINTR {
                continue;
            }
            if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
                return Ok(None);
            }
            return Err(error::from_errno(errno));
        }
    }

    fn poll_fd(&self, timeout_ms: i32) -> Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            let n = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout_ms) };
            if n < 0 {
                let errno = error::last_errno();
                if errno == libc::EINTR {
                    continue;
                }
                return Err(error::from_errno(errno));
            }
            return Ok(n > 0);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

// The fd is exclusively owned and every access goes through &self methods
// that only perform syscalls, so sharing across threads is sound.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}
