//! Synchronization primitives: fences, binary semaphores, timeline semaphores.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::errors::{HeliosError, Result};

/// How long device-side waits may block before the frame is considered lost.
/// In this model all GPU work completes at submit time, so a wait that runs
/// into this timeout indicates a broken submission chain.
pub const GPU_WAIT_TIMEOUT: Duration = Duration::from_secs(8);

/// A CPU-waitable fence signalled by queue submission.
#[derive(Debug)]
pub struct Fence {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl Fence {
    pub(crate) fn new(signaled: bool) -> Self {
        Self {
            signaled: Mutex::new(signaled),
            condvar: Condvar::new(),
        }
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub(crate) fn signal(&self) {
        *self.signaled.lock() = true;
        self.condvar.notify_all();
    }

    /// Block until the fence is signalled.
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let mut signaled = self.signaled.lock();
        let deadline = std::time::Instant::now() + timeout;
        while !*signaled {
            if self.condvar.wait_until(&mut signaled, deadline).timed_out() {
                return Err(HeliosError::Device("fence wait timed out".into()));
            }
        }
        Ok(())
    }
}

/// A binary semaphore. Signalled by one submission, consumed by the next
/// wait; waiting on an unsignalled binary semaphore is a submission error.
#[derive(Debug)]
pub struct Semaphore {
    signaled: Mutex<bool>,
}

impl Semaphore {
    pub(crate) fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
        }
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    pub(crate) fn signal(&self) {
        *self.signaled.lock() = true;
    }

    /// Consume the pending signal. Returns whether one was pending.
    pub(crate) fn consume(&self) -> bool {
        std::mem::take(&mut *self.signaled.lock())
    }
}

/// A timeline semaphore: a monotonically increasing `u64` usable for both
/// CPU- and GPU-side waits.
#[derive(Debug)]
pub struct TimelineSemaphore {
    value: Mutex<u64>,
    condvar: Condvar,
}

impl TimelineSemaphore {
    pub(crate) fn new(initial: u64) -> Self {
        Self {
            value: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        *self.value.lock()
    }

    /// Advance the timeline. Values never move backwards.
    pub(crate) fn signal(&self, value: u64) {
        let mut current = self.value.lock();
        if value > *current {
            *current = value;
            self.condvar.notify_all();
        }
    }

    /// Block until the timeline reaches `value`.
    pub fn wait(&self, value: u64, timeout: Duration) -> Result<()> {
        let mut current = self.value.lock();
        let deadline = std::time::Instant::now() + timeout;
        while *current < value {
            if self.condvar.wait_until(&mut current, deadline).timed_out() {
                return Err(HeliosError::Device(format!(
                    "timeline semaphore wait timed out (value {} < {value})",
                    *current
                )));
            }
        }
        Ok(())
    }
}
