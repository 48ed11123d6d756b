//! One-shot readiness flag with blocking wait (a wait queue plus its
//! condition variable).
//!
//! `poll` only looks at the flag. A blocking waiter consumes it, so one
//! `signal_ready` releases at most one waiter. Signalling an already ready
//! flag is a no-op: pending readiness does not count up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar};
use std::time::{Duration, Instant};

use log::Level;

use crate::device::lock;
use crate::error::Interrupted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Idle,
    Ready,
}

/// A waiter's "signal pending" bit. Clones share the bit.
#[derive(Debug, Clone, Default)]
pub struct SignalPending(Arc<AtomicBool>);

impl SignalPending {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Acknowledge the signal so the next wait blocks again.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }
}

pub struct WaitSignal {
    name: String,
    ready: std::sync::Mutex<bool>,
    cond: Condvar,
}

impl WaitSignal {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ready: std::sync::Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Mark ready and wake one blocked waiter.
    pub fn signal_ready(&self) {
        let mut ready = lock(&self.ready);
        if *ready {
            crate::pr!(Level::Debug, self.name, "already ready, signal coalesced");
            return;
        }
        *ready = true;
        self.cond.notify_one();
    }

    /// Non-blocking, non-consuming check.
    pub fn poll(&self) -> bool {
        *lock(&self.ready)
    }

    pub fn state(&self) -> WaitState {
        if self.poll() {
            WaitState::Ready
        } else {
            WaitState::Idle
        }
    }

    /// Block until ready, then consume readiness.
    pub fn wait_until_ready(&self, pending: &SignalPending) -> Result<(), Interrupted> {
        let mut ready = lock(&self.ready);
        loop {
            if *ready {
                *ready = false;
                return Ok(());
            }
            if pending.is_raised() {
                return Err(Interrupted);
            }
            ready = self
                .cond
                .wait(ready)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Like [`Self::wait_until_ready`], giving up after `timeout`.
    /// `Ok(false)` means the deadline passed with nothing to consume.
    pub fn wait_timeout(
        &self,
        pending: &SignalPending,
        timeout: Duration,
    ) -> Result<bool, Interrupted> {
        let deadline = Instant::now() + timeout;
        let mut ready = lock(&self.ready);
        loop {
            if *ready {
                *ready = false;
                return Ok(true);
            }
            if pending.is_raised() {
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            ready = self
                .cond
                .wait_timeout(ready, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .0;
        }
    }

    /// Raise `pending` and wake its owner if it sleeps here.
    pub fn interrupt(&self, pending: &SignalPending) {
        pending.raise();
        let _guard = lock(&self.ready);
        self.cond.notify_all();
    }
}

impl std::fmt::Debug for WaitSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitSignal")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
