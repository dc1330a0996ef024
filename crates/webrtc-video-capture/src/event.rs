//! Auto-reset event used to wake the worker threads.
//!
//! C++ source: `webrtc/system_wrappers/interface/event_wrapper.h`

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct Event {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wake one waiter, or the next one to wait.
    pub(crate) fn set(&self) {
        *self.signalled.lock() = true;
        self.cond.notify_one();
    }

    pub(crate) fn reset(&self) {
        *self.signalled.lock() = false;
    }

    /// Wait until set or until `timeout` passes. Consumes the signal.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signalled = self.signalled.lock();
        while !*signalled {
            if self.cond.wait_until(&mut signalled, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *signalled, false)
    }
}
