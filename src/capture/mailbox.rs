//! Capacity-1 hand-off primitives between capture threads
//!
//! [`LatestMailbox`] carries frames from a compositor callback thread to the
//! capture worker. Posting overwrites any unread value, so at most one frame
//! is ever buffered. [`StopSignal`] is a one-way latch the worker waits on
//! between iterations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Result of waiting on a [`LatestMailbox`]
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Value(T),
    /// Nothing arrived within the wait
    Empty,
    /// The producer closed the mailbox and nothing is left to read
    Closed,
}

#[derive(Debug)]
struct MailboxState<T> {
    value:  Option<T>,
    closed: bool,
}

/// Latest-wins single-slot channel
#[derive(Debug)]
pub struct LatestMailbox<T> {
    state: Mutex<MailboxState<T>>,
    ready: Condvar,
}

impl<T> Default for LatestMailbox<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                value:  None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }
}

impl<T> LatestMailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning `true` if it replaced an unread one
    ///
    /// Posting to a closed mailbox drops the value.
    pub fn post(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        let replaced = state.value.replace(value).is_some();
        drop(state);
        self.ready.notify_one();
        replaced
    }

    /// Takes the pending value without waiting
    pub fn try_take(&self) -> Received<T> {
        let mut state = self.state.lock();
        match state.value.take() {
            Some(value) => Received::Value(value),
            None if state.closed => Received::Closed,
            None => Received::Empty,
        }
    }

    /// Waits up to `timeout` for a value
    pub fn take_timeout(&self, timeout: Duration) -> Received<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Received::Value(value);
            }
            if state.closed {
                return Received::Closed;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return match state.value.take() {
                    Some(value) => Received::Value(value),
                    None if state.closed => Received::Closed,
                    None => Received::Empty,
                };
            }
        }
    }

    /// Marks the producer side as finished and wakes any waiter
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// One-way stop latch shared between a controller and a worker
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleeps up to `timeout`, returning early with `true` once triggered
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut stopped = flag.lock();
        while !*stopped {
            if cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    /// Blocks until triggered
    pub fn wait(&self) {
        let (flag, cvar) = &*self.inner;
        let mut stopped = flag.lock();
        while !*stopped {
            cvar.wait(&mut stopped);
        }
    }

    /// Whether two handles refer to the same latch
    pub fn same_as(&self, other: &StopSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
