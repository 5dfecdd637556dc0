//! # Dispatch queue — bounded handoff from reactor to workers
//!
//! A capacity-bounded FIFO of readiness events. The reactor produces, the
//! workers consume; both block (optionally with a timeout) instead of
//! spinning. The bound is the system's backpressure: when workers fall
//! behind, `produce` stalls the reactor thread, which in turn stops
//! polling.
//!
//! Built from a mutex-guarded deque plus a condvar pair — the native
//! equivalent of the producer/consumer semaphore pair this replaces.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use wiremux_core::interest::Interest;

use crate::handler::HandlerRef;

/// One queued readiness event awaiting a worker.
pub struct ReadyTask {
    pub handler: HandlerRef,
    pub ready: Interest,
}

/// Outcome of a timed produce attempt. Failures hand the task back so the
/// caller can release the handler's busy claim.
pub enum ProduceError {
    /// Queue closed; the task was never enqueued.
    Closed(ReadyTask),
    /// No slot freed within the timeout.
    Timeout(ReadyTask),
}

/// Outcome of a timed consume attempt.
pub enum Consumed {
    Task(ReadyTask),
    TimedOut,
    /// Queue closed and fully drained.
    Closed,
}

struct Inner {
    queue: VecDeque<ReadyTask>,
    closed: bool,
}

/// Bounded FIFO with exactly-once delivery of each task to one consumer.
pub struct DispatchQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Block until a slot frees, then enqueue. `Err` returns the task when
    /// the queue has been closed.
    pub fn produce(&self, task: ReadyTask) -> Result<(), ReadyTask> {
        let mut inner = self.inner.lock().unwrap();
        while inner.queue.len() >= self.capacity && !inner.closed {
            inner = self.not_full.wait(inner).unwrap();
        }
        if inner.closed {
            return Err(task);
        }
        inner.queue.push_back(task);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Like [`produce`](Self::produce), but give up after `timeout`.
    pub fn produce_timeout(&self, task: ReadyTask, timeout: Duration) -> Result<(), ProduceError> {
        let deadline = std::time::Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        while inner.queue.len() >= self.capacity && !inner.closed {
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(ProduceError::Timeout(task));
            }
            let (guard, _res) = self.not_full.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
        }
        if inner.closed {
            return Err(ProduceError::Closed(task));
        }
        inner.queue.push_back(task);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until a task exists. `None` once the queue is closed and
    /// drained — tasks enqueued before `close` are still delivered.
    pub fn consume(&self) -> Option<ReadyTask> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(task) = inner.queue.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Some(task);
            }
            if inner.closed {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Like [`consume`](Self::consume), but give up after `timeout`.
    pub fn consume_timeout(&self, timeout: Duration) -> Consumed {
        let deadline = std::time::Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(task) = inner.queue.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Consumed::Task(task);
            }
            if inner.closed {
                return Consumed::Closed;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Consumed::TimedOut;
            }
            let (guard, _res) = self.not_empty.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
        }
    }

    /// Close the queue and wake every waiter. Producers fail from here on;
    /// consumers drain what is left, then see `Closed`.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
