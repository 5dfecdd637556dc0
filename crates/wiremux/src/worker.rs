//! # Worker pool — readiness event consumers
//!
//! N independent threads, each looping: take one task from the dispatch
//! queue, run the handler's callbacks in the fixed read → write → error
//! order per the task's flags, then release the handler's busy flag. The
//! release is what lets the reactor poll that channel again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wiremux_core::interest::Interest;
use wiremux_core::{wm_debug, wm_error};

use crate::dispatch::{Consumed, DispatchQueue, ReadyTask};

/// How long a worker waits on an empty queue before re-checking quit.
const CONSUME_TICK: Duration = Duration::from_millis(50);

/// Handles to the running worker threads.
pub(crate) struct WorkerPool {
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers consuming from `queue`.
    pub(crate) fn start(
        count: usize,
        queue: Arc<DispatchQueue>,
        quit: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let queue = queue.clone();
            let quit = quit.clone();
            let handle = thread::Builder::new()
                .name(format!("wiremux-worker-{}", id))
                .spawn(move || {
                    worker_loop(id, &queue, &quit);
                    wm_debug!("worker {}: stopped", id);
                })?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    /// Wait for every worker to exit. Call after closing the queue.
    pub(crate) fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                wm_error!("worker thread panicked");
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}

fn worker_loop(id: usize, queue: &DispatchQueue, quit: &AtomicBool) {
    while !quit.load(Ordering::Relaxed) {
        match queue.consume_timeout(CONSUME_TICK) {
            Consumed::Task(task) => run_task(id, task),
            Consumed::TimedOut => continue,
            Consumed::Closed => break,
        }
    }
    // Quit observed with tasks possibly still queued: drain what is left
    // so no handler stays claimed forever.
    loop {
        match queue.consume_timeout(Duration::ZERO) {
            Consumed::Task(task) => run_task(id, task),
            _ => break,
        }
    }
}

fn run_task(id: usize, task: ReadyTask) {
    let ReadyTask { handler, ready } = task;
    wm_debug!("worker {}: fd={} {:?}", id, handler.fd(), ready);

    if ready.contains(Interest::READ) {
        handler.on_read_ready();
    }
    if ready.contains(Interest::WRITE) {
        handler.on_write_ready();
    }
    if ready.contains(Interest::ERROR) {
        handler.on_error();
    }

    handler.busy().release();
}
