//! # Reactor — the readiness poller
//!
//! Runs on a dedicated OS thread. Each iteration:
//!
//! 1. Builds a check list per registration set from channels whose handler
//!    is not busy (a busy handler cannot safely take another callback until
//!    the previous batch finishes).
//! 2. Sleeps out the poll timeout when all three lists are empty.
//! 3. Issues one `poll(2)` across the union of the lists with a bounded
//!    wait. A failed poll is logged and the iteration is lost, not fatal.
//! 4. Merges readiness into a batch keyed by handler: the first discovery
//!    claims the busy flag (claim lost ⇒ readiness deferred to the next
//!    iteration), later discoveries in the same pass merge flags with the
//!    error-override rule.
//! 5. Produces each (handler, flags) pair into the dispatch queue —
//!    blocking there when workers lag is the backpressure path.
//!
//! The quit flag is checked once per iteration; shutdown latency is
//! bounded by the poll timeout, not instantaneous.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wiremux_core::interest::Interest;
use wiremux_core::{wm_debug, wm_trace, wm_warn};

use crate::channel::errno;
use crate::dispatch::{DispatchQueue, ReadyTask};
use crate::handler::HandlerRef;
use crate::registry::Registry;

/// Readable for fds in the read set. POLLHUP and POLLERR count: recv()
/// will report the close/error, which is how orderly shutdown and socket
/// errors reach the connection's state machine.
const POLL_READ_MASK: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

/// Writable for fds in the write set.
const POLL_WRITE_MASK: libc::c_short = libc::POLLOUT | libc::POLLERR;

/// Error-ready for fds in the error set. Deliberately excludes POLLHUP:
/// an orderly hangup drains through the read path first.
const POLL_ERROR_MASK: libc::c_short = libc::POLLPRI | libc::POLLERR | libc::POLLNVAL;

/// Spawn the reactor thread.
pub(crate) fn spawn(
    registry: Arc<Registry>,
    queue: Arc<DispatchQueue>,
    quit: Arc<AtomicBool>,
    poll_timeout: Duration,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("wiremux-reactor".into())
        .spawn(move || {
            reactor_loop(&registry, &queue, &quit, poll_timeout);
            wm_debug!("reactor: stopped");
        })
}

fn reactor_loop(
    registry: &Registry,
    queue: &DispatchQueue,
    quit: &AtomicBool,
    poll_timeout: Duration,
) {
    // poll(2) rounds to milliseconds; never pass 0 or the loop would spin.
    let timeout_ms = poll_timeout.as_millis().clamp(1, i32::MAX as u128) as libc::c_int;

    while !quit.load(Ordering::Relaxed) {
        let read_list = registry.read_set().snapshot_not_busy();
        let write_list = registry.write_set().snapshot_not_busy();
        let error_list = registry.error_set().snapshot_not_busy();

        if read_list.is_empty() && write_list.is_empty() && error_list.is_empty() {
            thread::sleep(poll_timeout);
            continue;
        }

        // One pollfd per distinct fd, events OR'ed across the three lists.
        let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(
            read_list.len() + write_list.len() + error_list.len(),
        );
        let mut slots: HashMap<RawFd, usize> = HashMap::with_capacity(pollfds.capacity());
        for (fd, _) in &read_list {
            add_events(&mut pollfds, &mut slots, *fd, libc::POLLIN);
        }
        for (fd, _) in &write_list {
            add_events(&mut pollfds, &mut slots, *fd, libc::POLLOUT);
        }
        for (fd, _) in &error_list {
            add_events(&mut pollfds, &mut slots, *fd, libc::POLLPRI);
        }

        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let e = errno();
            if e != libc::EINTR {
                wm_warn!("reactor: poll failed (errno {}), iteration dropped", e);
            }
            continue;
        }
        if rc == 0 {
            continue;
        }

        // Merge readiness into one batch per handler. The first flag for a
        // handler performs the busy claim; a handler that is busy again by
        // now (a worker won the race) is retried next iteration.
        let mut batch: HashMap<RawFd, (HandlerRef, Interest)> = HashMap::new();

        collect_ready(&read_list, &pollfds, &slots, POLL_READ_MASK, Interest::READ, registry, &mut batch);
        collect_ready(&write_list, &pollfds, &slots, POLL_WRITE_MASK, Interest::WRITE, registry, &mut batch);
        collect_ready(&error_list, &pollfds, &slots, POLL_ERROR_MASK, Interest::ERROR, registry, &mut batch);

        for (_, (handler, ready)) in batch {
            wm_trace!("reactor: dispatch fd={} {:?}", handler.fd(), ready);
            if let Err(task) = queue.produce(ReadyTask { handler, ready }) {
                // Queue closed under us: give the claim back and stop.
                task.handler.busy().release();
                return;
            }
        }
    }
}

fn add_events(
    pollfds: &mut Vec<libc::pollfd>,
    slots: &mut HashMap<RawFd, usize>,
    fd: RawFd,
    events: libc::c_short,
) {
    match slots.get(&fd) {
        Some(&idx) => pollfds[idx].events |= events,
        None => {
            slots.insert(fd, pollfds.len());
            pollfds.push(libc::pollfd {
                fd,
                events,
                revents: 0,
            });
        }
    }
}

/// Fold one check list's readiness into the batch map.
fn collect_ready(
    list: &[(RawFd, HandlerRef)],
    pollfds: &[libc::pollfd],
    slots: &HashMap<RawFd, usize>,
    ready_mask: libc::c_short,
    flag: Interest,
    registry: &Registry,
    batch: &mut HashMap<RawFd, (HandlerRef, Interest)>,
) {
    let set = match flag {
        f if f == Interest::READ => registry.read_set(),
        f if f == Interest::WRITE => registry.write_set(),
        _ => registry.error_set(),
    };

    for (fd, handler) in list {
        let Some(&idx) = slots.get(fd) else { continue };
        if pollfds[idx].revents & ready_mask == 0 {
            continue;
        }
        // A worker may have unregistered this channel after the snapshot.
        if !set.contains(*fd) {
            continue;
        }
        match batch.get_mut(fd) {
            Some(entry) => {
                // Already claimed in this pass — merge, with ERROR
                // overriding and never downgraded.
                entry.1 = entry.1.merge(flag);
            }
            None => {
                if handler.busy().try_claim() {
                    batch.insert(*fd, (handler.clone(), flag));
                }
            }
        }
    }
}
