//! # AcceptHandler — readiness handler for the listening socket
//!
//! Registered for read + error interest only. On read readiness it accepts
//! pending connections and hands each raw channel to a caller-supplied
//! factory, which is expected to build a `MessageConn` (or any other
//! handler) and register it. Write readiness is meaningless for a listener
//! and ignored.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wiremux_core::interest::Interest;
use wiremux_core::{wm_debug, wm_warn};

use crate::channel::Channel;
use crate::handler::{BusyFlag, EventHandler, HandlerRef};
use crate::registry::Registry;

/// Builds a connection handler from a freshly accepted channel.
pub type ConnFactory = Box<dyn Fn(Channel) + Send + Sync>;

/// Handler owning the listening channel.
pub struct AcceptHandler {
    channel: Channel,
    registry: Arc<Registry>,
    busy: BusyFlag,
    factory: ConnFactory,
    retired: AtomicBool,
}

impl AcceptHandler {
    pub fn new(channel: Channel, registry: Arc<Registry>, factory: ConnFactory) -> Arc<Self> {
        Arc::new(Self {
            channel,
            registry,
            busy: BusyFlag::new(),
            factory,
            retired: AtomicBool::new(false),
        })
    }

    /// Arm the listener for read + error readiness.
    pub fn register(self: &Arc<Self>) {
        let href: HandlerRef = self.clone();
        self.registry.register(&href, Interest::READ | Interest::ERROR);
    }

    /// The port the listener is bound to.
    pub fn local_port(&self) -> Option<u16> {
        self.channel.local_port()
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Stop listening: unregister everywhere and close the socket.
    fn retire(&self) {
        if self.retired.swap(true, Ordering::AcqRel) {
            return;
        }
        let fd = self.channel.fd();
        if fd >= 0 {
            self.registry.unregister_all(fd);
        }
        self.channel.close();
        wm_debug!("acceptor fd={}: retired", fd);
    }
}

impl EventHandler for AcceptHandler {
    fn fd(&self) -> RawFd {
        self.channel.fd()
    }

    fn busy(&self) -> &BusyFlag {
        &self.busy
    }

    fn on_read_ready(&self) {
        if self.retired.load(Ordering::Acquire) {
            return;
        }
        // Drain the whole pending backlog; a burst of simultaneous
        // connects should not cost one poll cycle each.
        loop {
            match self.channel.accept() {
                Ok(Some(accepted)) => {
                    wm_debug!("acceptor: new connection fd={}", accepted.fd());
                    (self.factory)(accepted);
                }
                Ok(None) => break,
                Err(e) => {
                    wm_warn!("acceptor fd={}: accept failed (errno {})", self.channel.fd(), e);
                    self.retire();
                    break;
                }
            }
        }
    }

    fn on_write_ready(&self) {
        // Listeners are never write-registered.
    }

    fn on_error(&self) {
        self.retire();
    }
}

impl Drop for AcceptHandler {
    fn drop(&mut self) {
        self.retire();
    }
}
