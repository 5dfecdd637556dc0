//! Registration sets — which handler wants which readiness
//!
//! Three independent fd → handler maps, one per interest kind. A channel
//! appears at most once per set, and is present exactly when its handler
//! currently wants that kind of notification. Locks are held only for the
//! map operation itself, never across an I/O call.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Mutex;

use wiremux_core::interest::Interest;

use crate::handler::HandlerRef;

/// One fd → handler map for a single interest kind.
pub(crate) struct RegistrationSet {
    handlers: Mutex<HashMap<RawFd, HandlerRef>>,
}

impl RegistrationSet {
    fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Add `handler` keyed by its fd. Re-registering is a no-op.
    fn register(&self, handler: &HandlerRef) {
        let fd = handler.fd();
        if fd < 0 {
            return;
        }
        self.handlers
            .lock()
            .unwrap()
            .entry(fd)
            .or_insert_with(|| handler.clone());
    }

    fn unregister(&self, fd: RawFd) {
        self.handlers.lock().unwrap().remove(&fd);
    }

    pub(crate) fn contains(&self, fd: RawFd) -> bool {
        self.handlers.lock().unwrap().contains_key(&fd)
    }

    /// Check list for one poll iteration: every registered channel whose
    /// handler is not currently busy running callbacks.
    pub(crate) fn snapshot_not_busy(&self) -> Vec<(RawFd, HandlerRef)> {
        self.handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, h)| !h.busy().is_busy())
            .map(|(fd, h)| (*fd, h.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

/// The reactor's registration bookkeeping: read, write and error sets.
pub struct Registry {
    read: RegistrationSet,
    write: RegistrationSet,
    error: RegistrationSet,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            read: RegistrationSet::new(),
            write: RegistrationSet::new(),
            error: RegistrationSet::new(),
        }
    }

    /// Register `handler` for every kind in `interest`.
    pub fn register(&self, handler: &HandlerRef, interest: Interest) {
        if interest.contains(Interest::READ) {
            self.read.register(handler);
        }
        if interest.contains(Interest::WRITE) {
            self.write.register(handler);
        }
        if interest.contains(Interest::ERROR) {
            self.error.register(handler);
        }
    }

    /// Remove `fd` from every kind in `interest`.
    pub fn unregister(&self, fd: RawFd, interest: Interest) {
        if interest.contains(Interest::READ) {
            self.read.unregister(fd);
        }
        if interest.contains(Interest::WRITE) {
            self.write.unregister(fd);
        }
        if interest.contains(Interest::ERROR) {
            self.error.unregister(fd);
        }
    }

    /// Remove `fd` everywhere (error handling / teardown).
    pub fn unregister_all(&self, fd: RawFd) {
        self.unregister(fd, Interest::ALL);
    }

    /// True if `fd` sits in any of the three sets.
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.read.contains(fd) || self.write.contains(fd) || self.error.contains(fd)
    }

    /// Registered channels across all sets (fds counted once per set).
    pub fn registered_count(&self) -> usize {
        self.read.len() + self.write.len() + self.error.len()
    }

    pub(crate) fn read_set(&self) -> &RegistrationSet {
        &self.read
    }

    pub(crate) fn write_set(&self) -> &RegistrationSet {
        &self.write
    }

    pub(crate) fn error_set(&self) -> &RegistrationSet {
        &self.error
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
