//! Handler trait and the busy-flag protocol
//!
//! Every registered socket is owned by exactly one handler. The reactor
//! claims a handler's [`BusyFlag`] before dispatching its readiness and a
//! worker releases it after the callbacks return, so for any handler at
//! most one callback invocation is ever in flight. That claim is the only
//! mutual-exclusion mechanism per-connection state needs.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-handler mutual-exclusion marker.
///
/// **Contract:**
/// - `try_claim()` is the only way in: non-blocking, single winner.
/// - Whoever claimed must `release()` once the callbacks finish.
/// - A busy handler's channel is skipped when the reactor builds its
///   check lists; fresh readiness is deferred, never lost.
pub struct BusyFlag(AtomicBool);

impl BusyFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Attempt the atomic claim. True exactly once until released.
    #[inline]
    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release after the callback batch. Idempotent.
    #[inline]
    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for BusyFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability set of anything registrable with the reactor.
///
/// Two implementors exist: `MessageConn` (a framed connection) and
/// `AcceptHandler` (a listening socket). Callbacks take `&self`; the busy
/// discipline guarantees they never run concurrently for one handler.
pub trait EventHandler: Send + Sync {
    /// The fd of the channel this handler owns.
    fn fd(&self) -> RawFd;

    /// The handler's busy flag.
    fn busy(&self) -> &BusyFlag;

    /// The channel is read-ready.
    fn on_read_ready(&self);

    /// The channel is write-ready.
    fn on_write_ready(&self);

    /// The channel is error-ready; by convention the handler unregisters
    /// itself from all interest sets here so it is not re-armed.
    fn on_error(&self);
}

/// Shared handler reference as stored in the registration sets.
pub type HandlerRef = Arc<dyn EventHandler>;
