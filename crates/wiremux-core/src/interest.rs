//! Readiness interest flags
//!
//! A tiny bitset over {read, write, error}. The one non-obvious rule lives
//! in [`Interest::merge`]: error interest is exclusive. Once a handler's
//! batched event carries ERROR, read/write readiness discovered in the same
//! poll pass is dropped, and a later ERROR discovery replaces whatever was
//! merged before it. The handler must learn about the error before anything
//! else runs.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Bitset of readiness kinds a handler is interested in / ready for.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READ: Interest = Interest(1 << 0);
    pub const WRITE: Interest = Interest(1 << 1);
    pub const ERROR: Interest = Interest(1 << 2);
    pub const ALL: Interest = Interest(0b111);

    #[inline]
    pub fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn remove(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }

    /// Merge freshly discovered readiness into an already-batched event.
    ///
    /// ERROR overrides and is never downgraded: an entry that carries ERROR
    /// ignores incoming READ/WRITE, and incoming ERROR collapses the entry
    /// to ERROR alone.
    #[inline]
    pub fn merge(self, incoming: Interest) -> Interest {
        if self.contains(Interest::ERROR) {
            self
        } else if incoming.contains(Interest::ERROR) {
            Interest::ERROR
        } else {
            self | incoming
        }
    }
}

impl BitOr for Interest {
    type Output = Interest;
    #[inline]
    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    #[inline]
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Interest::READ) {
            parts.push("READ");
        }
        if self.contains(Interest::WRITE) {
            parts.push("WRITE");
        }
        if self.contains(Interest::ERROR) {
            parts.push("ERROR");
        }
        if parts.is_empty() {
            write!(f, "Interest(NONE)")
        } else {
            write!(f, "Interest({})", parts.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_union() {
        let rw = Interest::READ | Interest::WRITE;
        assert!(rw.contains(Interest::READ));
        assert!(rw.contains(Interest::WRITE));
        assert!(!rw.contains(Interest::ERROR));
        assert!(!Interest::NONE.contains(Interest::READ));
    }

    #[test]
    fn test_remove() {
        let rw = Interest::READ | Interest::WRITE;
        assert_eq!(rw.remove(Interest::WRITE), Interest::READ);
        assert!(rw.remove(Interest::ALL).is_empty());
    }

    #[test]
    fn test_merge_plain_union() {
        let merged = Interest::READ.merge(Interest::WRITE);
        assert_eq!(merged, Interest::READ | Interest::WRITE);
    }

    #[test]
    fn test_merge_error_overrides() {
        // Incoming ERROR collapses merged read/write.
        let merged = (Interest::READ | Interest::WRITE).merge(Interest::ERROR);
        assert_eq!(merged, Interest::ERROR);
    }

    #[test]
    fn test_merge_error_never_downgraded() {
        let merged = Interest::ERROR.merge(Interest::READ | Interest::WRITE);
        assert_eq!(merged, Interest::ERROR);
    }
}
