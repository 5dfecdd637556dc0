//! Outcome taxonomy for socket calls
//!
//! Every send/receive/accept on a non-blocking socket resolves to exactly
//! one of these. Transient outcomes (`WouldBlock`) are retried on the next
//! readiness cycle; fatal ones route to the connection's error path and
//! never propagate past the handler.

use core::fmt;

/// EAGAIN, which EWOULDBLOCK aliases on every supported platform. This
/// crate stays libc-free, so the value is pinned per platform; the engine
/// crate cross-checks it against libc in its tests.
#[cfg(any(target_os = "linux", target_os = "android"))]
const ERRNO_AGAIN: i32 = 11;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const ERRNO_AGAIN: i32 = 35;

/// EINTR, identical across supported platforms.
const ERRNO_INTR: i32 = 4;

/// Classified result of one socket operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// The operation completed fully; payload is the byte count.
    Success(usize),

    /// Zero or partial progress on a non-blocking socket; payload is the
    /// byte count actually transferred. Retry on the next readiness event.
    WouldBlock(usize),

    /// The peer closed its end in an orderly way.
    RemoteClosed,

    /// An OS-level error, with the errno attached. Fatal for the connection.
    SocketError(i32),

    /// Anything the other variants cannot explain. Fatal.
    Exception,
}

impl IoStatus {
    /// Classify a failed call from its errno and the progress made so far.
    pub fn from_errno(errno: i32, progressed: usize) -> Self {
        match errno {
            ERRNO_AGAIN | ERRNO_INTR => IoStatus::WouldBlock(progressed),
            0 => IoStatus::Exception,
            e => IoStatus::SocketError(e),
        }
    }

    /// True for outcomes that end the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IoStatus::RemoteClosed | IoStatus::SocketError(_) | IoStatus::Exception
        )
    }

    /// True when the caller should retry on the next readiness event.
    pub fn is_transient(&self) -> bool {
        matches!(self, IoStatus::WouldBlock(_))
    }
}

impl fmt::Display for IoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoStatus::Success(n) => write!(f, "success ({} bytes)", n),
            IoStatus::WouldBlock(n) => write!(f, "would block ({} bytes done)", n),
            IoStatus::RemoteClosed => write!(f, "remote closed"),
            IoStatus::SocketError(e) => write!(f, "socket error (errno {})", e),
            IoStatus::Exception => write!(f, "unexpected socket exception"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_would_block() {
        assert_eq!(IoStatus::from_errno(ERRNO_AGAIN, 3), IoStatus::WouldBlock(3));
        assert_eq!(IoStatus::from_errno(ERRNO_INTR, 0), IoStatus::WouldBlock(0));
    }

    #[test]
    fn test_classify_hard_error() {
        assert_eq!(IoStatus::from_errno(104, 0), IoStatus::SocketError(104));
        assert!(IoStatus::SocketError(104).is_fatal());
    }

    #[test]
    fn test_fatality() {
        assert!(IoStatus::RemoteClosed.is_fatal());
        assert!(IoStatus::Exception.is_fatal());
        assert!(!IoStatus::Success(10).is_fatal());
        assert!(IoStatus::WouldBlock(0).is_transient());
    }
}
