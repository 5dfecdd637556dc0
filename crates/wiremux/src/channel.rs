//! # Channel — the non-blocking TCP socket wrapper
//!
//! Owns one OS socket and classifies every call into the closed
//! [`IoStatus`] taxonomy instead of leaking raw errno values upward.
//! A failed send/receive records `(errno, message)` for retrieval by the
//! caller; the next successful call clears it.
//!
//! Close is idempotent: the fd is swapped out atomically, both directions
//! are shut down, and the handle is released exactly once. `Drop` closes.

use std::net::Ipv4Addr;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use wiremux_core::error::{EngineError, EngineResult};
use wiremux_core::status::IoStatus;

/// Pending-connection backlog for listening sockets.
const LISTEN_BACKLOG: i32 = 1024;

/// Sentinel for a closed channel.
const CLOSED_FD: RawFd = -1;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        /// Read the calling thread's errno.
        pub(crate) fn errno() -> i32 {
            unsafe { *libc::__errno_location() }
        }
    } else {
        /// Read the calling thread's errno.
        pub(crate) fn errno() -> i32 {
            unsafe { *libc::__error() }
        }
    }
}

/// Suppress SIGPIPE on send where the platform supports it.
cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
    } else {
        const SEND_FLAGS: libc::c_int = 0;
    }
}

/// One TCP socket in non-blocking mode.
pub struct Channel {
    fd: AtomicI32,
    last_error: Mutex<Option<(i32, String)>>,
}

impl Channel {
    /// Create a fresh non-blocking TCP socket.
    pub fn new() -> EngineResult<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(EngineError::Socket(errno()));
        }
        let ch = Self::from_raw(fd);
        ch.set_nonblocking()?;
        Ok(ch)
    }

    /// Wrap an fd the caller already owns (e.g. just accepted).
    pub fn from_raw(fd: RawFd) -> Self {
        Self {
            fd: AtomicI32::new(fd),
            last_error: Mutex::new(None),
        }
    }

    /// Bind to `port` on all interfaces and start listening.
    pub fn bind_listen(port: u16) -> EngineResult<Self> {
        let ch = Self::new()?;
        let fd = ch.fd();

        unsafe {
            let opt: libc::c_int = 1;
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &opt as *const _ as *const _,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
        }

        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
        addr.sin_port = port.to_be();

        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of_val(&addr) as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(EngineError::Bind(errno()));
        }

        let rc = unsafe { libc::listen(fd, LISTEN_BACKLOG) };
        if rc != 0 {
            return Err(EngineError::Listen(errno()));
        }

        Ok(ch)
    }

    /// Connect to `addr:port`. The connect itself runs in blocking mode;
    /// the socket is switched to non-blocking once established so all
    /// subsequent I/O goes through the readiness loop.
    pub fn connect(addr: Ipv4Addr, port: u16) -> EngineResult<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(EngineError::Socket(errno()));
        }
        let ch = Self::from_raw(fd);

        let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        sa.sin_family = libc::AF_INET as libc::sa_family_t;
        sa.sin_addr.s_addr = u32::from(addr).to_be();
        sa.sin_port = port.to_be();

        let rc = unsafe {
            libc::connect(
                fd,
                &sa as *const _ as *const libc::sockaddr,
                std::mem::size_of_val(&sa) as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(EngineError::Connect(errno()));
        }

        ch.set_nonblocking()?;
        ch.set_nodelay();
        Ok(ch)
    }

    /// Accept one pending connection.
    ///
    /// `Ok(None)` means no connection is pending — on a non-blocking
    /// listener that is the normal idle answer, not an error. Accepted
    /// sockets come back non-blocking with `TCP_NODELAY` set.
    pub fn accept(&self) -> Result<Option<Channel>, i32> {
        let fd = self.fd();
        if fd == CLOSED_FD {
            return Err(libc::EBADF);
        }

        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut addr_len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

        let client = unsafe {
            libc::accept4(
                fd,
                &mut addr as *mut _ as *mut libc::sockaddr,
                &mut addr_len,
                libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            )
        };
        if client < 0 {
            let e = errno();
            return match e {
                libc::EAGAIN | libc::EINTR | libc::ECONNABORTED => Ok(None),
                _ => Err(e),
            };
        }

        let ch = Channel::from_raw(client);
        ch.set_nodelay();
        Ok(Some(ch))
    }

    /// Send as much of `buf` as the socket accepts.
    ///
    /// `Success(len)` only when the whole buffer went out; `WouldBlock(n)`
    /// reports partial progress for the caller to resume from.
    pub fn send(&self, buf: &[u8]) -> IoStatus {
        let fd = self.fd();
        if fd == CLOSED_FD {
            return IoStatus::Exception;
        }

        let mut written = 0usize;
        while written < buf.len() {
            let rc = unsafe {
                libc::send(
                    fd,
                    buf[written..].as_ptr() as *const libc::c_void,
                    buf.len() - written,
                    SEND_FLAGS,
                )
            };
            if rc > 0 {
                written += rc as usize;
                continue;
            }
            if rc == 0 {
                // send() returning 0 on a SOCK_STREAM socket is out of contract
                self.record_error(0, "send returned 0");
                return IoStatus::Exception;
            }
            let e = errno();
            let status = IoStatus::from_errno(e, written);
            if status.is_fatal() {
                self.record_error(e, &os_error_string(e));
            }
            return status;
        }

        self.clear_error();
        IoStatus::Success(written)
    }

    /// Receive into `buf` with a single read.
    ///
    /// Zero bytes on a clean read means the peer closed in an orderly way.
    pub fn receive(&self, buf: &mut [u8]) -> IoStatus {
        let fd = self.fd();
        if fd == CLOSED_FD {
            return IoStatus::Exception;
        }
        if buf.is_empty() {
            return IoStatus::Success(0);
        }

        let rc = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if rc > 0 {
            self.clear_error();
            return IoStatus::Success(rc as usize);
        }
        if rc == 0 {
            return IoStatus::RemoteClosed;
        }
        let e = errno();
        let status = IoStatus::from_errno(e, 0);
        if status.is_fatal() {
            self.record_error(e, &os_error_string(e));
        }
        status
    }

    /// Shut down both directions and release the fd. Safe to call twice.
    pub fn close(&self) {
        let fd = self.fd.swap(CLOSED_FD, Ordering::AcqRel);
        if fd >= 0 {
            unsafe {
                libc::shutdown(fd, libc::SHUT_RDWR);
                libc::close(fd);
            }
        }
    }

    /// The raw fd, or -1 once closed.
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.fd() == CLOSED_FD
    }

    /// The port the OS actually bound (useful after binding port 0).
    pub fn local_port(&self) -> Option<u16> {
        let fd = self.fd();
        if fd == CLOSED_FD {
            return None;
        }
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockname(fd, &mut addr as *mut _ as *mut libc::sockaddr, &mut len)
        };
        if rc != 0 {
            return None;
        }
        Some(u16::from_be(addr.sin_port))
    }

    /// Errno and message from the most recent failed send/receive, if the
    /// call after it has not succeeded yet.
    pub fn last_error(&self) -> Option<(i32, String)> {
        self.last_error.lock().unwrap().clone()
    }

    fn record_error(&self, code: i32, msg: &str) {
        *self.last_error.lock().unwrap() = Some((code, msg.to_string()));
    }

    fn clear_error(&self) {
        let mut guard = self.last_error.lock().unwrap();
        if guard.is_some() {
            *guard = None;
        }
    }

    fn set_nonblocking(&self) -> EngineResult<()> {
        let fd = self.fd();
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(EngineError::SetNonBlocking(errno()));
        }
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(EngineError::SetNonBlocking(errno()));
        }
        Ok(())
    }

    fn set_nodelay(&self) {
        unsafe {
            let opt: libc::c_int = 1;
            libc::setsockopt(
                self.fd(),
                libc::IPPROTO_TCP,
                libc::TCP_NODELAY,
                &opt as *const _ as *const _,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

fn os_error_string(code: i32) -> String {
    std::io::Error::from_raw_os_error(code).to_string()
}
