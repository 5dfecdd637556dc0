//! Error types for the wiremux engine

use core::fmt;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from engine construction and lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// socket() failed
    Socket(i32),

    /// bind() failed
    Bind(i32),

    /// listen() failed
    Listen(i32),

    /// connect() failed (immediate failure, not in-progress)
    Connect(i32),

    /// Could not switch the socket to non-blocking mode
    SetNonBlocking(i32),

    /// Failed to spawn the reactor or a worker thread
    SpawnFailed,

    /// The connection already went through error handling
    ConnectionDown,

    /// start() called twice
    AlreadyRunning,

    /// Framing protocol violation
    Frame(FrameError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Socket(e) => write!(f, "socket creation failed (errno {})", e),
            EngineError::Bind(e) => write!(f, "bind failed (errno {})", e),
            EngineError::Listen(e) => write!(f, "listen failed (errno {})", e),
            EngineError::Connect(e) => write!(f, "connect failed (errno {})", e),
            EngineError::SetNonBlocking(e) => {
                write!(f, "could not set socket non-blocking (errno {})", e)
            }
            EngineError::SpawnFailed => write!(f, "failed to spawn engine thread"),
            EngineError::ConnectionDown => write!(f, "connection is down"),
            EngineError::AlreadyRunning => write!(f, "engine already running"),
            EngineError::Frame(e) => write!(f, "frame error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {}

/// Framing protocol violations — fatal for the connection, not the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Header signature byte did not match the frame marker
    BadSignature(u8),

    /// Header declared a frame longer than the fixed maximum
    Oversize(u32),

    /// Header declared a frame shorter than the header itself
    Undersize(u32),

    /// Outgoing payload would exceed the maximum frame size
    PayloadTooLarge(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BadSignature(b) => write!(f, "bad frame signature byte 0x{:02x}", b),
            FrameError::Oversize(n) => write!(f, "frame length {} exceeds maximum", n),
            FrameError::Undersize(n) => write!(f, "frame length {} below header size", n),
            FrameError::PayloadTooLarge(n) => write!(f, "payload of {} bytes does not fit a frame", n),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<FrameError> for EngineError {
    fn from(e: FrameError) -> Self {
        EngineError::Frame(e)
    }
}
