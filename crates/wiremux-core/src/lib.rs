//! # wiremux-core
//!
//! Platform-agnostic building blocks for the wiremux TCP message engine:
//!
//! - [`status`] — the closed outcome taxonomy for socket calls
//! - [`error`] — engine and framing error types
//! - [`interest`] — the read/write/error readiness flag set
//! - [`frame`] — the length-prefixed wire frame codec
//! - [`config`] — engine tuning knobs
//! - [`wlog`] — the leveled stderr log sink
//!
//! Nothing in this crate touches a socket; the engine itself lives in the
//! `wiremux` crate.

pub mod config;
pub mod error;
pub mod frame;
pub mod interest;
pub mod status;
pub mod wlog;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, FrameError};
pub use frame::{FRAME_SIGNATURE, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
pub use interest::Interest;
pub use status::IoStatus;
pub use wlog::{set_log_level, LogLevel};
