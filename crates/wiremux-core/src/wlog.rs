//! Leveled stderr log sink for wiremux
//!
//! A printk-style sink: a global atomic level, optional per-line flush,
//! and macros that format straight to a locked stderr handle so lines
//! from different threads never interleave.
//!
//! # Environment Variables
//!
//! - `WMX_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5)
//! - `WMX_FLUSH=1` - flush stderr after every line (crash debugging)
//!
//! The engine only ever *calls* this sink; demos and embedding programs
//! may configure it via [`set_log_level`] / [`set_flush`].

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log severity, most to least severe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN ]",
            LogLevel::Info => "[INFO ]",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => return None,
        })
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH: AtomicBool = AtomicBool::new(false);
static INIT: AtomicBool = AtomicBool::new(false);

/// Read `WMX_LOG_LEVEL` / `WMX_FLUSH` once. Runs lazily on first log;
/// call explicitly for deterministic startup.
pub fn init() {
    if INIT.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Some(level) = std::env::var("WMX_LOG_LEVEL").ok().and_then(|v| LogLevel::parse(&v)) {
        LEVEL.store(level as u8, Ordering::Relaxed);
    }
    if let Ok(v) = std::env::var("WMX_FLUSH") {
        FLUSH.store(matches!(v.as_str(), "1" | "true" | "yes" | "on"), Ordering::Relaxed);
    }
}

/// Set the level programmatically (overrides the environment).
pub fn set_log_level(level: LogLevel) {
    INIT.store(true, Ordering::SeqCst);
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Enable or disable per-line flushing.
pub fn set_flush(enabled: bool) {
    FLUSH.store(enabled, Ordering::Relaxed);
}

/// Whether a line at `level` would currently be emitted.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    if !INIT.load(Ordering::Relaxed) {
        init();
    }
    level as u8 <= LEVEL.load(Ordering::Relaxed)
}

#[doc(hidden)]
pub fn _emit(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = write!(out, "{} ", level.tag());
    let _ = out.write_fmt(args);
    let _ = out.write_all(b"\n");
    if FLUSH.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

/// Error level log.
#[macro_export]
macro_rules! wm_error {
    ($($arg:tt)*) => {{
        $crate::wlog::_emit($crate::wlog::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log.
#[macro_export]
macro_rules! wm_warn {
    ($($arg:tt)*) => {{
        $crate::wlog::_emit($crate::wlog::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log.
#[macro_export]
macro_rules! wm_info {
    ($($arg:tt)*) => {{
        $crate::wlog::_emit($crate::wlog::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log.
#[macro_export]
macro_rules! wm_debug {
    ($($arg:tt)*) => {{
        $crate::wlog::_emit($crate::wlog::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Trace level log (most verbose).
#[macro_export]
macro_rules! wm_trace {
    ($($arg:tt)*) => {{
        $crate::wlog::_emit($crate::wlog::LogLevel::Trace, format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_parse() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("2"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn test_macros_compile() {
        set_log_level(LogLevel::Off);
        wm_error!("error {}", 1);
        wm_warn!("warn");
        wm_info!("info");
        wm_debug!("debug");
        wm_trace!("trace");
    }
}
