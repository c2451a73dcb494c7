//! Leveled stderr logging for defio.
//!
//! No logging framework, no formatting layers: a level gate read once from
//! the environment, a locked write to stderr, done. The reactor logs kernel
//! failures through these macros and nothing else in the hot path.
//!
//! # Environment variables
//!
//! - `DEFIO_LOG=<level>` - off, error, warn, info, debug, trace (or 0-5)
//! - `DEFIO_LOG_FLUSH=1` - flush stderr after each line

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels, lowest to most verbose.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Off => "",
            Level::Error => "error",
            Level::Warn => "warn ",
            Level::Info => "info ",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Warn as u8);
static FLUSH: AtomicBool = AtomicBool::new(false);
static INIT: AtomicBool = AtomicBool::new(false);

fn parse_level(s: &str) -> Level {
    match s.trim().to_ascii_lowercase().as_str() {
        "off" | "0" => Level::Off,
        "error" | "1" => Level::Error,
        "warn" | "2" => Level::Warn,
        "info" | "3" => Level::Info,
        "debug" | "4" => Level::Debug,
        "trace" | "5" => Level::Trace,
        _ => Level::Warn,
    }
}

/// Read `DEFIO_LOG` / `DEFIO_LOG_FLUSH` once. Called lazily on first log;
/// call it directly for deterministic startup.
pub fn init() {
    if INIT.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Ok(v) = std::env::var("DEFIO_LOG") {
        LEVEL.store(parse_level(&v) as u8, Ordering::Relaxed);
    }
    if let Ok(v) = std::env::var("DEFIO_LOG_FLUSH") {
        let on = matches!(v.as_str(), "1" | "true" | "yes" | "on");
        FLUSH.store(on, Ordering::Relaxed);
    }
}

/// Override the level set from the environment.
pub fn set_level(level: Level) {
    init();
    LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn enabled(level: Level) -> bool {
    if !INIT.load(Ordering::Relaxed) {
        init();
    }
    level as u8 <= LEVEL.load(Ordering::Relaxed)
}

#[doc(hidden)]
pub fn _log(level: Level, args: std::fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = write!(out, "defio[{}] ", level.tag());
    let _ = out.write_fmt(args);
    let _ = out.write_all(b"\n");
    if FLUSH.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

#[macro_export]
macro_rules! derror {
    ($($arg:tt)*) => {
        $crate::dlog::_log($crate::dlog::Level::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dwarn {
    ($($arg:tt)*) => {
        $crate::dlog::_log($crate::dlog::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dinfo {
    ($($arg:tt)*) => {
        $crate::dlog::_log($crate::dlog::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! ddebug {
    ($($arg:tt)*) => {
        $crate::dlog::_log($crate::dlog::Level::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! dtrace {
    ($($arg:tt)*) => {
        $crate::dlog::_log($crate::dlog::Level::Trace, format_args!($($arg)*))
    };
}
