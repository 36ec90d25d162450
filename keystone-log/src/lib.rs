//! Keystone logging.
//!
//! The JWT and auth crates report token lifecycle events (issued,
//! rejected, blacklisted) and blacklist store trouble through the
//! [`debug!`], [`info!`] and [`warn!`] macros defined here. Output is
//! configured once from the environment:
//!
//! - `KEYSTONE_LOG=debug|info|warn|off` sets the minimum level (default `info`)
//! - `KEYSTONE_LOG_OUTPUT=json|text|log` picks the sink (default `json`)
//!
//! The `log` sink forwards records to the `log` facade so a host
//! application's logger decides where they go.
//!
//! ```rust
//! use keystone_log::{debug, warn};
//!
//! debug!("decoded token {}", "4b1c");
//! warn!(target: "keystone_jwt::blacklist", "store slow to respond");
//! ```

use once_cell::sync::Lazy;
use std::env;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Severity of a record. Keystone never logs below `Debug` or above `Warn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Debug = 1,
    Info = 2,
    Warn = 3,
    /// Nothing is emitted
    Off = 4,
}

impl Level {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            _ => Level::Off,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Off => "OFF",
        })
    }
}

/// Where records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// One JSON object per line on stderr
    Json,
    /// `<time> <LEVEL> <component>: <message>` on stderr
    Text,
    /// The `log` facade
    Log,
}

impl Output {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Output::Json),
            "text" | "plain" => Some(Output::Text),
            "log" => Some(Output::Log),
            _ => None,
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static OUTPUT: Lazy<Output> = Lazy::new(|| {
    let level = env::var("KEYSTONE_LOG")
        .ok()
        .and_then(|v| Level::from_env_value(&v))
        .unwrap_or(Level::Info);
    LEVEL.store(level as u8, Ordering::SeqCst);

    env::var("KEYSTONE_LOG_OUTPUT")
        .ok()
        .and_then(|v| Output::from_env_value(&v))
        .unwrap_or(Output::Json)
});

/// Read the environment now instead of on the first record.
pub fn init() {
    Lazy::force(&OUTPUT);
}

pub fn output() -> Output {
    *OUTPUT
}

pub fn level() -> Level {
    init();
    Level::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Change the minimum level at runtime.
pub fn set_level(level: Level) {
    init();
    LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Whether a record at `level` would be emitted.
#[inline]
pub fn enabled(level: Level) -> bool {
    init();
    level != Level::Off && level as u8 >= LEVEL.load(Ordering::Relaxed)
}

/// Last path segment of a module target: `keystone_jwt::blacklist` is
/// reported as `blacklist`.
fn component(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

#[doc(hidden)]
pub fn emit(level: Level, target: &str, args: fmt::Arguments<'_>) {
    let output = output();
    if !enabled(level) {
        return;
    }

    match output {
        Output::Json => emit_json(level, target, &args.to_string()),
        Output::Text => eprintln!(
            "{} {:5} {}: {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            level,
            component(target),
            args
        ),
        Output::Log => {
            let lvl = match level {
                Level::Debug => log::Level::Debug,
                Level::Info => log::Level::Info,
                Level::Warn | Level::Off => log::Level::Warn,
            };
            log::log!(target: target, lvl, "{}", args);
        }
    }
}

#[cfg(feature = "json")]
fn emit_json(level: Level, target: &str, message: &str) {
    #[derive(serde::Serialize)]
    struct Line<'a> {
        ts: String,
        level: String,
        component: &'a str,
        target: &'a str,
        msg: &'a str,
    }

    let line = Line {
        ts: chrono::Utc::now().to_rfc3339(),
        level: level.to_string(),
        component: component(target),
        target,
        msg: message,
    };
    if let Ok(json) = serde_json::to_string(&line) {
        eprintln!("{}", json);
    }
}

#[cfg(not(feature = "json"))]
fn emit_json(level: Level, target: &str, message: &str) {
    eprintln!(
        "{} {:5} {}: {}",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        level,
        component(target),
        message
    );
}

#[doc(hidden)]
#[macro_export]
macro_rules! __emit {
    ($level:expr, target: $target:expr, $($arg:tt)+) => {
        if $crate::enabled($level) {
            $crate::emit($level, $target, format_args!($($arg)+));
        }
    };
    ($level:expr, $($arg:tt)+) => {
        $crate::__emit!($level, target: module_path!(), $($arg)+)
    };
}

/// Token-level diagnostics: issued, decoded, rejected.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => { $crate::__emit!($crate::Level::Debug, $($arg)+) };
}

/// State changes such as a token being blacklisted.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => { $crate::__emit!($crate::Level::Info, $($arg)+) };
}

/// Failures that fail closed, mostly blacklist store outages.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => { $crate::__emit!($crate::Level::Warn, $($arg)+) };
}
