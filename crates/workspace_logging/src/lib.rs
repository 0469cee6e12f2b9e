#![deny(missing_docs)]
//! Shared logging utilities for the workspace client.
//!
//! This crate provides the `ws_*` logging macros used across the codebase,
//! a thread-local job tag that prefixes messages emitted while a job's
//! events are being applied, and a minimal test initializer for the global
//! logger.

use std::cell::RefCell;

#[doc(hidden)]
pub use log;

thread_local! {
    /// Job currently being processed on this thread, if any.
    static JOB_TAG: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Tags subsequent log lines on this thread with `job_id`.
///
/// Pass `None` to clear the tag once the job's message has been handled.
pub fn set_job_tag(job_id: Option<&str>) {
    JOB_TAG.with(|tag| *tag.borrow_mut() = job_id.map(ToOwned::to_owned));
}

/// Returns the job tag for the current thread, or an empty string.
pub fn job_tag() -> String {
    JOB_TAG.with(|tag| {
        tag.borrow()
            .as_deref()
            .map(|job| format!("[job {job}] "))
            .unwrap_or_default()
    })
}

/// Runs `f` with the job tag set, restoring the previous tag afterwards.
pub fn with_job_tag<R>(job_id: &str, f: impl FnOnce() -> R) -> R {
    let previous = JOB_TAG.with(|tag| tag.replace(Some(job_id.to_owned())));
    let out = f();
    JOB_TAG.with(|tag| *tag.borrow_mut() = previous);
    out
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! ws_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!("{}{}", $crate::job_tag(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! ws_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!("{}{}", $crate::job_tag(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! ws_info {
    ($($arg:tt)*) => {{
        $crate::log::info!("{}{}", $crate::job_tag(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! ws_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!("{}{}", $crate::job_tag(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! ws_error {
    ($($arg:tt)*) => {{
        $crate::log::error!("{}{}", $crate::job_tag(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Another test may already have installed the logger.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
