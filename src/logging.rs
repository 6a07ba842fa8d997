//! Developer diagnostics, compiled in for debug builds only.

use std::sync::OnceLock;
use std::thread;
use std::time::Instant;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Pin the log clock; later timestamps are relative to the first call.
pub fn init() {
    STARTED.get_or_init(Instant::now);
}

pub fn dev_log(message: &str) {
    if !cfg!(debug_assertions) {
        return;
    }

    let elapsed = STARTED.get_or_init(Instant::now).elapsed().as_millis();
    let current = thread::current();
    let thread_name = current.name().unwrap_or("unnamed");
    eprintln!("[{elapsed}ms][{thread_name}] {message}");
}

#[macro_export]
macro_rules! log_dev {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            $crate::logging::dev_log(&format!($($arg)*));
        }
    };
}
