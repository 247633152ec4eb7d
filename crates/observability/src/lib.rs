//! Process-wide logging setup shared by binaries and tests.

/// Subscriber configuration (filters, output format).
pub mod subscriber;

pub use subscriber::{LOG_FORMAT_ENV, LogFormat};

/// Initialize logging with an `info` fallback filter.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init("info");
}

/// Initialize logging, using `default_filter` when `RUST_LOG` is unset.
pub fn init_with_filter(default_filter: &str) {
    subscriber::init(default_filter);
}
