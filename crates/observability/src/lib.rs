//! Tracing and logging (shared setup).

/// Initialize process-wide tracing from `RUST_LOG` and `LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init();
}

/// Subscriber configuration (filters, output format).
pub mod subscriber;

pub use subscriber::LogFormat;
