//! Tracing and logging setup shared by unitforge binaries and hosts.

/// Initialize process-wide tracing with the format chosen by
/// `UOM_LOG_FORMAT` (`json` unless set to `pretty`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::{LogFormat, init_with};
