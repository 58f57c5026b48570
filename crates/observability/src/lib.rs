//! Process-wide logging setup shared by the sync binaries.

/// Tracing subscriber configuration.
pub mod tracing;

/// Initialize structured logging for the process.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info");
}
