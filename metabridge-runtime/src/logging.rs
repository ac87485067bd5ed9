//! Logging utilities for the native runtime
//!
//! Provides lightweight logging for object lifecycle and message sends.
//! Uses `tracing` for structured logging with minimal overhead.

// Re-export tracing macros for use throughout the runtime
pub use tracing::{debug, error, info, trace, warn, Level};

/// Initialize runtime logging with sensible defaults
///
/// Hosts that install their own subscriber first keep it; this only fills in
/// a compact console subscriber when nothing is installed yet.
pub fn init_runtime_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            EnvFilter::new("metabridge_runtime=debug")
        }
        #[cfg(not(debug_assertions))]
        {
            EnvFilter::new("metabridge_runtime=info")
        }
    });

    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok(); // Ignore error if already initialized
}

/// Log an instance allocation
#[inline]
pub fn log_object_allocated(address: usize, class: &str) {
    trace!(
        target: "objects",
        event = "object_alloc",
        address,
        class,
        "allocated native instance"
    );
}

/// Log an instance whose retain count reached zero
#[inline]
pub fn log_object_destroyed(address: usize, class: &str) {
    debug!(
        target: "objects",
        event = "object_destroy",
        address,
        class,
        "destroyed native instance"
    );
}

/// Log a release aimed at an address that is no longer live
#[inline]
pub fn log_release_ignored(address: usize) {
    trace!(
        target: "objects",
        event = "release_ignored",
        address,
        "release of non-live instance ignored"
    );
}

/// Log a message send or function call
#[inline]
pub fn log_native_call(selector: &str, arg_count: usize) {
    trace!(
        target: "interop",
        event = "native_call",
        selector,
        args = arg_count,
        "native call"
    );
}

/// Log a class registration
#[inline]
pub fn log_class_registered(name: &str, id: u32) {
    debug!(
        target: "objects",
        event = "class_registered",
        class = name,
        id,
        "native class registered"
    );
}
