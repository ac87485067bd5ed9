//! Reference counting - retain/release on object headers
//!
//! Hot path operations with minimal overhead.
//! Thread-safe atomic operations.

use super::header::ObjectHeader;
use std::sync::atomic::{fence, Ordering};

/// Result of a release request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Count dropped but the instance is still alive
    Released { remaining: u32 },
    /// Count reached zero and the instance was destroyed
    Destroyed,
    /// Address is not a live instance; nothing happened
    NotLive,
}

/// Increment retain count, returning the new count
#[inline]
pub(crate) fn retain(header: &ObjectHeader) -> u32 {
    let old = header.refcount.fetch_add(1, Ordering::Relaxed);
    debug_assert!(old < u32::MAX, "refcount overflow");
    old + 1
}

/// Decrement retain count, returning the remaining count
///
/// `None` means the count was already zero; `Some(0)` means destroy.
#[inline]
pub(crate) fn release(header: &ObjectHeader) -> Option<u32> {
    let old = header
        .refcount
        .fetch_update(Ordering::Release, Ordering::Relaxed, |count| {
            count.checked_sub(1)
        })
        .ok()?;

    if old == 1 {
        // Synchronize with all previous releases before destruction
        fence(Ordering::Acquire);
    }
    Some(old - 1)
}
