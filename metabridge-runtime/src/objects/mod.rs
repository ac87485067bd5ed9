//! Native objects - classes, instances, retain/release
//!
//! Design: Instances live in a concurrent table keyed by their address, and
//! that address is the native pointer handed to the bridge. A pointer that is
//! not in the table is not live, so releasing or messaging it is detected
//! instead of touching freed memory.

mod class;
mod header;
mod refcount;
mod runtime;

#[cfg(test)]
mod tests;

pub use class::{NativeClass, NativeClassBuilder};
pub use header::{NativeObject, ObjectHeader};
pub use refcount::ReleaseOutcome;
pub use runtime::{NativeRuntime, ROOT_CLASS};

use std::fmt;

/// Address of a native instance (may be null)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectPtr(usize);

impl ObjectPtr {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn addr(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPtr({:#x})", self.0)
    }
}

impl fmt::Display for ObjectPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Index of a registered native class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

impl ClassId {
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}
