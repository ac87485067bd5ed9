//! Object layout - header plus instance variable storage
//!
//! Every native instance starts with an `ObjectHeader` carrying its class and
//! atomic retain count.

use super::ClassId;
use crate::interop::NativeValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Object header - prefixed before every native instance
#[repr(C, align(8))]
pub struct ObjectHeader {
    pub class: ClassId,
    pub refcount: AtomicU32,
}

impl ObjectHeader {
    /// Create header for new object (allocation hands out +1)
    #[inline]
    pub const fn new(class: ClassId) -> Self {
        Self {
            class,
            refcount: AtomicU32::new(1),
        }
    }

    /// Current retain count
    #[inline]
    pub fn retain_count(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }
}

/// Native instance
pub struct NativeObject {
    header: ObjectHeader,
    serial: u64,
    ivars: Mutex<HashMap<String, NativeValue>>,
}

impl NativeObject {
    pub(crate) fn new(class: ClassId, serial: u64) -> Self {
        Self {
            header: ObjectHeader::new(class),
            serial,
            ivars: Mutex::new(HashMap::new()),
        }
    }

    /// Allocation serial; unique for the lifetime of the runtime, unlike the address
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[inline]
    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    #[inline]
    pub fn class(&self) -> ClassId {
        self.header.class
    }

    pub fn ivar(&self, name: &str) -> Option<NativeValue> {
        self.ivars.lock().get(name).cloned()
    }

    /// Store an instance variable, returning the previous value
    ///
    /// The previous value is handed back so it drops after the lock is gone.
    pub fn set_ivar(&self, name: &str, value: NativeValue) -> Option<NativeValue> {
        self.ivars.lock().insert(name.to_string(), value)
    }

    /// Take all instance variables out (used on destruction)
    pub(crate) fn take_ivars(&self) -> HashMap<String, NativeValue> {
        std::mem::take(&mut *self.ivars.lock())
    }
}
