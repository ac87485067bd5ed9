//! Instance registry - one wrapper per native instance
//!
//! Design: wrappers are `Arc`-backed handles owned by scripting code. The
//! registry only keeps `Weak` references keyed by native address, so it never
//! extends a wrapper's lifetime. Dropping the last handle is finalization: it
//! runs the same path as an explicit `release`, which gives the native
//! instance back if the wrapper owned it.
//!
//! Native addresses are reused after destruction, so each wrapper also
//! records the allocation serial of the instance it was made for. A registry
//! entry whose serial no longer matches the instance at that address is stale
//! and is never handed out or released again.

use crate::synth::SynthesizedClass;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metabridge_runtime::{NativeRuntime, ObjectPtr, ReleaseOutcome};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Scripting-side handle for one native instance
#[derive(Clone)]
pub struct Wrapper {
    inner: Arc<WrapperInner>,
}

struct WrapperInner {
    ptr: ObjectPtr,
    serial: u64,
    owning: AtomicBool,
    released: AtomicBool,
    class: Arc<SynthesizedClass>,
    registry: Weak<Shared>,
}

impl Wrapper {
    #[inline]
    pub fn ptr(&self) -> ObjectPtr {
        self.inner.ptr
    }

    /// Allocation serial of the wrapped instance
    #[inline]
    pub fn serial(&self) -> u64 {
        self.inner.serial
    }

    /// Synthesized class of the wrapped instance
    #[inline]
    pub fn class(&self) -> &Arc<SynthesizedClass> {
        &self.inner.class
    }

    /// Whether finalizing this wrapper releases the native instance
    #[inline]
    pub fn is_owning(&self) -> bool {
        self.inner.owning.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of scripting handles sharing this wrapper
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    fn downgrade(&self) -> Weak<WrapperInner> {
        Arc::downgrade(&self.inner)
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("class", &self.inner.class.name())
            .field("ptr", &self.inner.ptr)
            .field("serial", &self.inner.serial)
            .field("owning", &self.is_owning())
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for WrapperInner {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.finalize(self, true);
        }
    }
}

/// Registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Wrappers currently tracked
    pub live: usize,
    pub created: u64,
    pub released: u64,
    /// Releases of an already released wrapper, swallowed
    pub double_releases: u64,
}

struct Shared {
    runtime: Arc<NativeRuntime>,
    entries: DashMap<ObjectPtr, Weak<WrapperInner>>,
    created: AtomicU64,
    released: AtomicU64,
    double_releases: AtomicU64,
}

impl Shared {
    /// Whether the instance at the wrapper's address is still the one it wraps
    fn is_current(&self, inner: &WrapperInner) -> bool {
        self.runtime.serial_of(inner.ptr) == Some(inner.serial)
    }

    /// Release path shared by explicit release and finalization
    fn finalize(&self, inner: &WrapperInner, from_drop: bool) -> bool {
        let me = inner as *const WrapperInner;
        self.entries
            .remove_if(&inner.ptr, |_, weak| Weak::as_ptr(weak) == me);

        if inner.released.swap(true, Ordering::AcqRel) {
            if !from_drop {
                self.double_releases.fetch_add(1, Ordering::Relaxed);
                trace!(event = "double_release", address = inner.ptr.addr(), "release ignored");
            }
            return false;
        }

        self.released.fetch_add(1, Ordering::Relaxed);
        if inner.owning.load(Ordering::Acquire) {
            let outcome = self.runtime.release_instance(inner.ptr, inner.serial);
            if outcome == ReleaseOutcome::NotLive {
                debug!(
                    event = "release_dead_instance",
                    address = inner.ptr.addr(),
                    class = inner.class.name(),
                    "native instance was already destroyed"
                );
            }
        }
        debug!(
            event = if from_drop { "wrapper_finalized" } else { "wrapper_released" },
            address = inner.ptr.addr(),
            class = inner.class.name(),
            "wrapper finalized"
        );
        true
    }
}

/// Table from native address to its wrapper
#[derive(Clone)]
pub struct InstanceRegistry {
    shared: Arc<Shared>,
}

impl InstanceRegistry {
    pub fn new(runtime: Arc<NativeRuntime>) -> Self {
        Self::with_capacity(runtime, 256)
    }

    pub fn with_capacity(runtime: Arc<NativeRuntime>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                runtime,
                entries: DashMap::with_capacity(capacity),
                created: AtomicU64::new(0),
                released: AtomicU64::new(0),
                double_releases: AtomicU64::new(0),
            }),
        }
    }

    /// The live wrapper for the instance currently at `ptr`, if any
    pub fn lookup(&self, ptr: ObjectPtr) -> Option<Wrapper> {
        let inner = self.shared.entries.get(&ptr).and_then(|entry| entry.value().upgrade())?;
        // A stale handle drops here, after the table guard
        self.shared.is_current(&inner).then(|| Wrapper { inner })
    }

    /// Whether the wrapper still refers to a live instance
    ///
    /// `false` once the instance was destroyed, even if its address now holds
    /// a newer instance.
    pub fn is_current(&self, wrapper: &Wrapper) -> bool {
        self.shared.is_current(&wrapper.inner)
    }

    /// Whether a live wrapper represents `ptr`
    pub fn contains(&self, ptr: ObjectPtr) -> bool {
        self.lookup(ptr).is_some()
    }

    /// Existing wrapper for `ptr`, or a new one of `class`
    ///
    /// `owning` says the caller holds a +1 reference that the wrapper should
    /// take over. An existing wrapper that already owns the instance has that
    /// surplus reference released; a non-owning one is promoted to owning.
    ///
    /// An entry left behind by an instance that died outside the bridge is
    /// replaced, never reused for the new instance at the same address.
    pub fn wrapper_for(&self, ptr: ObjectPtr, class: &Arc<SynthesizedClass>, owning: bool) -> Wrapper {
        // Serial 0 is never allocated, so a dead pointer gets a wrapper that is never current
        let serial = self.shared.runtime.serial_of(ptr).unwrap_or(0);
        let mut stale = None;
        let (wrapper, surplus) = match self.shared.entries.entry(ptr) {
            Entry::Occupied(mut slot) => match slot.get().upgrade() {
                Some(inner) if inner.serial == serial => {
                    let surplus = owning && inner.owning.swap(true, Ordering::AcqRel);
                    (Wrapper { inner }, surplus)
                }
                previous => {
                    // Either mid-finalization or made for an earlier instance at this address
                    if let Some(previous) = &previous {
                        debug!(
                            event = "stale_wrapper_replaced",
                            address = ptr.addr(),
                            stale_class = previous.class.name(),
                            class = class.name(),
                            "address reused by a new instance"
                        );
                    }
                    stale = previous;
                    let wrapper = self.create(ptr, serial, class, owning);
                    slot.insert(wrapper.downgrade());
                    (wrapper, false)
                }
            },
            Entry::Vacant(slot) => {
                let wrapper = self.create(ptr, serial, class, owning);
                slot.insert(wrapper.downgrade());
                (wrapper, false)
            }
        };
        drop(stale);

        // Outside the table guard: releasing may run native teardown
        if surplus {
            self.shared.runtime.release_instance(ptr, wrapper.serial());
            trace!(event = "surplus_release", address = ptr.addr(), "balanced transferred reference");
        }
        wrapper
    }

    /// Register a wrapper under `ptr`
    ///
    /// Fails if `ptr` is not the wrapper's address, if the wrapped instance is
    /// gone, or if a different live wrapper already represents the instance.
    pub fn track(&self, ptr: ObjectPtr, wrapper: &Wrapper) -> bool {
        if wrapper.ptr() != ptr || wrapper.is_released() || !self.is_current(wrapper) {
            return false;
        }
        // The upgraded handle must drop after the table guard
        let (tracked, _existing) = match self.shared.entries.entry(ptr) {
            Entry::Occupied(mut slot) => match slot.get().upgrade() {
                Some(existing) if existing.serial == wrapper.inner.serial => {
                    (Arc::ptr_eq(&existing, &wrapper.inner), Some(existing))
                }
                stale => {
                    slot.insert(wrapper.downgrade());
                    (true, stale)
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(wrapper.downgrade());
                (true, None)
            }
        };
        tracked
    }

    /// Release a wrapper's hold on its native instance
    ///
    /// Releasing twice, or releasing after the instance died elsewhere, is a
    /// no-op. Returns whether this call did the release.
    pub fn release(&self, wrapper: &Wrapper) -> bool {
        self.shared.finalize(&wrapper.inner, false)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            live: self.shared.entries.len(),
            created: self.shared.created.load(Ordering::Relaxed),
            released: self.shared.released.load(Ordering::Relaxed),
            double_releases: self.shared.double_releases.load(Ordering::Relaxed),
        }
    }

    fn create(&self, ptr: ObjectPtr, serial: u64, class: &Arc<SynthesizedClass>, owning: bool) -> Wrapper {
        self.shared.created.fetch_add(1, Ordering::Relaxed);
        debug!(
            event = "wrapper_created",
            address = ptr.addr(),
            class = class.name(),
            owning,
            "wrapper created"
        );
        Wrapper {
            inner: Arc::new(WrapperInner {
                ptr,
                serial,
                owning: AtomicBool::new(owning),
                released: AtomicBool::new(false),
                class: Arc::clone(class),
                registry: Arc::downgrade(&self.shared),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
