//! Native runtime - class registry, live-object table, message send
//!
//! Design: classes are append-only and addressed by `ClassId`; instances are
//! shared `Arc`s stored in a concurrent table keyed by address. Lookups clone
//! the `Arc` out and drop the table guard immediately, so implementations may
//! call back into the runtime freely.
//!
//! Addresses are reused once an instance is destroyed. Each allocation also
//! gets a serial that is never reused; `release_instance` and `serial_of` let
//! holders of an old pointer tell the instance they saw from a newer one.

use super::class::{NativeClass, NativeClassBuilder};
use super::header::NativeObject;
use super::refcount::{self, ReleaseOutcome};
use super::{ClassId, ObjectPtr};
use crate::interop::{selector_arity, CallError, Imp, MessageContext, NativeCall, NativeValue, Receiver};
use crate::logging::{log_class_registered, log_object_allocated, log_object_destroyed, log_release_ignored};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Name of the root class every class without an explicit superclass inherits from
pub const ROOT_CLASS: &str = "NSObject";

/// The native object model
pub struct NativeRuntime {
    classes: RwLock<Vec<Arc<NativeClass>>>,
    class_names: DashMap<String, ClassId>,
    objects: DashMap<ObjectPtr, Arc<NativeObject>>,
    functions: DashMap<String, (Imp, usize)>,
    next_serial: AtomicU64,
}

impl NativeRuntime {
    /// Create a runtime holding only the root class
    pub fn new() -> Self {
        let runtime = Self {
            classes: RwLock::new(Vec::new()),
            class_names: DashMap::with_capacity(64),
            objects: DashMap::with_capacity(256),
            functions: DashMap::new(),
            next_serial: AtomicU64::new(1),
        };

        let root = NativeClassBuilder::new(ROOT_CLASS).method("init", root_init);
        // The table is empty, so registering the root cannot collide
        let _ = runtime.register_class(root);
        runtime
    }

    /// Register a class; its superclass must already be registered
    pub fn register_class(&self, builder: NativeClassBuilder) -> Result<ClassId, CallError> {
        let superclass = match &builder.superclass {
            Some(name) => Some(
                self.class_named(name)
                    .ok_or_else(|| CallError::UnknownClass(name.clone()))?,
            ),
            None if builder.name != ROOT_CLASS => self.class_named(ROOT_CLASS),
            None => None,
        };

        match self.class_names.entry(builder.name.clone()) {
            Entry::Occupied(_) => Err(CallError::DuplicateClass(builder.name)),
            Entry::Vacant(slot) => {
                let mut classes = self.classes.write();
                let id = ClassId::new(classes.len() as u32);
                classes.push(Arc::new(NativeClass {
                    id,
                    name: builder.name.clone(),
                    superclass,
                    instance_methods: builder.instance_methods,
                    class_methods: builder.class_methods,
                }));
                slot.insert(id);
                log_class_registered(&builder.name, id.index());
                Ok(id)
            }
        }
    }

    /// Register a plain function taking `arity` arguments
    pub fn register_function(&self, name: impl Into<String>, arity: usize, imp: Imp) {
        self.functions.insert(name.into(), (imp, arity));
    }

    pub fn class(&self, id: ClassId) -> Option<Arc<NativeClass>> {
        self.classes.read().get(id.index() as usize).cloned()
    }

    pub fn class_named(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).map(|entry| *entry.value())
    }

    pub fn class_name(&self, id: ClassId) -> Option<String> {
        self.class(id).map(|class| class.name.clone())
    }

    pub fn superclass_of(&self, id: ClassId) -> Option<ClassId> {
        self.class(id).and_then(|class| class.superclass)
    }

    /// Check whether `class` is `ancestor` or inherits from it
    pub fn is_subclass(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.superclass_of(id);
        }
        false
    }

    /// Find an implementation along the superclass chain
    pub fn lookup_method(&self, class: ClassId, selector: &str, is_static: bool) -> Option<Imp> {
        let classes = self.classes.read();
        let mut current = Some(class);
        while let Some(id) = current {
            let cls = classes.get(id.index() as usize)?;
            if let Some(imp) = cls.own_method(selector, is_static) {
                return Some(imp);
            }
            current = cls.superclass;
        }
        None
    }

    /// Check whether a receiver answers a selector
    pub fn responds_to(&self, receiver: Receiver, selector: &str) -> bool {
        match receiver {
            Receiver::Instance(ptr) => self
                .class_of(ptr)
                .and_then(|class| self.lookup_method(class, selector, false))
                .is_some(),
            Receiver::Class(id) => self.lookup_method(id, selector, true).is_some(),
            Receiver::None => false,
        }
    }

    /// Allocate an instance with a retain count of one
    pub fn alloc(&self, class: ClassId) -> Result<ObjectPtr, CallError> {
        let name = self
            .class_name(class)
            .ok_or_else(|| CallError::UnknownClass(format!("#{}", class.index())))?;

        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let object = Arc::new(NativeObject::new(class, serial));
        let ptr = ObjectPtr::from_addr(Arc::as_ptr(&object) as usize);
        self.objects.insert(ptr, object);

        log_object_allocated(ptr.addr(), &name);
        Ok(ptr)
    }

    fn object(&self, ptr: ObjectPtr) -> Option<Arc<NativeObject>> {
        self.objects.get(&ptr).map(|entry| Arc::clone(entry.value()))
    }

    #[inline]
    pub fn is_live(&self, ptr: ObjectPtr) -> bool {
        self.objects.contains_key(&ptr)
    }

    /// Number of live instances
    pub fn live_count(&self) -> usize {
        self.objects.len()
    }

    pub fn retain_count(&self, ptr: ObjectPtr) -> Option<u32> {
        self.object(ptr).map(|object| object.header().retain_count())
    }

    /// Allocation serial of the instance currently at `ptr`
    pub fn serial_of(&self, ptr: ObjectPtr) -> Option<u64> {
        self.object(ptr).map(|object| object.serial())
    }

    pub fn class_of(&self, ptr: ObjectPtr) -> Option<ClassId> {
        self.object(ptr).map(|object| object.class())
    }

    /// Retain a live instance; returns `false` if the pointer is not live
    pub fn retain(&self, ptr: ObjectPtr) -> bool {
        match self.object(ptr) {
            Some(object) => {
                refcount::retain(object.header());
                true
            }
            None => false,
        }
    }

    /// Release an instance, destroying it when the count reaches zero
    ///
    /// Releasing a pointer that is not live is a no-op.
    pub fn release(&self, ptr: ObjectPtr) -> ReleaseOutcome {
        let Some(object) = self.object(ptr) else {
            log_release_ignored(ptr.addr());
            return ReleaseOutcome::NotLive;
        };
        self.release_object(ptr, &object)
    }

    /// Release `ptr` only if it still holds the allocation with `serial`
    ///
    /// After the original instance died and its address was reused, this is
    /// a no-op instead of a release of the newer instance.
    pub fn release_instance(&self, ptr: ObjectPtr, serial: u64) -> ReleaseOutcome {
        match self.object(ptr) {
            Some(object) if object.serial() == serial => self.release_object(ptr, &object),
            _ => {
                log_release_ignored(ptr.addr());
                ReleaseOutcome::NotLive
            }
        }
    }

    fn release_object(&self, ptr: ObjectPtr, object: &NativeObject) -> ReleaseOutcome {
        match refcount::release(object.header()) {
            None => ReleaseOutcome::NotLive,
            Some(0) => {
                self.destroy(ptr, object);
                ReleaseOutcome::Destroyed
            }
            Some(remaining) => ReleaseOutcome::Released { remaining },
        }
    }

    /// Remove a dead instance from the table (cold path)
    #[cold]
    fn destroy(&self, ptr: ObjectPtr, object: &NativeObject) {
        let removed = self.objects.remove(&ptr);
        let class = self.class_name(object.class()).unwrap_or_default();
        log_object_destroyed(ptr.addr(), &class);

        // Instance variables may own blocks whose captures call back in here,
        // so they drop only after every table guard is gone.
        let ivars = object.take_ivars();
        drop(removed);
        drop(ivars);
    }

    pub fn get_ivar(&self, ptr: ObjectPtr, name: &str) -> Option<NativeValue> {
        self.object(ptr)?.ivar(name)
    }

    /// Write an instance variable; returns `false` if the pointer is not live
    pub fn set_ivar(&self, ptr: ObjectPtr, name: &str, value: NativeValue) -> bool {
        match self.object(ptr) {
            Some(object) => {
                let previous = object.set_ivar(name, value);
                drop(previous);
                true
            }
            None => false,
        }
    }

    /// Send a message to an instance or class
    pub fn send(
        &self,
        receiver: Receiver,
        selector: &str,
        args: &[NativeValue],
    ) -> Result<NativeValue, CallError> {
        // The receiver stays allocated for the duration of the call
        let (class, is_static, _keep_alive) = match receiver {
            Receiver::Instance(ptr) => {
                let object = self
                    .object(ptr)
                    .ok_or(CallError::DeadReceiver(ptr.addr()))?;
                (object.class(), false, Some(object))
            }
            Receiver::Class(id) => (id, true, None),
            Receiver::None => {
                return Err(CallError::UnrecognizedSelector {
                    receiver: "nil".to_string(),
                    selector: selector.to_string(),
                })
            }
        };

        let imp = self
            .lookup_method(class, selector, is_static)
            .ok_or_else(|| CallError::UnrecognizedSelector {
                receiver: self.describe(class, is_static),
                selector: selector.to_string(),
            })?;

        NativeCall::new(imp, selector, selector_arity(selector)).call(self, receiver, args)
    }

    /// Call a registered plain function
    pub fn call_function(&self, name: &str, args: &[NativeValue]) -> Result<NativeValue, CallError> {
        let (imp, arity) = self
            .functions
            .get(name)
            .map(|entry| *entry.value())
            .ok_or_else(|| CallError::UnknownFunction(name.to_string()))?;

        NativeCall::new(imp, name, arity).call(self, Receiver::None, args)
    }

    fn describe(&self, class: ClassId, is_static: bool) -> String {
        let name = self
            .class_name(class)
            .unwrap_or_else(|| format!("#{}", class.index()));
        if is_static {
            format!("class {}", name)
        } else {
            format!("instance of {}", name)
        }
    }
}

impl Default for NativeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// `-[NSObject init]`
fn root_init(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::Object(ctx.this())
}
