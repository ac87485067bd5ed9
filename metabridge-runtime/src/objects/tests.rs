//! Tests for the native object model

use super::*;
use crate::interop::{CallError, MessageContext, NativeValue, Receiver};
use std::sync::Arc;
use std::thread;

fn counter_init(ctx: &MessageContext<'_>, args: &[NativeValue]) -> NativeValue {
    ctx.set_ivar("count", args[0].clone());
    NativeValue::Object(ctx.this())
}

fn counter_value(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    ctx.ivar("count")
}

fn counter_increment(ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    let next = ctx.ivar("count").as_i64().unwrap_or(0) + 1;
    ctx.set_ivar("count", NativeValue::I64(next));
    NativeValue::Void
}

fn counter_kind(_ctx: &MessageContext<'_>, _args: &[NativeValue]) -> NativeValue {
    NativeValue::c_string("counter").unwrap()
}

fn setup() -> (NativeRuntime, ClassId) {
    let runtime = NativeRuntime::new();
    let class = runtime
        .register_class(
            NativeClassBuilder::new("Counter")
                .method("initWithCount:", counter_init)
                .method("value", counter_value)
                .method("increment", counter_increment)
                .class_method("kind", counter_kind),
        )
        .unwrap();
    (runtime, class)
}

#[cfg(test)]
mod class_tests {
    use super::*;

    #[test]
    fn test_root_class_registered() {
        let runtime = NativeRuntime::new();
        let root = runtime.class_named(ROOT_CLASS).unwrap();
        assert!(runtime.superclass_of(root).is_none());
        assert!(runtime.lookup_method(root, "init", false).is_some());
    }

    #[test]
    fn test_classes_inherit_from_root() {
        let (runtime, counter) = setup();
        let root = runtime.class_named(ROOT_CLASS).unwrap();
        assert_eq!(runtime.superclass_of(counter), Some(root));
        assert!(runtime.is_subclass(counter, root));
        assert!(!runtime.is_subclass(root, counter));
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let (runtime, _) = setup();
        let result = runtime.register_class(NativeClassBuilder::new("Counter"));
        assert_eq!(result, Err(CallError::DuplicateClass("Counter".to_string())));
    }

    #[test]
    fn test_unknown_superclass_rejected() {
        let runtime = NativeRuntime::new();
        let result = runtime.register_class(NativeClassBuilder::new("Orphan").superclass("Missing"));
        assert_eq!(result, Err(CallError::UnknownClass("Missing".to_string())));
    }

    #[test]
    fn test_inherited_lookup() {
        let (runtime, counter) = setup();
        let sub = runtime
            .register_class(NativeClassBuilder::new("SubCounter").superclass("Counter"))
            .unwrap();
        assert!(runtime.lookup_method(sub, "value", false).is_some());
        assert!(runtime.lookup_method(sub, "kind", true).is_some());
        assert!(runtime.lookup_method(sub, "kind", false).is_none());
        assert!(runtime.lookup_method(counter, "missing", false).is_none());
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_alloc_starts_at_one() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();
        assert!(!ptr.is_null());
        assert!(runtime.is_live(ptr));
        assert_eq!(runtime.retain_count(ptr), Some(1));
        assert_eq!(runtime.class_of(ptr), Some(counter));
    }

    #[test]
    fn test_retain_release_destroys_at_zero() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();

        assert!(runtime.retain(ptr));
        assert_eq!(runtime.retain_count(ptr), Some(2));

        assert_eq!(runtime.release(ptr), ReleaseOutcome::Released { remaining: 1 });
        assert_eq!(runtime.release(ptr), ReleaseOutcome::Destroyed);
        assert!(!runtime.is_live(ptr));
        assert_eq!(runtime.live_count(), 0);
    }

    #[test]
    fn test_release_of_dead_pointer_is_noop() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();
        assert_eq!(runtime.release(ptr), ReleaseOutcome::Destroyed);

        assert_eq!(runtime.release(ptr), ReleaseOutcome::NotLive);
        assert_eq!(runtime.release(ObjectPtr::NULL), ReleaseOutcome::NotLive);
        assert!(!runtime.retain(ptr));
    }

    #[test]
    fn test_serials_never_repeat() {
        let (runtime, counter) = setup();
        let mut seen = Vec::new();
        for _ in 0..32 {
            let ptr = runtime.alloc(counter).unwrap();
            seen.push(runtime.serial_of(ptr).unwrap());
            runtime.release(ptr);
            assert_eq!(runtime.serial_of(ptr), None);
        }
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_release_instance_checks_serial() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();
        let serial = runtime.serial_of(ptr).unwrap();

        assert_eq!(runtime.release_instance(ptr, serial + 1), ReleaseOutcome::NotLive);
        assert_eq!(runtime.retain_count(ptr), Some(1));
        assert_eq!(runtime.release_instance(ptr, serial), ReleaseOutcome::Destroyed);
        assert_eq!(runtime.release_instance(ptr, serial), ReleaseOutcome::NotLive);
    }

    #[test]
    fn test_stale_release_spares_reused_address() {
        let (runtime, counter) = setup();
        for _ in 0..50 {
            let old = runtime.alloc(counter).unwrap();
            let old_serial = runtime.serial_of(old).unwrap();
            runtime.release(old);

            let fresh = runtime.alloc(counter).unwrap();
            assert_eq!(runtime.release_instance(old, old_serial), ReleaseOutcome::NotLive);
            assert!(runtime.is_live(fresh));
            runtime.release(fresh);
        }
        assert_eq!(runtime.live_count(), 0);
    }

    #[test]
    fn test_concurrent_retain_release() {
        let (runtime, counter) = setup();
        let runtime = Arc::new(runtime);
        let ptr = runtime.alloc(counter).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                thread::spawn(move || {
                    for _ in 0..100 {
                        runtime.retain(ptr);
                        runtime.release(ptr);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(runtime.retain_count(ptr), Some(1));
        assert_eq!(runtime.release(ptr), ReleaseOutcome::Destroyed);
    }
}

#[cfg(test)]
mod send_tests {
    use super::*;

    #[test]
    fn test_send_instance_methods() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();

        let result = runtime
            .send(Receiver::Instance(ptr), "initWithCount:", &[NativeValue::I64(41)])
            .unwrap();
        assert_eq!(result, NativeValue::Object(ptr));

        runtime.send(Receiver::Instance(ptr), "increment", &[]).unwrap();
        let value = runtime.send(Receiver::Instance(ptr), "value", &[]).unwrap();
        assert_eq!(value, NativeValue::I64(42));
    }

    #[test]
    fn test_send_class_method() {
        let (runtime, counter) = setup();
        let kind = runtime.send(Receiver::Class(counter), "kind", &[]).unwrap();
        assert_eq!(kind.as_str(), Some("counter"));
    }

    #[test]
    fn test_send_checks_selector_arity() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();
        let result = runtime.send(Receiver::Instance(ptr), "initWithCount:", &[]);
        assert_eq!(result, Err(CallError::ArgCountMismatch { expected: 1, got: 0 }));
    }

    #[test]
    fn test_unrecognized_selector() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();
        let err = runtime.send(Receiver::Instance(ptr), "explode", &[]).unwrap_err();
        assert!(matches!(err, CallError::UnrecognizedSelector { .. }));
        assert!(err.to_string().contains("instance of Counter"));
    }

    #[test]
    fn test_send_to_dead_instance() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();
        runtime.release(ptr);
        let result = runtime.send(Receiver::Instance(ptr), "value", &[]);
        assert_eq!(result, Err(CallError::DeadReceiver(ptr.addr())));
    }

    #[test]
    fn test_responds_to() {
        let (runtime, counter) = setup();
        let ptr = runtime.alloc(counter).unwrap();
        assert!(runtime.responds_to(Receiver::Instance(ptr), "init"));
        assert!(runtime.responds_to(Receiver::Class(counter), "kind"));
        assert!(!runtime.responds_to(Receiver::Instance(ptr), "kind"));
        assert!(!runtime.responds_to(Receiver::None, "init"));
    }
}
