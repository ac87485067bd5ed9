//! Tests for the instance registry

use super::*;
use crate::synth::TypeSynthesizer;
use crate::testing::{metafile, native_runtime};

struct Fixture {
    runtime: Arc<NativeRuntime>,
    registry: InstanceRegistry,
    circle: Arc<SynthesizedClass>,
}

fn fixture() -> Fixture {
    let runtime = native_runtime();
    let synth = TypeSynthesizer::new(metafile(), Arc::clone(&runtime));
    let circle = synth.synthesize_named("Circle").unwrap();
    Fixture {
        registry: InstanceRegistry::new(Arc::clone(&runtime)),
        runtime,
        circle,
    }
}

impl Fixture {
    fn alloc(&self) -> ObjectPtr {
        let class = self.runtime.class_named("Circle").unwrap();
        self.runtime.alloc(class).unwrap()
    }
}

#[cfg(test)]
mod identity_tests {
    use super::*;

    #[test]
    fn test_one_wrapper_per_instance() {
        let f = fixture();
        let ptr = f.alloc();

        let first = f.registry.wrapper_for(ptr, &f.circle, true);
        let second = f.registry.wrapper_for(ptr, &f.circle, false);
        assert!(first.ptr_eq(&second));
        assert_eq!(first.handle_count(), 2);
        assert!(f.registry.lookup(ptr).unwrap().ptr_eq(&first));
        assert_eq!(f.registry.stats().created, 1);
    }

    #[test]
    fn test_non_owning_promoted() {
        let f = fixture();
        let ptr = f.alloc();

        let borrowed = f.registry.wrapper_for(ptr, &f.circle, false);
        assert!(!borrowed.is_owning());
        let owned = f.registry.wrapper_for(ptr, &f.circle, true);
        assert!(owned.ptr_eq(&borrowed));
        assert!(borrowed.is_owning());
        assert_eq!(f.runtime.retain_count(ptr), Some(1));
    }

    #[test]
    fn test_surplus_reference_balanced() {
        let f = fixture();
        let ptr = f.alloc();
        let wrapper = f.registry.wrapper_for(ptr, &f.circle, true);

        // A second +1 handed over for the same instance
        f.runtime.retain(ptr);
        assert_eq!(f.runtime.retain_count(ptr), Some(2));
        let again = f.registry.wrapper_for(ptr, &f.circle, true);
        assert!(again.ptr_eq(&wrapper));
        assert_eq!(f.runtime.retain_count(ptr), Some(1));
    }

    #[test]
    fn test_track() {
        let f = fixture();
        let ptr = f.alloc();
        let other = f.alloc();
        let wrapper = f.registry.wrapper_for(ptr, &f.circle, true);

        assert!(f.registry.track(ptr, &wrapper));
        assert!(!f.registry.track(other, &wrapper));

        let impostor = InstanceRegistry::new(Arc::clone(&f.runtime)).wrapper_for(ptr, &f.circle, false);
        assert!(!f.registry.track(ptr, &impostor));
    }
}

#[cfg(test)]
mod release_tests {
    use super::*;

    #[test]
    fn test_release_gives_back_instance() {
        let f = fixture();
        let ptr = f.alloc();
        let wrapper = f.registry.wrapper_for(ptr, &f.circle, true);

        assert!(f.registry.release(&wrapper));
        assert!(wrapper.is_released());
        assert!(!f.runtime.is_live(ptr));
        assert!(!f.registry.contains(ptr));
    }

    #[test]
    fn test_double_release_is_noop() {
        let f = fixture();
        let ptr = f.alloc();
        let wrapper = f.registry.wrapper_for(ptr, &f.circle, true);

        assert!(f.registry.release(&wrapper));
        assert!(!f.registry.release(&wrapper));
        let stats = f.registry.stats();
        assert_eq!(stats.released, 1);
        assert_eq!(stats.double_releases, 1);
    }

    #[test]
    fn test_non_owning_release_keeps_instance() {
        let f = fixture();
        let ptr = f.alloc();
        let wrapper = f.registry.wrapper_for(ptr, &f.circle, false);

        assert!(f.registry.release(&wrapper));
        assert!(f.runtime.is_live(ptr));
        assert_eq!(f.runtime.retain_count(ptr), Some(1));
    }

    #[test]
    fn test_drop_finalizes() {
        let f = fixture();
        let ptr = f.alloc();
        let wrapper = f.registry.wrapper_for(ptr, &f.circle, true);
        let clone = wrapper.clone();

        drop(wrapper);
        assert!(f.runtime.is_live(ptr));
        drop(clone);
        assert!(!f.runtime.is_live(ptr));
        assert_eq!(f.registry.stats().live, 0);
    }

    #[test]
    fn test_release_after_native_death() {
        let f = fixture();
        let ptr = f.alloc();
        let wrapper = f.registry.wrapper_for(ptr, &f.circle, true);

        // Destroyed behind the wrapper's back
        f.runtime.release(ptr);
        assert!(f.registry.release(&wrapper));
        assert!(!f.runtime.is_live(ptr));
    }

    #[test]
    fn test_new_wrapper_after_release() {
        let f = fixture();
        let ptr = f.alloc();
        f.runtime.retain(ptr);

        let first = f.registry.wrapper_for(ptr, &f.circle, true);
        f.registry.release(&first);
        let second = f.registry.wrapper_for(ptr, &f.circle, true);
        assert!(!second.ptr_eq(&first));
        assert!(!second.is_released());
    }
}

#[cfg(test)]
mod reuse_tests {
    use super::*;

    #[test]
    fn test_reused_address_gets_fresh_wrapper() {
        let f = fixture();
        for _ in 0..50 {
            let old = f.alloc();
            let stale = f.registry.wrapper_for(old, &f.circle, true);
            // Destroyed outside the bridge while the wrapper is still held
            f.runtime.release(old);
            assert!(!f.registry.is_current(&stale));
            assert!(f.registry.lookup(old).is_none());

            let ptr = f.alloc();
            let wrapper = f.registry.wrapper_for(ptr, &f.circle, true);
            assert!(!wrapper.ptr_eq(&stale));
            assert!(f.registry.is_current(&wrapper));
            assert_eq!(f.runtime.retain_count(ptr), Some(1));

            drop(stale);
            assert!(f.runtime.is_live(ptr));
            assert!(f.registry.lookup(ptr).unwrap().ptr_eq(&wrapper));

            drop(wrapper);
            assert!(!f.runtime.is_live(ptr));
        }
        assert_eq!(f.runtime.live_count(), 0);
    }

    #[test]
    fn test_stale_release_spares_new_instance() {
        let f = fixture();
        for _ in 0..50 {
            let old = f.alloc();
            let stale = f.registry.wrapper_for(old, &f.circle, true);
            f.runtime.release(old);

            let other = f.alloc();
            assert!(f.registry.release(&stale));
            assert!(f.runtime.is_live(other));
            assert_eq!(f.runtime.retain_count(other), Some(1));
            f.runtime.release(other);
        }
    }

    #[test]
    fn test_dead_wrapper_not_tracked() {
        let f = fixture();
        let ptr = f.alloc();
        let wrapper = f.registry.wrapper_for(ptr, &f.circle, true);
        f.runtime.release(ptr);

        assert!(!f.registry.track(ptr, &wrapper));
        assert!(!f.registry.contains(ptr));
    }
}
