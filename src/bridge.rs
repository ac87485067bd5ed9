//! The bridge - one metadata store, one native runtime, and the state that
//! correlates them with scripting values
//!
//! `Bridge` is a cheap handle. Native blocks created for scripting callbacks
//! hold a `WeakBridge` so a block kept alive by native code never keeps the
//! bridge itself alive.

use crate::config::BridgeConfig;
use crate::console::Console;
use crate::convert::ValueConverter;
use crate::errors::BridgeError;
use crate::inspect::RemoteObject;
use crate::metadata::{Descriptor, MetaFile};
use crate::registry::{InstanceRegistry, RegistryStats, Wrapper};
use crate::script::{ScriptFunction, ScriptValue};
use crate::synth::{SynthesizedClass, TypeSynthesizer};
use metabridge_runtime::NativeRuntime;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::info;

/// Bridge counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub classes_synthesized: u64,
    pub native_calls: u64,
    pub conversion_errors: u64,
    pub registry: RegistryStats,
}

#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    meta: Arc<MetaFile>,
    runtime: Arc<NativeRuntime>,
    synth: TypeSynthesizer,
    registry: InstanceRegistry,
    console: Console,
    native_calls: AtomicU64,
    conversion_errors: AtomicU64,
}

/// Non-owning bridge handle
#[derive(Clone)]
pub struct WeakBridge {
    inner: Weak<BridgeInner>,
}

impl WeakBridge {
    pub fn upgrade(&self) -> Option<Bridge> {
        self.inner.upgrade().map(|inner| Bridge { inner })
    }
}

impl Bridge {
    pub fn new(meta: Arc<MetaFile>, runtime: Arc<NativeRuntime>) -> Self {
        Self::with_config(meta, runtime, &BridgeConfig::default())
    }

    pub fn with_config(meta: Arc<MetaFile>, runtime: Arc<NativeRuntime>, config: &BridgeConfig) -> Self {
        info!(
            event = "bridge_init",
            descriptors = meta.len(),
            version = meta.version(),
            "bridge initialized"
        );
        Self {
            inner: Arc::new(BridgeInner {
                synth: TypeSynthesizer::new(Arc::clone(&meta), Arc::clone(&runtime)),
                registry: InstanceRegistry::with_capacity(
                    Arc::clone(&runtime),
                    config.registry.initial_capacity,
                ),
                console: Console::new().retaining(config.inspector.enabled),
                meta,
                runtime,
                native_calls: AtomicU64::new(0),
                conversion_errors: AtomicU64::new(0),
            }),
        }
    }

    /// Load the configured metadata blob and build a bridge over it
    ///
    /// A load failure is a `FatalLoad` error; callers are expected to end
    /// the process with `errors::terminate`.
    pub fn from_config(config: &BridgeConfig, runtime: Arc<NativeRuntime>) -> Result<Self, BridgeError> {
        let meta = MetaFile::load(config.metadata_path())?;
        Ok(Self::with_config(Arc::new(meta), runtime, config))
    }

    #[inline]
    pub fn meta(&self) -> &Arc<MetaFile> {
        &self.inner.meta
    }

    #[inline]
    pub fn runtime(&self) -> &Arc<NativeRuntime> {
        &self.inner.runtime
    }

    #[inline]
    pub fn synthesizer(&self) -> &TypeSynthesizer {
        &self.inner.synth
    }

    #[inline]
    pub fn registry(&self) -> &InstanceRegistry {
        &self.inner.registry
    }

    #[inline]
    pub fn console(&self) -> &Console {
        &self.inner.console
    }

    pub fn converter(&self) -> ValueConverter<'_> {
        ValueConverter::new(self)
    }

    pub fn downgrade(&self) -> WeakBridge {
        WeakBridge {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Synthesized class for a type name
    pub fn resolve_class(&self, name: &str) -> Result<Arc<SynthesizedClass>, BridgeError> {
        self.inner.synth.synthesize_named(name)
    }

    /// Global binding for a name: a constructor for classes and protocols,
    /// a function for plain functions
    pub fn global(&self, name: &str) -> Result<ScriptValue, BridgeError> {
        match self.meta().resolve(name) {
            Some(Descriptor::Interface(_) | Descriptor::Protocol(_)) => {
                Ok(ScriptValue::Constructor(self.resolve_class(name)?))
            }
            Some(Descriptor::Function(_)) => {
                let bridge = self.downgrade();
                let function = name.to_string();
                Ok(ScriptValue::Function(
                    ScriptFunction::new(move |args| {
                        bridge
                            .upgrade()
                            .ok_or_else(|| BridgeError::not_found("bridge", function.as_str()))?
                            .call_function(&function, args)
                    })
                    .named(name),
                ))
            }
            Some(Descriptor::Struct(_)) | None => Err(BridgeError::not_found("globals", name)),
        }
    }

    /// `instanceof`: the value wraps an instance of `class`, a subclass, or a
    /// class conforming to it
    pub fn instance_of(&self, value: &ScriptValue, class: &SynthesizedClass) -> bool {
        match value {
            ScriptValue::Object(wrapper) => wrapper.class().is_compatible(class.id()),
            _ => false,
        }
    }

    /// Give up a wrapper's hold on its native instance; repeat calls are no-ops
    pub fn release(&self, wrapper: &Wrapper) -> bool {
        self.inner.registry.release(wrapper)
    }

    /// Inspector view of a value
    pub fn describe(&self, value: &ScriptValue) -> RemoteObject {
        RemoteObject::from_value(value)
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            classes_synthesized: self.inner.synth.synthesized_count(),
            native_calls: self.inner.native_calls.load(Ordering::Relaxed),
            conversion_errors: self.inner.conversion_errors.load(Ordering::Relaxed),
            registry: self.inner.registry.stats(),
        }
    }

    pub(crate) fn note_native_call(&self) {
        self.inner.native_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_conversion_error(&self) {
        self.inner.conversion_errors.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("meta", &self.inner.meta)
            .field("stats", &self.stats())
            .finish()
    }
}
