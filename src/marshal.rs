//! Call marshaling - construction, method and property access, functions
//!
//! Every entry point follows the same order: pick the member, check arity
//! against its signature, convert the arguments, then make exactly one
//! native call and convert the result. A failure before the native call
//! leaves the native side untouched.

use crate::bridge::Bridge;
use crate::errors::BridgeError;
use crate::metadata::{Descriptor, DescriptorKind, TypeEncoding};
use crate::registry::Wrapper;
use crate::script::ScriptValue;
use crate::synth::{MethodEntry, SynthesizedClass};
use metabridge_runtime::{CallError, NativeValue, ObjectPtr, Receiver};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Receiver of a method or property access
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Instance(&'a Wrapper),
    Static(&'a SynthesizedClass),
}

impl Target<'_> {
    fn class(&self) -> &SynthesizedClass {
        match self {
            Target::Instance(wrapper) => wrapper.class(),
            Target::Static(class) => class,
        }
    }
}

impl Bridge {
    /// `new Class(...args)`: the first declared initializer taking
    /// `args.len()` arguments, or the root `init` for an empty argument list
    pub fn construct(&self, class: &Arc<SynthesizedClass>, args: &[ScriptValue]) -> Result<Wrapper, BridgeError> {
        if let Some(init) = class.initializer_for_arity(args.len()) {
            return self.construct_with(class, init, args);
        }
        if args.is_empty() {
            return self.construct_with(class, &MethodEntry::default_init(class.name()), args);
        }

        let meta = self.meta();
        let overloads: Vec<String> = class
            .initializers()
            .iter()
            .map(|init| format!("{} {}", init.selector, meta.signature_text(&init.signature)))
            .collect();
        Err(BridgeError::ArityMismatch {
            member: format!("new {}", class.name()),
            expected: class.initializers().first().map_or(0, MethodEntry::arity),
            got: args.len(),
            signature: if overloads.is_empty() {
                "init".to_string()
            } else {
                overloads.join(" | ")
            },
        })
    }

    /// Allocate an instance and send it a specific initializer
    ///
    /// The initializer consumes the allocation: on a nil result nothing is
    /// left to release. The returned wrapper owns the instance.
    pub fn construct_with(
        &self,
        class: &Arc<SynthesizedClass>,
        init: &MethodEntry,
        args: &[ScriptValue],
    ) -> Result<Wrapper, BridgeError> {
        let native = match (class.kind(), class.native_class()) {
            (DescriptorKind::Interface, Some(native)) => native,
            _ => return Err(BridgeError::not_found(class.name(), "native class")),
        };
        self.check_arity(init, args)?;
        let frame = self.converter().frame(&init.selector, &init.signature.params, args)?;

        let runtime = self.runtime();
        let ptr = runtime.alloc(native)?;
        self.note_native_call();
        let result = match runtime.send(Receiver::Instance(ptr), &init.selector, &frame) {
            Ok(result) => result,
            Err(err) => {
                runtime.release(ptr);
                return Err(err.into());
            }
        };

        let instance = result.as_object().unwrap_or(ObjectPtr::NULL);
        if instance.is_null() {
            debug!(
                event = "construction_failed",
                class = class.name(),
                selector = %init.selector,
                "initializer returned nil"
            );
            return Err(BridgeError::ConstructionFailed {
                class: class.name().to_string(),
                selector: init.selector.clone(),
            });
        }

        let ty = TypeEncoding::Object(Some(class.id()));
        match self.converter().to_scripting_owned(NativeValue::Object(instance), &ty, true) {
            Ok(ScriptValue::Object(wrapper)) => {
                debug!(
                    event = "instance_constructed",
                    class = wrapper.class().name(),
                    address = instance.addr(),
                    "constructed"
                );
                Ok(wrapper)
            }
            Ok(other) => {
                runtime.release(instance);
                Err(BridgeError::mismatch(class.name(), other.describe_kind()).at(&init.selector, None))
            }
            // The converter already gave the reference back
            Err(err) => Err(err.at(&init.selector, None)),
        }
    }

    /// Dispatch one method entry to the native side
    #[instrument(level = "trace", skip_all, fields(selector = %method.selector))]
    pub fn invoke(&self, method: &MethodEntry, target: Target<'_>, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        self.check_arity(method, args)?;
        let converter = self.converter();
        let frame = converter.frame(&method.name, &method.signature.params, args)?;

        let receiver = match target {
            Target::Instance(wrapper) => {
                if wrapper.is_released() {
                    return Err(BridgeError::ReleasedInstance {
                        class: wrapper.class().name().to_string(),
                        address: wrapper.ptr().addr(),
                    });
                }
                if !self.registry().is_current(wrapper) {
                    return Err(CallError::DeadReceiver(wrapper.ptr().addr()).into());
                }
                Receiver::Instance(wrapper.ptr())
            }
            Target::Static(class) => match class.native_class() {
                Some(native) => Receiver::Class(native),
                None => return Err(BridgeError::not_found(class.name(), method.selector.as_str())),
            },
        };

        self.note_native_call();
        trace!(event = "native_call", member = %method.qualified_name(), arity = frame.len(), "send");
        let result = self.runtime().send(receiver, &method.selector, &frame)?;
        converter
            .to_scripting_owned(result, &method.signature.ret, method.owns_return)
            .map_err(|err| err.at(&method.name, None))
    }

    /// `instance.name(...args)`
    pub fn call_method(&self, wrapper: &Wrapper, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        let method = wrapper
            .class()
            .method(name)
            .ok_or_else(|| BridgeError::not_found(format!("{} instance", wrapper.class().name()), name))?;
        self.invoke(method, Target::Instance(wrapper), args)
    }

    /// `Class.name(...args)`
    pub fn call_static(&self, class: &SynthesizedClass, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        let method = class
            .static_method(name)
            .ok_or_else(|| BridgeError::not_found(class.name(), name))?;
        self.invoke(method, Target::Static(class), args)
    }

    pub fn get_property(&self, target: Target<'_>, name: &str) -> Result<ScriptValue, BridgeError> {
        let class = target.class();
        let getter = self
            .property_of(target, name)?
            .getter
            .as_ref()
            .ok_or_else(|| BridgeError::not_found(class.name(), name))?;
        self.invoke(getter, target, &[])
    }

    pub fn set_property(&self, target: Target<'_>, name: &str, value: ScriptValue) -> Result<(), BridgeError> {
        let class = target.class();
        let property = self.property_of(target, name)?;
        let setter = match &property.setter {
            Some(setter) if !property.readonly => setter,
            _ => {
                return Err(BridgeError::ReadOnlyProperty {
                    class: class.name().to_string(),
                    property: name.to_string(),
                })
            }
        };
        self.invoke(setter, target, std::slice::from_ref(&value))?;
        Ok(())
    }

    /// Call a plain function described in the metadata
    pub fn call_function(&self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        let signature = match self.meta().resolve(name) {
            Some(Descriptor::Function(function)) => function.signature(),
            _ => return Err(BridgeError::not_found("functions", name)),
        };
        if args.len() != signature.arity() {
            return Err(BridgeError::ArityMismatch {
                member: name.to_string(),
                expected: signature.arity(),
                got: args.len(),
                signature: format!("{} {}", name, self.meta().signature_text(&signature)),
            });
        }

        let converter = self.converter();
        let frame = converter.frame(name, &signature.params, args)?;
        self.note_native_call();
        trace!(event = "native_call", member = name, arity = frame.len(), "call");
        let result = self.runtime().call_function(name, &frame)?;
        converter
            .to_scripting(result, &signature.ret)
            .map_err(|err| err.at(name, None))
    }

    fn property_of<'t>(&self, target: Target<'t>, name: &str) -> Result<&'t crate::synth::PropertyEntry, BridgeError> {
        let found = match target {
            Target::Instance(wrapper) => wrapper.class().property(name),
            Target::Static(class) => class.static_property(name),
        };
        found.ok_or_else(|| BridgeError::not_found(target.class().name(), name))
    }

    fn check_arity(&self, method: &MethodEntry, args: &[ScriptValue]) -> Result<(), BridgeError> {
        if args.len() == method.arity() {
            return Ok(());
        }
        Err(BridgeError::ArityMismatch {
            member: method.qualified_name(),
            expected: method.arity(),
            got: args.len(),
            signature: format!(
                "{} {}",
                method.selector,
                self.meta().signature_text(&method.signature)
            ),
        })
    }
}
