//! Native calls - the uniform calling convention for method implementations
//!
//! Every method implementation (IMP) and plain function receives the same
//! frame: a context naming the receiver and selector, plus the argument
//! slots in signature order.

use super::types::NativeValue;
use crate::logging::log_native_call;
use crate::objects::{ClassId, NativeRuntime, ObjectPtr};
use thiserror::Error;

/// Method implementation
pub type Imp = fn(&MessageContext<'_>, &[NativeValue]) -> NativeValue;

/// Target of a native call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Instance method on a live object
    Instance(ObjectPtr),
    /// Class (static) method
    Class(ClassId),
    /// Plain function, no receiver
    None,
}

/// Frame handed to a method implementation
pub struct MessageContext<'r> {
    runtime: &'r NativeRuntime,
    receiver: Receiver,
    selector: &'r str,
}

impl<'r> MessageContext<'r> {
    #[inline]
    pub fn runtime(&self) -> &'r NativeRuntime {
        self.runtime
    }

    #[inline]
    pub fn receiver(&self) -> Receiver {
        self.receiver
    }

    #[inline]
    pub fn selector(&self) -> &'r str {
        self.selector
    }

    /// Receiving instance (null for class methods and functions)
    #[inline]
    pub fn this(&self) -> ObjectPtr {
        match self.receiver {
            Receiver::Instance(ptr) => ptr,
            _ => ObjectPtr::NULL,
        }
    }

    /// Read an instance variable of the receiver
    pub fn ivar(&self, name: &str) -> NativeValue {
        self.runtime.get_ivar(self.this(), name).unwrap_or_default()
    }

    /// Write an instance variable of the receiver
    pub fn set_ivar(&self, name: &str, value: NativeValue) {
        self.runtime.set_ivar(self.this(), name, value);
    }
}

/// Number of arguments a selector takes (one per colon)
#[inline]
pub fn selector_arity(selector: &str) -> usize {
    selector.bytes().filter(|&b| b == b':').count()
}

/// Native call descriptor
pub struct NativeCall<'a> {
    imp: Imp,
    selector: &'a str,
    arity: usize,
}

impl<'a> NativeCall<'a> {
    /// Create call descriptor
    #[inline]
    pub fn new(imp: Imp, selector: &'a str, arity: usize) -> Self {
        Self {
            imp,
            selector,
            arity,
        }
    }

    /// Call the implementation with arguments
    pub fn call(
        &self,
        runtime: &NativeRuntime,
        receiver: Receiver,
        args: &[NativeValue],
    ) -> Result<NativeValue, CallError> {
        if args.len() != self.arity {
            return Err(CallError::ArgCountMismatch {
                expected: self.arity,
                got: args.len(),
            });
        }

        log_native_call(self.selector, args.len());

        let ctx = MessageContext {
            runtime,
            receiver,
            selector: self.selector,
        };
        Ok((self.imp)(&ctx, args))
    }
}

/// Native call errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("expected {expected} arguments, got {got}")]
    ArgCountMismatch { expected: usize, got: usize },

    #[error("{receiver} does not recognize selector '{selector}'")]
    UnrecognizedSelector { receiver: String, selector: String },

    #[error("no native function named '{0}'")]
    UnknownFunction(String),

    #[error("no native class named '{0}'")]
    UnknownClass(String),

    #[error("class '{0}' is already registered")]
    DuplicateClass(String),

    #[error("message sent to deallocated instance {0:#x}")]
    DeadReceiver(usize),
}
