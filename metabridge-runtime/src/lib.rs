//! metabridge runtime - the native object model behind the bridge
//!
//! This crate provides the foreign side that the scripting bridge drives:
//! native classes with selector-keyed implementations, reference counted
//! instances, plain functions, blocks, and the native value representation
//! that arguments and return values travel in.

pub mod interop;
pub mod logging;
pub mod objects;

// Re-export core types
pub use interop::{
    selector_arity, CallError, Imp, MessageContext, NativeBlock, NativeCall, NativeKind,
    NativeValue, Receiver,
};
pub use objects::{ClassId, NativeClassBuilder, NativeRuntime, ObjectPtr, ReleaseOutcome, ROOT_CLASS};

/// Runtime initialization
pub fn init() {
    logging::init_runtime_logging();
    logging::info!(event = "runtime_init", "metabridge runtime initializing");
}
