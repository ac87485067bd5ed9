//! metabridge - a metadata-driven bridge between a scripting runtime and a
//! native object model
//!
//! A binary metadata blob describes the foreign type universe. From it the
//! bridge synthesizes scripting-side classes on demand, marshals values and
//! calls across the boundary, and keeps exactly one wrapper per live native
//! instance.

// Core modules
pub mod bridge;
pub mod convert;
pub mod errors;
pub mod marshal;
pub mod metadata;
pub mod registry;
pub mod script;
pub mod synth;

// Host integration
pub mod cli;
pub mod config;
pub mod console;
pub mod inspect;
pub mod logging;
pub mod queue;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use bridge::{Bridge, BridgeStats, WeakBridge};
pub use config::BridgeConfig;
pub use convert::{ValueConverter, MAX_SAFE_INTEGER};
pub use errors::{terminate, BridgeError, LoadError, SchemaError};
pub use marshal::Target;
pub use metadata::{Descriptor, DescriptorId, MetaFile, Signature, TypeEncoding, TypeUniverse};
pub use queue::{ConcurrentQueue, MainThreadDispatcher, WakeTarget};
pub use registry::{InstanceRegistry, RegistryStats, Wrapper};
pub use script::{ScriptFunction, ScriptValue};
pub use synth::{MethodEntry, PropertyEntry, SynthesizedClass, TypeSynthesizer};

pub use metabridge_runtime as runtime;
