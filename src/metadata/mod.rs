//! Metadata store - the binary description of the foreign type universe
//!
//! Architecture:
//! - `file.rs` - loading, validation, name lookup (MetaFile)
//! - `meta.rs` - read-only descriptor views (InterfaceMeta, MethodMeta, ...)
//! - `encoding.rs` - encoded type signatures (TypeEncoding, Signature)
//! - `schema.rs` - serde type universe compiled into the binary form
//!
//! Design: the blob is loaded once and never mutated. Descriptors are views
//! addressed by offset, so any number of readers can hold them at once.

mod encoding;
mod file;
mod meta;
pub mod schema;

#[cfg(test)]
mod tests;

pub use encoding::{Signature, TypeEncoding};
pub use file::{MetaFile, MAGIC, VERSION};
pub use meta::{
    Descriptor, DescriptorId, DescriptorKind, FieldMeta, FunctionMeta, InterfaceMeta, MethodMeta,
    PropertyMeta, ProtocolMeta, StructMeta,
};
pub use schema::TypeUniverse;
