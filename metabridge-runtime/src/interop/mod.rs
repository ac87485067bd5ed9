//! Interoperability - values and calls crossing into native code
//!
//! Architecture:
//! - `types.rs` - native value model (NativeKind, NativeValue, NativeBlock)
//! - `call.rs` - uniform calling convention for IMPs and functions

mod call;
mod types;

pub use call::{selector_arity, CallError, Imp, MessageContext, NativeCall, Receiver};
pub use types::{NativeBlock, NativeKind, NativeValue};
