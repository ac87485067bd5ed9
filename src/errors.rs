//! Error taxonomy for the bridge
//!
//! Design: two tiers. `LoadError` describes a metadata blob that cannot be
//! trusted; anything built from it would be inconsistent, so it is fatal.
//! `BridgeError` is what scripting code sees; apart from `FatalLoad` and
//! `Synthesis` every variant is recoverable and leaves the bridge usable.

use metabridge_runtime::CallError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed or missing metadata
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read metadata file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("metadata truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad metadata magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unsupported metadata version {found} (supported: {supported})")]
    UnsupportedVersion { found: u16, supported: u16 },

    #[error("{what} at offset {offset:#x} is out of bounds")]
    OutOfBounds { what: &'static str, offset: usize },

    #[error("invalid {what} at offset {offset:#x}: {reason}")]
    InvalidRecord {
        what: &'static str,
        offset: usize,
        reason: String,
    },

    #[error("unknown {what} tag {tag} at offset {offset:#x}")]
    UnknownTag {
        what: &'static str,
        tag: u8,
        offset: usize,
    },
}

/// Errors produced while compiling a type universe into a metadata blob
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("cannot parse type '{text}': {reason}")]
    BadType { text: String, reason: String },

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("'{0}' is declared more than once")]
    Duplicate(String),

    #[error("'{name}' has {count} {what}, more than the format allows")]
    TooMany {
        name: String,
        what: &'static str,
        count: usize,
    },

    #[error("invalid universe JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced to scripting code
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("fatal metadata error: {0}")]
    FatalLoad(#[from] LoadError),

    #[error("cannot synthesize '{class}': {reason}")]
    Synthesis { class: String, reason: String },

    #[error("{member}: {} expected {expected}, got {actual}", position(.index))]
    TypeMismatch {
        member: String,
        index: Option<usize>,
        expected: String,
        actual: String,
    },

    #[error("{member}: expected {expected} argument(s) for {signature}, got {got}")]
    ArityMismatch {
        member: String,
        expected: usize,
        got: usize,
        signature: String,
    },

    #[error("{member}: cannot convert {actual} to {expected} for {}: {reason}", position(.index))]
    Conversion {
        member: String,
        index: Option<usize>,
        expected: String,
        actual: String,
        reason: String,
    },

    #[error("'{name}' not found on {owner}")]
    NotFound { owner: String, name: String },

    #[error("property '{property}' of {class} is read-only")]
    ReadOnlyProperty { class: String, property: String },

    #[error("{class} instance {address:#x} was already released")]
    ReleasedInstance { class: String, address: usize },

    #[error("construction of {class} failed: '{selector}' returned nil")]
    ConstructionFailed { class: String, selector: String },

    #[error(transparent)]
    Native(#[from] CallError),
}

fn position(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("argument {}", i + 1),
        None => "return value".to_string(),
    }
}

impl BridgeError {
    /// Whether the error belongs to the FatalLoadError class
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalLoad(_) | Self::Synthesis { .. })
    }

    /// Attach the member and argument position to a conversion failure
    ///
    /// Conversions are performed without knowing which call they serve; the
    /// call site fills the location in before the error reaches scripting code.
    pub fn at(mut self, site: &str, position: Option<usize>) -> Self {
        match &mut self {
            Self::TypeMismatch { member, index, .. } | Self::Conversion { member, index, .. } => {
                if member.is_empty() {
                    *member = site.to_string();
                    *index = position;
                }
            }
            _ => {}
        }
        self
    }

    pub(crate) fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            member: String::new(),
            index: None,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub(crate) fn conversion(
        expected: impl Into<String>,
        actual: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conversion {
            member: String::new(),
            index: None,
            expected: expected.into(),
            actual: actual.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

/// Report a fatal error and end the process
///
/// Continuing after a fatal load or synthesis failure would run the bridge
/// against an inconsistent metadata graph.
pub fn terminate(err: &BridgeError) -> ! {
    tracing::error!(event = "fatal", error = %err, "metabridge cannot continue");
    eprintln!("metabridge: fatal: {}", err);
    std::process::exit(70)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let load = BridgeError::from(LoadError::BadMagic(*b"XXXX"));
        assert!(load.is_fatal());

        let synth = BridgeError::Synthesis {
            class: "Circle".into(),
            reason: "cycle".into(),
        };
        assert!(synth.is_fatal());

        assert!(!BridgeError::mismatch("id<Shape>", "number").is_fatal());
        assert!(!BridgeError::from(CallError::UnknownFunction("f".into())).is_fatal());
    }

    #[test]
    fn test_site_attached_once() {
        let err = BridgeError::conversion("i8", "number", "out of range")
            .at("setLevel:", Some(0))
            .at("outer", Some(3));

        let message = err.to_string();
        assert!(message.starts_with("setLevel:: cannot convert number to i8 for argument 1"));
    }

    #[test]
    fn test_return_value_position() {
        let err = BridgeError::mismatch("string", "i32").at("name", None);
        assert_eq!(err.to_string(), "name: return value expected string, got i32");
    }
}
