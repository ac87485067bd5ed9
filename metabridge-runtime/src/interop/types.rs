//! Native value representation
//!
//! Every value that crosses into native code travels as a `NativeValue`.
//! `NativeKind` names the slot shape independently of any payload and
//! carries the C size/alignment of scalar slots.

use super::call::CallError;
use crate::objects::{ClassId, ObjectPtr};
use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

/// Native slot kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NativeKind {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    CString,
    Object,
    Class,
    Block,
    Struct,
    Pointer,
}

impl NativeKind {
    /// Get size of a scalar slot in bytes (aggregates report 0)
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void | Self::Struct => 0,
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64
            | Self::U64
            | Self::F64
            | Self::CString
            | Self::Object
            | Self::Class
            | Self::Block
            | Self::Pointer => 8,
        }
    }

    /// Get alignment requirement
    #[inline]
    pub const fn align(self) -> usize {
        match self.size() {
            0 => 1,
            n => n,
        }
    }

    /// Check if kind is integral
    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }

    /// Check if kind is floating point
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// C spelling of the kind (for diagnostics)
    pub const fn c_name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::I8 => "int8_t",
            Self::I16 => "int16_t",
            Self::I32 => "int32_t",
            Self::I64 => "int64_t",
            Self::U8 => "uint8_t",
            Self::U16 => "uint16_t",
            Self::U32 => "uint32_t",
            Self::U64 => "uint64_t",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::CString => "char *",
            Self::Object => "id",
            Self::Class => "Class",
            Self::Block => "block",
            Self::Struct => "struct",
            Self::Pointer => "void *",
        }
    }
}

/// Native block - a callable native closure with a fixed arity
#[derive(Clone)]
pub struct NativeBlock {
    arity: usize,
    body: Arc<dyn Fn(&[NativeValue]) -> NativeValue + Send + Sync>,
}

impl NativeBlock {
    pub fn new<F>(arity: usize, body: F) -> Self
    where
        F: Fn(&[NativeValue]) -> NativeValue + Send + Sync + 'static,
    {
        Self {
            arity,
            body: Arc::new(body),
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Invoke the block body
    pub fn invoke(&self, args: &[NativeValue]) -> Result<NativeValue, CallError> {
        if args.len() != self.arity {
            return Err(CallError::ArgCountMismatch {
                expected: self.arity,
                got: args.len(),
            });
        }
        Ok((self.body)(args))
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for NativeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeBlock {{ arity: {} }}", self.arity)
    }
}

/// Native value container
#[derive(Debug, Clone)]
pub enum NativeValue {
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    CString(Option<CString>),
    Object(ObjectPtr),
    Class(Option<ClassId>),
    Block(Option<NativeBlock>),
    /// Struct passed by value, fields in declaration order
    Struct(Vec<NativeValue>),
    Pointer(usize),
}

impl NativeValue {
    /// Slot kind of this value
    pub fn kind(&self) -> NativeKind {
        match self {
            Self::Void => NativeKind::Void,
            Self::Bool(_) => NativeKind::Bool,
            Self::I8(_) => NativeKind::I8,
            Self::I16(_) => NativeKind::I16,
            Self::I32(_) => NativeKind::I32,
            Self::I64(_) => NativeKind::I64,
            Self::U8(_) => NativeKind::U8,
            Self::U16(_) => NativeKind::U16,
            Self::U32(_) => NativeKind::U32,
            Self::U64(_) => NativeKind::U64,
            Self::F32(_) => NativeKind::F32,
            Self::F64(_) => NativeKind::F64,
            Self::CString(_) => NativeKind::CString,
            Self::Object(_) => NativeKind::Object,
            Self::Class(_) => NativeKind::Class,
            Self::Block(_) => NativeKind::Block,
            Self::Struct(_) => NativeKind::Struct,
            Self::Pointer(_) => NativeKind::Pointer,
        }
    }

    /// Zero value for a slot kind (nil, 0, false, empty aggregate)
    pub fn zero(kind: NativeKind) -> Self {
        match kind {
            NativeKind::Void => Self::Void,
            NativeKind::Bool => Self::Bool(false),
            NativeKind::I8 => Self::I8(0),
            NativeKind::I16 => Self::I16(0),
            NativeKind::I32 => Self::I32(0),
            NativeKind::I64 => Self::I64(0),
            NativeKind::U8 => Self::U8(0),
            NativeKind::U16 => Self::U16(0),
            NativeKind::U32 => Self::U32(0),
            NativeKind::U64 => Self::U64(0),
            NativeKind::F32 => Self::F32(0.0),
            NativeKind::F64 => Self::F64(0.0),
            NativeKind::CString => Self::CString(None),
            NativeKind::Object => Self::Object(ObjectPtr::NULL),
            NativeKind::Class => Self::Class(None),
            NativeKind::Block => Self::Block(None),
            NativeKind::Struct => Self::Struct(Vec::new()),
            NativeKind::Pointer => Self::Pointer(0),
        }
    }

    /// Create a C string value from Rust text
    ///
    /// Returns `None` if the text contains an interior NUL.
    pub fn c_string(text: &str) -> Option<Self> {
        CString::new(text).ok().map(|s| Self::CString(Some(s)))
    }

    /// Widen any integral value to i64 (u64 above i64::MAX yields None)
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v.into()),
            Self::I16(v) => Some(v.into()),
            Self::I32(v) => Some(v.into()),
            Self::I64(v) => Some(v),
            Self::U8(v) => Some(v.into()),
            Self::U16(v) => Some(v.into()),
            Self::U32(v) => Some(v.into()),
            Self::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Widen any numeric value to f64
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v.into()),
            Self::F64(v) => Some(v),
            Self::U64(v) => Some(v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectPtr> {
        match *self {
            Self::Object(ptr) => Some(ptr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::CString(Some(s)) => s.to_str().ok(),
            _ => None,
        }
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Void, Self::Void) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::I16(a), Self::I16(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::U16(a), Self::U16(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a == b,
            (Self::CString(a), Self::CString(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Class(a), Self::Class(b)) => a == b,
            (Self::Block(a), Self::Block(b)) => match (a, b) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            },
            (Self::Struct(a), Self::Struct(b)) => a == b,
            (Self::Pointer(a), Self::Pointer(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for NativeValue {
    #[inline]
    fn default() -> Self {
        Self::Void
    }
}
