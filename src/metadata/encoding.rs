//! Encoded type signatures
//!
//! A type encoding is one tag byte, followed by a `u32` payload for the tags
//! that reference something else: object and struct encodings carry the
//! offset of a descriptor (`u32::MAX` for an untyped `id`), block encodings
//! carry the offset of a signature record.
//!
//! A signature record is a `u8` parameter count, the return type, then the
//! parameter types.

use super::file::Cursor;
use super::meta::DescriptorId;
use crate::errors::LoadError;
use metabridge_runtime::NativeKind;

pub(crate) const TAG_VOID: u8 = 0;
pub(crate) const TAG_BOOL: u8 = 1;
pub(crate) const TAG_I8: u8 = 2;
pub(crate) const TAG_I16: u8 = 3;
pub(crate) const TAG_I32: u8 = 4;
pub(crate) const TAG_I64: u8 = 5;
pub(crate) const TAG_U8: u8 = 6;
pub(crate) const TAG_U16: u8 = 7;
pub(crate) const TAG_U32: u8 = 8;
pub(crate) const TAG_U64: u8 = 9;
pub(crate) const TAG_F32: u8 = 10;
pub(crate) const TAG_F64: u8 = 11;
pub(crate) const TAG_STRING: u8 = 12;
pub(crate) const TAG_OBJECT: u8 = 13;
pub(crate) const TAG_CLASS: u8 = 14;
pub(crate) const TAG_BLOCK: u8 = 15;
pub(crate) const TAG_STRUCT: u8 = 16;
pub(crate) const TAG_POINTER: u8 = 17;

/// Offset value meaning "no reference"
pub(crate) const NONE: u32 = u32::MAX;

/// Decoded type encoding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeEncoding {
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
    /// NUL-terminated C string
    String,
    /// Object reference, optionally constrained to a class or protocol
    Object(Option<DescriptorId>),
    /// Class object
    Class,
    /// Native block with its own signature
    Block(Box<Signature>),
    /// Structure passed by value
    Struct(DescriptorId),
    /// Opaque pointer
    Pointer,
}

impl TypeEncoding {
    /// Native slot kind this encoding travels in
    pub fn native_kind(&self) -> NativeKind {
        match self {
            Self::Void => NativeKind::Void,
            Self::Bool => NativeKind::Bool,
            Self::I8 => NativeKind::I8,
            Self::I16 => NativeKind::I16,
            Self::I32 => NativeKind::I32,
            Self::I64 => NativeKind::I64,
            Self::U8 => NativeKind::U8,
            Self::U16 => NativeKind::U16,
            Self::U32 => NativeKind::U32,
            Self::U64 => NativeKind::U64,
            Self::F32 => NativeKind::F32,
            Self::F64 => NativeKind::F64,
            Self::String => NativeKind::CString,
            Self::Object(_) => NativeKind::Object,
            Self::Class => NativeKind::Class,
            Self::Block(_) => NativeKind::Block,
            Self::Struct(_) => NativeKind::Struct,
            Self::Pointer => NativeKind::Pointer,
        }
    }

    #[inline]
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            Self::Object(_) | Self::Class | Self::Block(_) | Self::Struct(_)
        )
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            Self::Void => TAG_VOID,
            Self::Bool => TAG_BOOL,
            Self::I8 => TAG_I8,
            Self::I16 => TAG_I16,
            Self::I32 => TAG_I32,
            Self::I64 => TAG_I64,
            Self::U8 => TAG_U8,
            Self::U16 => TAG_U16,
            Self::U32 => TAG_U32,
            Self::U64 => TAG_U64,
            Self::F32 => TAG_F32,
            Self::F64 => TAG_F64,
            Self::String => TAG_STRING,
            Self::Object(_) => TAG_OBJECT,
            Self::Class => TAG_CLASS,
            Self::Block(_) => TAG_BLOCK,
            Self::Struct(_) => TAG_STRUCT,
            Self::Pointer => TAG_POINTER,
        }
    }

    /// Decode one type encoding at the cursor
    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, LoadError> {
        let at = cursor.position();
        let tag = cursor.u8("type tag")?;
        let ty = match tag {
            TAG_VOID => Self::Void,
            TAG_BOOL => Self::Bool,
            TAG_I8 => Self::I8,
            TAG_I16 => Self::I16,
            TAG_I32 => Self::I32,
            TAG_I64 => Self::I64,
            TAG_U8 => Self::U8,
            TAG_U16 => Self::U16,
            TAG_U32 => Self::U32,
            TAG_U64 => Self::U64,
            TAG_F32 => Self::F32,
            TAG_F64 => Self::F64,
            TAG_STRING => Self::String,
            TAG_CLASS => Self::Class,
            TAG_POINTER => Self::Pointer,
            TAG_OBJECT => match cursor.u32("object type")? {
                NONE => Self::Object(None),
                offset => Self::Object(Some(DescriptorId(offset))),
            },
            TAG_STRUCT => Self::Struct(DescriptorId(cursor.u32("struct type")?)),
            TAG_BLOCK => {
                let offset = cursor.u32("block signature")?;
                let mut inner = cursor.at(offset as usize)?;
                Self::Block(Box::new(Signature::decode(&mut inner)?))
            }
            tag => {
                return Err(LoadError::UnknownTag {
                    what: "type",
                    tag,
                    offset: at,
                })
            }
        };
        Ok(ty)
    }

    /// Append the inline form; block signatures must already be placed
    pub(crate) fn encode_inline(&self, block_signature: Option<u32>, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            Self::Object(target) => {
                let offset = target.map_or(NONE, |id| id.0);
                out.extend_from_slice(&offset.to_le_bytes());
            }
            Self::Struct(id) => out.extend_from_slice(&id.0.to_le_bytes()),
            Self::Block(_) => {
                out.extend_from_slice(&block_signature.unwrap_or(NONE).to_le_bytes());
            }
            _ => {}
        }
    }
}

/// Return and parameter types of a method, function, or block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub ret: TypeEncoding,
    pub params: Vec<TypeEncoding>,
}

impl Signature {
    pub fn new(ret: TypeEncoding, params: Vec<TypeEncoding>) -> Self {
        Self { ret, params }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, LoadError> {
        let count = cursor.u8("parameter count")?;
        let ret = TypeEncoding::decode(cursor)?;
        let params = (0..count)
            .map(|_| TypeEncoding::decode(cursor))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ret, params })
    }
}
