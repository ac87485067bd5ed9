//! Descriptor views - read-only windows onto records in a `MetaFile`
//!
//! Every descriptor record starts with `kind u8, flags u8, reserved u16,
//! name u32`. The kind-specific fields follow:
//!
//! - Interface: `base u32, protocols u32, methods u32, properties u32`
//! - Protocol: `protocols u32, methods u32, properties u32`
//! - Struct: `fields u32` (each field is `name u32` + inline type)
//! - Function: `signature u32`
//!
//! Method records are `name u32, selector u32, flags u32, signature u32`.
//! Property records are `name u32, flags u32, getter u32, setter u32` followed
//! by the inline property type.

use super::encoding::{Signature, TypeEncoding, NONE};
use super::file::MetaFile;
use serde::{Deserialize, Serialize};
use std::fmt;

pub(crate) const HEADER_FIELDS: usize = 8;
pub(crate) const INTERFACE_SIZE: usize = HEADER_FIELDS + 16;
pub(crate) const PROTOCOL_SIZE: usize = HEADER_FIELDS + 12;
pub(crate) const STRUCT_SIZE: usize = HEADER_FIELDS + 4;
pub(crate) const FUNCTION_SIZE: usize = HEADER_FIELDS + 4;
pub(crate) const METHOD_RECORD_SIZE: usize = 16;
pub(crate) const PROPERTY_RECORD_SIZE: usize = 17;

pub const METHOD_STATIC: u8 = 1 << 0;
pub const METHOD_OWNS_RETURN: u8 = 1 << 1;
pub const METHOD_INITIALIZER: u8 = 1 << 2;
pub const METHOD_OPTIONAL: u8 = 1 << 3;

pub const PROPERTY_STATIC: u8 = 1 << 0;
pub const PROPERTY_READONLY: u8 = 1 << 1;

/// Stable identity of a descriptor: its absolute offset in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DescriptorId(pub(crate) u32);

impl DescriptorId {
    #[inline]
    pub const fn offset(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DescriptorKind {
    Interface = 1,
    Protocol = 2,
    Struct = 3,
    Function = 4,
}

impl DescriptorKind {
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Interface),
            2 => Some(Self::Protocol),
            3 => Some(Self::Struct),
            4 => Some(Self::Function),
            _ => None,
        }
    }
}

/// One foreign type
#[derive(Clone, Copy)]
pub enum Descriptor<'a> {
    Interface(InterfaceMeta<'a>),
    Protocol(ProtocolMeta<'a>),
    Struct(StructMeta<'a>),
    Function(FunctionMeta<'a>),
}

impl<'a> Descriptor<'a> {
    pub(crate) fn at(file: &'a MetaFile, id: DescriptorId) -> Self {
        let record = Record { file, offset: id.0 };
        match DescriptorKind::from_tag(file.u8_at(id.0 as usize)) {
            Some(DescriptorKind::Protocol) => Self::Protocol(ProtocolMeta(record)),
            Some(DescriptorKind::Struct) => Self::Struct(StructMeta(record)),
            Some(DescriptorKind::Function) => Self::Function(FunctionMeta(record)),
            _ => Self::Interface(InterfaceMeta(record)),
        }
    }

    fn record(&self) -> Record<'a> {
        match self {
            Self::Interface(m) => m.0,
            Self::Protocol(m) => m.0,
            Self::Struct(m) => m.0,
            Self::Function(m) => m.0,
        }
    }

    #[inline]
    pub fn id(&self) -> DescriptorId {
        DescriptorId(self.record().offset)
    }

    #[inline]
    pub fn name(&self) -> &'a str {
        self.record().name()
    }

    pub fn kind(&self) -> DescriptorKind {
        match self {
            Self::Interface(_) => DescriptorKind::Interface,
            Self::Protocol(_) => DescriptorKind::Protocol,
            Self::Struct(_) => DescriptorKind::Struct,
            Self::Function(_) => DescriptorKind::Function,
        }
    }
}

impl fmt::Debug for Descriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({} {})", self.kind(), self.name(), self.id())
    }
}

#[derive(Clone, Copy)]
struct Record<'a> {
    file: &'a MetaFile,
    offset: u32,
}

impl<'a> Record<'a> {
    #[inline]
    fn field(&self, index: usize) -> u32 {
        self.file.u32_at(self.offset as usize + HEADER_FIELDS + index * 4)
    }

    fn name(&self) -> &'a str {
        self.file.str_at(self.file.u32_at(self.offset as usize + 4))
    }

    fn ids(&self, index: usize) -> impl Iterator<Item = DescriptorId> + 'a {
        self.file.list_at(self.field(index)).map(DescriptorId)
    }

    fn methods(&self, index: usize) -> impl Iterator<Item = MethodMeta<'a>> + 'a {
        let file = self.file;
        file.list_at(self.field(index))
            .map(move |offset| MethodMeta { file, offset })
    }

    fn properties(&self, index: usize) -> impl Iterator<Item = PropertyMeta<'a>> + 'a {
        let file = self.file;
        file.list_at(self.field(index))
            .map(move |offset| PropertyMeta { file, offset })
    }
}

/// Class declaration
#[derive(Clone, Copy)]
pub struct InterfaceMeta<'a>(Record<'a>);

impl<'a> InterfaceMeta<'a> {
    pub fn name(&self) -> &'a str {
        self.0.name()
    }

    pub fn base(&self) -> Option<DescriptorId> {
        match self.0.field(0) {
            NONE => None,
            offset => Some(DescriptorId(offset)),
        }
    }

    pub fn protocols(&self) -> impl Iterator<Item = DescriptorId> + 'a {
        self.0.ids(1)
    }

    pub fn methods(&self) -> impl Iterator<Item = MethodMeta<'a>> + 'a {
        self.0.methods(2)
    }

    pub fn properties(&self) -> impl Iterator<Item = PropertyMeta<'a>> + 'a {
        self.0.properties(3)
    }
}

/// Protocol declaration
#[derive(Clone, Copy)]
pub struct ProtocolMeta<'a>(Record<'a>);

impl<'a> ProtocolMeta<'a> {
    pub fn name(&self) -> &'a str {
        self.0.name()
    }

    pub fn protocols(&self) -> impl Iterator<Item = DescriptorId> + 'a {
        self.0.ids(0)
    }

    pub fn methods(&self) -> impl Iterator<Item = MethodMeta<'a>> + 'a {
        self.0.methods(1)
    }

    pub fn properties(&self) -> impl Iterator<Item = PropertyMeta<'a>> + 'a {
        self.0.properties(2)
    }
}

/// Structure declaration
#[derive(Clone, Copy)]
pub struct StructMeta<'a>(Record<'a>);

/// One structure field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMeta<'a> {
    pub name: &'a str,
    pub ty: TypeEncoding,
}

impl<'a> StructMeta<'a> {
    pub fn name(&self) -> &'a str {
        self.0.name()
    }

    /// Fields in declaration order
    pub fn fields(&self) -> Vec<FieldMeta<'a>> {
        let file = self.0.file;
        file.list_at(self.0.field(0))
            .map(|offset| FieldMeta {
                name: file.str_at(file.u32_at(offset as usize)),
                ty: file.type_at(offset as usize + 4),
            })
            .collect()
    }
}

/// Plain C function declaration
#[derive(Clone, Copy)]
pub struct FunctionMeta<'a>(Record<'a>);

impl<'a> FunctionMeta<'a> {
    pub fn name(&self) -> &'a str {
        self.0.name()
    }

    pub fn signature(&self) -> Signature {
        self.0.file.signature_at(self.0.field(0))
    }
}

/// Method record
#[derive(Clone, Copy)]
pub struct MethodMeta<'a> {
    file: &'a MetaFile,
    offset: u32,
}

impl<'a> MethodMeta<'a> {
    /// Name scripting code calls the method by
    pub fn name(&self) -> &'a str {
        self.file.str_at(self.file.u32_at(self.offset as usize))
    }

    pub fn selector(&self) -> &'a str {
        self.file.str_at(self.file.u32_at(self.offset as usize + 4))
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.file.u8_at(self.offset as usize + 8)
    }

    pub fn is_static(&self) -> bool {
        self.flags() & METHOD_STATIC != 0
    }

    /// The caller receives a +1 reference to the returned object
    pub fn owns_return(&self) -> bool {
        self.flags() & METHOD_OWNS_RETURN != 0
    }

    pub fn is_initializer(&self) -> bool {
        self.flags() & METHOD_INITIALIZER != 0
    }

    pub fn is_optional(&self) -> bool {
        self.flags() & METHOD_OPTIONAL != 0
    }

    pub fn signature(&self) -> Signature {
        self.file
            .signature_at(self.file.u32_at(self.offset as usize + 12))
    }
}

impl fmt::Debug for MethodMeta<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodMeta({} -> {})", self.name(), self.selector())
    }
}

/// Property record
#[derive(Clone, Copy)]
pub struct PropertyMeta<'a> {
    file: &'a MetaFile,
    offset: u32,
}

impl<'a> PropertyMeta<'a> {
    pub fn name(&self) -> &'a str {
        self.file.str_at(self.file.u32_at(self.offset as usize))
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.file.u8_at(self.offset as usize + 4)
    }

    pub fn is_static(&self) -> bool {
        self.flags() & PROPERTY_STATIC != 0
    }

    pub fn is_readonly(&self) -> bool {
        self.flags() & PROPERTY_READONLY != 0
    }

    pub fn ty(&self) -> TypeEncoding {
        self.file.type_at(self.offset as usize + 16)
    }

    pub fn getter(&self) -> Option<MethodMeta<'a>> {
        self.accessor(8)
    }

    pub fn setter(&self) -> Option<MethodMeta<'a>> {
        self.accessor(12)
    }

    fn accessor(&self, at: usize) -> Option<MethodMeta<'a>> {
        match self.file.u32_at(self.offset as usize + at) {
            NONE => None,
            offset => Some(MethodMeta {
                file: self.file,
                offset,
            }),
        }
    }
}

impl fmt::Debug for PropertyMeta<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyMeta({})", self.name())
    }
}
