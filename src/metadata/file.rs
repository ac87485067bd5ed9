//! Metadata file - loading, validation, and offset-addressed reads
//!
//! Design: the blob is validated once, completely, when it is loaded. Every
//! record reachable from the name index is decoded and bounds-checked, so the
//! read accessors used afterwards never fail. The file is immutable after
//! load and shared as `Arc<MetaFile>`.

use super::encoding::{Signature, TypeEncoding, NONE};
use super::meta::{
    Descriptor, DescriptorId, DescriptorKind, MethodMeta, PropertyMeta, FUNCTION_SIZE,
    INTERFACE_SIZE, METHOD_RECORD_SIZE, PROPERTY_RECORD_SIZE, PROTOCOL_SIZE, STRUCT_SIZE,
};
use crate::errors::LoadError;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const MAGIC: [u8; 4] = *b"MBMD";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 32;

/// Deepest block-in-block nesting a signature may have
const MAX_NESTING: u8 = 16;

static GLOBAL: OnceCell<Arc<MetaFile>> = OnceCell::new();

/// Bounds-checked little-endian reader
#[derive(Clone)]
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: u8,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self {
            bytes,
            pos,
            depth: 0,
        }
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Cursor at another offset, one nesting level deeper
    pub(crate) fn at(&self, offset: usize) -> Result<Self, LoadError> {
        if self.depth >= MAX_NESTING {
            return Err(LoadError::InvalidRecord {
                what: "signature",
                offset,
                reason: "block signatures nest too deeply".to_string(),
            });
        }
        Ok(Self {
            bytes: self.bytes,
            pos: offset,
            depth: self.depth + 1,
        })
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], LoadError> {
        let slice = self
            .pos
            .checked_add(len)
            .and_then(|end| self.bytes.get(self.pos..end))
            .ok_or(LoadError::OutOfBounds {
                what,
                offset: self.pos,
            })?;
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8, LoadError> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16, LoadError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32, LoadError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Length-prefixed UTF-8 string
    pub(crate) fn string(&mut self, what: &'static str) -> Result<&'a str, LoadError> {
        let at = self.pos;
        let len = self.u16(what)? as usize;
        let raw = self.take(len, what)?;
        std::str::from_utf8(raw).map_err(|e| LoadError::InvalidRecord {
            what,
            offset: at,
            reason: e.to_string(),
        })
    }
}

/// Loaded, validated metadata blob
pub struct MetaFile {
    bytes: Vec<u8>,
    version: u16,
    strings: Range<usize>,
    index: Range<usize>,
    descriptors: Range<usize>,
    known: HashSet<u32>,
}

impl MetaFile {
    /// Validate a blob and take ownership of it
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, LoadError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoadError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut header = Cursor::new(&bytes, 0);
        let mut magic = [0u8; 4];
        for byte in &mut magic {
            *byte = header.u8("magic")?;
        }
        if magic != MAGIC {
            return Err(LoadError::BadMagic(magic));
        }

        let version = header.u16("version")?;
        if version != VERSION {
            return Err(LoadError::UnsupportedVersion {
                found: version,
                supported: VERSION,
            });
        }
        header.u16("reserved")?;

        let strings_off = header.u32("string table offset")? as usize;
        let strings_len = header.u32("string table length")? as usize;
        let index_off = header.u32("name index offset")? as usize;
        let desc_off = header.u32("descriptor section offset")? as usize;
        let desc_len = header.u32("descriptor section length")? as usize;
        let total = header.u32("total length")? as usize;

        if total > bytes.len() {
            return Err(LoadError::Truncated {
                expected: total,
                actual: bytes.len(),
            });
        }
        if total < bytes.len() {
            return Err(LoadError::InvalidRecord {
                what: "header",
                offset: 28,
                reason: format!("declares {} bytes but the file has {}", total, bytes.len()),
            });
        }

        let strings = section(strings_off, strings_len, total, "string table")?;
        let descriptors = section(desc_off, desc_len, total, "descriptor section")?;
        let index_count = Cursor::new(&bytes, index_off).u32("name index")? as usize;
        let index_len = index_count
            .checked_mul(8)
            .and_then(|pairs| pairs.checked_add(4))
            .ok_or(LoadError::OutOfBounds {
                what: "name index",
                offset: index_off,
            })?;
        let index = section(index_off, index_len, total, "name index")?;

        let mut file = Self {
            bytes,
            version,
            strings,
            index,
            descriptors,
            known: HashSet::new(),
        };
        file.validate()?;

        debug!(
            event = "metadata_validated",
            bytes = file.bytes.len(),
            descriptors = file.known.len(),
            "metadata validated"
        );
        Ok(file)
    }

    /// Read and validate a metadata file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::from_bytes(bytes)?;
        info!(
            event = "metadata_loaded",
            path = %path.display(),
            bytes = file.bytes.len(),
            types = file.len(),
            "metadata loaded"
        );
        Ok(file)
    }

    /// Load the process-wide metadata once; later calls return the same file
    pub fn init_global(path: impl AsRef<Path>) -> Result<Arc<MetaFile>, LoadError> {
        GLOBAL
            .get_or_try_init(|| Self::load(path).map(Arc::new))
            .map(Arc::clone)
    }

    /// The process-wide metadata, if it has been loaded
    pub fn global() -> Option<Arc<MetaFile>> {
        GLOBAL.get().cloned()
    }

    /// Platform file name, e.g. `metadata-x86_64.bin`
    pub fn default_file_name() -> String {
        format!("metadata-{}.bin", std::env::consts::ARCH)
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of named descriptors
    pub fn len(&self) -> usize {
        (self.index.len() - 4) / 8
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look a type up by name
    pub fn resolve(&self, name: &str) -> Option<Descriptor<'_>> {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (name_off, desc_off) = self.index_entry(mid);
            match self.str_at(name_off).cmp(name) {
                std::cmp::Ordering::Equal => return self.descriptor(DescriptorId(desc_off)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    /// Descriptor at a validated offset
    pub fn descriptor(&self, id: DescriptorId) -> Option<Descriptor<'_>> {
        if self.known.contains(&id.0) {
            Some(Descriptor::at(self, id))
        } else {
            None
        }
    }

    /// Named descriptors in name order
    pub fn descriptors(&self) -> impl Iterator<Item = Descriptor<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.descriptor(DescriptorId(self.index_entry(i).1)))
    }

    /// Methods declared directly on an interface or protocol
    pub fn methods_of<'a>(&'a self, descriptor: &Descriptor<'a>) -> Vec<MethodMeta<'a>> {
        match descriptor {
            Descriptor::Interface(meta) => meta.methods().collect(),
            Descriptor::Protocol(meta) => meta.methods().collect(),
            _ => Vec::new(),
        }
    }

    /// Properties declared directly on an interface or protocol
    pub fn properties_of<'a>(&'a self, descriptor: &Descriptor<'a>) -> Vec<PropertyMeta<'a>> {
        match descriptor {
            Descriptor::Interface(meta) => meta.properties().collect(),
            Descriptor::Protocol(meta) => meta.properties().collect(),
            _ => Vec::new(),
        }
    }

    /// Human-readable spelling of a type encoding
    pub fn type_name(&self, ty: &TypeEncoding) -> String {
        let named = |id: DescriptorId| {
            self.descriptor(id)
                .map_or_else(|| format!("#{:x}", id.0), |d| d.name().to_string())
        };
        match ty {
            TypeEncoding::Void => "void".into(),
            TypeEncoding::Bool => "bool".into(),
            TypeEncoding::I8 => "i8".into(),
            TypeEncoding::I16 => "i16".into(),
            TypeEncoding::I32 => "i32".into(),
            TypeEncoding::I64 => "i64".into(),
            TypeEncoding::U8 => "u8".into(),
            TypeEncoding::U16 => "u16".into(),
            TypeEncoding::U32 => "u32".into(),
            TypeEncoding::U64 => "u64".into(),
            TypeEncoding::F32 => "f32".into(),
            TypeEncoding::F64 => "f64".into(),
            TypeEncoding::String => "string".into(),
            TypeEncoding::Class => "class".into(),
            TypeEncoding::Pointer => "pointer".into(),
            TypeEncoding::Object(None) => "id".into(),
            TypeEncoding::Object(Some(id)) => format!("id<{}>", named(*id)),
            TypeEncoding::Struct(id) => format!("struct<{}>", named(*id)),
            TypeEncoding::Block(sig) => format!("block<{}>", self.signature_text(sig)),
        }
    }

    /// `ret(param, param)` spelling of a signature
    pub fn signature_text(&self, sig: &Signature) -> String {
        let params: Vec<String> = sig.params.iter().map(|p| self.type_name(p)).collect();
        format!("{}({})", self.type_name(&sig.ret), params.join(", "))
    }

    // Reads below run on a validated file and cannot fail; they fall back
    // to zero values instead of panicking.

    fn index_entry(&self, i: usize) -> (u32, u32) {
        let at = self.index.start + 4 + i * 8;
        (self.u32_at(at), self.u32_at(at + 4))
    }

    #[inline]
    pub(crate) fn u8_at(&self, offset: usize) -> u8 {
        self.bytes.get(offset).copied().unwrap_or(0)
    }

    #[inline]
    pub(crate) fn u32_at(&self, offset: usize) -> u32 {
        Cursor::new(&self.bytes, offset).u32("u32").unwrap_or(NONE)
    }

    pub(crate) fn str_at(&self, offset: u32) -> &str {
        Cursor::new(&self.bytes, offset as usize)
            .string("string")
            .unwrap_or("")
    }

    /// Entries of a `count + offsets` list (`NONE` is the empty list)
    pub(crate) fn list_at(&self, offset: u32) -> impl Iterator<Item = u32> + '_ {
        let (start, count) = if offset == NONE {
            (0, 0)
        } else {
            (offset as usize + 4, self.u32_at(offset as usize) as usize)
        };
        (0..count).map(move |i| self.u32_at(start + i * 4))
    }

    pub(crate) fn signature_at(&self, offset: u32) -> Signature {
        Signature::decode(&mut Cursor::new(&self.bytes, offset as usize))
            .unwrap_or_else(|_| Signature::new(TypeEncoding::Void, Vec::new()))
    }

    pub(crate) fn type_at(&self, offset: usize) -> TypeEncoding {
        TypeEncoding::decode(&mut Cursor::new(&self.bytes, offset)).unwrap_or(TypeEncoding::Void)
    }

    /// Walk every record reachable from the name index
    fn validate(&mut self) -> Result<(), LoadError> {
        let mut pending = Vec::with_capacity(self.len());
        let mut previous: Option<&str> = None;

        for i in 0..self.len() {
            let (name_off, desc_off) = self.index_entry(i);
            let name = self.checked_string(name_off, "type name")?;
            if previous.is_some_and(|prev| prev >= name) {
                return Err(LoadError::InvalidRecord {
                    what: "name index",
                    offset: self.index.start + 4 + i * 8,
                    reason: format!("'{}' is out of order or duplicated", name),
                });
            }
            previous = Some(name);
            pending.push(desc_off);
        }

        let mut known = HashSet::with_capacity(pending.len());
        while let Some(offset) = pending.pop() {
            if known.insert(offset) {
                self.validate_descriptor(offset, &mut pending)?;
            }
        }
        self.known = known;
        Ok(())
    }

    fn validate_descriptor(&self, offset: u32, pending: &mut Vec<u32>) -> Result<(), LoadError> {
        self.in_descriptors(offset, 8, "descriptor")?;
        let mut cursor = Cursor::new(&self.bytes, offset as usize);
        let tag = cursor.u8("descriptor kind")?;
        let kind = DescriptorKind::from_tag(tag).ok_or(LoadError::UnknownTag {
            what: "descriptor",
            tag,
            offset: offset as usize,
        })?;
        cursor.u8("descriptor flags")?;
        cursor.u16("reserved")?;
        self.checked_string(cursor.u32("descriptor name")?, "descriptor name")?;

        let size = match kind {
            DescriptorKind::Interface => INTERFACE_SIZE,
            DescriptorKind::Protocol => PROTOCOL_SIZE,
            DescriptorKind::Struct => STRUCT_SIZE,
            DescriptorKind::Function => FUNCTION_SIZE,
        };
        self.in_descriptors(offset, size, "descriptor")?;

        match kind {
            DescriptorKind::Interface | DescriptorKind::Protocol => {
                if kind == DescriptorKind::Interface {
                    let base = cursor.u32("base class")?;
                    if base != NONE {
                        pending.push(base);
                    }
                }
                pending.extend(self.checked_list(cursor.u32("protocols")?)?);
                for method in self.checked_list(cursor.u32("methods")?)? {
                    self.validate_method(method, pending)?;
                }
                for property in self.checked_list(cursor.u32("properties")?)? {
                    self.validate_property(property, pending)?;
                }
            }
            DescriptorKind::Struct => {
                for field in self.checked_list(cursor.u32("fields")?)? {
                    self.in_descriptors(field, 5, "struct field")?;
                    let mut field_cursor = Cursor::new(&self.bytes, field as usize);
                    self.checked_string(field_cursor.u32("field name")?, "field name")?;
                    let ty = TypeEncoding::decode(&mut field_cursor)?;
                    collect_refs(&ty, pending);
                }
            }
            DescriptorKind::Function => {
                self.checked_signature(cursor.u32("function signature")?, pending)?;
            }
        }
        Ok(())
    }

    fn validate_method(&self, offset: u32, pending: &mut Vec<u32>) -> Result<(), LoadError> {
        self.in_descriptors(offset, METHOD_RECORD_SIZE, "method")?;
        let mut cursor = Cursor::new(&self.bytes, offset as usize);
        self.checked_string(cursor.u32("method name")?, "method name")?;
        self.checked_string(cursor.u32("selector")?, "selector")?;
        cursor.u32("method flags")?;
        self.checked_signature(cursor.u32("method signature")?, pending)
    }

    fn validate_property(&self, offset: u32, pending: &mut Vec<u32>) -> Result<(), LoadError> {
        self.in_descriptors(offset, PROPERTY_RECORD_SIZE, "property")?;
        let mut cursor = Cursor::new(&self.bytes, offset as usize);
        self.checked_string(cursor.u32("property name")?, "property name")?;
        cursor.u32("property flags")?;
        for accessor in [cursor.u32("getter")?, cursor.u32("setter")?] {
            if accessor != NONE {
                self.validate_method(accessor, pending)?;
            }
        }
        let ty = TypeEncoding::decode(&mut cursor)?;
        collect_refs(&ty, pending);
        Ok(())
    }

    fn checked_signature(&self, offset: u32, pending: &mut Vec<u32>) -> Result<(), LoadError> {
        self.in_descriptors(offset, 2, "signature")?;
        let sig = Signature::decode(&mut Cursor::new(&self.bytes, offset as usize))?;
        collect_refs(&sig.ret, pending);
        for param in &sig.params {
            collect_refs(param, pending);
        }
        Ok(())
    }

    fn checked_string(&self, offset: u32, what: &'static str) -> Result<&str, LoadError> {
        let start = offset as usize;
        let mut cursor = Cursor::new(&self.bytes, start);
        let text = cursor.string(what)?;
        if start < self.strings.start || cursor.position() > self.strings.end {
            return Err(LoadError::OutOfBounds {
                what,
                offset: start,
            });
        }
        Ok(text)
    }

    fn checked_list(&self, offset: u32) -> Result<Vec<u32>, LoadError> {
        if offset == NONE {
            return Ok(Vec::new());
        }
        self.in_descriptors(offset, 4, "list")?;
        let mut cursor = Cursor::new(&self.bytes, offset as usize);
        let count = cursor.u32("list length")? as usize;
        self.in_descriptors(offset, 4 + count.saturating_mul(4), "list")?;
        (0..count).map(|_| cursor.u32("list entry")).collect()
    }

    fn in_descriptors(&self, offset: u32, len: usize, what: &'static str) -> Result<(), LoadError> {
        let start = offset as usize;
        let fits = start >= self.descriptors.start
            && start
                .checked_add(len)
                .is_some_and(|end| end <= self.descriptors.end);
        if fits {
            Ok(())
        } else {
            Err(LoadError::OutOfBounds {
                what,
                offset: start,
            })
        }
    }
}

impl std::fmt::Debug for MetaFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaFile")
            .field("version", &self.version)
            .field("bytes", &self.bytes.len())
            .field("types", &self.len())
            .finish()
    }
}

fn section(offset: usize, len: usize, total: usize, what: &'static str) -> Result<Range<usize>, LoadError> {
    match offset.checked_add(len) {
        Some(end) if offset >= HEADER_SIZE && end <= total => Ok(offset..end),
        _ => Err(LoadError::OutOfBounds { what, offset }),
    }
}

/// Queue the descriptors a type encoding refers to
fn collect_refs(ty: &TypeEncoding, pending: &mut Vec<u32>) {
    match ty {
        TypeEncoding::Object(Some(id)) | TypeEncoding::Struct(id) => pending.push(id.0),
        TypeEncoding::Block(sig) => {
            collect_refs(&sig.ret, pending);
            for param in &sig.params {
                collect_refs(param, pending);
            }
        }
        _ => {}
    }
}
