//! Type universe schema - the serde description compiled into metadata blobs
//!
//! Types are written as strings: primitives (`void`, `bool`, `i8`..`u64`,
//! `f32`, `f64`, `string`, `class`, `pointer`), `id` or `id<Name>` for
//! objects, `struct<Name>` for structures, and `block<ret(param, ...)>` for
//! blocks.
//!
//! Design: encoding is two-pass. Every string is interned first so the string
//! table size is known; descriptor records have a fixed size per kind, so all
//! descriptor offsets are assigned before any variable-length data (lists,
//! methods, signatures) is written behind them.

use super::encoding::{Signature, TypeEncoding, NONE};
use super::file::{HEADER_SIZE, MAGIC, VERSION};
use super::meta::{
    DescriptorId, DescriptorKind, FUNCTION_SIZE, INTERFACE_SIZE, METHOD_INITIALIZER,
    METHOD_OPTIONAL, METHOD_OWNS_RETURN, METHOD_STATIC, PROPERTY_READONLY, PROPERTY_STATIC,
    PROTOCOL_SIZE, STRUCT_SIZE,
};
use crate::errors::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Complete description of a foreign type universe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeUniverse {
    #[serde(default)]
    pub interfaces: Vec<InterfaceSchema>,
    #[serde(default)]
    pub protocols: Vec<ProtocolSchema>,
    #[serde(default)]
    pub structs: Vec<StructSchema>,
    #[serde(default)]
    pub functions: Vec<FunctionSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSchema {
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodSchema>,
    #[serde(default)]
    pub properties: Vec<PropertySchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSchema {
    pub name: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodSchema>,
    #[serde(default)]
    pub properties: Vec<PropertySchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSchema {
    /// Scripting-side name
    pub name: String,
    pub selector: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "void")]
    pub returns: String,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub owns_return: bool,
    #[serde(default)]
    pub initializer: bool,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub readonly: bool,
    /// Getter selector, defaults to the property name
    #[serde(default)]
    pub getter: Option<String>,
    /// Setter selector, defaults to `setName:`
    #[serde(default)]
    pub setter: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructSchema {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default = "void")]
    pub returns: String,
}

fn void() -> String {
    "void".to_string()
}

impl MethodSchema {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            params: Vec::new(),
            returns: void(),
            is_static: false,
            owns_return: false,
            initializer: false,
            optional: false,
        }
    }

    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.returns = ty.into();
        self
    }

    pub fn class_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn owning(mut self) -> Self {
        self.owns_return = true;
        self
    }

    pub fn initializer(mut self) -> Self {
        self.initializer = true;
        self
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.is_static {
            flags |= METHOD_STATIC;
        }
        if self.owns_return {
            flags |= METHOD_OWNS_RETURN;
        }
        if self.initializer {
            flags |= METHOD_INITIALIZER;
        }
        if self.optional {
            flags |= METHOD_OPTIONAL;
        }
        flags
    }
}

impl PropertySchema {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            is_static: false,
            readonly: false,
            getter: None,
            setter: None,
        }
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn class_property(mut self) -> Self {
        self.is_static = true;
        self
    }

    fn getter_selector(&self) -> String {
        self.getter.clone().unwrap_or_else(|| self.name.clone())
    }

    fn setter_selector(&self) -> String {
        self.setter.clone().unwrap_or_else(|| {
            let mut chars = self.name.chars();
            let capitalized: String = chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect())
                .unwrap_or_default();
            format!("set{}:", capitalized)
        })
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.is_static {
            flags |= PROPERTY_STATIC;
        }
        if self.readonly {
            flags |= PROPERTY_READONLY;
        }
        flags
    }
}

impl TypeUniverse {
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Compile into the binary metadata format
    pub fn encode(&self) -> Result<Vec<u8>, SchemaError> {
        Encoder::new(self)?.finish()
    }
}

/// Type reference with names not yet resolved to offsets
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Primitive(TypeEncoding),
    Object(Option<String>),
    Struct(String),
    Block(Box<TypeRef>, Vec<TypeRef>),
}

/// Parse a type string such as `block<void(id<Shape>, i32)>`
pub fn parse_type(text: &str) -> Result<TypeRef, SchemaError> {
    let mut parser = TypeParser { text, pos: 0 };
    let ty = parser.parse()?;
    parser.skip_ws();
    if parser.pos != text.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(ty)
}

struct TypeParser<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> TypeParser<'t> {
    fn error(&self, reason: &str) -> SchemaError {
        SchemaError::BadType {
            text: self.text.to_string(),
            reason: format!("{} at column {}", reason, self.pos + 1),
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: char) -> bool {
        self.skip_ws();
        if self.text[self.pos..].starts_with(token) {
            self.pos += token.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: char) -> Result<(), SchemaError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", token)))
        }
    }

    fn ident(&mut self) -> Result<&'t str, SchemaError> {
        self.skip_ws();
        let text = self.text;
        let rest = &text[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a type name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn parse(&mut self) -> Result<TypeRef, SchemaError> {
        let word = self.ident()?;
        let primitive = match word {
            "void" => TypeEncoding::Void,
            "bool" => TypeEncoding::Bool,
            "i8" => TypeEncoding::I8,
            "i16" => TypeEncoding::I16,
            "i32" => TypeEncoding::I32,
            "i64" => TypeEncoding::I64,
            "u8" => TypeEncoding::U8,
            "u16" => TypeEncoding::U16,
            "u32" => TypeEncoding::U32,
            "u64" => TypeEncoding::U64,
            "f32" => TypeEncoding::F32,
            "f64" => TypeEncoding::F64,
            "string" => TypeEncoding::String,
            "class" => TypeEncoding::Class,
            "pointer" => TypeEncoding::Pointer,
            "id" => {
                if self.eat('<') {
                    let name = self.ident()?.to_string();
                    self.expect('>')?;
                    return Ok(TypeRef::Object(Some(name)));
                }
                return Ok(TypeRef::Object(None));
            }
            "struct" => {
                self.expect('<')?;
                let name = self.ident()?.to_string();
                self.expect('>')?;
                return Ok(TypeRef::Struct(name));
            }
            "block" => {
                self.expect('<')?;
                let ret = self.parse()?;
                self.expect('(')?;
                let mut params = Vec::new();
                if !self.eat(')') {
                    loop {
                        params.push(self.parse()?);
                        if self.eat(')') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                self.expect('>')?;
                return Ok(TypeRef::Block(Box::new(ret), params));
            }
            other => return Err(SchemaError::UnknownType(other.to_string())),
        };
        Ok(TypeRef::Primitive(primitive))
    }
}

/// Declaration in the order descriptors are laid out
#[derive(Clone, Copy)]
enum Decl<'u> {
    Interface(&'u InterfaceSchema),
    Protocol(&'u ProtocolSchema),
    Struct(&'u StructSchema),
    Function(&'u FunctionSchema),
}

impl<'u> Decl<'u> {
    fn name(&self) -> &'u str {
        match *self {
            Decl::Interface(d) => &d.name,
            Decl::Protocol(d) => &d.name,
            Decl::Struct(d) => &d.name,
            Decl::Function(d) => &d.name,
        }
    }

    fn kind(&self) -> DescriptorKind {
        match self {
            Decl::Interface(_) => DescriptorKind::Interface,
            Decl::Protocol(_) => DescriptorKind::Protocol,
            Decl::Struct(_) => DescriptorKind::Struct,
            Decl::Function(_) => DescriptorKind::Function,
        }
    }

    fn record_size(&self) -> usize {
        match self.kind() {
            DescriptorKind::Interface => INTERFACE_SIZE,
            DescriptorKind::Protocol => PROTOCOL_SIZE,
            DescriptorKind::Struct => STRUCT_SIZE,
            DescriptorKind::Function => FUNCTION_SIZE,
        }
    }
}

struct Encoder<'u> {
    decls: Vec<Decl<'u>>,
    offsets: HashMap<&'u str, u32>,
    strings: Vec<u8>,
    string_offsets: HashMap<String, u32>,
    strings_start: u32,
    desc_start: u32,
    section: Vec<u8>,
}

impl<'u> Encoder<'u> {
    fn new(universe: &'u TypeUniverse) -> Result<Self, SchemaError> {
        let decls: Vec<Decl<'u>> = universe
            .interfaces
            .iter()
            .map(Decl::Interface)
            .chain(universe.protocols.iter().map(Decl::Protocol))
            .chain(universe.structs.iter().map(Decl::Struct))
            .chain(universe.functions.iter().map(Decl::Function))
            .collect();

        let mut encoder = Self {
            decls: Vec::new(),
            offsets: HashMap::new(),
            strings: Vec::new(),
            string_offsets: HashMap::new(),
            strings_start: HEADER_SIZE as u32,
            desc_start: 0,
            section: Vec::new(),
        };

        for decl in &decls {
            encoder.intern_decl(decl)?;
        }

        let index_len = 4 + 8 * decls.len() as u32;
        encoder.desc_start = encoder.strings_start + encoder.strings.len() as u32 + index_len;

        let mut cursor = encoder.desc_start;
        for decl in &decls {
            let name = decl.name();
            if encoder.offsets.insert(name, cursor).is_some() {
                return Err(SchemaError::Duplicate(name.to_string()));
            }
            cursor += decl.record_size() as u32;
        }
        encoder.section = vec![0; (cursor - encoder.desc_start) as usize];
        encoder.decls = decls;
        Ok(encoder)
    }

    fn intern_decl(&mut self, decl: &Decl<'_>) -> Result<(), SchemaError> {
        self.intern(decl.name())?;
        let (methods, properties): (&[MethodSchema], &[PropertySchema]) = match decl {
            Decl::Interface(d) => (d.methods.as_slice(), d.properties.as_slice()),
            Decl::Protocol(d) => (d.methods.as_slice(), d.properties.as_slice()),
            Decl::Struct(d) => {
                for field in &d.fields {
                    self.intern(&field.name)?;
                }
                (&[][..], &[][..])
            }
            Decl::Function(_) => (&[][..], &[][..]),
        };
        for method in methods {
            self.intern(&method.name)?;
            self.intern(&method.selector)?;
        }
        for property in properties {
            self.intern(&property.name)?;
            self.intern(&property.getter_selector())?;
            if !property.readonly {
                self.intern(&property.setter_selector())?;
            }
        }
        Ok(())
    }

    fn intern(&mut self, text: &str) -> Result<u32, SchemaError> {
        if let Some(&offset) = self.string_offsets.get(text) {
            return Ok(offset);
        }
        let len = u16::try_from(text.len()).map_err(|_| SchemaError::TooMany {
            name: text.chars().take(32).collect(),
            what: "bytes",
            count: text.len(),
        })?;
        let offset = self.strings_start + self.strings.len() as u32;
        self.strings.extend_from_slice(&len.to_le_bytes());
        self.strings.extend_from_slice(text.as_bytes());
        self.string_offsets.insert(text.to_string(), offset);
        Ok(offset)
    }

    fn string(&self, text: &str) -> u32 {
        self.string_offsets.get(text).copied().unwrap_or(NONE)
    }

    /// Absolute offset of the next appended byte
    fn here(&self) -> u32 {
        self.desc_start + self.section.len() as u32
    }

    fn patch(&mut self, at: u32, value: u32) {
        let local = (at - self.desc_start) as usize;
        self.section[local..local + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn push_u32(&mut self, value: u32) {
        self.section.extend_from_slice(&value.to_le_bytes());
    }

    fn push_list(&mut self, entries: &[u32]) -> u32 {
        let at = self.here();
        self.push_u32(entries.len() as u32);
        for &entry in entries {
            self.push_u32(entry);
        }
        at
    }

    fn named(&self, name: &str, kind: Option<DescriptorKind>) -> Result<u32, SchemaError> {
        let found = self.decls.iter().find(|d| d.name() == name);
        match found {
            Some(decl) if kind.map_or(true, |k| decl.kind() == k) => {
                Ok(self.offsets.get(name).copied().unwrap_or(NONE))
            }
            _ => Err(SchemaError::UnknownType(name.to_string())),
        }
    }

    fn resolve(&self, ty: &TypeRef) -> Result<TypeEncoding, SchemaError> {
        Ok(match ty {
            TypeRef::Primitive(p) => p.clone(),
            TypeRef::Object(None) => TypeEncoding::Object(None),
            TypeRef::Object(Some(name)) => {
                TypeEncoding::Object(Some(DescriptorId(self.named(name, None)?)))
            }
            TypeRef::Struct(name) => {
                TypeEncoding::Struct(DescriptorId(self.named(name, Some(DescriptorKind::Struct))?))
            }
            TypeRef::Block(ret, params) => TypeEncoding::Block(Box::new(Signature::new(
                self.resolve(ret)?,
                params.iter().map(|p| self.resolve(p)).collect::<Result<_, _>>()?,
            ))),
        })
    }

    fn resolve_text(&self, text: &str) -> Result<TypeEncoding, SchemaError> {
        self.resolve(&parse_type(text)?)
    }

    /// Append a type's inline form, placing nested block signatures first
    fn inline_type(&mut self, ty: &TypeEncoding) -> Vec<u8> {
        let block = match ty {
            TypeEncoding::Block(sig) => Some(self.push_signature(sig)),
            _ => None,
        };
        let mut out = Vec::with_capacity(5);
        ty.encode_inline(block, &mut out);
        out
    }

    fn push_signature(&mut self, sig: &Signature) -> u32 {
        let inline: Vec<Vec<u8>> = std::iter::once(&sig.ret)
            .chain(sig.params.iter())
            .map(|ty| self.inline_type(ty))
            .collect();
        let at = self.here();
        self.section.push(sig.params.len() as u8);
        for bytes in inline {
            self.section.extend_from_slice(&bytes);
        }
        at
    }

    fn signature_of(&self, owner: &str, params: &[String], returns: &str) -> Result<Signature, SchemaError> {
        if params.len() > u8::MAX as usize {
            return Err(SchemaError::TooMany {
                name: owner.to_string(),
                what: "parameters",
                count: params.len(),
            });
        }
        Ok(Signature::new(
            self.resolve_text(returns)?,
            params
                .iter()
                .map(|p| self.resolve_text(p))
                .collect::<Result<_, _>>()?,
        ))
    }

    fn push_method(&mut self, name: &str, selector: &str, flags: u8, sig: &Signature) -> u32 {
        let sig_at = self.push_signature(sig);
        let at = self.here();
        self.push_u32(self.string(name));
        self.push_u32(self.string(selector));
        self.push_u32(flags as u32);
        self.push_u32(sig_at);
        at
    }

    fn push_methods(&mut self, owner: &str, methods: &[MethodSchema]) -> Result<u32, SchemaError> {
        let mut records = Vec::with_capacity(methods.len());
        for method in methods {
            let sig = self.signature_of(owner, &method.params, &method.returns)?;
            records.push(self.push_method(&method.name, &method.selector, method.flags(), &sig));
        }
        Ok(self.push_list(&records))
    }

    fn push_properties(&mut self, properties: &[PropertySchema]) -> Result<u32, SchemaError> {
        let mut records = Vec::with_capacity(properties.len());
        for property in properties {
            let ty = self.resolve_text(&property.ty)?;
            let accessor_flags = if property.is_static { METHOD_STATIC } else { 0 };

            let getter_sig = Signature::new(ty.clone(), Vec::new());
            let getter = self.push_method(
                &property.name,
                &property.getter_selector(),
                accessor_flags,
                &getter_sig,
            );
            let setter = if property.readonly {
                NONE
            } else {
                let setter_sig = Signature::new(TypeEncoding::Void, vec![ty.clone()]);
                self.push_method(
                    &property.name,
                    &property.setter_selector(),
                    accessor_flags,
                    &setter_sig,
                )
            };

            let inline = self.inline_type(&ty);
            let at = self.here();
            self.push_u32(self.string(&property.name));
            self.push_u32(property.flags() as u32);
            self.push_u32(getter);
            self.push_u32(setter);
            self.section.extend_from_slice(&inline);
            records.push(at);
        }
        Ok(self.push_list(&records))
    }

    fn protocol_list(&mut self, names: &[String]) -> Result<u32, SchemaError> {
        let ids = names
            .iter()
            .map(|name| self.named(name, Some(DescriptorKind::Protocol)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.push_list(&ids))
    }

    fn finish(mut self) -> Result<Vec<u8>, SchemaError> {
        let mut records = Vec::with_capacity(self.decls.len());

        for i in 0..self.decls.len() {
            let decl = self.decls[i];
            let (name, kind) = (decl.name(), decl.kind());
            let at = self.offsets.get(name).copied().unwrap_or(NONE);
            let fields: Vec<u32> = match decl {
                Decl::Interface(d) => {
                    let base = match &d.base {
                        Some(base) => self.named(base, Some(DescriptorKind::Interface))?,
                        None => NONE,
                    };
                    let protocols = self.protocol_list(&d.protocols)?;
                    let methods = self.push_methods(&d.name, &d.methods)?;
                    let properties = self.push_properties(&d.properties)?;
                    vec![base, protocols, methods, properties]
                }
                Decl::Protocol(d) => {
                    let protocols = self.protocol_list(&d.protocols)?;
                    let methods = self.push_methods(&d.name, &d.methods)?;
                    let properties = self.push_properties(&d.properties)?;
                    vec![protocols, methods, properties]
                }
                Decl::Struct(d) => {
                    let mut entries = Vec::with_capacity(d.fields.len());
                    for field in &d.fields {
                        let ty = self.resolve_text(&field.ty)?;
                        let inline = self.inline_type(&ty);
                        entries.push(self.here());
                        self.push_u32(self.string(&field.name));
                        self.section.extend_from_slice(&inline);
                    }
                    vec![self.push_list(&entries)]
                }
                Decl::Function(d) => {
                    let sig = self.signature_of(&d.name, &d.params, &d.returns)?;
                    vec![self.push_signature(&sig)]
                }
            };
            records.push((at, kind, self.string(name), fields));
        }

        for (at, kind, name, fields) in records {
            let local = (at - self.desc_start) as usize;
            self.section[local] = kind as u8;
            self.patch(at + 4, name);
            for (i, value) in fields.into_iter().enumerate() {
                self.patch(at + 8 + 4 * i as u32, value);
            }
        }

        self.assemble()
    }

    fn assemble(self) -> Result<Vec<u8>, SchemaError> {
        let sorted: BTreeMap<&str, u32> = self.offsets.iter().map(|(k, v)| (*k, *v)).collect();
        let index_start = self.strings_start + self.strings.len() as u32;
        let total = self.desc_start as usize + self.section.len();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        for value in [
            self.strings_start,
            self.strings.len() as u32,
            index_start,
            self.desc_start,
            self.section.len() as u32,
            total as u32,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.resize(HEADER_SIZE, 0);

        out.extend_from_slice(&self.strings);
        out.extend_from_slice(&(sorted.len() as u32).to_le_bytes());
        for (name, desc) in &sorted {
            out.extend_from_slice(&self.string(name).to_le_bytes());
            out.extend_from_slice(&desc.to_le_bytes());
        }
        out.extend_from_slice(&self.section);
        Ok(out)
    }
}
