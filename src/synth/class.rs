//! Synthesized classes - the merged dispatch tables built from a descriptor

use crate::metadata::{DescriptorId, DescriptorKind, MethodMeta, PropertyMeta, Signature, TypeEncoding};
use metabridge_runtime::ClassId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Callable member resolved from a method record
#[derive(Debug, Clone, PartialEq)]
pub struct MethodEntry {
    pub name: String,
    pub selector: String,
    pub signature: Signature,
    pub is_static: bool,
    pub owns_return: bool,
    pub is_initializer: bool,
    pub optional: bool,
    /// Class or protocol that declared the member
    pub declared_in: String,
}

impl MethodEntry {
    pub(crate) fn from_meta(meta: &MethodMeta<'_>, declared_in: &str) -> Self {
        Self {
            name: meta.name().to_string(),
            selector: meta.selector().to_string(),
            signature: meta.signature(),
            is_static: meta.is_static(),
            owns_return: meta.owns_return(),
            is_initializer: meta.is_initializer(),
            optional: meta.is_optional(),
            declared_in: declared_in.to_string(),
        }
    }

    /// The root class's `init`, used when a class declares no initializers
    pub(crate) fn default_init(class: &str) -> Self {
        Self {
            name: "init".to_string(),
            selector: "init".to_string(),
            signature: Signature::new(TypeEncoding::Object(None), Vec::new()),
            is_static: false,
            owns_return: true,
            is_initializer: true,
            optional: false,
            declared_in: class.to_string(),
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.signature.arity()
    }

    /// `Owner.name` for diagnostics
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declared_in, self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub name: String,
    pub ty: TypeEncoding,
    pub is_static: bool,
    pub readonly: bool,
    pub getter: Option<MethodEntry>,
    pub setter: Option<MethodEntry>,
    pub declared_in: String,
}

impl PropertyEntry {
    pub(crate) fn from_meta(meta: &PropertyMeta<'_>, declared_in: &str) -> Self {
        Self {
            name: meta.name().to_string(),
            ty: meta.ty(),
            is_static: meta.is_static(),
            readonly: meta.is_readonly(),
            getter: meta.getter().map(|m| MethodEntry::from_meta(&m, declared_in)),
            setter: meta.setter().map(|m| MethodEntry::from_meta(&m, declared_in)),
            declared_in: declared_in.to_string(),
        }
    }
}

/// Member tables under construction
#[derive(Default)]
pub(crate) struct Tables {
    pub instance_methods: HashMap<String, MethodEntry>,
    pub static_methods: HashMap<String, MethodEntry>,
    pub instance_properties: HashMap<String, PropertyEntry>,
    pub static_properties: HashMap<String, PropertyEntry>,
    pub initializers: Vec<MethodEntry>,
}

impl Tables {
    /// Overlay another class's tables; later merges win on name collision
    pub fn merge_from(&mut self, other: &SynthesizedClass) {
        for (name, entry) in &other.instance_methods {
            self.instance_methods.insert(name.clone(), entry.clone());
        }
        for (name, entry) in &other.static_methods {
            self.static_methods.insert(name.clone(), entry.clone());
        }
        for (name, entry) in &other.instance_properties {
            self.instance_properties.insert(name.clone(), entry.clone());
        }
        for (name, entry) in &other.static_properties {
            self.static_properties.insert(name.clone(), entry.clone());
        }
    }

    pub fn add_method(&mut self, entry: MethodEntry) {
        if entry.is_initializer {
            self.initializers.push(entry);
        } else if entry.is_static {
            self.static_methods.insert(entry.name.clone(), entry);
        } else {
            self.instance_methods.insert(entry.name.clone(), entry);
        }
    }

    pub fn add_property(&mut self, entry: PropertyEntry) {
        if entry.is_static {
            self.static_properties.insert(entry.name.clone(), entry);
        } else {
            self.instance_properties.insert(entry.name.clone(), entry);
        }
    }
}

/// Scripting-side constructor and prototype for one descriptor
pub struct SynthesizedClass {
    pub(crate) id: DescriptorId,
    pub(crate) name: String,
    pub(crate) kind: DescriptorKind,
    pub(crate) native: Option<ClassId>,
    pub(crate) superclass: Option<Arc<SynthesizedClass>>,
    pub(crate) protocols: Vec<Arc<SynthesizedClass>>,
    /// Self followed by every ancestor
    pub(crate) lineage: Vec<DescriptorId>,
    /// Every protocol conformed to, directly or through ancestors
    pub(crate) conformances: HashSet<DescriptorId>,
    pub(crate) instance_methods: HashMap<String, MethodEntry>,
    pub(crate) static_methods: HashMap<String, MethodEntry>,
    pub(crate) instance_properties: HashMap<String, PropertyEntry>,
    pub(crate) static_properties: HashMap<String, PropertyEntry>,
    /// Own initializers first, then inherited ones
    pub(crate) initializers: Vec<MethodEntry>,
}

impl SynthesizedClass {
    #[inline]
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Native class backing this descriptor, if the runtime has one
    #[inline]
    pub fn native_class(&self) -> Option<ClassId> {
        self.native
    }

    pub fn superclass(&self) -> Option<&Arc<SynthesizedClass>> {
        self.superclass.as_ref()
    }

    pub fn protocols(&self) -> &[Arc<SynthesizedClass>] {
        &self.protocols
    }

    pub fn lineage(&self) -> &[DescriptorId] {
        &self.lineage
    }

    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.instance_methods.get(name)
    }

    pub fn static_method(&self, name: &str) -> Option<&MethodEntry> {
        self.static_methods.get(name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyEntry> {
        self.instance_properties.get(name)
    }

    pub fn static_property(&self, name: &str) -> Option<&PropertyEntry> {
        self.static_properties.get(name)
    }

    pub fn initializers(&self) -> &[MethodEntry] {
        &self.initializers
    }

    /// First declared initializer taking `arity` arguments
    pub fn initializer_for_arity(&self, arity: usize) -> Option<&MethodEntry> {
        self.initializers.iter().find(|init| init.arity() == arity)
    }

    pub fn initializer_named(&self, name: &str) -> Option<&MethodEntry> {
        self.initializers.iter().find(|init| init.name == name)
    }

    /// Instance method names, sorted
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.instance_methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_subclass_of(&self, id: DescriptorId) -> bool {
        self.lineage.contains(&id)
    }

    pub fn conforms_to(&self, id: DescriptorId) -> bool {
        self.conformances.contains(&id)
    }

    /// Instances of this class are acceptable where `id` is expected
    #[inline]
    pub fn is_compatible(&self, id: DescriptorId) -> bool {
        self.is_subclass_of(id) || self.conforms_to(id)
    }
}

impl fmt::Debug for SynthesizedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesizedClass")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("native", &self.native)
            .field("methods", &self.instance_methods.len())
            .field("static_methods", &self.static_methods.len())
            .finish()
    }
}
