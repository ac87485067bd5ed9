//! Native classes - selector-keyed method tables with single inheritance

use super::ClassId;
use crate::interop::Imp;
use std::collections::HashMap;

/// Registered native class
pub struct NativeClass {
    pub(crate) id: ClassId,
    pub(crate) name: String,
    pub(crate) superclass: Option<ClassId>,
    pub(crate) instance_methods: HashMap<String, Imp>,
    pub(crate) class_methods: HashMap<String, Imp>,
}

impl NativeClass {
    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass
    }

    /// Method declared directly on this class (no inheritance)
    pub fn own_method(&self, selector: &str, is_static: bool) -> Option<Imp> {
        let table = if is_static {
            &self.class_methods
        } else {
            &self.instance_methods
        };
        table.get(selector).copied()
    }
}

/// Fluent builder for native classes
///
/// ```ignore
/// let circle = runtime.register_class(
///     NativeClassBuilder::new("Circle")
///         .superclass("Shape")
///         .method("initWithRadius:", circle_init)
///         .method("area", circle_area),
/// )?;
/// ```
pub struct NativeClassBuilder {
    pub(crate) name: String,
    pub(crate) superclass: Option<String>,
    pub(crate) instance_methods: HashMap<String, Imp>,
    pub(crate) class_methods: HashMap<String, Imp>,
}

impl NativeClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            instance_methods: HashMap::new(),
            class_methods: HashMap::new(),
        }
    }

    pub fn superclass(mut self, name: impl Into<String>) -> Self {
        self.superclass = Some(name.into());
        self
    }

    pub fn method(mut self, selector: impl Into<String>, imp: Imp) -> Self {
        self.instance_methods.insert(selector.into(), imp);
        self
    }

    pub fn class_method(mut self, selector: impl Into<String>, imp: Imp) -> Self {
        self.class_methods.insert(selector.into(), imp);
        self
    }
}
