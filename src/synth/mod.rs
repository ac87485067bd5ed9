//! Type synthesizer - descriptors to scripting-side classes, memoized
//!
//! Architecture:
//! - `mod.rs` - memo table and the synthesis walk (TypeSynthesizer)
//! - `class.rs` - merged dispatch tables (SynthesizedClass, MethodEntry)
//!
//! Design: each descriptor gets one `OnceCell` in a concurrent map. A cell in
//! the map is a class being synthesized; an initialized cell is a finished
//! class. Concurrent requests for the same descriptor block on the cell and
//! observe the single result, so a type never has two representations.
//! Table precedence on name collision: protocol < superclass < own.

mod class;


pub use class::{MethodEntry, PropertyEntry, SynthesizedClass};

use crate::errors::BridgeError;
use crate::metadata::{Descriptor, DescriptorId, DescriptorKind, MetaFile};
use class::Tables;
use dashmap::DashMap;
use metabridge_runtime::{NativeRuntime, ObjectPtr};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

type Slot = Arc<OnceCell<Arc<SynthesizedClass>>>;

/// Progress of one descriptor through synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Unresolved,
    Synthesizing,
    Synthesized,
}

pub struct TypeSynthesizer {
    meta: Arc<MetaFile>,
    runtime: Arc<NativeRuntime>,
    memo: DashMap<DescriptorId, Slot>,
    synthesized: AtomicU64,
}

impl TypeSynthesizer {
    pub fn new(meta: Arc<MetaFile>, runtime: Arc<NativeRuntime>) -> Self {
        Self {
            meta,
            runtime,
            memo: DashMap::new(),
            synthesized: AtomicU64::new(0),
        }
    }

    /// Class for a descriptor, built on first use
    pub fn synthesize(&self, id: DescriptorId) -> Result<Arc<SynthesizedClass>, BridgeError> {
        self.synthesize_tracked(id, &mut Vec::new())
    }

    /// Class for a type name
    pub fn synthesize_named(&self, name: &str) -> Result<Arc<SynthesizedClass>, BridgeError> {
        let id = self
            .meta
            .resolve(name)
            .ok_or_else(|| BridgeError::not_found("metadata", name))?
            .id();
        self.synthesize(id)
    }

    pub fn state(&self, id: DescriptorId) -> SynthesisState {
        match self.memo.get(&id) {
            None => SynthesisState::Unresolved,
            Some(slot) if slot.get().is_some() => SynthesisState::Synthesized,
            Some(_) => SynthesisState::Synthesizing,
        }
    }

    /// Finished class for a descriptor, without synthesizing it
    pub fn cached(&self, id: DescriptorId) -> Option<Arc<SynthesizedClass>> {
        self.memo.get(&id).and_then(|slot| slot.get().cloned())
    }

    /// Number of classes built so far
    pub fn synthesized_count(&self) -> u64 {
        self.synthesized.load(Ordering::Relaxed)
    }

    /// Most derived described class of a live instance
    ///
    /// Walks the instance's native superclass chain until a class known to
    /// the metadata is found, falling back to the declared type.
    pub fn class_for_instance(
        &self,
        ptr: ObjectPtr,
        declared: Option<DescriptorId>,
    ) -> Result<Arc<SynthesizedClass>, BridgeError> {
        let mut current = self.runtime.class_of(ptr);
        while let Some(class) = current {
            if let Some(name) = self.runtime.class_name(class) {
                if let Some(descriptor @ Descriptor::Interface(_)) = self.meta.resolve(&name) {
                    return self.synthesize(descriptor.id());
                }
            }
            current = self.runtime.superclass_of(class);
        }

        match declared {
            Some(id) => self.synthesize(id),
            None => Err(BridgeError::not_found(
                "metadata",
                format!("class of instance {}", ptr),
            )),
        }
    }

    fn synthesize_tracked(
        &self,
        id: DescriptorId,
        visiting: &mut Vec<DescriptorId>,
    ) -> Result<Arc<SynthesizedClass>, BridgeError> {
        if visiting.contains(&id) {
            let chain: Vec<&str> = visiting
                .iter()
                .chain(std::iter::once(&id))
                .map(|step| self.name_of(*step))
                .collect();
            return Err(BridgeError::Synthesis {
                class: self.name_of(id).to_string(),
                reason: format!("inheritance cycle {}", chain.join(" -> ")),
            });
        }

        // Clone the slot out so no map guard is held while building
        let slot: Slot = Arc::clone(self.memo.entry(id).or_default().value());
        if let Some(done) = slot.get() {
            return Ok(Arc::clone(done));
        }

        visiting.push(id);
        let result = slot.get_or_try_init(|| self.build(id, visiting).map(Arc::new));
        visiting.pop();

        match result {
            Ok(class) => Ok(Arc::clone(class)),
            Err(err) => {
                self.memo.remove_if(&id, |_, cell| cell.get().is_none());
                Err(err)
            }
        }
    }

    fn name_of(&self, id: DescriptorId) -> &str {
        self.meta.descriptor(id).map_or("<invalid>", |d| d.name())
    }

    fn build(
        &self,
        id: DescriptorId,
        visiting: &mut Vec<DescriptorId>,
    ) -> Result<SynthesizedClass, BridgeError> {
        let descriptor = self.meta.descriptor(id).ok_or_else(|| BridgeError::Synthesis {
            class: id.to_string(),
            reason: "no descriptor at this offset".to_string(),
        })?;
        let name = descriptor.name();
        let fail = |reason: String| BridgeError::Synthesis {
            class: name.to_string(),
            reason,
        };

        let (base, protocol_ids): (_, Vec<DescriptorId>) = match descriptor {
            Descriptor::Interface(meta) => (meta.base(), meta.protocols().collect()),
            Descriptor::Protocol(meta) => (None, meta.protocols().collect()),
            other => {
                return Err(fail(format!(
                    "{:?} descriptors have no class representation",
                    other.kind()
                )))
            }
        };
        debug!(event = "synthesis_started", class = name, "synthesizing");

        let superclass = match base {
            Some(base) => {
                let parent = self.synthesize_tracked(base, visiting)?;
                if parent.kind() != DescriptorKind::Interface {
                    return Err(fail(format!("superclass {} is not a class", parent.name())));
                }
                Some(parent)
            }
            None => None,
        };

        let mut protocols = Vec::with_capacity(protocol_ids.len());
        for protocol_id in protocol_ids {
            let protocol = self.synthesize_tracked(protocol_id, visiting)?;
            if protocol.kind() != DescriptorKind::Protocol {
                return Err(fail(format!("{} is not a protocol", protocol.name())));
            }
            protocols.push(protocol);
        }

        let mut tables = Tables::default();
        for protocol in &protocols {
            tables.merge_from(protocol);
        }
        if let Some(parent) = &superclass {
            tables.merge_from(parent);
        }
        for method in self.meta.methods_of(&descriptor) {
            tables.add_method(MethodEntry::from_meta(&method, name));
        }
        for property in self.meta.properties_of(&descriptor) {
            tables.add_property(PropertyEntry::from_meta(&property, name));
        }
        if let Some(parent) = &superclass {
            tables.initializers.extend(parent.initializers.iter().cloned());
        }

        let mut lineage = vec![id];
        let mut conformances = HashSet::new();
        if let Some(parent) = &superclass {
            lineage.extend_from_slice(&parent.lineage);
            conformances.extend(parent.conformances.iter().copied());
        }
        for protocol in &protocols {
            conformances.insert(protocol.id);
            conformances.extend(protocol.conformances.iter().copied());
        }

        let kind = descriptor.kind();
        let native = match kind {
            DescriptorKind::Interface => self.runtime.class_named(name),
            _ => None,
        };

        self.synthesized.fetch_add(1, Ordering::Relaxed);
        info!(
            event = "class_synthesized",
            class = name,
            methods = tables.instance_methods.len(),
            static_methods = tables.static_methods.len(),
            native = native.is_some(),
            "class synthesized"
        );

        Ok(SynthesizedClass {
            id,
            name: name.to_string(),
            kind,
            native,
            superclass,
            protocols,
            lineage,
            conformances,
            instance_methods: tables.instance_methods,
            static_methods: tables.static_methods,
            instance_properties: tables.instance_properties,
            static_properties: tables.static_properties,
            initializers: tables.initializers,
        })
    }
}
