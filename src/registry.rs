//! Model registry: maps a logical model id to its engine preference list
//! and capabilities. Reads never block writers and never observe a torn
//! state, via copy-on-write swap of an immutable map.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::{OrchestratorError, Result};
use crate::model::{Capability, ModelDescriptor};

type Table = HashMap<String, Arc<ModelDescriptor>>;

/// Holds every known [`ModelDescriptor`] by `model_id`.
pub struct ModelRegistry {
    table: ArcSwap<Table>,
}

impl ModelRegistry {
    pub fn new(descriptors: Vec<ModelDescriptor>) -> Self {
        let table: Table = descriptors
            .into_iter()
            .map(|d| (d.model_id.clone(), Arc::new(d)))
            .collect();
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// O(1) lookup by explicit model id. Retired descriptors are rejected.
    pub fn resolve(&self, model_id: &str) -> Result<Arc<ModelDescriptor>> {
        let table = self.table.load();
        match table.get(model_id) {
            Some(desc) if !desc.retired => Ok(Arc::clone(desc)),
            Some(_) => Err(OrchestratorError::NotFound),
            None => Err(OrchestratorError::NotFound),
        }
    }

    /// O(n) lookup of every live descriptor declaring `capability`.
    pub fn resolve_by_capability(&self, capability: Capability) -> Vec<Arc<ModelDescriptor>> {
        self.table
            .load()
            .values()
            .filter(|d| !d.retired && d.capability_set.contains(&capability))
            .cloned()
            .collect()
    }

    /// Registers a new descriptor, or replaces an existing one with the
    /// same `model_id`. Atomic copy-on-write: concurrent readers observe
    /// either the whole prior table or the whole new one, never a mix.
    pub fn register(&self, descriptor: ModelDescriptor) {
        let prev = self.table.load();
        let mut next: Table = (**prev).clone();
        next.insert(descriptor.model_id.clone(), Arc::new(descriptor));
        self.table.store(Arc::new(next));
    }

    /// Soft-deletes a descriptor: it is rejected for new requests but the
    /// entry (and any in-flight references already holding an `Arc` to it)
    /// is left intact.
    pub fn retire(&self, model_id: &str) -> Result<()> {
        let prev = self.table.load();
        let Some(existing) = prev.get(model_id) else {
            return Err(OrchestratorError::NotFound);
        };
        let mut retired = (**existing).clone();
        retired.retired = true;
        let mut next: Table = (**prev).clone();
        next.insert(model_id.to_string(), Arc::new(retired));
        self.table.store(Arc::new(next));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
