//! Shape store shared between threads
//!
//! Shapes of shared objects live in one store behind a mutex. Every mutation
//! holds the lock for its whole duration, so two threads adding the same
//! transition observe a single winner.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::attributes::{PropertyAttributes, PropertyEntry};
use crate::dependency::{CodeRef, CompilationDependencies};
use crate::key::PropertyKey;
use crate::shape::{ObjectKind, ShapeId};
use crate::store::{ShapeStore, ShapeStoreConfig};

/// Thread-safe handle to a shared shape store
#[derive(Debug, Clone)]
pub struct SharedShapeStore {
    inner: Arc<Mutex<ShapeStore>>,
}

impl SharedShapeStore {
    /// Create a shared store; every shape in it carries the shared flag
    pub fn new(config: ShapeStoreConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ShapeStore::new_shared(config))),
        }
    }

    /// Lock the store for a sequence of operations
    pub fn lock(&self) -> MutexGuard<'_, ShapeStore> {
        self.inner.lock()
    }

    /// See [`ShapeStore::create_root`]
    pub fn create_root(&self, kind: ObjectKind, object_size: u32, inlined_slots: u32) -> ShapeId {
        self.inner.lock().create_root(kind, object_size, inlined_slots)
    }

    /// See [`ShapeStore::add_property`]
    pub fn add_property(
        &self,
        shape: ShapeId,
        key: PropertyKey,
        attributes: PropertyAttributes,
    ) -> ShapeId {
        self.inner.lock().add_property(shape, key, attributes)
    }

    /// See [`ShapeStore::find_property`]
    pub fn find_property(&self, shape: ShapeId, key: &PropertyKey) -> Option<PropertyEntry> {
        self.inner.lock().find_property(shape, key).cloned()
    }

    /// Commit dependencies under the lock
    pub fn commit(&self, dependencies: CompilationDependencies) -> Option<CodeRef> {
        dependencies.commit(&mut self.inner.lock())
    }
}
