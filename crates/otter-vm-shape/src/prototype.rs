//! Prototype shapes and change propagation
//!
//! An object used as a prototype gets its own unshared shape the first time
//! it is used that way. That shape carries a listener list: every prototype
//! object inheriting from it registers its own shape there, and every shape
//! created by pointing an ordinary object at it is remembered as an instance
//! root. Mutating a prototype therefore reaches, breadth first, everything
//! whose prototype chain passes through it.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::dependency::DependencyGroup;
use crate::detector::FeatureDetector;
use crate::key::ObjectId;
use crate::shape::{ChangeMarker, ProtoDetails, ShapeFlags, ShapeId, ShapeRecord};
use crate::store::ShapeStore;
use crate::transition::TransitionKey;

/// A prototype object together with its shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtoRef {
    /// Prototype object
    pub object: ObjectId,
    /// Shape the caller last saw on it
    pub shape: ShapeId,
}

/// Result of [`ShapeStore::set_prototype`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrototypeTransition {
    /// New shape of the object whose prototype was set
    pub shape: ShapeId,
    /// Current shape of the prototype object, which may have been copied
    /// the first time it was used as a prototype
    pub prototype_shape: Option<ShapeId>,
}

impl ShapeStore {
    /// Register the canonical `Array.prototype` object
    pub fn set_array_prototype(&mut self, object: ObjectId) {
        self.array_prototype = Some(object);
    }

    /// Give `owner` (currently of `shape`) its own prototype shape.
    ///
    /// If `owner` already serves as a prototype its current shape is
    /// returned. Otherwise `shape` is copied, the copy is flagged as a
    /// prototype and registered on its own prototype's listener list, and code
    /// assuming `shape` has no prototype instances is deoptimized.
    pub fn become_prototype(&mut self, shape: ShapeId, owner: ObjectId) -> ShapeId {
        if let Some(current) = self.prototype_shape(owner) {
            return current;
        }
        let mut record = self.shape(shape).derive();
        record.flags.insert(ShapeFlags::PROTOTYPE);
        record.owner = Some(owner);
        record.proto_details = Some(ProtoDetails::default());
        record.parent = Some(shape);
        let prototype = self.alloc(record);

        self.shape_mut(shape).flags.insert(ShapeFlags::PROTOTYPE_SOURCE);
        self.prototype_shapes.insert(owner, prototype);
        self.register_listener(prototype);
        self.trigger_lazy_deoptimization(shape, DependencyGroup::NOT_PROTOTYPE);
        tracing::trace!(%shape, %prototype, %owner, "object became a prototype");
        prototype
    }

    /// Flag a shape built ahead of time as a prototype template.
    ///
    /// Transitions that already leave `shape` stay ordinary edges. Properties
    /// added from now on go through prototype mutation like on any other
    /// prototype shape.
    pub fn mark_prototype(&mut self, shape: ShapeId) {
        self.shape_mut(shape).flags.insert(ShapeFlags::PROTOTYPE);
        tracing::trace!(%shape, "marked prototype template");
    }

    /// Shape for an object of `shape` after setting its prototype.
    ///
    /// The prototype object becomes a prototype first (copy on first use).
    /// Ordinary shapes take a shared prototype transition; prototype shapes
    /// are copied, re-registered on the new prototype and their listeners
    /// notified. The fast-array-prototype bit is recomputed on the result.
    pub fn set_prototype(&mut self, shape: ShapeId, proto: Option<ProtoRef>) -> PrototypeTransition {
        let prototype_shape = proto.map(|p| self.become_prototype(p.shape, p.object));
        let target = proto.map(|p| p.object);
        let record = self.shape(shape);

        let result = if record.prototype == target {
            shape
        } else if record.is_prototype() {
            let copy = self.mutate_prototype(shape, |_| {});
            self.unregister_listener(copy);
            self.shape_mut(copy).prototype = target;
            self.register_listener(copy);
            copy
        } else if record.is_dictionary() {
            self.shape_mut(shape).prototype = target;
            self.remember_instance_root(shape);
            shape
        } else {
            let key = TransitionKey::Prototype(target);
            match self.lookup_transition(shape, &key) {
                Some(existing) => existing,
                None => {
                    let child = self.derive_child(shape, key, |r| r.prototype = target);
                    self.remember_instance_root(child);
                    child
                }
            }
        };
        self.refresh_fast_array_flag(result);
        PrototypeTransition {
            shape: result,
            prototype_shape,
        }
    }

    /// Shapes from `receiver` up its prototype chain to `holder`, inclusive.
    ///
    /// `None` if the chain does not reach `holder` through the current shapes
    /// of the prototype objects. A prototype that was mutated has a new
    /// current shape, so a stale `holder` is never reached.
    pub fn prototype_chain(&self, receiver: ShapeId, holder: ShapeId) -> Option<Vec<ShapeId>> {
        let mut chain = Vec::new();
        let mut visited = FxHashSet::default();
        let mut current = receiver;
        loop {
            let record = self.get(current)?;
            if !visited.insert(current) {
                return None;
            }
            chain.push(current);
            if current == holder {
                return Some(chain);
            }
            current = self.prototype_shape(record.prototype?)?;
        }
    }

    /// Flip every shape whose prototype chain passes through `shape` to
    /// unstable and deoptimize their stability and proto-chain dependents.
    ///
    /// Walks transition edges, listener lists and instance roots breadth
    /// first; each shape is visited once even if the graph has cycles.
    /// Prototype shapes fire their change marker and get a fresh one, so
    /// handlers built before the change go stale while new ones can be cached.
    /// Returns the number of shapes visited.
    pub fn notify_prototype_changed(&mut self, shape: ShapeId) -> usize {
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::from([shape]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(record) = self.get(current) else {
                continue;
            };
            let mut next = record.transitions.targets();
            if let Some(details) = &record.proto_details {
                next.extend(details.listeners.iter().flatten().copied());
                next.extend(details.instance_roots.iter().copied());
            }
            queue.extend(next.into_iter().filter_map(|t| t.upgrade(self)));

            let record = self.shape_mut(current);
            record.flags.remove(ShapeFlags::STABLE);
            record.enum_cache = None;
            if record.is_prototype() {
                record.marker.mark_changed();
                record.marker = ChangeMarker::default();
            }
            self.trigger_lazy_deoptimization(
                current,
                DependencyGroup::STABILITY | DependencyGroup::PROTO_CHAIN,
            );
        }
        tracing::debug!(%shape, invalidated = visited.len(), "prototype chain changed");
        visited.len()
    }

    /// Copy a prototype shape through `edit` and move its object onto the copy
    pub(crate) fn mutate_prototype(
        &mut self,
        shape: ShapeId,
        edit: impl FnOnce(&mut ShapeRecord),
    ) -> ShapeId {
        let mut record = self.shape(shape).derive();
        edit(&mut record);
        record.parent = Some(shape);
        let copy = self.alloc(record);
        self.replace_prototype_shape(shape, copy);
        copy
    }

    /// Hand prototype ownership, listeners and registration from `old` to `new`
    pub(crate) fn replace_prototype_shape(&mut self, old: ShapeId, new: ShapeId) {
        self.notify_prototype_changed(old);

        let old_record = self.shape_mut(old);
        let owner = old_record.owner;
        let details = old_record.proto_details.take().unwrap_or_default();
        let registered = details.registered_index;

        let new_record = self.shape_mut(new);
        new_record.flags.insert(ShapeFlags::PROTOTYPE);
        new_record.owner = owner;
        new_record.proto_details = Some(details);
        let prototype = new_record.prototype;

        if let Some(slot) = registered
            && let Some(proto_shape) = prototype.and_then(|p| self.prototype_shape(p))
            && let Some(listeners) = self
                .get_mut(proto_shape)
                .and_then(|r| r.proto_details.as_mut())
            && let Some(entry) = listeners.listeners.get_mut(slot as usize)
        {
            *entry = Some(new.downgrade());
        }
        if let Some(owner) = owner {
            self.prototype_shapes.insert(owner, new);
            if self.array_prototype == Some(owner) {
                self.invalidate_detector(FeatureDetector::ArrayPrototypeUnmodified);
            }
        }
        tracing::trace!(%old, %new, "prototype shape replaced");
    }

    pub(crate) fn register_listener(&mut self, shape: ShapeId) {
        let record = self.shape(shape);
        if record.is_shared() {
            return;
        }
        let Some(proto_shape) = record.prototype.and_then(|p| self.prototype_shape(p)) else {
            return;
        };
        let slot = self
            .shape_mut(proto_shape)
            .proto_details
            .get_or_insert_with(ProtoDetails::default)
            .push_listener(shape.downgrade());
        self.shape_mut(shape)
            .proto_details
            .get_or_insert_with(ProtoDetails::default)
            .registered_index = Some(slot);
    }

    pub(crate) fn unregister_listener(&mut self, shape: ShapeId) {
        let record = self.shape(shape);
        let Some(slot) = record.proto_details.as_ref().and_then(|d| d.registered_index) else {
            return;
        };
        if let Some(proto_shape) = record.prototype.and_then(|p| self.prototype_shape(p))
            && let Some(details) = self
                .get_mut(proto_shape)
                .and_then(|r| r.proto_details.as_mut())
        {
            details.remove_listener(slot);
        }
        if let Some(details) = self.shape_mut(shape).proto_details.as_mut() {
            details.registered_index = None;
        }
    }

    fn remember_instance_root(&mut self, shape: ShapeId) {
        let Some(proto_shape) = self
            .shape(shape)
            .prototype
            .and_then(|p| self.prototype_shape(p))
        else {
            return;
        };
        let weak = shape.downgrade();
        let details = self
            .shape_mut(proto_shape)
            .proto_details
            .get_or_insert_with(ProtoDetails::default);
        if !details.instance_roots.contains(&weak) {
            details.instance_roots.push(weak);
        }
    }

    fn refresh_fast_array_flag(&mut self, shape: ShapeId) {
        let fast = self.array_prototype.is_some()
            && self.shape(shape).prototype == self.array_prototype
            && self.is_detector_intact(FeatureDetector::ArrayPrototypeUnmodified);
        self.shape_mut(shape)
            .flags
            .set(ShapeFlags::FAST_ARRAY_PROTOTYPE, fast);
    }
}
