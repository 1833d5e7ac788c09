//! Shape store
//!
//! Owns every shape record in a generational arena. All shape-graph mutation
//! goes through here so transition sharing, stability bookkeeping and
//! dependency triggering stay in one place.
//!
//! ## Design
//!
//! - Adding a property looks up an existing transition keyed by
//!   `(key, attribute metadata)` before cloning; equal addition sequences
//!   converge on the same shape
//! - A shape that gains an outgoing transition loses [`ShapeFlags::STABLE`]
//!   and its stability dependents are deoptimized
//! - Prototype shapes are never shared; their mutations clone and re-point the
//!   owning object, then notify listeners (see the `prototype` module)
//! - Dictionary shapes are private to one object and mutate in place
//! - Nothing here fails: past the fast-property ceiling objects go to
//!   dictionary mode

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::attributes::{PropertyAttributes, PropertyEntry, Representation};
use crate::dependency::{CodeRef, DependencyGroup};
use crate::deopt::{DeoptHandler, DeoptQueue, DeoptReason, DeoptRequest};
use crate::detector::GlobalInvariants;
use crate::key::{ObjectId, PropertyKey};
use crate::shape::{
    DictionaryTable, ElementsKind, ObjectKind, ShapeFlags, ShapeId, ShapeRecord,
};
use crate::transition::{TransitionEdges, TransitionKey};
use crate::{MAX_FAST_PROPERTIES, MAX_LITERAL_CACHE_LENGTH};

/// Size of an object header in bytes
pub const OBJECT_HEADER_SIZE: u32 = 16;

/// Size of one in-object slot in bytes
pub const SLOT_SIZE: u32 = 8;

/// Object size for a plain object with `inlined_slots` in-object slots,
/// saturating at `u32::MAX`
#[inline]
pub const fn object_size_for(inlined_slots: u32) -> u32 {
    OBJECT_HEADER_SIZE.saturating_add(inlined_slots.saturating_mul(SLOT_SIZE))
}

/// Shape store limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeStoreConfig {
    /// Properties a shape may hold before the object goes to dictionary mode
    pub max_fast_properties: u32,
    /// Longest literal whose root shape is cached by length
    pub max_literal_cache_length: u32,
}

impl Default for ShapeStoreConfig {
    fn default() -> Self {
        Self {
            max_fast_properties: MAX_FAST_PROPERTIES,
            max_literal_cache_length: MAX_LITERAL_CACHE_LENGTH,
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<ShapeRecord>,
}

/// Arena of shapes plus the global speculation state attached to them
#[derive(Debug)]
pub struct ShapeStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    pub(crate) config: ShapeStoreConfig,
    pub(crate) shared: bool,
    /// Current shape of every object used as a prototype
    pub(crate) prototype_shapes: FxHashMap<ObjectId, ShapeId>,
    pub(crate) literal_roots: FxHashMap<(u32, u32), ShapeId>,
    pub(crate) array_prototype: Option<ObjectId>,
    pub(crate) globals: GlobalInvariants,
    pub(crate) deopt: DeoptQueue,
}

impl Default for ShapeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeStore {
    /// Create an empty store with default limits
    pub fn new() -> Self {
        Self::with_config(ShapeStoreConfig::default())
    }

    /// Create an empty store
    pub fn with_config(config: ShapeStoreConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            config,
            shared: false,
            prototype_shapes: FxHashMap::default(),
            literal_roots: FxHashMap::default(),
            array_prototype: None,
            globals: GlobalInvariants::default(),
            deopt: DeoptQueue::default(),
        }
    }

    pub(crate) fn new_shared(config: ShapeStoreConfig) -> Self {
        let mut store = Self::with_config(config);
        store.shared = true;
        store
    }

    /// Store limits
    pub fn config(&self) -> &ShapeStoreConfig {
        &self.config
    }

    /// Shapes created here are shared between threads
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Number of live shapes
    pub fn len(&self) -> usize {
        self.live
    }

    /// No live shapes
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    // ==================== Arena ====================

    /// Does `id` name a live shape
    #[inline]
    pub fn is_live(&self, id: ShapeId) -> bool {
        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.generation == id.generation() && slot.record.is_some())
    }

    /// Shape record, if still live
    #[inline]
    pub fn get(&self, id: ShapeId) -> Option<&ShapeRecord> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_ref())
    }

    /// Shape record.
    ///
    /// # Panics
    ///
    /// Panics if the shape was collected; holding a strong handle across a
    /// collection without rooting it is a VM bug.
    #[inline]
    pub fn shape(&self, id: ShapeId) -> &ShapeRecord {
        match self.get(id) {
            Some(record) => record,
            None => panic!("use of collected {id}"),
        }
    }

    pub(crate) fn get_mut(&mut self, id: ShapeId) -> Option<&mut ShapeRecord> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_mut())
    }

    pub(crate) fn shape_mut(&mut self, id: ShapeId) -> &mut ShapeRecord {
        match self.get_mut(id) {
            Some(record) => record,
            None => panic!("use of collected {id}"),
        }
    }

    pub(crate) fn alloc(&mut self, mut record: ShapeRecord) -> ShapeId {
        if self.shared {
            record.flags |= ShapeFlags::SHARED;
        }
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            ShapeId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                record: Some(record),
            });
            ShapeId::new(index, 0)
        }
    }

    /// Free every slot whose index is not marked. Returns the count freed.
    pub(crate) fn sweep(&mut self, marked: &[bool]) -> usize {
        let mut swept = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.record.is_some() && !marked.get(index).copied().unwrap_or(false) {
                slot.record = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                swept += 1;
            }
        }
        self.live -= swept;
        swept
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn live_ids(&self) -> Vec<ShapeId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.record.is_some())
            .map(|(index, slot)| ShapeId::new(index as u32, slot.generation))
            .collect()
    }

    // ==================== Creation ====================

    /// Create a root shape with no properties and no prototype
    pub fn create_root(&mut self, kind: ObjectKind, object_size: u32, inlined_slots: u32) -> ShapeId {
        let inlined_slots = inlined_slots.min(self.config.max_fast_properties);
        let id = self.alloc(ShapeRecord::root(kind, object_size, inlined_slots));
        tracing::trace!(%id, ?kind, inlined_slots, "created root shape");
        id
    }

    /// Create a root shape that already carries `properties` in order.
    ///
    /// Only the [`ShapeFlags::ROLES`] bits of `roles` are applied. Duplicate
    /// keys keep their first entry. Callers keep `properties` under the
    /// fast-property ceiling.
    pub fn create_root_with_layout(
        &mut self,
        kind: ObjectKind,
        object_size: u32,
        inlined_slots: u32,
        properties: impl IntoIterator<Item = (PropertyKey, PropertyAttributes)>,
        roles: ShapeFlags,
    ) -> ShapeId {
        let inlined_slots = inlined_slots.min(self.config.max_fast_properties);
        let mut record = ShapeRecord::root(kind, object_size, inlined_slots);
        for (key, attributes) in properties {
            if record.position_of(&key).is_some() {
                continue;
            }
            let offset = record.layout.len() as u32;
            record.push_entry(PropertyEntry {
                key,
                offset,
                attributes,
            });
        }
        record.flags |= roles & ShapeFlags::ROLES;
        let properties = record.layout.len();
        let id = self.alloc(record);
        tracing::trace!(%id, ?kind, properties, ?roles, "created root shape with layout");
        id
    }

    /// Cached empty root for object literals of `literal_length` properties
    /// with room for `capacity` in-object slots.
    ///
    /// Literals built from the same root share transitions across call sites.
    /// Returns `None` for literals too long to cache.
    pub fn literal_root(&mut self, literal_length: u32, capacity: u32) -> Option<ShapeId> {
        if literal_length > self.config.max_literal_cache_length {
            return None;
        }
        let key = (literal_length, capacity);
        if let Some(&id) = self.literal_roots.get(&key)
            && self.is_live(id)
        {
            return Some(id);
        }
        let id = self.create_root(ObjectKind::Plain, object_size_for(capacity), capacity);
        self.literal_roots.insert(key, id);
        tracing::debug!(literal_length, capacity, %id, "created object literal root shape");
        Some(id)
    }

    // ==================== Lookup ====================

    /// Find `key` in the fast layout of `shape`.
    ///
    /// Dictionary shapes keep their properties in a table and report nothing
    /// here; use [`find_dictionary_property`](Self::find_dictionary_property).
    pub fn find_property(&self, shape: ShapeId, key: &PropertyKey) -> Option<&PropertyEntry> {
        let record = self.get(shape)?;
        record.position_of(key).map(|pos| &record.layout[pos])
    }

    /// Find `key` in the table of a dictionary-mode shape
    pub fn find_dictionary_property(&self, shape: ShapeId, key: &PropertyKey) -> Option<&PropertyEntry> {
        self.get(shape)?.dictionary.as_ref()?.entries.get(key)
    }

    /// Follow an existing transition edge
    pub fn lookup_transition(&self, shape: ShapeId, key: &TransitionKey) -> Option<ShapeId> {
        match &self.get(shape)?.transitions {
            TransitionEdges::Empty => None,
            TransitionEdges::Single(target) => target
                .upgrade(self)
                .filter(|&t| self.shape(t).transition_key.as_ref() == Some(key)),
            TransitionEdges::Table(table) => table.get(key).and_then(|t| t.upgrade(self)),
        }
    }

    /// Current shape of a prototype object
    pub fn prototype_shape(&self, object: ObjectId) -> Option<ShapeId> {
        self.prototype_shapes
            .get(&object)
            .copied()
            .filter(|&s| self.is_live(s))
    }

    /// Enumerable own keys in layout order, cached per shape
    pub fn enum_keys(&mut self, shape: ShapeId) -> Arc<[PropertyKey]> {
        let record = self.shape(shape);
        if let Some(keys) = &record.enum_cache {
            return keys.clone();
        }
        if record.is_dictionary() {
            return record
                .dictionary_entries()
                .filter(|e| e.attributes.enumerable)
                .map(|e| e.key.clone())
                .collect();
        }
        let keys: Arc<[PropertyKey]> = record
            .layout
            .iter()
            .filter(|e| e.attributes.enumerable)
            .map(|e| e.key.clone())
            .collect();
        self.shape_mut(shape).enum_cache = Some(keys.clone());
        keys
    }

    // ==================== Transitions ====================

    /// Shape for an object of `shape` after adding `key`.
    ///
    /// Reuses the transition for `(key, attribute metadata)` when one exists.
    /// A key the layout already has with the same metadata only widens its
    /// representation; different metadata reconfigures the property, which
    /// moves the object to dictionary mode.
    pub fn add_property(
        &mut self,
        shape: ShapeId,
        key: PropertyKey,
        attributes: PropertyAttributes,
    ) -> ShapeId {
        let record = self.shape(shape);
        let (is_dictionary, is_prototype, len) =
            (record.is_dictionary(), record.is_prototype(), record.layout.len() as u32);
        let existing = record.position_of(&key);

        if is_dictionary {
            self.dictionary_insert(shape, key, attributes);
            return shape;
        }
        if let Some(pos) = existing {
            let current = self.shape(shape).layout[pos].attributes;
            if current.metadata() != attributes.metadata() {
                let dictionary = self.transition_to_dictionary(shape);
                let attributes = PropertyAttributes {
                    representation: current.representation.widen(attributes.representation),
                    ..attributes
                };
                tracing::debug!(%shape, %dictionary, %key, "reconfigured property attributes");
                self.dictionary_insert(dictionary, key, attributes);
                return dictionary;
            }
            self.widen_representation(shape, &key, attributes.representation);
            return shape;
        }
        if len >= self.config.max_fast_properties {
            tracing::debug!(%shape, properties = len, "fast property ceiling reached");
            let dictionary = self.transition_to_dictionary(shape);
            self.dictionary_insert(dictionary, key, attributes);
            return dictionary;
        }

        let entry = PropertyEntry {
            key: key.clone(),
            offset: len,
            attributes,
        };
        if is_prototype {
            return self.mutate_prototype(shape, |record| record.push_entry(entry));
        }

        let transition_key = TransitionKey::property(key.clone(), attributes);
        if let Some(existing) = self.lookup_transition(shape, &transition_key) {
            self.widen_representation(existing, &key, attributes.representation);
            return existing;
        }
        let child = self.derive_child(shape, transition_key, |record| record.push_entry(entry));
        tracing::trace!(parent = %shape, %child, %key, "added property transition");
        child
    }

    /// Shape after generalizing the elements kind to include `kind`
    pub fn transition_elements_kind(&mut self, shape: ShapeId, kind: ElementsKind) -> ShapeId {
        let record = self.shape(shape);
        let target = record.elements_kind.generalize(kind);
        if target == record.elements_kind {
            return shape;
        }
        if record.is_prototype() {
            return self.mutate_prototype(shape, |record| record.elements_kind = target);
        }
        if record.is_dictionary() {
            self.shape_mut(shape).elements_kind = target;
            return shape;
        }
        let key = TransitionKey::Elements(target);
        match self.lookup_transition(shape, &key) {
            Some(existing) => existing,
            None => self.derive_child(shape, key, |record| record.elements_kind = target),
        }
    }

    /// Clone `parent` through `edit`, link it under `key` and destabilize the parent
    pub(crate) fn derive_child(
        &mut self,
        parent: ShapeId,
        key: TransitionKey,
        edit: impl FnOnce(&mut ShapeRecord),
    ) -> ShapeId {
        let mut record = self.shape(parent).derive();
        edit(&mut record);
        record.parent = Some(parent);
        record.transition_key = Some(key.clone());
        let child = self.alloc(record);
        self.install_transition(parent, key, child);
        self.destabilize(parent);
        child
    }

    fn install_transition(&mut self, parent: ShapeId, key: TransitionKey, child: ShapeId) {
        let edges = std::mem::take(&mut self.shape_mut(parent).transitions);
        let edges = match edges {
            TransitionEdges::Empty => TransitionEdges::Single(child.downgrade()),
            TransitionEdges::Single(existing) => {
                let existing_key = existing
                    .upgrade(self)
                    .and_then(|t| self.shape(t).transition_key.clone());
                match existing_key {
                    Some(existing_key) => {
                        let mut table = FxHashMap::default();
                        table.insert(existing_key, existing);
                        table.insert(key, child.downgrade());
                        TransitionEdges::Table(table)
                    }
                    None => TransitionEdges::Single(child.downgrade()),
                }
            }
            TransitionEdges::Table(mut table) => {
                table.retain(|_, target| self.is_live(target.id()));
                table.insert(key, child.downgrade());
                TransitionEdges::Table(table)
            }
        };
        self.shape_mut(parent).transitions = edges;
    }

    /// Clear the stable bit and deoptimize code that relied on it
    pub(crate) fn destabilize(&mut self, shape: ShapeId) {
        if let Some(record) = self.get_mut(shape) {
            record.flags.remove(ShapeFlags::STABLE);
            self.trigger_lazy_deoptimization(shape, DependencyGroup::STABILITY);
        }
    }

    // ==================== Dictionary mode ====================

    /// Move an object of `shape` to a private dictionary-mode shape.
    ///
    /// The current layout becomes the table contents. Inlined slots are no
    /// longer used. There is no way back to fast mode.
    pub fn transition_to_dictionary(&mut self, shape: ShapeId) -> ShapeId {
        let source = self.shape(shape);
        if source.is_dictionary() {
            return shape;
        }
        let is_prototype = source.is_prototype();
        let mut record = source.derive();
        let mut table = DictionaryTable {
            next_offset: record.layout.len() as u32,
            ..DictionaryTable::default()
        };
        for entry in record.layout.drain(..) {
            table.entries.insert(entry.key.clone(), entry);
        }
        let count = table.entries.len();
        record.index.clear();
        record.inlined_slots = 0;
        record.dictionary = Some(table);
        record.flags.insert(ShapeFlags::DICTIONARY);
        record.flags.remove(ShapeFlags::STABLE);

        let dictionary = self.alloc(record);
        if is_prototype {
            self.replace_prototype_shape(shape, dictionary);
        }
        self.destabilize(shape);
        tracing::debug!(from = %shape, to = %dictionary, properties = count, "converted to dictionary mode");
        dictionary
    }

    fn dictionary_insert(&mut self, shape: ShapeId, key: PropertyKey, attributes: PropertyAttributes) {
        let record = self.shape_mut(shape);
        record.enum_cache = None;
        let is_prototype = record.is_prototype();
        if let Some(table) = record.dictionary.as_mut() {
            match table.entries.get_mut(&key) {
                Some(entry) => entry.attributes = attributes,
                None => {
                    let offset = table.next_offset;
                    table.next_offset += 1;
                    table.entries.insert(
                        key.clone(),
                        PropertyEntry {
                            key,
                            offset,
                            attributes,
                        },
                    );
                }
            }
        }
        if is_prototype {
            self.notify_prototype_changed(shape);
        }
    }

    /// Shape after deleting `key`.
    ///
    /// Fast shapes go to dictionary mode first; dictionary shapes delete in
    /// place. Deleting an absent key changes nothing.
    pub fn delete_property(&mut self, shape: ShapeId, key: &PropertyKey) -> ShapeId {
        let record = self.shape(shape);
        let present = if record.is_dictionary() {
            record
                .dictionary
                .as_ref()
                .is_some_and(|t| t.entries.contains_key(key))
        } else {
            record.position_of(key).is_some()
        };
        if !present {
            return shape;
        }
        let dictionary = self.transition_to_dictionary(shape);
        let record = self.shape_mut(dictionary);
        record.enum_cache = None;
        let is_prototype = record.is_prototype();
        if let Some(table) = record.dictionary.as_mut() {
            table.entries.shift_remove(key);
        }
        if is_prototype {
            self.notify_prototype_changed(dictionary);
        }
        dictionary
    }

    // ==================== Representation ====================

    /// Widen the representation of `key` on `shape` and every shape sharing
    /// that slot through the transition tree. Returns whether anything changed.
    pub fn widen_representation(
        &mut self,
        shape: ShapeId,
        key: &PropertyKey,
        representation: Representation,
    ) -> bool {
        let record = self.shape(shape);
        let Some(pos) = record.position_of(key) else {
            return false;
        };
        let current = record.layout[pos].attributes.representation;
        let widened = current.widen(representation);
        if widened == current {
            return false;
        }

        let mut origin = shape;
        while let Some(parent) = self.shape(origin).parent
            && self.get(parent).is_some_and(|p| p.layout.len() > pos && !p.is_dictionary())
        {
            origin = parent;
        }

        let mut touched = Vec::new();
        for candidate in self.transition_descendants(origin) {
            let record = self.shape_mut(candidate);
            if let Some(entry) = record.layout.get_mut(pos)
                && entry.key == *key
                && entry.attributes.representation < widened
            {
                entry.attributes.representation = widened;
                touched.push(candidate);
            }
        }
        for candidate in &touched {
            self.trigger_lazy_deoptimization(*candidate, DependencyGroup::FIELD_REPRESENTATION);
        }
        tracing::debug!(%origin, %key, ?widened, shapes = touched.len(), "widened field representation");
        true
    }

    /// `root` and every shape reachable from it over transition edges
    pub fn transition_descendants(&self, root: ShapeId) -> Vec<ShapeId> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(record) = self.get(current) else {
                continue;
            };
            order.push(current);
            queue.extend(
                record
                    .transitions
                    .targets()
                    .into_iter()
                    .filter_map(|t| t.upgrade(self)),
            );
        }
        order
    }

    // ==================== Deoptimization ====================

    /// Schedule every code object with an entry on `shape` matching `mask`
    /// and drop those entries. Returns the number newly scheduled.
    pub fn trigger_lazy_deoptimization(&mut self, shape: ShapeId, mask: DependencyGroup) -> usize {
        let Some(record) = self.get_mut(shape) else {
            return 0;
        };
        if record.dependents.is_empty() {
            return 0;
        }
        let matched = record.dependents.take_matching(mask);
        matched
            .into_iter()
            .filter(|&(code, groups)| self.deopt.schedule(code, DeoptReason::from_group(groups)))
            .count()
    }

    /// Has `code` neither been deoptimized nor superseded
    pub fn is_code_valid(&self, code: CodeRef) -> bool {
        self.deopt.is_current(code)
    }

    /// Requests scheduled since the last call
    pub fn take_deopt_requests(&mut self) -> Vec<DeoptRequest> {
        self.deopt.drain()
    }

    /// Number of requests waiting to be taken
    pub fn pending_deopt_count(&self) -> usize {
        self.deopt.len()
    }

    /// Install a callback run for every scheduled request
    pub fn set_deopt_handler(&mut self, handler: Option<DeoptHandler>) {
        self.deopt.set_handler(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> PropertyKey {
        PropertyKey::string(name)
    }

    fn root(store: &mut ShapeStore) -> ShapeId {
        store.create_root(ObjectKind::Plain, object_size_for(4), 4)
    }

    // ==================== Transitions ====================

    #[test]
    fn test_transition_sharing() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        let a = store.add_property(r, key("x"), PropertyAttributes::data());
        let a = store.add_property(a, key("y"), PropertyAttributes::data());
        let b = store.add_property(r, key("x"), PropertyAttributes::data());
        let b = store.add_property(b, key("y"), PropertyAttributes::data());
        assert_eq!(a, b);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_attributes_split_transitions() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        let a = store.add_property(r, key("x"), PropertyAttributes::data());
        let b = store.add_property(r, key("x"), PropertyAttributes::hidden());
        assert_ne!(a, b);
        assert!(matches!(store.shape(r).transitions(), TransitionEdges::Table(t) if t.len() == 2));
        assert_eq!(store.lookup_transition(r, &TransitionKey::property(key("x"), PropertyAttributes::hidden())), Some(b));
    }

    #[test]
    fn test_copy_on_transition_keeps_order() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        let a = store.add_property(r, key("a"), PropertyAttributes::data());
        let b = store.add_property(a, key("b"), PropertyAttributes::data());
        let c = store.add_property(b, key("c"), PropertyAttributes::data());

        assert_eq!(store.shape(a).properties().len(), 1);
        assert_eq!(store.shape(b).properties().len(), 2);
        let layout = store.shape(c).properties();
        let names: Vec<_> = layout.iter().map(|e| e.key.to_string()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        let offsets: Vec<_> = layout.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, [0, 1, 2]);
        assert_eq!(store.shape(c).parent(), Some(b));
    }

    #[test]
    fn test_parent_loses_stability() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        assert!(store.shape(r).is_stable());
        let a = store.add_property(r, key("x"), PropertyAttributes::data());
        assert!(!store.shape(r).is_stable());
        assert!(store.shape(a).is_stable());
    }

    #[test]
    fn test_elements_kind_transition() {
        let mut store = ShapeStore::new();
        let r = store.create_root(ObjectKind::Array, object_size_for(0), 0);
        let packed = store.transition_elements_kind(r, ElementsKind::PackedInt);
        assert_eq!(packed, r);
        let dictionary = store.transition_elements_kind(r, ElementsKind::Dictionary);
        assert_ne!(dictionary, r);
        assert_eq!(store.shape(dictionary).elements_kind(), ElementsKind::Dictionary);
        assert_eq!(store.transition_elements_kind(r, ElementsKind::Dictionary), dictionary);
        assert_eq!(store.transition_elements_kind(dictionary, ElementsKind::PackedInt), dictionary);
    }

    // ==================== Dictionary mode ====================

    #[test]
    fn test_dictionary_is_one_way() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        let a = store.add_property(r, key("x"), PropertyAttributes::data());
        let d = store.transition_to_dictionary(a);
        assert!(store.shape(d).is_dictionary());
        assert_eq!(store.shape(d).inlined_slots(), 0);
        assert!(store.find_property(d, &key("x")).is_none());
        assert!(store.find_dictionary_property(d, &key("x")).is_some());

        let d2 = store.add_property(d, key("y"), PropertyAttributes::data());
        assert_eq!(d, d2);
        assert!(store.shape(d2).is_dictionary());
        assert_eq!(store.shape(d2).property_count(), 2);
        assert_eq!(store.transition_to_dictionary(d2), d2);
    }

    #[test]
    fn test_delete_goes_to_dictionary() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        let a = store.add_property(r, key("x"), PropertyAttributes::data());
        let b = store.add_property(a, key("y"), PropertyAttributes::data());
        assert_eq!(store.delete_property(b, &key("nope")), b);
        let d = store.delete_property(b, &key("x"));
        assert!(store.shape(d).is_dictionary());
        assert!(store.find_dictionary_property(d, &key("x")).is_none());
        assert_eq!(store.shape(d).property_count(), 1);
    }

    #[test]
    fn test_fast_property_ceiling() {
        let mut store = ShapeStore::with_config(ShapeStoreConfig {
            max_fast_properties: 3,
            ..ShapeStoreConfig::default()
        });
        let mut shape = root(&mut store);
        for i in 0..3 {
            shape = store.add_property(shape, key(&format!("p{i}")), PropertyAttributes::data());
            assert!(!store.shape(shape).is_dictionary());
        }
        shape = store.add_property(shape, key("p3"), PropertyAttributes::data());
        assert!(store.shape(shape).is_dictionary());
        assert_eq!(store.shape(shape).property_count(), 4);
    }

    #[test]
    fn test_reconfigured_attributes_go_to_dictionary() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        let int = PropertyAttributes::data().with_representation(Representation::Int);
        let a = store.add_property(r, key("x"), int);
        let b = store.add_property(a, key("y"), PropertyAttributes::data());
        assert_eq!(store.add_property(b, key("x"), int), b);

        let frozen = PropertyAttributes {
            writable: false,
            configurable: false,
            ..PropertyAttributes::data()
        };
        let reconfigured = store.add_property(b, key("x"), frozen);
        assert_ne!(reconfigured, b);
        assert!(store.shape(reconfigured).is_dictionary());
        let entry = store.find_dictionary_property(reconfigured, &key("x")).unwrap();
        assert!(!entry.attributes.writable);
        assert!(!entry.attributes.configurable);
        assert_eq!(entry.attributes.representation, Representation::Int);
        assert_eq!(entry.offset, 0);
        assert!(store.find_dictionary_property(reconfigured, &key("y")).is_some());
        assert!(store.find_property(b, &key("x")).unwrap().attributes.writable);
    }

    // ==================== Representation ====================

    #[test]
    fn test_representation_widens_across_descendants() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        let int = PropertyAttributes::data().with_representation(Representation::Int);
        let a = store.add_property(r, key("x"), int);
        let b = store.add_property(a, key("y"), int);
        let c = store.add_property(a, key("z"), int);

        let double = PropertyAttributes::data().with_representation(Representation::Double);
        let again = store.add_property(r, key("x"), double);
        assert_eq!(again, a);
        for shape in [a, b, c] {
            let entry = store.find_property(shape, &key("x")).unwrap();
            assert_eq!(entry.attributes.representation, Representation::Double);
        }
        assert!(!store.widen_representation(b, &key("x"), Representation::Int));
        assert_eq!(
            store.find_property(b, &key("y")).unwrap().attributes.representation,
            Representation::Int
        );
    }

    // ==================== Misc ====================

    #[test]
    fn test_literal_root_cache() {
        let mut store = ShapeStore::new();
        let a = store.literal_root(2, 4).unwrap();
        assert_eq!(store.literal_root(2, 4), Some(a));
        assert_ne!(store.literal_root(3, 4), Some(a));
        assert!(store.literal_root(MAX_LITERAL_CACHE_LENGTH + 1, 4).is_none());
        assert_eq!(store.shape(a).inlined_slots(), 4);
    }

    #[test]
    fn test_root_with_layout() {
        let mut store = ShapeStore::new();
        let props = [
            (key("x"), PropertyAttributes::data()),
            (key("y"), PropertyAttributes::data()),
            (key("x"), PropertyAttributes::hidden()),
        ];
        let r = store.create_root_with_layout(
            ObjectKind::Plain,
            object_size_for(4),
            4,
            props,
            ShapeFlags::CLASS_PROTOTYPE | ShapeFlags::DICTIONARY,
        );
        let record = store.shape(r);
        assert_eq!(record.property_count(), 2);
        assert_eq!(record.parent(), None);
        assert!(record.flags().contains(ShapeFlags::CLASS_PROTOTYPE));
        assert!(!record.is_dictionary());
        assert_eq!(store.find_property(r, &key("y")).unwrap().offset, 1);

        let z = store.add_property(r, key("z"), PropertyAttributes::data());
        assert_eq!(store.find_property(z, &key("z")).unwrap().offset, 2);
        assert!(store.shape(z).flags().contains(ShapeFlags::CLASS_PROTOTYPE));
    }

    #[test]
    fn test_object_size_saturates() {
        assert_eq!(object_size_for(4), OBJECT_HEADER_SIZE + 4 * SLOT_SIZE);
        assert_eq!(object_size_for(600_000_000), u32::MAX);
        assert_eq!(object_size_for(u32::MAX), u32::MAX);

        let mut store = ShapeStore::new();
        let r = store.create_root(ObjectKind::Plain, object_size_for(600_000_000), 600_000_000);
        assert_eq!(store.shape(r).inlined_slots(), MAX_FAST_PROPERTIES);
    }

    #[test]
    fn test_enum_keys_skip_hidden() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        let a = store.add_property(r, key("x"), PropertyAttributes::data());
        let b = store.add_property(a, key("h"), PropertyAttributes::hidden());
        let keys = store.enum_keys(b);
        assert_eq!(&*keys, &[key("x")]);
        assert!(Arc::ptr_eq(&keys, &store.enum_keys(b)));
    }

    #[test]
    #[should_panic(expected = "use of collected")]
    fn test_stale_handle_panics() {
        let mut store = ShapeStore::new();
        let r = root(&mut store);
        store.collect(std::iter::empty());
        store.shape(r);
    }
}
