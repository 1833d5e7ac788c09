//! Shape records and handles
//!
//! A shape describes the layout shared by every object built through the same
//! sequence of property additions. Records live in the [`ShapeStore`] arena;
//! everything outside the store talks about them through [`ShapeId`].
//!
//! [`ShapeStore`]: crate::store::ShapeStore

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::attributes::PropertyEntry;
use crate::dependency::DependencyRecord;
use crate::key::{ObjectId, PropertyKey};
use crate::transition::{TransitionEdges, TransitionKey};

/// Generational handle to a shape in a [`ShapeStore`](crate::store::ShapeStore)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId {
    index: u32,
    generation: u32,
}

impl ShapeId {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Weak handle that does not keep the shape alive across a collection
    #[inline]
    pub const fn downgrade(self) -> WeakShape {
        WeakShape(self)
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape#{}.{}", self.index, self.generation)
    }
}

/// Weak reference to a shape.
///
/// Transition edges, listener lists and inline-cache slots hold these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct WeakShape(ShapeId);

impl WeakShape {
    /// Resolve to a live shape, or `None` if it was collected
    #[inline]
    pub fn upgrade(self, store: &crate::store::ShapeStore) -> Option<ShapeId> {
        store.is_live(self.0).then_some(self.0)
    }

    /// The handle this weak reference was made from, live or not
    #[inline]
    pub const fn id(self) -> ShapeId {
        self.0
    }
}

/// Object kind tag carried by a shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ObjectKind {
    /// Ordinary object
    #[default]
    Plain = 0,
    /// Array exotic object
    Array = 1,
    /// Function object
    Function = 2,
    /// Arguments object
    Arguments = 3,
    /// Typed array
    TypedArray = 4,
    /// Global object
    Global = 5,
}

impl ObjectKind {
    /// Convert from a raw tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Plain),
            1 => Some(Self::Array),
            2 => Some(Self::Function),
            3 => Some(Self::Arguments),
            4 => Some(Self::TypedArray),
            5 => Some(Self::Global),
            _ => None,
        }
    }
}

/// Element storage kind.
///
/// Ordered by generality; an object's elements kind only generalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ElementsKind {
    /// Packed small integers
    PackedInt = 0,
    /// Packed numbers
    PackedDouble = 1,
    /// Any values, possibly holey
    #[default]
    Generic = 2,
    /// Sparse hash-table storage
    Dictionary = 3,
}

impl ElementsKind {
    /// Least kind that can hold values of both
    #[inline]
    pub fn generalize(self, other: Self) -> Self {
        self.max(other)
    }

    /// Convert from a raw tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::PackedInt),
            1 => Some(Self::PackedDouble),
            2 => Some(Self::Generic),
            3 => Some(Self::Dictionary),
            _ => None,
        }
    }
}

bitflags! {
    /// Shape state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u32 {
        /// Never been the parent of a transition and prototype unchanged
        const STABLE = 1 << 0;
        /// Shape of an object used as some other object's prototype
        const PROTOTYPE = 1 << 1;
        /// Properties live in a hash table owned by the shape
        const DICTIONARY = 1 << 2;
        /// Shape of a class constructor function
        const CLASS_CONSTRUCTOR = 1 << 3;
        /// Shape of a class's `prototype` object
        const CLASS_PROTOTYPE = 1 << 4;
        /// Instances are callable
        const CALLABLE = 1 << 5;
        /// Lives in a store shared between threads
        const SHARED = 1 << 6;
        /// Prototype is the unmodified canonical array prototype
        const FAST_ARRAY_PROTOTYPE = 1 << 7;
        /// An object left this shape to become a prototype
        const PROTOTYPE_SOURCE = 1 << 8;

        /// Role bits a root may be created with
        const ROLES = Self::PROTOTYPE.bits()
            | Self::CLASS_CONSTRUCTOR.bits()
            | Self::CLASS_PROTOTYPE.bits()
            | Self::CALLABLE.bits();

        /// Bits copied onto shapes derived by a transition
        const INHERITED = Self::CLASS_CONSTRUCTOR.bits()
            | Self::CLASS_PROTOTYPE.bits()
            | Self::CALLABLE.bits()
            | Self::SHARED.bits();
    }
}

/// Prototype-chain change marker.
///
/// Inline-cache handlers that resolved a property through the prototype chain
/// hold a clone of the marker of every shape they walked; once any of those
/// shapes changes, the handler is stale. Reading it needs no store access.
#[derive(Clone, Default)]
pub struct ChangeMarker(Arc<AtomicBool>);

impl ChangeMarker {
    /// Has the owning shape's prototype chain changed
    #[inline]
    pub fn has_changed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn mark_changed(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Do both handles observe the same shape
    #[inline]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ChangeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChangeMarker").field(&self.has_changed()).finish()
    }
}

/// Listener bookkeeping for a prototype shape
#[derive(Debug, Default)]
pub(crate) struct ProtoDetails {
    /// Index in the listener list of this shape's own prototype
    pub(crate) registered_index: Option<u32>,
    /// Shapes of prototype objects whose prototype is this shape's owner
    pub(crate) listeners: Vec<Option<WeakShape>>,
    pub(crate) free_slots: Vec<u32>,
    /// Non-prototype shapes created by pointing an object at this prototype
    pub(crate) instance_roots: Vec<WeakShape>,
}

impl ProtoDetails {
    pub(crate) fn push_listener(&mut self, listener: WeakShape) -> u32 {
        if let Some(slot) = self.free_slots.pop() {
            self.listeners[slot as usize] = Some(listener);
            slot
        } else {
            self.listeners.push(Some(listener));
            (self.listeners.len() - 1) as u32
        }
    }

    pub(crate) fn remove_listener(&mut self, slot: u32) {
        if let Some(entry) = self.listeners.get_mut(slot as usize)
            && entry.take().is_some()
        {
            self.free_slots.push(slot);
        }
    }

    pub(crate) fn live_listener_count(&self) -> usize {
        self.listeners.iter().filter(|l| l.is_some()).count()
    }
}

/// Hash-table storage of a dictionary-mode shape, in insertion order
#[derive(Debug, Clone, Default)]
pub(crate) struct DictionaryTable {
    pub(crate) entries: IndexMap<PropertyKey, PropertyEntry, FxBuildHasher>,
    pub(crate) next_offset: u32,
}

/// A shape
#[derive(Debug)]
pub struct ShapeRecord {
    pub(crate) kind: ObjectKind,
    pub(crate) object_size: u32,
    pub(crate) inlined_slots: u32,
    pub(crate) layout: Vec<PropertyEntry>,
    pub(crate) index: FxHashMap<PropertyKey, u32>,
    pub(crate) elements_kind: ElementsKind,
    pub(crate) prototype: Option<ObjectId>,
    pub(crate) flags: ShapeFlags,
    pub(crate) transitions: TransitionEdges,
    pub(crate) parent: Option<ShapeId>,
    pub(crate) transition_key: Option<TransitionKey>,
    pub(crate) dictionary: Option<DictionaryTable>,
    pub(crate) marker: ChangeMarker,
    pub(crate) proto_details: Option<ProtoDetails>,
    pub(crate) owner: Option<ObjectId>,
    pub(crate) enum_cache: Option<Arc<[PropertyKey]>>,
    pub(crate) dependents: DependencyRecord,
}

impl ShapeRecord {
    pub(crate) fn root(kind: ObjectKind, object_size: u32, inlined_slots: u32) -> Self {
        Self {
            kind,
            object_size,
            inlined_slots,
            layout: Vec::new(),
            index: FxHashMap::default(),
            elements_kind: ElementsKind::default(),
            prototype: None,
            flags: ShapeFlags::STABLE,
            transitions: TransitionEdges::Empty,
            parent: None,
            transition_key: None,
            dictionary: None,
            marker: ChangeMarker::default(),
            proto_details: None,
            owner: None,
            enum_cache: None,
            dependents: DependencyRecord::default(),
        }
    }

    /// Copy for a transition: same layout, fresh edges, caches and markers
    pub(crate) fn derive(&self) -> Self {
        let mut flags = (self.flags & ShapeFlags::INHERITED) | ShapeFlags::STABLE;
        if self.is_dictionary() {
            flags.remove(ShapeFlags::STABLE);
            flags.insert(ShapeFlags::DICTIONARY);
        }
        Self {
            kind: self.kind,
            object_size: self.object_size,
            inlined_slots: self.inlined_slots,
            layout: self.layout.clone(),
            index: self.index.clone(),
            elements_kind: self.elements_kind,
            prototype: self.prototype,
            flags,
            transitions: TransitionEdges::Empty,
            parent: None,
            transition_key: None,
            dictionary: self.dictionary.clone(),
            marker: ChangeMarker::default(),
            proto_details: None,
            owner: None,
            enum_cache: None,
            dependents: DependencyRecord::default(),
        }
    }

    pub(crate) fn push_entry(&mut self, entry: PropertyEntry) {
        self.index.insert(entry.key.clone(), self.layout.len() as u32);
        self.layout.push(entry);
    }

    /// Object kind
    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Base object size in bytes
    #[inline]
    pub fn object_size(&self) -> u32 {
        self.object_size
    }

    /// Number of in-object property slots
    #[inline]
    pub fn inlined_slots(&self) -> u32 {
        self.inlined_slots
    }

    /// Ordered layout. Empty for dictionary shapes.
    #[inline]
    pub fn properties(&self) -> &[PropertyEntry] {
        &self.layout
    }

    /// Number of properties, including dictionary entries
    pub fn property_count(&self) -> usize {
        match &self.dictionary {
            Some(table) => table.entries.len(),
            None => self.layout.len(),
        }
    }

    /// Dictionary entries in insertion order
    pub fn dictionary_entries(&self) -> impl Iterator<Item = &PropertyEntry> {
        self.dictionary.iter().flat_map(|t| t.entries.values())
    }

    /// Elements kind
    #[inline]
    pub fn elements_kind(&self) -> ElementsKind {
        self.elements_kind
    }

    /// Prototype object
    #[inline]
    pub fn prototype(&self) -> Option<ObjectId> {
        self.prototype
    }

    /// State flags
    #[inline]
    pub fn flags(&self) -> ShapeFlags {
        self.flags
    }

    /// See [`ShapeFlags::STABLE`]
    #[inline]
    pub fn is_stable(&self) -> bool {
        self.flags.contains(ShapeFlags::STABLE)
    }

    /// See [`ShapeFlags::PROTOTYPE`]
    #[inline]
    pub fn is_prototype(&self) -> bool {
        self.flags.contains(ShapeFlags::PROTOTYPE)
    }

    /// See [`ShapeFlags::DICTIONARY`]
    #[inline]
    pub fn is_dictionary(&self) -> bool {
        self.flags.contains(ShapeFlags::DICTIONARY)
    }

    /// See [`ShapeFlags::SHARED`]
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.flags.contains(ShapeFlags::SHARED)
    }

    /// Shape this one was derived from
    #[inline]
    pub fn parent(&self) -> Option<ShapeId> {
        self.parent
    }

    /// Key of the edge leading here from the parent
    #[inline]
    pub fn transition_key(&self) -> Option<&TransitionKey> {
        self.transition_key.as_ref()
    }

    /// Outgoing transition edges
    #[inline]
    pub fn transitions(&self) -> &TransitionEdges {
        &self.transitions
    }

    /// Prototype-chain change marker
    #[inline]
    pub fn change_marker(&self) -> &ChangeMarker {
        &self.marker
    }

    /// Object this prototype shape belongs to
    #[inline]
    pub fn prototype_owner(&self) -> Option<ObjectId> {
        self.owner
    }

    /// Number of prototype shapes listening on this one
    pub fn listener_count(&self) -> usize {
        self.proto_details
            .as_ref()
            .map_or(0, ProtoDetails::live_listener_count)
    }

    /// Is this shape registered on its prototype's listener list
    pub fn is_registered_listener(&self) -> bool {
        self.proto_details
            .as_ref()
            .is_some_and(|d| d.registered_index.is_some())
    }

    /// Dependency entries of optimized code on this shape
    #[inline]
    pub fn dependents(&self) -> &DependencyRecord {
        &self.dependents
    }

    pub(crate) fn position_of(&self, key: &PropertyKey) -> Option<usize> {
        self.index.get(key).map(|&i| i as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::PropertyAttributes;

    #[test]
    fn test_derive_resets_per_shape_state() {
        let mut root = ShapeRecord::root(ObjectKind::Plain, 16, 4);
        root.flags |= ShapeFlags::CLASS_PROTOTYPE | ShapeFlags::PROTOTYPE;
        root.flags.remove(ShapeFlags::STABLE);
        root.push_entry(PropertyEntry {
            key: PropertyKey::string("x"),
            offset: 0,
            attributes: PropertyAttributes::data(),
        });
        root.marker.mark_changed();

        let child = root.derive();
        assert!(child.is_stable());
        assert!(!child.is_prototype());
        assert!(child.flags.contains(ShapeFlags::CLASS_PROTOTYPE));
        assert!(!child.change_marker().has_changed());
        assert_eq!(child.position_of(&PropertyKey::string("x")), Some(0));
        assert!(child.transitions().is_empty());
    }

    #[test]
    fn test_listener_slots_are_reused() {
        let mut details = ProtoDetails::default();
        let a = ShapeId::new(1, 0).downgrade();
        let b = ShapeId::new(2, 0).downgrade();
        let slot_a = details.push_listener(a);
        details.push_listener(b);
        details.remove_listener(slot_a);
        assert_eq!(details.live_listener_count(), 1);
        assert_eq!(details.push_listener(a), slot_a);
        assert_eq!(details.live_listener_count(), 2);
    }

    #[test]
    fn test_elements_kind_generalizes() {
        assert_eq!(
            ElementsKind::PackedInt.generalize(ElementsKind::PackedDouble),
            ElementsKind::PackedDouble
        );
        assert_eq!(
            ElementsKind::Dictionary.generalize(ElementsKind::PackedInt),
            ElementsKind::Dictionary
        );
    }
}
