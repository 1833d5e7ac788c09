//! Profile Type Store
//!
//! Per-compilation-unit mapping between profile types and live shapes. All
//! tables are concurrent maps; inserts are insert-if-absent so concurrent
//! reconstructions of the same key agree on one shape.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use otter_vm_shape::{ElementsKind, PropertyKey, ShapeId, ShapeStore};
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::profile_type::{ProfileLocation, ProfileType, ProfileTypeKind, ProfileTypeTuple};

type FxDashMap<K, V> = DashMap<K, V, FxBuildHasher>;

/// Profile-type tables of one compilation unit
#[derive(Debug, Default)]
pub struct ProfileTypeStore {
    shapes: FxDashMap<ProfileTypeTuple, ShapeId>,
    names: FxDashMap<ShapeId, ProfileTypeTuple>,
    next_local: FxDashMap<ProfileType, AtomicU32>,
    locations: FxDashMap<ProfileLocation, ProfileType>,
    transitions: FxDashMap<ProfileType, SmallVec<[ProfileType; 2]>>,
    elements: FxDashMap<ProfileType, ElementsKind>,
    constpool: FxDashMap<u32, u32>,
    symbols: FxDashMap<ProfileType, PropertyKey>,
    aliases: FxDashMap<ProfileType, ProfileType>,
    next_trace: AtomicU32,
}

impl ProfileTypeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Shapes ====================

    /// Record `shape` for `tuple`.
    ///
    /// The first writer wins unless `update` is set. Returns the shape now
    /// recorded for `tuple`.
    pub fn record_shape(&self, tuple: ProfileTypeTuple, shape: ShapeId, update: bool) -> ShapeId {
        let winner = match self.shapes.entry(tuple) {
            Entry::Occupied(mut entry) => {
                if update {
                    self.names.remove(entry.get());
                    entry.insert(shape);
                }
                *entry.get()
            }
            Entry::Vacant(entry) => *entry.insert(shape),
        };
        if winner == shape {
            self.names.insert(shape, tuple);
        }
        winner
    }

    /// Shape recorded for `tuple`
    pub fn query_shape(&self, tuple: ProfileTypeTuple) -> Option<ShapeId> {
        self.shapes.get(&tuple).map(|s| *s)
    }

    /// Profile name of a shape, if it has one
    pub fn name_of(&self, shape: ShapeId) -> Option<ProfileTypeTuple> {
        self.names.get(&shape).map(|t| *t)
    }

    /// Mark a live shape as the root of `root_type`'s transition tree
    pub fn set_root_profile_type(&self, shape: ShapeId, root_type: ProfileType) {
        self.record_shape(ProfileTypeTuple::root(root_type), shape, true);
    }

    /// Root type of the tree `shape` belongs to, walking parent links
    pub fn root_type_of(&self, store: &ShapeStore, shape: ShapeId) -> Option<ProfileType> {
        let mut current = Some(shape);
        while let Some(id) = current {
            if let Some(tuple) = self.name_of(id) {
                return Some(tuple.root);
            }
            current = store.get(id)?.parent();
        }
        None
    }

    /// Name of `shape` within `root`'s tree, numbering it if new
    pub fn get_or_insert_child(&self, shape: ShapeId, root: ProfileType) -> ProfileTypeTuple {
        if let Some(tuple) = self.name_of(shape)
            && tuple.root == root
        {
            return tuple;
        }
        let id = self
            .next_local
            .entry(root)
            .or_insert_with(|| AtomicU32::new(1))
            .fetch_add(1, Ordering::Relaxed);
        let child = ProfileType::new(root.abc, id, ProfileTypeKind::Local);
        let tuple = ProfileTypeTuple::new(root, child);
        let winner = self.record_shape(tuple, shape, false);
        self.name_of(winner).unwrap_or(tuple)
    }

    /// Forget shapes that were collected
    pub fn prune(&self, store: &ShapeStore) -> usize {
        let before = self.shapes.len();
        self.shapes.retain(|_, shape| store.is_live(*shape));
        self.names.retain(|shape, _| store.is_live(*shape));
        before - self.shapes.len()
    }

    // ==================== Locations ====================

    /// Record the root type defined at a location
    pub fn record_location(&self, location: ProfileLocation, root_type: ProfileType) {
        self.locations.entry(location).or_insert(root_type);
    }

    /// Root type defined at a location
    pub fn root_type_by_location(&self, location: ProfileLocation) -> Option<ProfileType> {
        self.locations.get(&location).map(|t| *t)
    }

    /// Fresh allocation trace id for a literal or transition type
    pub fn allocate_trace_id(&self) -> u32 {
        self.next_trace.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ==================== Prototype transitions ====================

    /// Record that instances of `base` were reshaped into `transition`
    pub fn record_transition(&self, base: ProfileType, transition: ProfileType) {
        let mut entry = self.transitions.entry(base).or_default();
        if !entry.contains(&transition) {
            entry.push(transition);
        }
    }

    /// Every transition type recorded for `base`
    pub fn find_all_transitions_by_base(&self, base: ProfileType) -> Vec<ProfileType> {
        self.transitions
            .get(&base)
            .map(|t| t.to_vec())
            .unwrap_or_default()
    }

    // ==================== Definition-site data ====================

    /// Elements kind observed for a literal type
    pub fn record_elements_kind(&self, literal: ProfileType, kind: ElementsKind) {
        self.elements
            .entry(literal)
            .and_modify(|k| *k = k.generalize(kind))
            .or_insert(kind);
    }

    /// Elements kind of a literal type
    pub fn elements_kind(&self, literal: ProfileType) -> Option<ElementsKind> {
        self.elements.get(&literal).map(|k| *k)
    }

    /// Constant-pool slot holding the literal of allocation trace `trace_id`
    pub fn record_constpool_index(&self, trace_id: u32, index: u32) {
        self.constpool.entry(trace_id).or_insert(index);
    }

    /// Constant-pool slot of an allocation trace
    pub fn constpool_index(&self, trace_id: u32) -> Option<u32> {
        self.constpool.get(&trace_id).map(|i| *i)
    }

    /// Symbol identity a profile type stands for
    pub fn record_symbol(&self, profile_type: ProfileType, symbol: PropertyKey) {
        self.symbols.entry(profile_type).or_insert(symbol);
    }

    /// Symbol of a profile type
    pub fn symbol(&self, profile_type: ProfileType) -> Option<PropertyKey> {
        self.symbols.get(&profile_type).map(|s| s.clone())
    }

    // ==================== Aliases ====================

    /// Resolve `from` to `to`; `alias(t, t)` marks `t` as known without layout
    pub fn alias(&self, from: ProfileType, to: ProfileType) {
        self.aliases.entry(from).or_insert(to);
    }

    /// Follow aliases from `profile_type`
    pub fn resolve(&self, profile_type: ProfileType) -> ProfileType {
        let mut current = profile_type;
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(&current).map(|t| *t) {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        current
    }

    /// Has an alias (possibly the identity) been registered
    pub fn has_alias(&self, profile_type: ProfileType) -> bool {
        self.aliases.contains_key(&profile_type)
    }

    /// Drop every table; used between unrelated compilation units
    pub fn clear(&self) {
        self.shapes.clear();
        self.names.clear();
        self.next_local.clear();
        self.locations.clear();
        self.transitions.clear();
        self.elements.clear();
        self.constpool.clear();
        self.symbols.clear();
        self.aliases.clear();
    }

    /// Number of recorded shapes
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// No shapes recorded
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
