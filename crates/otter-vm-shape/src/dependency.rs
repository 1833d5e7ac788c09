//! Speculation dependencies
//!
//! A compiler job collects the invariants its code relies on into a
//! [`CompilationDependencies`] set while it optimizes. Each `depend_on_*` call
//! checks the invariant immediately and refuses (returns `false`) if it does
//! not hold, so the compiler can fall back to a generic path. [`commit`]
//! re-validates the whole set and installs it all-or-nothing.
//!
//! Once installed, an entry lives on the shape it guards until the invariant
//! breaks; the store then schedules the code for lazy deoptimization and drops
//! the entry for good.
//!
//! [`commit`]: CompilationDependencies::commit

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::attributes::Representation;
use crate::detector::{FeatureDetector, HotReloadStage};
use crate::key::PropertyKey;
use crate::shape::{ShapeFlags, ShapeId};
use crate::store::ShapeStore;

/// Identity of an optimizable function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FunctionId(pub u32);

/// One installation of optimized code for a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeRef {
    /// Owning function
    pub function: FunctionId,
    /// Installation counter, bumped on every successful commit
    pub generation: u32,
}

bitflags! {
    /// Invariant groups a dependency entry listens to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DependencyGroup: u32 {
        /// Shape has no transitions and still describes its objects
        const STABILITY = 1 << 0;
        /// Instances of the shape are not used as prototypes
        const NOT_PROTOTYPE = 1 << 1;
        /// Prototype chain through the shape is unchanged
        const PROTO_CHAIN = 1 << 2;
        /// Field representation has not been widened
        const FIELD_REPRESENTATION = 1 << 3;
        /// Builtin feature detector still intact
        const FEATURE_DETECTOR = 1 << 4;
        /// Hot-reload stage unchanged
        const HOT_RELOAD = 1 << 5;
    }
}

/// Per-shape dependency entries.
///
/// Entries for the same code object are merged by OR-ing their groups.
#[derive(Debug, Default)]
pub struct DependencyRecord {
    entries: SmallVec<[(CodeRef, DependencyGroup); 4]>,
}

impl DependencyRecord {
    /// Number of code objects depending on the shape
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No dependents
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in installation order
    pub fn iter(&self) -> impl Iterator<Item = (CodeRef, DependencyGroup)> + '_ {
        self.entries.iter().copied()
    }

    /// Groups installed for `code`, if any
    pub fn groups_of(&self, code: CodeRef) -> Option<DependencyGroup> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|&(_, groups)| groups)
    }

    pub(crate) fn add(&mut self, code: CodeRef, group: DependencyGroup) {
        match self.entries.iter_mut().find(|(c, _)| *c == code) {
            Some((_, groups)) => *groups |= group,
            None => self.entries.push((code, group)),
        }
    }

    /// Remove and return the entries listening to any group in `mask`
    pub(crate) fn take_matching(
        &mut self,
        mask: DependencyGroup,
    ) -> SmallVec<[(CodeRef, DependencyGroup); 4]> {
        let mut taken = SmallVec::new();
        self.entries.retain(|&mut (code, groups)| {
            if groups.intersects(mask) {
                taken.push((code, groups & mask));
                false
            } else {
                true
            }
        });
        taken
    }
}

/// A single speculated invariant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// `shape` stays stable
    Stability(ShapeId),
    /// Objects with `shape` are not prototypes
    NotPrototype(ShapeId),
    /// The chain from `receiver` up to `holder` keeps its current shapes
    StableProtoChain {
        /// Shape the lookup started from
        receiver: ShapeId,
        /// Shape of the object the property was found on
        holder: ShapeId,
    },
    /// Field `key` on `shape` is no wider than `representation`
    FieldRepresentation {
        /// Guarded shape
        shape: ShapeId,
        /// Field key
        key: PropertyKey,
        /// Assumed representation
        representation: Representation,
    },
    /// Builtin feature detector intact
    FeatureDetector(FeatureDetector),
    /// Hot-reload stage unchanged
    HotReload(HotReloadStage),
}

impl Dependency {
    /// Group its entries are installed under
    pub fn group(&self) -> DependencyGroup {
        match self {
            Self::Stability(_) => DependencyGroup::STABILITY,
            Self::NotPrototype(_) => DependencyGroup::NOT_PROTOTYPE,
            Self::StableProtoChain { .. } => DependencyGroup::PROTO_CHAIN,
            Self::FieldRepresentation { .. } => DependencyGroup::FIELD_REPRESENTATION,
            Self::FeatureDetector(_) => DependencyGroup::FEATURE_DETECTOR,
            Self::HotReload(_) => DependencyGroup::HOT_RELOAD,
        }
    }

    /// Short name for logging
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Stability(_) => "stability",
            Self::NotPrototype(_) => "not-prototype",
            Self::StableProtoChain { .. } => "stable-proto-chain",
            Self::FieldRepresentation { .. } => "field-representation",
            Self::FeatureDetector(_) => "feature-detector",
            Self::HotReload(_) => "hot-reload",
        }
    }

    /// Does the invariant hold right now
    pub fn is_valid(&self, store: &ShapeStore) -> bool {
        match self {
            Self::Stability(shape) => store
                .get(*shape)
                .is_some_and(|r| r.is_stable() && !r.is_dictionary()),
            Self::NotPrototype(shape) => store.get(*shape).is_some_and(|r| {
                !r.flags().intersects(ShapeFlags::PROTOTYPE | ShapeFlags::PROTOTYPE_SOURCE)
            }),
            Self::StableProtoChain { receiver, holder } => {
                store.prototype_chain(*receiver, *holder).is_some()
            }
            Self::FieldRepresentation {
                shape,
                key,
                representation,
            } => store
                .find_property(*shape, key)
                .is_some_and(|e| e.attributes.representation <= *representation),
            Self::FeatureDetector(detector) => store.is_detector_intact(*detector),
            Self::HotReload(stage) => store.hot_reload_stage() == *stage,
        }
    }

    /// Attach an entry for `code`. Only called right after `is_valid`.
    fn install(&self, store: &mut ShapeStore, code: CodeRef) {
        let group = self.group();
        match self {
            Self::Stability(shape)
            | Self::NotPrototype(shape)
            | Self::FieldRepresentation { shape, .. } => {
                store.shape_mut(*shape).dependents.add(code, group);
            }
            Self::StableProtoChain { receiver, holder } => {
                for shape in store.prototype_chain(*receiver, *holder).unwrap_or_default() {
                    store.shape_mut(shape).dependents.add(code, group);
                }
            }
            Self::FeatureDetector(detector) => {
                store
                    .globals
                    .detector_dependents
                    .entry(*detector)
                    .or_default()
                    .push(code);
            }
            Self::HotReload(_) => store.globals.stage_dependents.push(code),
        }
    }
}

/// Dependencies collected by one compilation job
#[derive(Debug)]
pub struct CompilationDependencies {
    function: FunctionId,
    pending: Vec<Dependency>,
}

impl CompilationDependencies {
    /// Start collecting for `function`
    pub fn new(function: FunctionId) -> Self {
        Self {
            function,
            pending: Vec::new(),
        }
    }

    /// Function being compiled
    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// Pending dependencies
    pub fn pending(&self) -> &[Dependency] {
        &self.pending
    }

    /// Speculate that `shape` stays stable
    pub fn depend_on_stability(&mut self, store: &ShapeStore, shape: ShapeId) -> bool {
        self.record(store, Dependency::Stability(shape))
    }

    /// Speculate that objects of `shape` never become prototypes
    pub fn depend_on_not_prototype(&mut self, store: &ShapeStore, shape: ShapeId) -> bool {
        self.record(store, Dependency::NotPrototype(shape))
    }

    /// Speculate that the chain from `receiver` to `holder` stays as it is
    pub fn depend_on_stable_proto_chain(
        &mut self,
        store: &ShapeStore,
        receiver: ShapeId,
        holder: ShapeId,
    ) -> bool {
        self.record(store, Dependency::StableProtoChain { receiver, holder })
    }

    /// Speculate that field `key` of `shape` stays within `representation`
    pub fn depend_on_field_representation(
        &mut self,
        store: &ShapeStore,
        shape: ShapeId,
        key: PropertyKey,
        representation: Representation,
    ) -> bool {
        self.record(
            store,
            Dependency::FieldRepresentation {
                shape,
                key,
                representation,
            },
        )
    }

    /// Speculate that a builtin feature detector stays intact
    pub fn depend_on_feature_detector(
        &mut self,
        store: &ShapeStore,
        detector: FeatureDetector,
    ) -> bool {
        self.record(store, Dependency::FeatureDetector(detector))
    }

    /// Speculate that the current hot-reload stage does not change
    pub fn depend_on_hot_reload(&mut self, store: &ShapeStore) -> bool {
        self.record(store, Dependency::HotReload(store.hot_reload_stage()))
    }

    fn record(&mut self, store: &ShapeStore, dependency: Dependency) -> bool {
        if !dependency.is_valid(store) {
            tracing::trace!(
                function = self.function.0,
                kind = dependency.kind_name(),
                "speculation refused"
            );
            return false;
        }
        if !self.pending.contains(&dependency) {
            self.pending.push(dependency);
        }
        true
    }

    /// Re-validate every pending dependency and install them all.
    ///
    /// Returns the handle of the new code installation, or `None` when any
    /// dependency broke since it was recorded; nothing is installed then.
    pub fn commit(self, store: &mut ShapeStore) -> Option<CodeRef> {
        if let Some(broken) = self.pending.iter().find(|d| !d.is_valid(store)) {
            tracing::debug!(
                function = self.function.0,
                kind = broken.kind_name(),
                "commit rejected, dependency no longer holds"
            );
            return None;
        }
        let code = store.deopt.install(self.function);
        for dependency in &self.pending {
            dependency.install(store, code);
        }
        tracing::debug!(
            function = self.function.0,
            generation = code.generation,
            dependencies = self.pending.len(),
            "dependencies committed"
        );
        Some(code)
    }
}
