//! Lazy deoptimization queue
//!
//! Broken dependencies do not tear code down on the spot. The store records
//! a [`DeoptRequest`] per affected code object and the JIT drains them at its
//! next safepoint. A code object is scheduled at most once per installation.

use std::collections::VecDeque;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::dependency::{CodeRef, DependencyGroup, FunctionId};

/// Why a code object was scheduled for deoptimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeoptReason {
    /// A shape gained a transition or lost its objects
    ShapeUnstable,
    /// Instances of a shape started serving as prototypes
    BecamePrototype,
    /// A prototype chain the code walked has changed
    PrototypeChainChanged,
    /// A field representation was widened
    FieldRepresentation,
    /// A builtin feature detector was invalidated
    FeatureDetector,
    /// The hot-reload stage moved on
    HotReload,
}

impl DeoptReason {
    /// Most specific reason for the given triggered groups
    pub fn from_group(group: DependencyGroup) -> Self {
        if group.contains(DependencyGroup::PROTO_CHAIN) {
            Self::PrototypeChainChanged
        } else if group.contains(DependencyGroup::NOT_PROTOTYPE) {
            Self::BecamePrototype
        } else if group.contains(DependencyGroup::FIELD_REPRESENTATION) {
            Self::FieldRepresentation
        } else if group.contains(DependencyGroup::FEATURE_DETECTOR) {
            Self::FeatureDetector
        } else if group.contains(DependencyGroup::HOT_RELOAD) {
            Self::HotReload
        } else {
            Self::ShapeUnstable
        }
    }
}

/// A code object that must be discarded before it runs again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeoptRequest {
    /// Invalidated code
    pub code: CodeRef,
    /// Trigger
    pub reason: DeoptReason,
}

/// Callback invoked synchronously for every scheduled request
pub type DeoptHandler = Box<dyn Fn(&DeoptRequest) + Send + Sync>;

#[derive(Default)]
pub(crate) struct DeoptQueue {
    generations: FxHashMap<FunctionId, u32>,
    invalidated: FxHashSet<CodeRef>,
    pending: VecDeque<DeoptRequest>,
    handler: Option<DeoptHandler>,
}

impl DeoptQueue {
    /// Issue a code handle for a fresh installation of `function`
    pub(crate) fn install(&mut self, function: FunctionId) -> CodeRef {
        let generation = self.generations.entry(function).or_insert(0);
        *generation += 1;
        CodeRef {
            function,
            generation: *generation,
        }
    }

    pub(crate) fn is_current(&self, code: CodeRef) -> bool {
        self.generations.get(&code.function) == Some(&code.generation)
            && !self.invalidated.contains(&code)
    }

    /// Returns false if the code was already invalidated or superseded
    pub(crate) fn schedule(&mut self, code: CodeRef, reason: DeoptReason) -> bool {
        if !self.is_current(code) {
            return false;
        }
        self.invalidated.insert(code);
        let request = DeoptRequest { code, reason };
        tracing::debug!(
            function = code.function.0,
            generation = code.generation,
            ?reason,
            "scheduled lazy deoptimization"
        );
        if let Some(handler) = &self.handler {
            handler(&request);
        }
        self.pending.push_back(request);
        true
    }

    pub(crate) fn drain(&mut self) -> Vec<DeoptRequest> {
        self.pending.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn set_handler(&mut self, handler: Option<DeoptHandler>) {
        self.handler = handler;
    }

    /// Forget invalidated installations a newer one has superseded.
    ///
    /// Those fail the generation check on their own.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.invalidated.len();
        let generations = &self.generations;
        self.invalidated
            .retain(|code| generations.get(&code.function) == Some(&code.generation));
        before - self.invalidated.len()
    }
}

impl fmt::Debug for DeoptQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeoptQueue")
            .field("installed", &self.generations.len())
            .field("invalidated", &self.invalidated.len())
            .field("pending", &self.pending.len())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
