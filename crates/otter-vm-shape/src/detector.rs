//! Global invariants: builtin feature detectors and the hot-reload stage
//!
//! Optimized code may assume a builtin protocol is untouched (for example that
//! `Array.prototype[Symbol.iterator]` is the original). Those assumptions are
//! not tied to one shape, so their dependents are tracked here.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::dependency::{CodeRef, DependencyGroup};
use crate::deopt::DeoptReason;
use crate::store::ShapeStore;

/// Builtin behavior optimized code can assume unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureDetector {
    /// Canonical array prototype has not been modified
    ArrayPrototypeUnmodified,
    /// Array iteration protocol is the builtin one
    ArrayIteration,
    /// Map iteration protocol is the builtin one
    MapIteration,
    /// Set iteration protocol is the builtin one
    SetIteration,
    /// String iteration protocol is the builtin one
    StringIteration,
    /// `Array[Symbol.species]` is the builtin one
    ArraySpecies,
    /// `RegExp.prototype[Symbol.replace]` is the builtin one
    RegExpReplace,
    /// Typed array iteration protocol is the builtin one
    TypedArrayIteration,
}

/// Hot-reload patching stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HotReloadStage {
    /// No patch involved
    #[default]
    Initial,
    /// A patch's entry point is running
    ExecutingPatch,
    /// Patch loaded and active
    Loaded,
    /// Patch unloaded
    Unloaded,
}

#[derive(Debug, Default)]
pub(crate) struct GlobalInvariants {
    pub(crate) broken: FxHashSet<FeatureDetector>,
    pub(crate) detector_dependents: FxHashMap<FeatureDetector, Vec<CodeRef>>,
    pub(crate) stage: HotReloadStage,
    pub(crate) stage_dependents: Vec<CodeRef>,
}

impl ShapeStore {
    /// Is the detected builtin behavior still intact
    pub fn is_detector_intact(&self, detector: FeatureDetector) -> bool {
        !self.globals.broken.contains(&detector)
    }

    /// Mark a detector broken and deoptimize code that relied on it.
    ///
    /// Returns the number of code objects scheduled. Detectors never recover.
    pub fn invalidate_detector(&mut self, detector: FeatureDetector) -> usize {
        if !self.globals.broken.insert(detector) {
            return 0;
        }
        let dependents = self
            .globals
            .detector_dependents
            .remove(&detector)
            .unwrap_or_default();
        let reason = DeoptReason::from_group(DependencyGroup::FEATURE_DETECTOR);
        let scheduled = dependents
            .into_iter()
            .filter(|&code| self.deopt.schedule(code, reason))
            .count();
        tracing::info!(?detector, scheduled, "feature detector invalidated");
        scheduled
    }

    /// Current hot-reload stage
    pub fn hot_reload_stage(&self) -> HotReloadStage {
        self.globals.stage
    }

    /// Move to another hot-reload stage; code compiled under the old stage is
    /// deoptimized. Returns the number of code objects scheduled.
    pub fn set_hot_reload_stage(&mut self, stage: HotReloadStage) -> usize {
        if self.globals.stage == stage {
            return 0;
        }
        tracing::info!(from = ?self.globals.stage, to = ?stage, "hot reload stage changed");
        self.globals.stage = stage;
        let reason = DeoptReason::from_group(DependencyGroup::HOT_RELOAD);
        std::mem::take(&mut self.globals.stage_dependents)
            .into_iter()
            .filter(|&code| self.deopt.schedule(code, reason))
            .count()
    }
}
