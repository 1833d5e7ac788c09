//! Recorded profile of one compilation unit
//!
//! Everything the profiler learned that outlives the process: layouts of
//! root types, root → prototype associations, prototype transitions and the
//! per-method site feedback. Persisted as JSON.

use std::path::Path;

use otter_vm_bytecode::{AbcId, MethodId};
use serde::{Deserialize, Serialize};

use crate::error::{PgoError, Result};
use crate::layout::LayoutDescription;
use crate::profile_type::ProfileType;
use crate::profiler::MethodFeedback;

/// A function's prototype was replaced after instances of `base` existed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtoTransitionRecord {
    /// Instance root type before the replacement
    pub base: ProfileType,
    /// Instance root type after it
    pub transition: ProfileType,
    /// Type of the installed prototype
    pub prototype: ProfileType,
}

/// Recorded profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileRecord {
    /// Compilation unit
    pub abc: AbcId,
    /// Layouts by root type, at most one per root
    pub layouts: Vec<LayoutDescription>,
    /// (root type, prototype type) pairs
    pub root_prototypes: Vec<(ProfileType, ProfileType)>,
    /// Prototype transitions
    pub proto_transitions: Vec<ProtoTransitionRecord>,
    /// Site feedback by method
    pub methods: Vec<MethodFeedback>,
}

impl ProfileRecord {
    /// Empty profile of `abc`
    pub fn new(abc: AbcId) -> Self {
        Self {
            abc,
            ..Self::default()
        }
    }

    // ==================== Layouts ====================

    /// Layout of `root_type`
    pub fn layout(&self, root_type: ProfileType) -> Option<&LayoutDescription> {
        self.layouts.iter().find(|l| l.root_type == root_type)
    }

    /// Mutable layout of `root_type`
    pub fn layout_mut(&mut self, root_type: ProfileType) -> Option<&mut LayoutDescription> {
        self.layouts.iter_mut().find(|l| l.root_type == root_type)
    }

    /// Add a layout; an existing layout of the same root is kept.
    ///
    /// Returns whether `layout` was added.
    pub fn insert_layout(&mut self, layout: LayoutDescription) -> bool {
        if self.layout(layout.root_type).is_some() {
            return false;
        }
        self.layouts.push(layout);
        true
    }

    /// Add layouts loaded from the binary format
    pub fn merge_layouts(&mut self, layouts: impl IntoIterator<Item = LayoutDescription>) -> usize {
        let mut added = 0;
        for layout in layouts {
            if self.insert_layout(layout) {
                added += 1;
            }
        }
        added
    }

    // ==================== Prototypes ====================

    /// Associate a root type with the type of its prototype; the first
    /// association of a root is kept
    pub fn add_root_prototype(&mut self, root_type: ProfileType, prototype: ProfileType) {
        if self.prototype_of(root_type).is_none() {
            self.root_prototypes.push((root_type, prototype));
        }
    }

    /// Prototype type of `root_type`
    pub fn prototype_of(&self, root_type: ProfileType) -> Option<ProfileType> {
        self.root_prototypes
            .iter()
            .find(|(root, _)| *root == root_type)
            .map(|(_, prototype)| *prototype)
    }

    /// Record a prototype transition once
    pub fn add_proto_transition(&mut self, record: ProtoTransitionRecord) {
        if !self.proto_transitions.contains(&record) {
            self.proto_transitions.push(record);
        }
    }

    // ==================== Methods ====================

    /// Store feedback of a method, replacing earlier feedback
    pub fn record_method(&mut self, feedback: MethodFeedback) {
        match self.methods.iter_mut().find(|m| m.method == feedback.method) {
            Some(existing) => *existing = feedback,
            None => self.methods.push(feedback),
        }
    }

    /// Feedback of `method`
    pub fn method(&self, method: MethodId) -> Option<&MethodFeedback> {
        self.methods.iter().find(|m| m.method == method)
    }

    // ==================== Persistence ====================

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON, validating layouts
    pub fn from_json(json: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(json)?;
        for layout in &record.layouts {
            layout.validate()?;
        }
        Ok(record)
    }

    /// Write to `path` as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).map_err(|source| PgoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), layouts = self.layouts.len(), "saved profile");
        Ok(())
    }

    /// Read a profile written by [`save`](Self::save)
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| PgoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let record = Self::from_json(&json)?;
        tracing::debug!(path = %path.display(), layouts = record.layouts.len(), "loaded profile");
        Ok(record)
    }
}
