//! Compilation context
//!
//! Everything profiling and reconstruction of one compilation unit share:
//! configuration, the Profile Type Store, the recorded profile and the few
//! runtime objects the profiler has to recognize. Passed explicitly; nothing
//! here is global.

use std::path::Path;

use otter_vm_bytecode::AbcId;
use otter_vm_shape::{ObjectId, PropertyKey, ShapeStore};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::PgoConfig;
use crate::error::Result;
use crate::profiler::BytecodeTypeProfiler;
use crate::reconstructor::ShapeReconstructor;
use crate::record::ProfileRecord;
use crate::type_store::ProfileTypeStore;

/// Symbol id of `@@hasInstance` in [`GlobalEnv::default`]
pub const HAS_INSTANCE_SYMBOL: u32 = 1;

/// Runtime objects the profiler compares against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalEnv {
    /// `Function.prototype`
    pub function_prototype: Option<ObjectId>,
    /// Key of `@@hasInstance`
    pub has_instance: PropertyKey,
}

impl Default for GlobalEnv {
    fn default() -> Self {
        Self {
            function_prototype: None,
            has_instance: PropertyKey::symbol(HAS_INSTANCE_SYMBOL),
        }
    }
}

/// Shared state of one compilation unit
#[derive(Debug)]
pub struct CompilationContext {
    abc: AbcId,
    config: PgoConfig,
    env: GlobalEnv,
    type_store: ProfileTypeStore,
    profile: RwLock<ProfileRecord>,
}

impl CompilationContext {
    /// Fresh context with an empty profile
    pub fn new(abc: AbcId, config: PgoConfig) -> Self {
        Self {
            abc,
            config,
            env: GlobalEnv::default(),
            type_store: ProfileTypeStore::new(),
            profile: RwLock::new(ProfileRecord::new(abc)),
        }
    }

    /// Use `env` for runtime object checks
    pub fn with_env(mut self, env: GlobalEnv) -> Self {
        self.env = env;
        self
    }

    /// Start from a recorded profile; its prototype transitions are
    /// registered with the type store
    pub fn with_profile(mut self, profile: ProfileRecord) -> Self {
        for record in &profile.proto_transitions {
            self.type_store.record_transition(record.base, record.transition);
        }
        self.profile = RwLock::new(profile);
        self
    }

    /// Context over the profile saved at `path`
    pub fn load(config: PgoConfig, path: &Path) -> Result<Self> {
        let profile = ProfileRecord::load(path)?;
        Ok(Self::new(profile.abc, config).with_profile(profile))
    }

    /// Compilation unit
    pub fn abc(&self) -> AbcId {
        self.abc
    }

    /// Configuration
    pub fn config(&self) -> &PgoConfig {
        &self.config
    }

    /// Runtime objects
    pub fn env(&self) -> &GlobalEnv {
        &self.env
    }

    /// Profile Type Store
    pub fn type_store(&self) -> &ProfileTypeStore {
        &self.type_store
    }

    /// Read the recorded profile
    pub fn profile(&self) -> RwLockReadGuard<'_, ProfileRecord> {
        self.profile.read()
    }

    /// Update the recorded profile
    pub fn profile_mut(&self) -> RwLockWriteGuard<'_, ProfileRecord> {
        self.profile.write()
    }

    /// Take the recorded profile
    pub fn into_profile(self) -> ProfileRecord {
        self.profile.into_inner()
    }

    /// Save the recorded profile to `path`
    pub fn save_profile(&self, path: &Path) -> Result<()> {
        self.profile().save(path)
    }

    /// Shape store configured from this context
    pub fn new_shape_store(&self) -> ShapeStore {
        ShapeStore::with_config(self.config.shape_store_config())
    }

    /// Profiler recording into this context
    pub fn profiler(&self) -> BytecodeTypeProfiler<'_> {
        BytecodeTypeProfiler::new(self)
    }

    /// Reconstructor reading from this context
    pub fn reconstructor(&self) -> ShapeReconstructor<'_> {
        ShapeReconstructor::new(self)
    }
}
