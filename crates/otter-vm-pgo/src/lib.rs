//! # Otter VM PGO
//!
//! Type feedback collection and shape reconstruction for Otter VM.
//!
//! The [`BytecodeTypeProfiler`] turns the inline-cache slots a method left
//! behind into per-offset [`SiteFeedback`], naming shapes with stable
//! [`ProfileType`]s and recording the transition trees they belong to as
//! [`LayoutDescription`]s. The [`ShapeReconstructor`] replays those layouts
//! into a fresh [`otter_vm_shape::ShapeStore`] so a later run starts with the
//! shapes the profiled run ended with.
//!
//! ## Design
//!
//! - **Explicit context**: a [`CompilationContext`] carries configuration,
//!   the [`ProfileTypeStore`] and the recorded profile; nothing is global
//! - **First writer wins**: concurrent reconstructions of one profile type
//!   agree on a single shape
//! - **No errors for missing data**: insufficient profile is an `Option` or
//!   [`SiteFeedback::InsufficientProfile`]; only file I/O and decoding fail
//! - **Two persisted forms**: JSON profiles via serde and a compact binary
//!   layout format with validated key hashes and parent links

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod layout;
pub mod profile_type;
pub mod profiler;
pub mod reconstructor;
pub mod record;
mod tags;
pub mod type_store;

pub use codec::{decode_layouts, encode_layouts, load_layouts, save_layouts};
pub use config::{DEFAULT_CONFIG_FILE, PgoConfig, ProfilerMode};
pub use context::{CompilationContext, GlobalEnv, HAS_INSTANCE_SYMBOL};
pub use error::{CodecError, PgoError, Result};
pub use layout::{ACCESSOR_METHOD_PREFIX, ChildLayout, LayoutDescription, LayoutKey, LayoutProperty};
pub use profile_type::{LocationRole, ProfileLocation, ProfileType, ProfileTypeKind, ProfileTypeTuple};
pub use profiler::{
    BytecodeTypeProfiler, CallTarget, DefineSite, FeedbackTuple, MethodFeedback, ProfilerState,
    SiteFeedback, TypeHint,
};
pub use reconstructor::{ObjectAllocator, RootRole, ShapeReconstructor};
pub use record::{ProfileRecord, ProtoTransitionRecord};
pub use type_store::ProfileTypeStore;
