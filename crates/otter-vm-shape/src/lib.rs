//! # Otter VM Shapes
//!
//! Hidden-class shapes for heap objects, the transition tree that links them,
//! and the speculation dependencies optimized code places on them.
//!
//! ## Design
//!
//! - **Arena-owned**: every shape lives in a [`ShapeStore`] slot and is named
//!   by a generational [`ShapeId`]; weak edges are [`WeakShape`] handles that
//!   stop upgrading once the slot is swept
//! - **Transition sharing**: objects built by the same sequence of property
//!   additions end up on the same shape
//! - **Dictionary fallback**: deletion or exceeding the fast-property ceiling
//!   moves an object to a private, hash-table backed shape (one way)
//! - **Prototype listeners**: prototype shapes form a notification graph so a
//!   change anywhere on a chain invalidates everything below it
//! - **Lazy deoptimization**: optimized code commits [`Dependency`] sets; breaking
//!   one schedules the code in the store's deoptimization queue

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod attributes;
pub mod dependency;
pub mod deopt;
pub mod detector;
pub mod gc;
pub mod key;
mod prototype;
pub mod shape;
pub mod shared;
pub mod store;
pub mod transition;

pub use attributes::{PropertyAttributes, PropertyEntry, Representation};
pub use dependency::{CodeRef, CompilationDependencies, Dependency, DependencyGroup, FunctionId};
pub use deopt::{DeoptReason, DeoptRequest};
pub use detector::{FeatureDetector, HotReloadStage};
pub use gc::ShapeTracer;
pub use key::{ObjectId, PropertyKey, SymbolKind};
pub use prototype::{PrototypeTransition, ProtoRef};
pub use shape::{ChangeMarker, ElementsKind, ObjectKind, ShapeFlags, ShapeId, ShapeRecord, WeakShape};
pub use shared::SharedShapeStore;
pub use store::{ShapeStore, ShapeStoreConfig};
pub use transition::{TransitionEdges, TransitionKey};

/// Maximum number of properties a shape keeps in fast (layout) mode.
pub const MAX_FAST_PROPERTIES: u32 = 1024;

/// Longest object literal whose root shape is cached by length.
pub const MAX_LITERAL_CACHE_LENGTH: u32 = 63;
