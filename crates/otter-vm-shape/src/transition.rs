//! Transition edges between shapes

use rustc_hash::FxHashMap;

use crate::attributes::PropertyAttributes;
use crate::key::{ObjectId, PropertyKey};
use crate::shape::{ElementsKind, WeakShape};

/// What a transition changes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransitionKey {
    /// Appends a property with the given attribute metadata
    Property {
        /// Added key
        key: PropertyKey,
        /// [`PropertyAttributes::metadata`] of the added property
        metadata: u8,
    },
    /// Replaces the prototype
    Prototype(Option<ObjectId>),
    /// Generalizes the elements kind
    Elements(ElementsKind),
}

impl TransitionKey {
    /// Key for adding `key` with `attributes`
    pub fn property(key: PropertyKey, attributes: PropertyAttributes) -> Self {
        Self::Property {
            key,
            metadata: attributes.metadata(),
        }
    }
}

/// Outgoing transitions of a shape.
///
/// Most shapes have zero or one successor, so the single case avoids a table.
/// The key of a `Single` edge is stored on the target shape.
#[derive(Debug, Default)]
pub enum TransitionEdges {
    /// No transitions
    #[default]
    Empty,
    /// Exactly one transition
    Single(WeakShape),
    /// Several transitions
    Table(FxHashMap<TransitionKey, WeakShape>),
}

impl TransitionEdges {
    /// No outgoing edge at all
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Single(_) => false,
            Self::Table(table) => table.is_empty(),
        }
    }

    /// Number of edges, live or not
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Single(_) => 1,
            Self::Table(table) => table.len(),
        }
    }

    /// Edge targets, live or not
    pub fn targets(&self) -> Vec<WeakShape> {
        match self {
            Self::Empty => Vec::new(),
            Self::Single(target) => vec![*target],
            Self::Table(table) => table.values().copied().collect(),
        }
    }
}
