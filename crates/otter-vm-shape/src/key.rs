//! Property keys and heap object handles

use std::fmt;
use std::sync::Arc;

/// Handle to an object owned by the external heap.
///
/// The shape store never dereferences it; it only needs identity for
/// prototype links and prototype ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Create a new object handle
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw handle value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Flavor of a symbol key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Ordinary `Symbol()` value, not persistable across runs
    Public,
    /// Private class member (`#name`)
    Private,
    /// Symbol synthesized by the compiler for a class accessor method
    AccessorMethod,
}

/// Property key as seen by shapes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String key
    String(Arc<str>),
    /// Symbol key, identified by its numeric id
    Symbol {
        /// Symbol id
        id: u32,
        /// Symbol flavor
        kind: SymbolKind,
    },
    /// Integer index key
    Index(u32),
}

impl PropertyKey {
    /// Create a string key
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Create a public symbol key
    pub const fn symbol(id: u32) -> Self {
        Self::Symbol {
            id,
            kind: SymbolKind::Public,
        }
    }

    /// Create a private-name key
    pub const fn private(id: u32) -> Self {
        Self::Symbol {
            id,
            kind: SymbolKind::Private,
        }
    }

    /// Create a synthesized accessor-method key
    pub const fn accessor_method(id: u32) -> Self {
        Self::Symbol {
            id,
            kind: SymbolKind::AccessorMethod,
        }
    }

    /// String contents, if this is a string key
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Is this a symbol key of any flavor
    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol { .. })
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol { id, kind } => match kind {
                SymbolKind::Public => write!(f, "Symbol({id})"),
                SymbolKind::Private => write!(f, "#private({id})"),
                SymbolKind::AccessorMethod => write!(f, "#accessor({id})"),
            },
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}
