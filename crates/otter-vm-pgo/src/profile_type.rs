//! Profile types: stable names for shapes across runs

use std::fmt;

use otter_vm_bytecode::{AbcId, MethodId};
use serde::{Deserialize, Serialize};

/// What a recorded type identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProfileTypeKind {
    /// Class instances, keyed by constructor method id
    Class,
    /// Class constructor function object, keyed by constructor method id
    Constructor,
    /// Class prototype object, keyed by constructor method id
    Prototype,
    /// Array literal, keyed by allocation trace id
    ArrayLiteral,
    /// Object literal, keyed by allocation trace id
    ObjectLiteral,
    /// Function object, keyed by method id
    Function,
    /// Builtin object, keyed by builtin id
    Builtin,
    /// Class synthesized by the JIT from a construction site
    Jit,
    /// Megamorphic placeholder
    Mega,
    /// Instance root after a function's prototype was replaced
    Transition,
    /// Prototype installed by such a replacement
    PrototypeTransition,
    /// Non-root shape below some root, numbered per root
    Local,
}

/// Recorded type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileType {
    /// Compilation unit the id belongs to
    pub abc: AbcId,
    /// Identifier within the unit
    pub id: u32,
    /// Identifier kind
    pub kind: ProfileTypeKind,
    /// Recorded for the JIT rather than an offline profile
    pub jit: bool,
}

impl ProfileType {
    /// Create a profile type
    pub const fn new(abc: AbcId, id: u32, kind: ProfileTypeKind) -> Self {
        Self {
            abc,
            id,
            kind,
            jit: false,
        }
    }

    /// Class type of constructor `method`
    pub const fn class(abc: AbcId, method: MethodId) -> Self {
        Self::new(abc, method.0, ProfileTypeKind::Class)
    }

    /// Type of the constructor function object of `method`'s class
    pub const fn constructor(abc: AbcId, method: MethodId) -> Self {
        Self::new(abc, method.0, ProfileTypeKind::Constructor)
    }

    /// Type of the prototype object of `method`'s class
    pub const fn prototype(abc: AbcId, method: MethodId) -> Self {
        Self::new(abc, method.0, ProfileTypeKind::Prototype)
    }

    /// The megamorphic placeholder
    pub const fn mega() -> Self {
        Self::new(AbcId(0), 0, ProfileTypeKind::Mega)
    }

    /// Same type with the JIT flag set
    pub const fn with_jit(mut self) -> Self {
        self.jit = true;
        self
    }

    /// Is this the megamorphic placeholder
    pub fn is_mega(self) -> bool {
        self.kind == ProfileTypeKind::Mega
    }

    /// Can this type name a root shape
    pub fn is_root_kind(self) -> bool {
        !matches!(self.kind, ProfileTypeKind::Mega | ProfileTypeKind::Local)
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({}:{})", self.kind, self.abc.0, self.id)?;
        if self.jit {
            write!(f, "[jit]")?;
        }
        Ok(())
    }
}

/// (root type, child type) pair naming one shape of a transition tree.
///
/// The root shape itself is named by `(root, root)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileTypeTuple {
    /// Type of the tree's root
    pub root: ProfileType,
    /// Type of the shape within the tree
    pub child: ProfileType,
}

impl ProfileTypeTuple {
    /// Name of a root shape
    pub const fn root(root: ProfileType) -> Self {
        Self { root, child: root }
    }

    /// Name of a descendant shape
    pub const fn new(root: ProfileType, child: ProfileType) -> Self {
        Self { root, child }
    }

    /// Names the root of its tree
    pub fn is_root(&self) -> bool {
        self.root == self.child
    }

    /// Both halves megamorphic
    pub const fn mega() -> Self {
        Self::root(ProfileType::mega())
    }
}

impl fmt::Display for ProfileTypeTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.root, self.child)
    }
}

/// Which object a definition site's root type describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocationRole {
    /// The constructor function object
    Constructor,
    /// The class prototype object
    Prototype,
}

/// A bytecode location that defines objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileLocation {
    /// Method containing the site
    pub method: MethodId,
    /// Bytecode offset of the site
    pub offset: u32,
    /// Object described, `None` for instances
    pub role: Option<LocationRole>,
}

impl ProfileLocation {
    /// Instance location
    pub const fn new(method: MethodId, offset: u32) -> Self {
        Self {
            method,
            offset,
            role: None,
        }
    }

    /// Same site, another role
    pub const fn with_role(mut self, role: LocationRole) -> Self {
        self.role = Some(role);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_tuple() {
        let root = ProfileType::class(AbcId(1), MethodId(10));
        let tuple = ProfileTypeTuple::root(root);
        assert!(tuple.is_root());
        let child = ProfileType::new(AbcId(1), 1, ProfileTypeKind::Local);
        assert!(!ProfileTypeTuple::new(root, child).is_root());
    }

    #[test]
    fn test_jit_flag_distinguishes_types() {
        let plain = ProfileType::class(AbcId(1), MethodId(10));
        assert_ne!(plain, plain.with_jit());
        assert_eq!(plain.with_jit().to_string(), "Class(1:10)[jit]");
    }

    #[test]
    fn test_root_kinds() {
        assert!(ProfileType::class(AbcId(0), MethodId(1)).is_root_kind());
        assert!(!ProfileType::mega().is_root_kind());
        assert!(!ProfileType::new(AbcId(0), 3, ProfileTypeKind::Local).is_root_kind());
    }

    #[test]
    fn test_location_roles_are_distinct() {
        let site = ProfileLocation::new(MethodId(2), 14);
        assert_ne!(site, site.with_role(LocationRole::Prototype));
        assert_ne!(
            site.with_role(LocationRole::Constructor),
            site.with_role(LocationRole::Prototype)
        );
    }
}
