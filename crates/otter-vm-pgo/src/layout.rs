//! Layout descriptions: recorded transition trees
//!
//! A description mirrors one transition tree. Node 0 is the root and carries
//! its whole ordered property list; node `i + 1` is `children[i]`, which adds
//! one property to an earlier node. Subtrees whose keys cannot be persisted
//! (public symbols) are kept as `None` so later indices stay valid.

use std::sync::Arc;

use otter_vm_shape::store::object_size_for;
use otter_vm_shape::{
    MAX_FAST_PROPERTIES, ObjectKind, PropertyAttributes, PropertyKey, ShapeId, ShapeStore, SymbolKind,
};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::profile_type::ProfileType;

/// Reserved prefix for compiler-synthesized accessor-method keys
pub const ACCESSOR_METHOD_PREFIX: &str = "#otter.accessor#";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Persistable property key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutKey {
    /// String key with its hash
    String {
        /// Hash of `text`, checked on load
        hash: u32,
        /// Key text
        text: Arc<str>,
    },
    /// Private name by symbol id
    PrivateSymbol(u32),
}

impl LayoutKey {
    /// String key
    pub fn string(text: &str) -> Self {
        Self::String {
            hash: Self::hash_text(text),
            text: Arc::from(text),
        }
    }

    /// Hash stored next to string keys: 32-bit FNV-1a of the UTF-8 bytes,
    /// stable across builds and platforms
    pub fn hash_text(text: &str) -> u32 {
        text.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
        })
    }

    /// Encode a shape key; public symbols have no persistent identity
    pub fn from_property_key(key: &PropertyKey) -> Option<Self> {
        match key {
            PropertyKey::String(text) => Some(Self::string(text)),
            PropertyKey::Index(index) => Some(Self::string(&index.to_string())),
            PropertyKey::Symbol {
                id,
                kind: SymbolKind::Private,
            } => Some(Self::PrivateSymbol(*id)),
            PropertyKey::Symbol {
                id,
                kind: SymbolKind::AccessorMethod,
            } => Some(Self::string(&format!("{ACCESSOR_METHOD_PREFIX}{id}"))),
            PropertyKey::Symbol {
                kind: SymbolKind::Public,
                ..
            } => None,
        }
    }

    /// Decode back into a shape key
    pub fn to_property_key(&self) -> PropertyKey {
        match self {
            Self::PrivateSymbol(id) => PropertyKey::private(*id),
            Self::String { text, .. } => {
                if let Some(id) = text
                    .strip_prefix(ACCESSOR_METHOD_PREFIX)
                    .and_then(|rest| rest.parse::<u32>().ok())
                {
                    return PropertyKey::accessor_method(id);
                }
                match text.parse::<u32>() {
                    Ok(index) if index.to_string() == **text => PropertyKey::Index(index),
                    _ => PropertyKey::String(text.clone()),
                }
            }
        }
    }
}

/// One recorded property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutProperty {
    /// Key
    pub key: LayoutKey,
    /// Attribute bitfield, see [`PropertyAttributes::to_bits`]
    pub attributes: u32,
}

impl LayoutProperty {
    /// Record a shape property, if its key can be persisted
    pub fn new(key: &PropertyKey, attributes: PropertyAttributes) -> Option<Self> {
        Some(Self {
            key: LayoutKey::from_property_key(key)?,
            attributes: attributes.to_bits(),
        })
    }

    /// Decoded attributes
    pub fn attributes(&self) -> PropertyAttributes {
        PropertyAttributes::from_bits(self.attributes)
    }
}

/// Node adding one property to an earlier node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLayout {
    /// Type of the shape this node describes
    pub profile_type: ProfileType,
    /// Added property
    pub property: LayoutProperty,
    /// Index of the parent node (0 is the root)
    pub parent: u32,
}

/// Recorded transition tree of one root type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescription {
    /// Root profile type
    pub root_type: ProfileType,
    /// Object kind of the root
    #[serde(with = "crate::tags::object_kind")]
    pub kind: ObjectKind,
    /// Root object size in bytes
    pub object_size: u32,
    /// In-object slots of the root
    pub inlined_slots: u32,
    /// Root properties in layout order
    pub properties: Vec<LayoutProperty>,
    /// Descendant nodes; `None` marks a pruned subtree
    pub children: Vec<Option<ChildLayout>>,
}

impl LayoutDescription {
    /// Empty description of a root
    pub fn new(root_type: ProfileType, kind: ObjectKind, object_size: u32, inlined_slots: u32) -> Self {
        Self {
            root_type,
            kind,
            object_size,
            inlined_slots,
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Describe a live root shape. `None` for dictionary shapes and layouts
    /// with keys that cannot be persisted.
    pub fn from_root_shape(store: &ShapeStore, shape: ShapeId, root_type: ProfileType) -> Option<Self> {
        let record = store.get(shape)?;
        if record.is_dictionary() {
            return None;
        }
        let properties = record
            .properties()
            .iter()
            .map(|entry| LayoutProperty::new(&entry.key, entry.attributes))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            properties,
            ..Self::new(root_type, record.kind(), record.object_size(), record.inlined_slots())
        })
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> u32 {
        self.children.len() as u32 + 1
    }

    /// Node describing `profile_type`
    pub fn find_node(&self, profile_type: ProfileType) -> Option<u32> {
        if profile_type == self.root_type {
            return Some(0);
        }
        self.children
            .iter()
            .position(|c| c.as_ref().is_some_and(|c| c.profile_type == profile_type))
            .map(|i| i as u32 + 1)
    }

    /// Child node at `node`; `None` for the root, pruned nodes and out of range
    pub fn child(&self, node: u32) -> Option<&ChildLayout> {
        let index = node.checked_sub(1)?;
        self.children.get(index as usize)?.as_ref()
    }

    /// Record that `child_type` adds `property` to the node of `parent_type`.
    ///
    /// Returns the child's node index, reusing an existing node of that type.
    pub fn record_transition(
        &mut self,
        parent_type: ProfileType,
        child_type: ProfileType,
        property: LayoutProperty,
    ) -> Option<u32> {
        if let Some(existing) = self.find_node(child_type) {
            return Some(existing);
        }
        let parent = self.find_node(parent_type)?;
        self.children.push(Some(ChildLayout {
            profile_type: child_type,
            property,
            parent,
        }));
        Some(self.node_count() - 1)
    }

    /// Record a child of `parent` that cannot be persisted
    pub fn record_pruned(&mut self, parent: u32) -> u32 {
        debug_assert!(parent < self.node_count());
        self.children.push(None);
        self.node_count() - 1
    }

    /// Property count of the shape at `node`; `None` if pruned or unknown
    pub fn property_count(&self, node: u32) -> Option<u32> {
        let mut count = self.properties.len() as u32;
        let mut current = node;
        let mut steps = 0;
        while current != 0 {
            let child = self.child(current)?;
            count += 1;
            steps += 1;
            if steps > self.children.len() {
                return None;
            }
            current = child.parent;
        }
        Some(count)
    }

    /// Largest property count of any materializable node
    pub fn max_property_count(&self) -> u32 {
        (0..self.node_count())
            .filter_map(|node| self.property_count(node))
            .max()
            .unwrap_or(0)
    }

    /// Every child links to an earlier node and the root fits in an object
    /// of at most [`MAX_FAST_PROPERTIES`] in-object slots
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.inlined_slots > MAX_FAST_PROPERTIES
            || self.object_size > object_size_for(MAX_FAST_PROPERTIES)
        {
            return Err(CodecError::OversizedRoot {
                inlined_slots: self.inlined_slots,
                object_size: self.object_size,
            });
        }
        for (i, child) in self.children.iter().enumerate() {
            let node = i as u32 + 1;
            if let Some(child) = child
                && child.parent >= node
            {
                return Err(CodecError::InvalidParent {
                    node,
                    parent: child.parent,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_type::ProfileTypeKind;
    use otter_vm_bytecode::AbcId;

    fn local(id: u32) -> ProfileType {
        ProfileType::new(AbcId(1), id, ProfileTypeKind::Local)
    }

    fn root_type() -> ProfileType {
        ProfileType::new(AbcId(1), 100, ProfileTypeKind::ObjectLiteral)
    }

    fn prop(name: &str) -> LayoutProperty {
        LayoutProperty::new(&PropertyKey::string(name), PropertyAttributes::data()).unwrap()
    }

    #[test]
    fn test_key_encodings() {
        let accessor = PropertyKey::accessor_method(9);
        let encoded = LayoutKey::from_property_key(&accessor).unwrap();
        assert!(matches!(&encoded, LayoutKey::String { text, .. } if text.starts_with(ACCESSOR_METHOD_PREFIX)));
        assert_eq!(encoded.to_property_key(), accessor);

        let private = PropertyKey::private(4);
        assert_eq!(
            LayoutKey::from_property_key(&private),
            Some(LayoutKey::PrivateSymbol(4))
        );
        assert_eq!(
            LayoutKey::from_property_key(&PropertyKey::Index(7)).unwrap().to_property_key(),
            PropertyKey::Index(7)
        );
        assert_eq!(
            LayoutKey::string("007").to_property_key(),
            PropertyKey::string("007")
        );
        assert!(LayoutKey::from_property_key(&PropertyKey::symbol(1)).is_none());
    }

    #[test]
    fn test_tree_indices_and_counts() {
        let mut layout = LayoutDescription::new(root_type(), ObjectKind::Plain, 48, 4);
        layout.properties = vec![prop("x"), prop("y")];
        let z = layout.record_transition(root_type(), local(1), prop("z")).unwrap();
        let w = layout.record_transition(local(1), local(2), prop("w")).unwrap();
        let pruned = layout.record_pruned(0);
        layout.children.push(Some(ChildLayout {
            profile_type: local(3),
            property: prop("under_pruned"),
            parent: pruned,
        }));

        assert_eq!((z, w, pruned), (1, 2, 3));
        assert_eq!(layout.record_transition(root_type(), local(1), prop("z")), Some(1));
        assert_eq!(layout.property_count(0), Some(2));
        assert_eq!(layout.property_count(w), Some(4));
        assert_eq!(layout.property_count(4), None);
        assert_eq!(layout.max_property_count(), 4);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_forward_parent_is_invalid() {
        let mut layout = LayoutDescription::new(root_type(), ObjectKind::Plain, 48, 4);
        layout.children.push(Some(ChildLayout {
            profile_type: local(1),
            property: prop("a"),
            parent: 1,
        }));
        assert_eq!(
            layout.validate(),
            Err(CodecError::InvalidParent { node: 1, parent: 1 })
        );
    }

    #[test]
    fn test_string_hash_is_fnv1a() {
        assert_eq!(LayoutKey::hash_text(""), 0x811c_9dc5);
        assert_eq!(LayoutKey::hash_text("a"), 0xe40c_292c);
        assert_eq!(LayoutKey::hash_text("foobar"), 0xbf9c_f968);
        assert!(matches!(LayoutKey::string("a"), LayoutKey::String { hash: 0xe40c_292c, .. }));
    }

    #[test]
    fn test_oversized_root_is_invalid() {
        let huge = LayoutDescription::new(root_type(), ObjectKind::Plain, 48, 600_000_000);
        assert_eq!(
            huge.validate(),
            Err(CodecError::OversizedRoot {
                inlined_slots: 600_000_000,
                object_size: 48,
            })
        );
        let wide = LayoutDescription::new(root_type(), ObjectKind::Plain, u32::MAX, 4);
        assert!(matches!(wide.validate(), Err(CodecError::OversizedRoot { .. })));

        let max = MAX_FAST_PROPERTIES;
        let full = LayoutDescription::new(root_type(), ObjectKind::Plain, object_size_for(max), max);
        assert!(full.validate().is_ok());
    }

    #[test]
    fn test_from_root_shape() {
        let mut store = ShapeStore::new();
        let r = store.create_root(ObjectKind::Plain, 48, 4);
        let a = store.add_property(r, PropertyKey::string("a"), PropertyAttributes::data());
        let layout = LayoutDescription::from_root_shape(&store, a, root_type()).unwrap();
        assert_eq!(layout.properties, vec![prop("a")]);
        assert_eq!(layout.inlined_slots, 4);

        let s = store.add_property(a, PropertyKey::symbol(3), PropertyAttributes::data());
        assert!(LayoutDescription::from_root_shape(&store, s, root_type()).is_none());
    }
}
