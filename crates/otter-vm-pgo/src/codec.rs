//! Binary layout format
//!
//! Little-endian. A file is a `u32` layout count followed by layouts:
//!
//! ```text
//! layout   := profile_type kind:u8 object_size:u32 inlined:u32
//!             count:u32 property* count:u32 child*
//! property := key attributes:u32
//! child    := 0u8                                   (pruned)
//!           | 1u8 profile_type key attributes:u32 parent:u32
//! key      := 0u8 hash:u32 len:u32 utf8[len]        (string)
//!           | 1u8 id:u32                            (private symbol)
//! profile_type := abc:u32 id:u32 kind:u8 jit:u8
//! ```

use std::path::Path;
use std::sync::Arc;

use otter_vm_bytecode::AbcId;
use otter_vm_shape::ObjectKind;

use crate::error::{CodecError, PgoError, Result};
use crate::layout::{ChildLayout, LayoutDescription, LayoutKey, LayoutProperty};
use crate::profile_type::{ProfileType, ProfileTypeKind};

const KEY_STRING: u8 = 0;
const KEY_PRIVATE: u8 = 1;
const CHILD_PRUNED: u8 = 0;
const CHILD_PRESENT: u8 = 1;

fn kind_tag(kind: ProfileTypeKind) -> u8 {
    match kind {
        ProfileTypeKind::Class => 0,
        ProfileTypeKind::ArrayLiteral => 1,
        ProfileTypeKind::ObjectLiteral => 2,
        ProfileTypeKind::Function => 3,
        ProfileTypeKind::Builtin => 4,
        ProfileTypeKind::Jit => 5,
        ProfileTypeKind::Mega => 6,
        ProfileTypeKind::Transition => 7,
        ProfileTypeKind::PrototypeTransition => 8,
        ProfileTypeKind::Local => 9,
        ProfileTypeKind::Constructor => 10,
        ProfileTypeKind::Prototype => 11,
    }
}

fn kind_from_tag(tag: u8) -> Option<ProfileTypeKind> {
    let kind = match tag {
        0 => ProfileTypeKind::Class,
        1 => ProfileTypeKind::ArrayLiteral,
        2 => ProfileTypeKind::ObjectLiteral,
        3 => ProfileTypeKind::Function,
        4 => ProfileTypeKind::Builtin,
        5 => ProfileTypeKind::Jit,
        6 => ProfileTypeKind::Mega,
        7 => ProfileTypeKind::Transition,
        8 => ProfileTypeKind::PrototypeTransition,
        9 => ProfileTypeKind::Local,
        10 => ProfileTypeKind::Constructor,
        11 => ProfileTypeKind::Prototype,
        _ => return None,
    };
    Some(kind)
}

// ==================== Encoding ====================

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn profile_type(&mut self, ty: ProfileType) {
        self.u32(ty.abc.0);
        self.u32(ty.id);
        self.u8(kind_tag(ty.kind));
        self.u8(ty.jit as u8);
    }

    fn key(&mut self, key: &LayoutKey) {
        match key {
            LayoutKey::String { hash, text } => {
                self.u8(KEY_STRING);
                self.u32(*hash);
                self.u32(text.len() as u32);
                self.buf.extend_from_slice(text.as_bytes());
            }
            LayoutKey::PrivateSymbol(id) => {
                self.u8(KEY_PRIVATE);
                self.u32(*id);
            }
        }
    }

    fn property(&mut self, property: &LayoutProperty) {
        self.key(&property.key);
        self.u32(property.attributes);
    }

    fn layout(&mut self, layout: &LayoutDescription) {
        self.profile_type(layout.root_type);
        self.u8(layout.kind as u8);
        self.u32(layout.object_size);
        self.u32(layout.inlined_slots);
        self.u32(layout.properties.len() as u32);
        for property in &layout.properties {
            self.property(property);
        }
        self.u32(layout.children.len() as u32);
        for child in &layout.children {
            match child {
                None => self.u8(CHILD_PRUNED),
                Some(child) => {
                    self.u8(CHILD_PRESENT);
                    self.profile_type(child.profile_type);
                    self.property(&child.property);
                    self.u32(child.parent);
                }
            }
        }
    }
}

/// Encode layouts into the binary format
pub fn encode_layouts<'a>(layouts: impl IntoIterator<Item = &'a LayoutDescription>) -> Vec<u8> {
    let mut writer = Writer { buf: vec![0; 4] };
    let mut count = 0u32;
    for layout in layouts {
        writer.layout(layout);
        count += 1;
    }
    writer.buf[..4].copy_from_slice(&count.to_le_bytes());
    writer.buf
}

// ==================== Decoding ====================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, len: usize) -> std::result::Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(CodecError::UnexpectedEnd(self.pos))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> std::result::Result<u8, CodecError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> std::result::Result<u32, CodecError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn profile_type(&mut self) -> std::result::Result<ProfileType, CodecError> {
        let abc = AbcId(self.u32()?);
        let id = self.u32()?;
        let offset = self.pos;
        let tag = self.u8()?;
        let kind = kind_from_tag(tag).ok_or(CodecError::InvalidTag {
            what: "profile type kind",
            tag,
            offset,
        })?;
        let jit = self.u8()? != 0;
        Ok(ProfileType { abc, id, kind, jit })
    }

    fn key(&mut self) -> std::result::Result<LayoutKey, CodecError> {
        let offset = self.pos;
        match self.u8()? {
            KEY_STRING => {
                let stored = self.u32()?;
                let len = self.u32()? as usize;
                let start = self.pos;
                let text = std::str::from_utf8(self.bytes(len)?)
                    .map_err(|_| CodecError::InvalidUtf8(start))?;
                let computed = LayoutKey::hash_text(text);
                if computed != stored {
                    return Err(CodecError::HashMismatch {
                        text: text.to_string(),
                        stored,
                        computed,
                    });
                }
                Ok(LayoutKey::String {
                    hash: stored,
                    text: Arc::from(text),
                })
            }
            KEY_PRIVATE => Ok(LayoutKey::PrivateSymbol(self.u32()?)),
            tag => Err(CodecError::InvalidTag {
                what: "key",
                tag,
                offset,
            }),
        }
    }

    fn property(&mut self) -> std::result::Result<LayoutProperty, CodecError> {
        let key = self.key()?;
        let attributes = self.u32()?;
        Ok(LayoutProperty { key, attributes })
    }

    fn layout(&mut self) -> std::result::Result<LayoutDescription, CodecError> {
        let root_type = self.profile_type()?;
        let offset = self.pos;
        let tag = self.u8()?;
        let kind = ObjectKind::from_u8(tag).ok_or(CodecError::InvalidTag {
            what: "object kind",
            tag,
            offset,
        })?;
        let object_size = self.u32()?;
        let inlined_slots = self.u32()?;
        let mut layout = LayoutDescription::new(root_type, kind, object_size, inlined_slots);

        let count = self.u32()?;
        for _ in 0..count {
            layout.properties.push(self.property()?);
        }
        let count = self.u32()?;
        for _ in 0..count {
            let offset = self.pos;
            let child = match self.u8()? {
                CHILD_PRUNED => None,
                CHILD_PRESENT => Some(ChildLayout {
                    profile_type: self.profile_type()?,
                    property: self.property()?,
                    parent: self.u32()?,
                }),
                tag => {
                    return Err(CodecError::InvalidTag {
                        what: "child",
                        tag,
                        offset,
                    });
                }
            };
            layout.children.push(child);
        }
        layout.validate()?;
        Ok(layout)
    }
}

/// Decode layouts from the binary format
pub fn decode_layouts(data: &[u8]) -> std::result::Result<Vec<LayoutDescription>, CodecError> {
    let mut reader = Reader { data, pos: 0 };
    let count = reader.u32()?;
    let mut layouts = Vec::new();
    for _ in 0..count {
        layouts.push(reader.layout()?);
    }
    if reader.pos != data.len() {
        return Err(CodecError::TrailingBytes(data.len() - reader.pos));
    }
    Ok(layouts)
}

/// Write layouts to `path`
pub fn save_layouts<'a>(
    path: &Path,
    layouts: impl IntoIterator<Item = &'a LayoutDescription>,
) -> Result<()> {
    std::fs::write(path, encode_layouts(layouts)).map_err(|source| PgoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read layouts from `path`
pub fn load_layouts(path: &Path) -> Result<Vec<LayoutDescription>> {
    let data = std::fs::read(path).map_err(|source| PgoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let layouts = decode_layouts(&data)?;
    tracing::debug!(path = %path.display(), count = layouts.len(), "loaded layouts");
    Ok(layouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_vm_shape::{PropertyAttributes, PropertyKey};

    fn sample() -> LayoutDescription {
        let root = ProfileType::new(AbcId(2), 40, ProfileTypeKind::Class).with_jit();
        let mut layout = LayoutDescription::new(root, ObjectKind::Function, 64, 6);
        layout.properties = vec![
            LayoutProperty::new(&PropertyKey::string("x"), PropertyAttributes::data()).unwrap(),
            LayoutProperty::new(&PropertyKey::private(5), PropertyAttributes::hidden()).unwrap(),
        ];
        let child = ProfileType::new(AbcId(2), 1, ProfileTypeKind::Local);
        let accessor =
            LayoutProperty::new(&PropertyKey::accessor_method(3), PropertyAttributes::accessor()).unwrap();
        layout.record_transition(root, child, accessor).unwrap();
        layout.record_pruned(1);
        layout
    }

    #[test]
    fn test_layouts_survive_encoding() {
        let layouts = vec![sample(), sample()];
        let data = encode_layouts(&layouts);
        assert_eq!(decode_layouts(&data).unwrap(), layouts);
    }

    #[test]
    fn test_hash_is_checked() {
        let data = encode_layouts([&sample()]);
        // First key starts after count, root type, kind, size, inlined and property count.
        let hash_at = 4 + 10 + 1 + 4 + 4 + 4 + 1;
        let mut corrupt = data.clone();
        corrupt[hash_at] ^= 0xFF;
        assert!(matches!(
            decode_layouts(&corrupt),
            Err(CodecError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let data = encode_layouts([&sample()]);
        assert!(matches!(
            decode_layouts(&data[..data.len() - 1]),
            Err(CodecError::UnexpectedEnd(_))
        ));
        let mut longer = data.clone();
        longer.push(0);
        assert_eq!(decode_layouts(&longer), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_oversized_root_rejected() {
        let mut layout = sample();
        layout.inlined_slots = 600_000_000;
        assert_eq!(
            decode_layouts(&encode_layouts([&layout])),
            Err(CodecError::OversizedRoot {
                inlined_slots: 600_000_000,
                object_size: 64,
            })
        );
    }

    #[test]
    fn test_forward_parent_rejected() {
        let mut layout = sample();
        if let Some(Some(child)) = layout.children.first_mut() {
            child.parent = 5;
        }
        let data = encode_layouts([&layout]);
        assert_eq!(
            decode_layouts(&data),
            Err(CodecError::InvalidParent { node: 1, parent: 5 })
        );
    }
}
