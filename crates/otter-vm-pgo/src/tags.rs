//! Serde adapters for shape enums stored by their tag byte

pub(crate) mod object_kind {
    use otter_vm_shape::ObjectKind;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(kind: &ObjectKind, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*kind as u8)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ObjectKind, D::Error> {
        let tag = u8::deserialize(deserializer)?;
        ObjectKind::from_u8(tag).ok_or_else(|| D::Error::custom(format!("invalid object kind {tag}")))
    }
}

pub(crate) mod elements_kind {
    use otter_vm_shape::ElementsKind;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(kind: &ElementsKind, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*kind as u8)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ElementsKind, D::Error> {
        let tag = u8::deserialize(deserializer)?;
        ElementsKind::from_u8(tag).ok_or_else(|| D::Error::custom(format!("invalid elements kind {tag}")))
    }
}
