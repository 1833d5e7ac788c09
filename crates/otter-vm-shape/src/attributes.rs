//! Property attributes and layout entries

use crate::key::PropertyKey;

/// Field representation hint.
///
/// Ordered from narrowest to widest; a slot's representation only widens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Representation {
    /// No value observed yet
    #[default]
    None = 0,
    /// Small integers only
    Int = 1,
    /// Numbers
    Double = 2,
    /// Any value
    Tagged = 3,
}

impl Representation {
    /// Least representation that covers both
    #[inline]
    pub fn widen(self, other: Self) -> Self {
        self.max(other)
    }

    /// Convert from the two-bit wire value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::None,
            1 => Self::Int,
            2 => Self::Double,
            _ => Self::Tagged,
        }
    }
}

/// Property attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAttributes {
    /// Value can be changed
    pub writable: bool,
    /// Shows up in for-in enumeration
    pub enumerable: bool,
    /// Can be deleted or reconfigured
    pub configurable: bool,
    /// Slot holds an accessor pair instead of a value
    pub accessor: bool,
    /// Observed value representation
    pub representation: Representation,
}

const WRITABLE: u32 = 1 << 0;
const ENUMERABLE: u32 = 1 << 1;
const CONFIGURABLE: u32 = 1 << 2;
const ACCESSOR: u32 = 1 << 3;
const REPRESENTATION_SHIFT: u32 = 4;

impl PropertyAttributes {
    /// Default data property (writable, enumerable, configurable)
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
            accessor: false,
            representation: Representation::None,
        }
    }

    /// Accessor property (enumerable, configurable)
    pub const fn accessor() -> Self {
        Self {
            writable: false,
            enumerable: true,
            configurable: true,
            accessor: true,
            representation: Representation::Tagged,
        }
    }

    /// Non-enumerable data property, as used for class members
    pub const fn hidden() -> Self {
        Self {
            writable: true,
            enumerable: false,
            configurable: true,
            accessor: false,
            representation: Representation::None,
        }
    }

    /// Same attributes with another representation
    pub const fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Transition metadata: everything but the representation.
    ///
    /// Two additions of the same key with equal metadata share a transition
    /// even when their representations differ.
    #[inline]
    pub fn metadata(self) -> u8 {
        (self.to_bits() & 0x0f) as u8
    }

    /// Pack into the persisted attribute bitfield
    pub fn to_bits(self) -> u32 {
        let mut bits = 0;
        if self.writable {
            bits |= WRITABLE;
        }
        if self.enumerable {
            bits |= ENUMERABLE;
        }
        if self.configurable {
            bits |= CONFIGURABLE;
        }
        if self.accessor {
            bits |= ACCESSOR;
        }
        bits | ((self.representation as u32) << REPRESENTATION_SHIFT)
    }

    /// Unpack from the persisted attribute bitfield
    pub fn from_bits(bits: u32) -> Self {
        Self {
            writable: bits & WRITABLE != 0,
            enumerable: bits & ENUMERABLE != 0,
            configurable: bits & CONFIGURABLE != 0,
            accessor: bits & ACCESSOR != 0,
            representation: Representation::from_bits((bits >> REPRESENTATION_SHIFT) as u8),
        }
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::data()
    }
}

/// One entry of a shape's ordered layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEntry {
    /// Property key
    pub key: PropertyKey,
    /// Slot offset, assigned in insertion order
    pub offset: u32,
    /// Attributes
    pub attributes: PropertyAttributes,
}

impl PropertyEntry {
    /// Is the slot stored inside the object rather than in the overflow array
    #[inline]
    pub fn is_inlined(&self, inlined_slots: u32) -> bool {
        self.offset < inlined_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_representation_only_widens() {
        assert_eq!(Representation::Int.widen(Representation::Double), Representation::Double);
        assert_eq!(Representation::Tagged.widen(Representation::Int), Representation::Tagged);
        assert_eq!(Representation::None.widen(Representation::Int), Representation::Int);
    }

    #[test]
    fn test_bits_preserve_everything() {
        let attrs = PropertyAttributes::hidden().with_representation(Representation::Double);
        assert_eq!(PropertyAttributes::from_bits(attrs.to_bits()), attrs);
        assert_eq!(
            PropertyAttributes::from_bits(PropertyAttributes::accessor().to_bits()),
            PropertyAttributes::accessor()
        );
    }

    #[test]
    fn test_metadata_ignores_representation() {
        let a = PropertyAttributes::data();
        let b = a.with_representation(Representation::Tagged);
        assert_eq!(a.metadata(), b.metadata());
        assert_ne!(a.metadata(), PropertyAttributes::hidden().metadata());
    }
}
