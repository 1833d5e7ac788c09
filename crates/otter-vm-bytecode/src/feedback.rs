//! Inline-cache feedback slots
//!
//! Every instruction with an IC owns one or two consecutive slots of its
//! method's [`FeedbackVector`]. Property sites use the pair layout:
//!
//! | State         | `slot`                 | `slot + 1`         |
//! |---------------|------------------------|--------------------|
//! | uninitialized | `Undefined`            | `Undefined`        |
//! | monomorphic   | `Shape(weak)`          | `Handler(handler)` |
//! | polymorphic   | `Polymorphic(entries)` | `Undefined`        |
//! | megamorphic   | `Hole`                 | `Hole`             |
//!
//! Keyed sites whose key is a name store `Key(name)` in `slot` and the
//! polymorphic entries in `slot + 1`.

use std::sync::Arc;

use bitflags::bitflags;
use otter_vm_shape::{ChangeMarker, ElementsKind, PropertyKey, Representation, WeakShape};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::instruction::SlotId;
use crate::method::{FunctionKind, MethodId};

// ==================== Handlers ====================

/// What a cached access does once the receiver shape matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandlerKind {
    /// Plain data slot
    Field = 0,
    /// Accessor pair stored in a slot
    Accessor = 1,
    /// Property proven absent on the whole chain
    NonExist = 2,
    /// Indexed element access
    Element = 3,
    /// Receiver in dictionary mode
    Dictionary = 4,
    /// String primitive receiver
    String = 5,
    /// Number primitive receiver
    Number = 6,
}

impl HandlerKind {
    fn from_bits(bits: u32) -> Option<Self> {
        let kind = match bits {
            0 => Self::Field,
            1 => Self::Accessor,
            2 => Self::NonExist,
            3 => Self::Element,
            4 => Self::Dictionary,
            5 => Self::String,
            6 => Self::Number,
            _ => return None,
        };
        Some(kind)
    }
}

/// Packed handler description
///
/// Bits 0-2 kind, bit 3 inlined, bits 4-5 representation, bit 6 is-array,
/// bit 7 out-of-bounds, bits 8-9 elements kind, bits 12-31 slot offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerInfo(u32);

impl HandlerInfo {
    const KIND_MASK: u32 = 0b111;
    const INLINED: u32 = 1 << 3;
    const REPR_SHIFT: u32 = 4;
    const IS_ARRAY: u32 = 1 << 6;
    const OUT_OF_BOUNDS: u32 = 1 << 7;
    const ELEMENTS_SHIFT: u32 = 8;
    const OFFSET_SHIFT: u32 = 12;

    /// Largest encodable slot offset
    pub const MAX_OFFSET: u32 = (1 << 20) - 1;

    fn with_kind(kind: HandlerKind) -> u32 {
        kind as u32
    }

    /// Data field at `offset`
    pub fn field(offset: u32, inlined: bool, representation: Representation) -> Self {
        let mut bits = Self::with_kind(HandlerKind::Field)
            | ((representation as u32) << Self::REPR_SHIFT)
            | ((offset & Self::MAX_OFFSET) << Self::OFFSET_SHIFT);
        if inlined {
            bits |= Self::INLINED;
        }
        Self(bits)
    }

    /// Accessor pair at `offset`
    pub fn accessor(offset: u32, inlined: bool) -> Self {
        let mut bits =
            Self::with_kind(HandlerKind::Accessor) | ((offset & Self::MAX_OFFSET) << Self::OFFSET_SHIFT);
        if inlined {
            bits |= Self::INLINED;
        }
        Self(bits)
    }

    /// Absent property
    pub fn non_exist() -> Self {
        Self(Self::with_kind(HandlerKind::NonExist))
    }

    /// Element access
    pub fn element(kind: ElementsKind, is_array: bool, out_of_bounds: bool) -> Self {
        let mut bits = Self::with_kind(HandlerKind::Element) | ((kind as u32) << Self::ELEMENTS_SHIFT);
        if is_array {
            bits |= Self::IS_ARRAY;
        }
        if out_of_bounds {
            bits |= Self::OUT_OF_BOUNDS;
        }
        Self(bits)
    }

    /// Dictionary-mode receiver
    pub fn dictionary() -> Self {
        Self(Self::with_kind(HandlerKind::Dictionary))
    }

    /// Primitive receiver (`String` or `Number` kinds)
    pub fn primitive(kind: HandlerKind) -> Self {
        Self(Self::with_kind(kind))
    }

    /// Raw bits
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild from raw bits; `None` for an unknown kind
    pub fn from_raw(bits: u32) -> Option<Self> {
        HandlerKind::from_bits(bits & Self::KIND_MASK).map(|_| Self(bits))
    }

    /// Handler kind
    pub fn kind(self) -> HandlerKind {
        HandlerKind::from_bits(self.0 & Self::KIND_MASK).unwrap_or(HandlerKind::Field)
    }

    /// Slot offset for field and accessor handlers
    pub fn offset(self) -> u32 {
        self.0 >> Self::OFFSET_SHIFT
    }

    /// Slot lives inside the object
    pub fn is_inlined(self) -> bool {
        self.0 & Self::INLINED != 0
    }

    /// Field representation
    pub fn representation(self) -> Representation {
        Representation::from_bits(((self.0 >> Self::REPR_SHIFT) & 0b11) as u8)
    }

    /// Elements kind for element handlers
    pub fn elements_kind(self) -> ElementsKind {
        ElementsKind::from_u8(((self.0 >> Self::ELEMENTS_SHIFT) & 0b11) as u8).unwrap_or_default()
    }

    /// Element receiver is an array
    pub fn is_array(self) -> bool {
        self.0 & Self::IS_ARRAY != 0
    }

    /// Element access went past the length
    pub fn is_out_of_bounds(self) -> bool {
        self.0 & Self::OUT_OF_BOUNDS != 0
    }
}

/// Inline-cache handler stored next to a receiver shape
#[derive(Debug, Clone)]
pub enum IcHandler {
    /// Own property of the receiver
    Field(HandlerInfo),
    /// Store that added a property, moving the receiver to `target`
    Transition {
        /// Shape after the store
        target: WeakShape,
        /// Stored slot
        info: HandlerInfo,
    },
    /// Adding store guarded by a prototype chain
    TransitionWithProto {
        /// Shape after the store
        target: WeakShape,
        /// Marker of the prototype shape checked at cache time
        marker: ChangeMarker,
        /// Stored slot
        info: HandlerInfo,
    },
    /// Property found on a prototype
    Prototype {
        /// Shape of the holder
        holder: WeakShape,
        /// Marker of the receiver's prototype shape at cache time
        marker: ChangeMarker,
        /// Holder slot
        info: HandlerInfo,
        /// Getter or setter called through the slot
        accessor: Option<MethodId>,
    },
    /// Ahead-of-time store handler resolved against a holder shape
    StoreAot {
        /// Shape of the holder
        holder: WeakShape,
        /// Holder slot
        info: HandlerInfo,
    },
    /// Element access
    Element(HandlerInfo),
    /// Global object property
    Global,
    /// Cleared handler
    Invalid,
}

impl IcHandler {
    /// Handler info, if the handler carries one
    pub fn info(&self) -> Option<HandlerInfo> {
        match self {
            Self::Field(info) | Self::Element(info) => Some(*info),
            Self::Transition { info, .. }
            | Self::TransitionWithProto { info, .. }
            | Self::Prototype { info, .. }
            | Self::StoreAot { info, .. } => Some(*info),
            Self::Global | Self::Invalid => None,
        }
    }
}

/// One (shape, handler) pair of a polymorphic cache
#[derive(Debug, Clone)]
pub struct PolyEntry {
    /// Receiver shape
    pub shape: WeakShape,
    /// Handler for that shape
    pub handler: IcHandler,
}

// ==================== Non-property feedback ====================

bitflags! {
    /// Primitive operand types observed at an operator site
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct OperandTypes: u8 {
        /// Small integer
        const INT = 1 << 0;
        /// Double
        const DOUBLE = 1 << 1;
        /// Boolean
        const BOOLEAN = 1 << 2;
        /// String
        const STRING = 1 << 3;
        /// Undefined or null
        const NULLISH = 1 << 4;
        /// Object
        const OBJECT = 1 << 5;
        /// BigInt
        const BIGINT = 1 << 6;
        /// Symbol
        const SYMBOL = 1 << 7;

        /// Any number
        const NUMBER = Self::INT.bits() | Self::DOUBLE.bits();
    }
}

/// Iterator protocol observed at a `GetIterator` site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IteratorKind {
    /// Array iterator
    Array = 1,
    /// Map iterator
    Map = 2,
    /// Set iterator
    Set = 3,
    /// String iterator
    String = 4,
    /// Typed-array iterator
    TypedArray = 5,
    /// User-defined iterator
    Generic = 6,
}

impl IteratorKind {
    /// Convert from the stored tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        let kind = match tag {
            1 => Self::Array,
            2 => Self::Map,
            3 => Self::Set,
            4 => Self::String,
            5 => Self::TypedArray,
            6 => Self::Generic,
            _ => return None,
        };
        Some(kind)
    }
}

/// Callee observed at a call or construction site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalleeInfo {
    /// Called method
    pub method: MethodId,
    /// Kind of the called function
    pub kind: FunctionKind,
}

/// Shapes created by a class definition
#[derive(Debug, Clone)]
pub struct ClassCell {
    /// Constructor method
    pub constructor: MethodId,
    /// Initial shape of instances, before the constructor body adds fields
    pub instance_shape: Option<WeakShape>,
    /// Shape of the constructor function object
    pub constructor_shape: Option<WeakShape>,
    /// Shape of the class prototype object
    pub prototype_shape: Option<WeakShape>,
}

/// Allocation-site tracking for object and array literals
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Elements kind the literal's elements ended with
    pub elements_kind: ElementsKind,
    /// Literal length (properties or elements)
    pub length: u32,
    /// Shape the literal was created with
    pub shape: Option<WeakShape>,
}

// ==================== Slots ====================

/// Content of one feedback slot
#[derive(Debug, Clone, Default)]
pub enum SlotValue {
    /// Nothing recorded yet
    #[default]
    Undefined,
    /// Megamorphic marker
    Hole,
    /// Small integer payload (operand types, iterator kind)
    Int(i32),
    /// Monomorphic receiver shape
    Shape(WeakShape),
    /// Monomorphic handler
    Handler(IcHandler),
    /// Polymorphic entries
    Polymorphic(Arc<[PolyEntry]>),
    /// Key of a keyed site
    Key(PropertyKey),
    /// Bytecode callee
    Function(CalleeInfo),
    /// Builtin callee by builtin id
    BuiltinCallee(u32),
    /// Class definition result
    ClassCell(ClassCell),
    /// Literal allocation tracking
    TrackInfo(TrackInfo),
}

impl SlotValue {
    /// Slot was never written
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Slot holds the megamorphic marker
    pub fn is_hole(&self) -> bool {
        matches!(self, Self::Hole)
    }
}

/// Coarse IC state of a property site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcState {
    /// No information cached
    Uninitialized,
    /// Single shape cached
    Monomorphic,
    /// Several shapes cached
    Polymorphic(usize),
    /// Too many shapes seen
    Megamorphic,
}

/// Per-method feedback slots
///
/// Readers take a scoped shared lock; the interpreter writes through the
/// update helpers below.
#[derive(Debug, Default)]
pub struct FeedbackVector {
    slots: RwLock<Vec<SlotValue>>,
}

impl Clone for FeedbackVector {
    fn clone(&self) -> Self {
        Self {
            slots: RwLock::new(self.slots.read().clone()),
        }
    }
}

impl FeedbackVector {
    /// Create a vector of `len` uninitialized slots
    pub fn new(len: usize) -> Self {
        Self {
            slots: RwLock::new(vec![SlotValue::Undefined; len]),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Vector has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Run `f` with the slots locked for reading
    pub fn read<R>(&self, f: impl FnOnce(&[SlotValue]) -> R) -> R {
        f(&self.slots.read())
    }

    /// Copy of one slot
    pub fn get(&self, slot: SlotId) -> Option<SlotValue> {
        self.slots.read().get(slot.index()).cloned()
    }

    /// Overwrite one slot
    pub fn set(&self, slot: SlotId, value: SlotValue) -> Result<()> {
        let mut slots = self.slots.write();
        let len = slots.len();
        let cell = slots
            .get_mut(slot.index())
            .ok_or(BytecodeError::SlotOutOfRange { slot: slot.0, len })?;
        *cell = value;
        Ok(())
    }

    /// Reset every slot to uninitialized
    pub fn clear(&self) {
        self.slots.write().fill(SlotValue::Undefined);
    }

    /// State of the property site owning `slot` and `slot + 1`
    pub fn state(&self, slot: SlotId) -> IcState {
        let slots = self.slots.read();
        match (slots.get(slot.index()), slots.get(slot.index() + 1)) {
            (Some(SlotValue::Shape(_)), _) => IcState::Monomorphic,
            (Some(SlotValue::Polymorphic(entries)), _) => IcState::Polymorphic(entries.len()),
            (Some(SlotValue::Key(_)), Some(SlotValue::Polymorphic(entries))) => {
                IcState::Polymorphic(entries.len())
            }
            (Some(SlotValue::Hole), _) => IcState::Megamorphic,
            _ => IcState::Uninitialized,
        }
    }

    /// Record a property access at a named site.
    ///
    /// A second shape turns the site polymorphic; more than `limit` shapes
    /// turn it megamorphic for good.
    pub fn update_property_ic(
        &self,
        slot: SlotId,
        shape: WeakShape,
        handler: IcHandler,
        limit: usize,
    ) -> Result<IcState> {
        let mut slots = self.slots.write();
        let first = slot.index();
        if first + 1 >= slots.len() {
            return Err(BytecodeError::SlotOutOfRange {
                slot: slot.0,
                len: slots.len(),
            });
        }

        let entry = PolyEntry { shape, handler };
        let state = match (&slots[first], &slots[first + 1]) {
            (SlotValue::Hole, _) => IcState::Megamorphic,
            (SlotValue::Shape(cached), _) if *cached == entry.shape => {
                slots[first + 1] = SlotValue::Handler(entry.handler);
                IcState::Monomorphic
            }
            (SlotValue::Shape(cached), SlotValue::Handler(cached_handler)) => {
                let previous = PolyEntry {
                    shape: *cached,
                    handler: cached_handler.clone(),
                };
                grow_polymorphic(&mut slots, first, vec![previous], entry, limit)
            }
            (SlotValue::Polymorphic(entries), _) => {
                let entries = entries.to_vec();
                grow_polymorphic(&mut slots, first, entries, entry, limit)
            }
            _ => {
                slots[first] = SlotValue::Shape(entry.shape);
                slots[first + 1] = SlotValue::Handler(entry.handler);
                IcState::Monomorphic
            }
        };
        Ok(state)
    }

    /// Record a keyed access whose key is a name.
    ///
    /// The site stays polymorphic on the first key it saw; another key makes
    /// it megamorphic.
    pub fn update_keyed_ic(
        &self,
        slot: SlotId,
        key: PropertyKey,
        shape: WeakShape,
        handler: IcHandler,
        limit: usize,
    ) -> Result<IcState> {
        let mut slots = self.slots.write();
        let first = slot.index();
        if first + 1 >= slots.len() {
            return Err(BytecodeError::SlotOutOfRange {
                slot: slot.0,
                len: slots.len(),
            });
        }

        let entry = PolyEntry { shape, handler };
        let state = match (&slots[first], &slots[first + 1]) {
            (SlotValue::Hole, _) => IcState::Megamorphic,
            (SlotValue::Key(cached), SlotValue::Polymorphic(entries)) if *cached == key => {
                let mut entries = entries.to_vec();
                if let Some(existing) = entries.iter_mut().find(|e| e.shape == entry.shape) {
                    existing.handler = entry.handler;
                    slots[first + 1] = SlotValue::Polymorphic(entries.into());
                    IcState::Polymorphic(slot_len(&slots[first + 1]))
                } else if entries.len() < limit {
                    entries.push(entry);
                    let len = entries.len();
                    slots[first + 1] = SlotValue::Polymorphic(entries.into());
                    IcState::Polymorphic(len)
                } else {
                    go_megamorphic(&mut slots, first)
                }
            }
            (SlotValue::Key(_), _) => go_megamorphic(&mut slots, first),
            _ => {
                slots[first] = SlotValue::Key(key);
                slots[first + 1] = SlotValue::Polymorphic(Arc::from(vec![entry]));
                IcState::Polymorphic(1)
            }
        };
        Ok(state)
    }

    /// Accumulate operand types at an operator site
    pub fn record_operand_types(&self, slot: SlotId, types: OperandTypes) -> Result<OperandTypes> {
        let mut slots = self.slots.write();
        let len = slots.len();
        let cell = slots
            .get_mut(slot.index())
            .ok_or(BytecodeError::SlotOutOfRange { slot: slot.0, len })?;
        let seen = match cell {
            SlotValue::Int(bits) => OperandTypes::from_bits_truncate(*bits as u8),
            _ => OperandTypes::empty(),
        };
        let merged = seen | types;
        *cell = SlotValue::Int(merged.bits() as i32);
        Ok(merged)
    }

    /// Record a callee; a second distinct callee makes the site megamorphic
    pub fn record_call_target(&self, slot: SlotId, callee: SlotValue) -> Result<()> {
        let mut slots = self.slots.write();
        let len = slots.len();
        let cell = slots
            .get_mut(slot.index())
            .ok_or(BytecodeError::SlotOutOfRange { slot: slot.0, len })?;
        *cell = match (&*cell, &callee) {
            (SlotValue::Undefined, _) => callee,
            (SlotValue::Function(a), SlotValue::Function(b)) if a == b => callee,
            (SlotValue::BuiltinCallee(a), SlotValue::BuiltinCallee(b)) if a == b => callee,
            _ => SlotValue::Hole,
        };
        Ok(())
    }

    /// Record the iterator protocol used at a `GetIterator` site
    pub fn record_iterator_kind(&self, slot: SlotId, kind: IteratorKind) -> Result<()> {
        let mut slots = self.slots.write();
        let len = slots.len();
        let cell = slots
            .get_mut(slot.index())
            .ok_or(BytecodeError::SlotOutOfRange { slot: slot.0, len })?;
        *cell = match &*cell {
            SlotValue::Undefined => SlotValue::Int(kind as i32),
            SlotValue::Int(tag) if *tag == kind as i32 => SlotValue::Int(*tag),
            _ => SlotValue::Hole,
        };
        Ok(())
    }
}

fn slot_len(value: &SlotValue) -> usize {
    match value {
        SlotValue::Polymorphic(entries) => entries.len(),
        _ => 0,
    }
}

fn go_megamorphic(slots: &mut [SlotValue], first: usize) -> IcState {
    slots[first] = SlotValue::Hole;
    slots[first + 1] = SlotValue::Hole;
    tracing::trace!(slot = first, "inline cache went megamorphic");
    IcState::Megamorphic
}

fn grow_polymorphic(
    slots: &mut [SlotValue],
    first: usize,
    mut entries: Vec<PolyEntry>,
    entry: PolyEntry,
    limit: usize,
) -> IcState {
    if let Some(existing) = entries.iter_mut().find(|e| e.shape == entry.shape) {
        existing.handler = entry.handler;
    } else if entries.len() < limit {
        entries.push(entry);
    } else {
        return go_megamorphic(slots, first);
    }
    let len = entries.len();
    slots[first] = SlotValue::Polymorphic(entries.into());
    slots[first + 1] = SlotValue::Undefined;
    IcState::Polymorphic(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_vm_shape::{ObjectKind, ShapeStore};

    fn shapes(count: usize) -> Vec<WeakShape> {
        let mut store = ShapeStore::new();
        (0..count)
            .map(|_| store.create_root(ObjectKind::Plain, 16, 4).downgrade())
            .collect()
    }

    fn field(offset: u32) -> IcHandler {
        IcHandler::Field(HandlerInfo::field(offset, true, Representation::Tagged))
    }

    #[test]
    fn test_handler_info_bits() {
        let info = HandlerInfo::field(513, true, Representation::Double);
        assert_eq!(info.kind(), HandlerKind::Field);
        assert_eq!(info.offset(), 513);
        assert!(info.is_inlined());
        assert_eq!(info.representation(), Representation::Double);
        assert_eq!(HandlerInfo::from_raw(info.raw()), Some(info));

        let element = HandlerInfo::element(ElementsKind::PackedDouble, true, false);
        assert_eq!(element.kind(), HandlerKind::Element);
        assert_eq!(element.elements_kind(), ElementsKind::PackedDouble);
        assert!(element.is_array());
        assert!(!element.is_out_of_bounds());

        assert_eq!(HandlerInfo::from_raw(0b111), None);
    }

    #[test]
    fn test_property_ic_progression() {
        let shapes = shapes(4);
        let vector = FeedbackVector::new(2);
        let slot = SlotId(0);
        assert_eq!(vector.state(slot), IcState::Uninitialized);

        assert_eq!(
            vector.update_property_ic(slot, shapes[0], field(0), 2).unwrap(),
            IcState::Monomorphic
        );
        assert_eq!(
            vector.update_property_ic(slot, shapes[0], field(1), 2).unwrap(),
            IcState::Monomorphic
        );
        assert_eq!(
            vector.update_property_ic(slot, shapes[1], field(0), 2).unwrap(),
            IcState::Polymorphic(2)
        );
        assert!(vector.get(slot.next()).unwrap().is_undefined());
        assert_eq!(
            vector.update_property_ic(slot, shapes[2], field(0), 2).unwrap(),
            IcState::Megamorphic
        );
        assert!(vector.get(slot).unwrap().is_hole());
        assert!(vector.get(slot.next()).unwrap().is_hole());

        // Megamorphic is terminal.
        assert_eq!(
            vector.update_property_ic(slot, shapes[3], field(0), 2).unwrap(),
            IcState::Megamorphic
        );
    }

    #[test]
    fn test_keyed_ic_key_change_goes_mega() {
        let shapes = shapes(2);
        let vector = FeedbackVector::new(2);
        let slot = SlotId(0);
        let key = PropertyKey::string("k");
        assert_eq!(
            vector
                .update_keyed_ic(slot, key.clone(), shapes[0], field(0), 4)
                .unwrap(),
            IcState::Polymorphic(1)
        );
        assert_eq!(
            vector.update_keyed_ic(slot, key, shapes[1], field(1), 4).unwrap(),
            IcState::Polymorphic(2)
        );
        assert_eq!(
            vector
                .update_keyed_ic(slot, PropertyKey::string("other"), shapes[0], field(0), 4)
                .unwrap(),
            IcState::Megamorphic
        );
    }

    #[test]
    fn test_slot_out_of_range() {
        let vector = FeedbackVector::new(1);
        let err = vector
            .update_property_ic(SlotId(0), shapes(1)[0], field(0), 4)
            .unwrap_err();
        assert_eq!(err, BytecodeError::SlotOutOfRange { slot: 0, len: 1 });
        assert!(vector.set(SlotId(5), SlotValue::Hole).is_err());
    }

    #[test]
    fn test_operand_types_accumulate() {
        let vector = FeedbackVector::new(1);
        vector.record_operand_types(SlotId(0), OperandTypes::INT).unwrap();
        let merged = vector
            .record_operand_types(SlotId(0), OperandTypes::DOUBLE)
            .unwrap();
        assert_eq!(merged, OperandTypes::NUMBER);
    }

    #[test]
    fn test_call_target_mono_then_mega() {
        let vector = FeedbackVector::new(1);
        let callee = |id| {
            SlotValue::Function(CalleeInfo {
                method: MethodId(id),
                kind: FunctionKind::Normal,
            })
        };
        vector.record_call_target(SlotId(0), callee(1)).unwrap();
        vector.record_call_target(SlotId(0), callee(1)).unwrap();
        assert!(matches!(vector.get(SlotId(0)), Some(SlotValue::Function(_))));
        vector.record_call_target(SlotId(0), callee(2)).unwrap();
        assert!(vector.get(SlotId(0)).unwrap().is_hole());
    }

    #[test]
    fn test_iterator_kind() {
        let vector = FeedbackVector::new(1);
        vector.record_iterator_kind(SlotId(0), IteratorKind::Map).unwrap();
        assert!(matches!(vector.get(SlotId(0)), Some(SlotValue::Int(2))));
        vector.record_iterator_kind(SlotId(0), IteratorKind::Set).unwrap();
        assert!(vector.get(SlotId(0)).unwrap().is_hole());
    }
}
