//! Bytecode instructions
//!
//! Instructions are variable length: one opcode byte, an optional IC slot
//! operand, then fixed-size operands. Opcodes that own an inline cache carry a
//! one-byte slot (`0xFF` meaning "no IC"); the [`WIDE_PREFIX`] byte widens the
//! slot to two bytes (`0xFFFF` meaning "no IC").

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};

/// Prefix byte selecting a 16-bit IC slot operand
pub const WIDE_PREFIX: u8 = 0xFD;

/// Narrow slot value meaning the site has no inline cache
pub const NO_SLOT_NARROW: u8 = 0xFF;

/// Wide slot value meaning the site has no inline cache
pub const NO_SLOT_WIDE: u16 = 0xFFFF;

/// Index into a method's feedback vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SlotId(pub u16);

impl SlotId {
    /// Create a new slot id
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Slot index
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Slot right after this one
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Bytecode opcodes
///
/// Accumulator-based instruction set; only the operands the feedback
/// machinery cares about are modelled precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Misc ====================
    /// No operation
    Nop = 0x00,
    /// acc = undefined
    LoadUndefined = 0x01,
    /// dst = src
    Move = 0x02,
    /// pc += offset
    Jump = 0x03,
    /// return acc
    Return = 0x04,

    // ==================== Arithmetic ====================
    /// acc = reg + acc
    Add = 0x10,
    /// acc = reg - acc
    Sub = 0x11,
    /// acc = reg * acc
    Mul = 0x12,
    /// acc = reg / acc
    Div = 0x13,
    /// acc = reg % acc
    Mod = 0x14,
    /// acc = reg & acc
    BitAnd = 0x15,
    /// acc = reg | acc
    BitOr = 0x16,
    /// acc = reg << acc
    Shl = 0x17,
    /// acc = reg < acc
    Less = 0x18,
    /// acc = reg <= acc
    LessEq = 0x19,
    /// acc = reg > acc
    Greater = 0x1A,
    /// acc = reg >= acc
    GreaterEq = 0x1B,
    /// acc = reg === acc
    StrictEq = 0x1C,
    /// acc = reg == acc
    Eq = 0x1D,
    /// acc = acc + 1
    Inc = 0x1E,
    /// acc = acc - 1
    Dec = 0x1F,

    // ==================== Properties ====================
    /// acc = acc.name
    LdObjByName = 0x20,
    /// acc = this.name
    LdThisByName = 0x21,
    /// reg.name = acc
    StObjByName = 0x22,
    /// this.name = acc
    StThisByName = 0x23,
    /// Define own field: reg.name = acc
    DefineFieldByName = 0x24,
    /// acc = reg[acc]
    LdObjByValue = 0x25,
    /// reg[key] = acc
    StObjByValue = 0x26,
    /// Define own element: reg[index] = acc
    StOwnByIndex = 0x27,

    // ==================== Calls ====================
    /// acc = acc()
    CallArg0 = 0x30,
    /// acc = acc(reg)
    CallArg1 = 0x31,
    /// acc = acc(regs...)
    CallArgs = 0x32,
    /// acc = acc.call(this, regs...)
    CallThis = 0x33,
    /// super(regs...)
    SuperCall = 0x34,
    /// acc = new regs[0](regs[1..])
    NewObjRange = 0x38,

    // ==================== Definitions ====================
    /// Define a class from a constructor method and literal buffer
    DefineClass = 0x40,
    /// Create a closure for a method
    DefineFunc = 0x41,
    /// Create an object from a literal buffer
    CreateObjectWithBuffer = 0x48,
    /// Create an array from a literal buffer
    CreateArrayWithBuffer = 0x49,
    /// Create an empty array
    CreateEmptyArray = 0x4A,

    // ==================== Protocols ====================
    /// acc = acc[Symbol.iterator]()
    GetIterator = 0x50,
    /// acc = reg instanceof acc
    Instanceof = 0x51,
}

impl Opcode {
    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        let opcode = match byte {
            0x00 => Self::Nop,
            0x01 => Self::LoadUndefined,
            0x02 => Self::Move,
            0x03 => Self::Jump,
            0x04 => Self::Return,

            0x10 => Self::Add,
            0x11 => Self::Sub,
            0x12 => Self::Mul,
            0x13 => Self::Div,
            0x14 => Self::Mod,
            0x15 => Self::BitAnd,
            0x16 => Self::BitOr,
            0x17 => Self::Shl,
            0x18 => Self::Less,
            0x19 => Self::LessEq,
            0x1A => Self::Greater,
            0x1B => Self::GreaterEq,
            0x1C => Self::StrictEq,
            0x1D => Self::Eq,
            0x1E => Self::Inc,
            0x1F => Self::Dec,

            0x20 => Self::LdObjByName,
            0x21 => Self::LdThisByName,
            0x22 => Self::StObjByName,
            0x23 => Self::StThisByName,
            0x24 => Self::DefineFieldByName,
            0x25 => Self::LdObjByValue,
            0x26 => Self::StObjByValue,
            0x27 => Self::StOwnByIndex,

            0x30 => Self::CallArg0,
            0x31 => Self::CallArg1,
            0x32 => Self::CallArgs,
            0x33 => Self::CallThis,
            0x34 => Self::SuperCall,
            0x38 => Self::NewObjRange,

            0x40 => Self::DefineClass,
            0x41 => Self::DefineFunc,
            0x48 => Self::CreateObjectWithBuffer,
            0x49 => Self::CreateArrayWithBuffer,
            0x4A => Self::CreateEmptyArray,

            0x50 => Self::GetIterator,
            0x51 => Self::Instanceof,
            _ => return None,
        };
        Some(opcode)
    }

    /// Does the instruction carry an IC slot operand
    pub fn has_slot(self) -> bool {
        !matches!(
            self,
            Self::Nop | Self::LoadUndefined | Self::Move | Self::Jump | Self::Return
        )
    }

    /// Bytes of operands following the slot operand
    pub fn operand_size(self) -> usize {
        match self {
            Self::Nop | Self::LoadUndefined | Self::Inc | Self::Dec | Self::CallArg0 => 0,
            Self::CreateEmptyArray | Self::GetIterator => 0,
            Self::Return => 1,
            Self::Move | Self::Jump => 2,
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Mod
            | Self::BitAnd
            | Self::BitOr
            | Self::Shl
            | Self::Less
            | Self::LessEq
            | Self::Greater
            | Self::GreaterEq
            | Self::StrictEq
            | Self::Eq
            | Self::LdObjByValue
            | Self::CallArg1
            | Self::Instanceof => 1,
            Self::LdObjByName
            | Self::LdThisByName
            | Self::StThisByName
            | Self::StObjByValue
            | Self::CallArgs
            | Self::CallThis
            | Self::SuperCall
            | Self::NewObjRange
            | Self::CreateObjectWithBuffer
            | Self::CreateArrayWithBuffer => 2,
            Self::StObjByName | Self::DefineFieldByName | Self::StOwnByIndex | Self::DefineFunc => 3,
            Self::DefineClass => 5,
        }
    }

    /// Property load or store keyed by a constant name
    pub fn is_by_name(self) -> bool {
        matches!(
            self,
            Self::LdObjByName
                | Self::LdThisByName
                | Self::StObjByName
                | Self::StThisByName
                | Self::DefineFieldByName
        )
    }

    /// Property load or store keyed by a runtime value
    pub fn is_by_value(self) -> bool {
        matches!(self, Self::LdObjByValue | Self::StObjByValue | Self::StOwnByIndex)
    }

    /// Is the property access a store
    pub fn is_store(self) -> bool {
        matches!(
            self,
            Self::StObjByName
                | Self::StThisByName
                | Self::DefineFieldByName
                | Self::StObjByValue
                | Self::StOwnByIndex
        )
    }

    /// Binary or unary operator with operand type feedback
    pub fn is_operator(self) -> bool {
        (0x10..=0x1F).contains(&(self as u8))
    }

    /// Plain call site
    pub fn is_call(self) -> bool {
        matches!(
            self,
            Self::CallArg0 | Self::CallArg1 | Self::CallArgs | Self::CallThis | Self::SuperCall
        )
    }
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Byte offset of the instruction (of the wide prefix, if any)
    pub offset: u32,
    /// Opcode
    pub opcode: Opcode,
    /// IC slot, `None` for opcodes without one or with the no-IC marker
    pub slot: Option<SlotId>,
    /// Remaining operand bytes
    pub operands: &'a [u8],
    /// Encoded with the wide prefix
    pub wide: bool,
}

impl Instruction<'_> {
    /// Little-endian u16 operand at byte `at`
    pub fn operand_u16(&self, at: usize) -> Option<u16> {
        let bytes = self.operands.get(at..at + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// u8 operand at byte `at`
    pub fn operand_u8(&self, at: usize) -> Option<u8> {
        self.operands.get(at).copied()
    }
}

/// Iterator over the instructions of a bytecode stream
#[derive(Debug, Clone)]
pub struct BytecodeReader<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Start reading at offset zero
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, pos: 0 }
    }

    /// Offset of the next instruction
    pub fn position(&self) -> usize {
        self.pos
    }

    fn decode(&mut self) -> Result<Instruction<'a>> {
        let offset = self.pos as u32;
        let mut pos = self.pos;
        let wide = self.code[pos] == WIDE_PREFIX;
        if wide {
            pos += 1;
        }
        let byte = *self
            .code
            .get(pos)
            .ok_or(BytecodeError::UnexpectedEnd(offset))?;
        let opcode = Opcode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode {
            opcode: byte,
            offset: pos as u32,
        })?;
        pos += 1;

        let slot = if opcode.has_slot() {
            if wide {
                let bytes = self
                    .code
                    .get(pos..pos + 2)
                    .ok_or(BytecodeError::UnexpectedEnd(offset))?;
                pos += 2;
                let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
                (raw != NO_SLOT_WIDE).then_some(SlotId(raw))
            } else {
                let raw = *self
                    .code
                    .get(pos)
                    .ok_or(BytecodeError::UnexpectedEnd(offset))?;
                pos += 1;
                (raw != NO_SLOT_NARROW).then_some(SlotId(raw as u16))
            }
        } else if wide {
            return Err(BytecodeError::InvalidWide(offset));
        } else {
            None
        };

        let end = pos + opcode.operand_size();
        let operands = self
            .code
            .get(pos..end)
            .ok_or(BytecodeError::UnexpectedEnd(offset))?;
        self.pos = end;
        Ok(Instruction {
            offset,
            opcode,
            slot,
            operands,
            wide,
        })
    }
}

impl<'a> Iterator for BytecodeReader<'a> {
    type Item = Result<Instruction<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.code.len() {
            return None;
        }
        let item = self.decode();
        if item.is_err() {
            // Nothing after a decoding error can be trusted.
            self.pos = self.code.len();
        }
        Some(item)
    }
}

/// Emits a bytecode stream
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
}

impl BytecodeBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next instruction will be emitted at
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    /// Emit an instruction. Slots above the narrow range use the wide prefix.
    ///
    /// # Panics
    ///
    /// Panics if `operands` does not match the opcode's operand size.
    pub fn emit(&mut self, opcode: Opcode, slot: Option<SlotId>, operands: &[u8]) -> &mut Self {
        assert_eq!(
            operands.len(),
            opcode.operand_size(),
            "operand size mismatch for {opcode:?}"
        );
        if opcode.has_slot() {
            match slot {
                Some(SlotId(raw)) if raw >= NO_SLOT_NARROW as u16 => {
                    self.code.push(WIDE_PREFIX);
                    self.code.push(opcode as u8);
                    self.code.extend_from_slice(&raw.to_le_bytes());
                }
                Some(SlotId(raw)) => {
                    self.code.push(opcode as u8);
                    self.code.push(raw as u8);
                }
                None => {
                    self.code.push(opcode as u8);
                    self.code.push(NO_SLOT_NARROW);
                }
            }
        } else {
            self.code.push(opcode as u8);
        }
        self.code.extend_from_slice(operands);
        self
    }

    /// Emit an instruction whose operands are all zero
    pub fn op(&mut self, opcode: Opcode, slot: Option<SlotId>) -> &mut Self {
        let operands = vec![0; opcode.operand_size()];
        self.emit(opcode, slot, &operands)
    }

    /// Finish the stream
    pub fn finish(self) -> Vec<u8> {
        self.code
    }
}
