//! Bytecode errors

use thiserror::Error;

/// Errors that can occur while decoding bytecode
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BytecodeError {
    /// Invalid opcode byte
    #[error("Invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode {
        /// Offending byte
        opcode: u8,
        /// Offset of the byte
        offset: u32,
    },

    /// Wide prefix in front of an opcode without an IC slot
    #[error("Wide prefix on slotless opcode at offset {0}")]
    InvalidWide(u32),

    /// Instruction runs past the end of the stream
    #[error("Truncated instruction at offset {0}")]
    UnexpectedEnd(u32),

    /// Slot index outside the feedback vector
    #[error("Feedback slot {slot} out of range ({len} slots)")]
    SlotOutOfRange {
        /// Requested slot
        slot: u16,
        /// Feedback vector length
        len: usize,
    },
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
