//! # Otter VM Bytecode
//!
//! The instruction stream the interpreter executes and the inline-cache
//! feedback it leaves behind for the profiler.
//!
//! ## Design Principles
//!
//! - **Byte-encoded**: variable-length instructions, IC slot operand first
//! - **Narrow by default**: one-byte slots, a [`WIDE_PREFIX`] for the rest
//! - **Weak feedback**: slots hold [`otter_vm_shape::WeakShape`] handles, so
//!   feedback never keeps a shape alive
//! - **Scoped reads**: the feedback vector is read under a shared lock

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod feedback;
pub mod instruction;
pub mod method;

pub use error::{BytecodeError, Result};
pub use feedback::{
    CalleeInfo, ClassCell, FeedbackVector, HandlerInfo, HandlerKind, IcHandler, IcState,
    IteratorKind, OperandTypes, PolyEntry, SlotValue, TrackInfo,
};
pub use instruction::{
    BytecodeBuilder, BytecodeReader, Instruction, NO_SLOT_NARROW, NO_SLOT_WIDE, Opcode, SlotId,
    WIDE_PREFIX,
};
pub use method::{AbcId, FunctionKind, Method, MethodBuilder, MethodId};

/// Default number of polymorphic entries before a site goes megamorphic
pub const DEFAULT_POLYMORPHIC_LIMIT: usize = 4;
