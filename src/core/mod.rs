//! Core data types for loupe.
//!
//! Segments and symbols describe a loaded image; instructions describe what a
//! decoding backend produced from its code bytes.

pub mod instruction;
pub mod segment;
pub mod symbol;

pub use instruction::{
    Instruction, InstructionFlags, MemoryOperand, Operand, OperandKind, Payload, Register,
    RegisterId,
};
pub use segment::{Segment, SegmentFlags};
pub use symbol::{Symbol, SymbolKind, SymbolTable};
