//! loupe: executable loading, symbol resolution and instruction rendering
//! for a disassembler core.
//!
//! A [`Registry`] holds the known formats and processors. Loading bytes
//! through it yields a [`FormatPlugin`] with segments and a [`SymbolTable`];
//! a [`Decoder`] for the image's processor turns code bytes into
//! [`Instruction`]s, and a [`Printer`] renders those with symbol names.

/// Core data types module
pub mod core;

pub mod analysis;
pub mod config;
pub mod disasm;
pub mod error;
pub mod formats;
pub mod io;
pub mod logging;
pub mod printer;
pub mod registry;

pub use crate::analysis::Analyzer;
pub use crate::config::LoadOptions;
pub use crate::core::{
    Instruction, InstructionFlags, MemoryOperand, Operand, OperandKind, Payload, Register,
    Segment, SegmentFlags, Symbol, SymbolKind, SymbolTable,
};
pub use crate::disasm::{disassemble_at, DecodeError, Decoder, RegisterNames};
pub use crate::error::{LoupeError, Result};
pub use crate::formats::pe::PeFormat;
pub use crate::formats::FormatPlugin;
pub use crate::io::MappedImage;
pub use crate::printer::Printer;
pub use crate::registry::Registry;
