//! Decoding backends.
//!
//! - iced-x86 decodes x86/x64 into [`Instruction`]s
//! - capstone supplies register names for x86 listings

pub mod capstone;
pub mod iced;

use thiserror::Error;

use crate::core::instruction::{Instruction, RegisterId};
use crate::error::{LoupeError, Result};
use crate::formats::FormatPlugin;

pub use self::capstone::CapstoneRegisters;
pub use self::iced::IcedDecoder;

/// Decoder errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Insufficient bytes to decode an instruction")]
    InsufficientBytes,
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),
}

/// Turns backend register identifiers into text
pub trait RegisterNames {
    fn register_name(&self, id: RegisterId) -> String;
}

impl<T: RegisterNames + ?Sized> RegisterNames for &T {
    fn register_name(&self, id: RegisterId) -> String {
        (**self).register_name(id)
    }
}

impl<T: RegisterNames + ?Sized> RegisterNames for Box<T> {
    fn register_name(&self, id: RegisterId) -> String {
        (**self).register_name(id)
    }
}

/// A decoding backend for one processor
pub trait Decoder: RegisterNames + Send + Sync {
    fn name(&self) -> &str;

    /// Longest instruction the backend can produce
    fn max_instruction_length(&self) -> usize;

    /// Decode the instruction at the start of `bytes`, located at `address`
    fn decode(&self, address: u64, bytes: &[u8]) -> std::result::Result<Instruction, DecodeError>;
}

/// Decode the instruction at a virtual address of a loaded image.
///
/// `data` is the image the format was loaded from. The returned instruction
/// carries the index of its containing segment.
pub fn disassemble_at(
    image: &dyn FormatPlugin,
    data: &[u8],
    decoder: &dyn Decoder,
    address: u64,
) -> Result<Instruction> {
    let offset = image.offset(address)?;
    let start = usize::try_from(offset).map_err(|_| LoupeError::UnresolvedAddress { address })?;
    let bytes = data
        .get(start..)
        .filter(|b| !b.is_empty())
        .ok_or(LoupeError::UnresolvedAddress { address })?;
    let window = &bytes[..bytes.len().min(decoder.max_instruction_length())];

    let mut instruction = decoder.decode(address, window)?;
    instruction.segment = image.segment_index(address);
    Ok(instruction)
}
