//! Error types for the loupe disassembler core.
//!
//! Format parsers report detailed `PeError`s; at the crate boundary those are
//! folded into `LoupeError::StructuralValidation` so callers see a single
//! success/failure result for a load.

use thiserror::Error;

use crate::disasm::DecodeError;
use crate::formats::pe::PeError;

/// Main error type for loupe operations.
#[derive(Debug, Error)]
pub enum LoupeError {
    /// Bad magic, missing header, or a directory pointing outside the image.
    #[error("Structural validation failed: {0}")]
    StructuralValidation(#[from] PeError),

    /// An address that no segment of the loaded image contains
    #[error("Unresolved address: {address:#x}")]
    UnresolvedAddress { address: u64 },

    /// No registered format accepted the input
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// No decoding backend registered for the processor
    #[error("Unsupported processor: {0}")]
    UnsupportedProcessor(String),

    /// Instruction decoding errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Input file exceeds the configured limit
    #[error("File size of {found} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge { limit: u64, found: u64 },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or name database (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LoupeError {
    fn from(err: serde_json::Error) -> Self {
        LoupeError::Serialization(err.to_string())
    }
}

/// Result type alias for loupe operations
pub type Result<T> = std::result::Result<T, LoupeError>;
