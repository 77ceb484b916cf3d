//! Instruction and Operand types for decoded machine instructions.
//!
//! The model is backend-neutral: a decoding backend builds an `Instruction`
//! through the append-style builders below, and the printer and analyzers read
//! it. Register identifiers are opaque numbers owned by the backend; only the
//! backend's `RegisterNames` can turn them into text.

use bitflags::bitflags;
use std::any::Any;
use std::fmt;

/// Backend-defined register identifier
pub type RegisterId = u32;

bitflags! {
    /// Coarse instruction classification, composable
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstructionFlags: u32 {
        const STOP = 0x0000_0001;
        const NOP = 0x0000_0002;
        const JUMP = 0x0000_0004;
        const CALL = 0x0000_0008;
        const ADD = 0x0000_0010;
        const SUB = 0x0000_0020;
        const MUL = 0x0000_0040;
        const DIV = 0x0000_0080;
        const MOD = 0x0000_0100;
        const AND = 0x0000_0200;
        const OR = 0x0000_0400;
        const XOR = 0x0000_0800;
        const NOT = 0x0000_1000;
        const PUSH = 0x0000_2000;
        const POP = 0x0000_4000;
        const COMPARE = 0x0000_8000;

        const CONDITIONAL = 0x0100_0000;
        const PRIVILEGED = 0x0200_0000;
        const JUMP_TABLE = 0x0400_0000;
        const INVALID = 0x1000_0000;

        const BRANCH = Self::JUMP.bits() | Self::CALL.bits();
    }
}

/// Register reference with a backend-defined type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub id: RegisterId,
    pub tag: u32,
}

impl Register {
    pub fn new(id: RegisterId) -> Self {
        Self { id, tag: 0 }
    }

    pub fn tagged(id: RegisterId, tag: u32) -> Self {
        Self { id, tag }
    }
}

/// `[base + index * scale + displacement]` memory reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryOperand {
    pub base: Option<Register>,
    pub index: Option<Register>,
    pub scale: u32,
    pub displacement: i64,
}

impl MemoryOperand {
    pub fn new(
        base: Option<Register>,
        index: Option<Register>,
        scale: u32,
        displacement: i64,
    ) -> Self {
        Self {
            base,
            index,
            scale: scale.max(1),
            displacement,
        }
    }

    /// No base and no index: the displacement is an absolute address
    pub fn displacement_only(&self) -> bool {
        self.base.is_none() && self.index.is_none()
    }
}

/// Operand variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Register operand
    Register(Register),
    /// Immediate value; see `Operand::signed` / `Operand::unsigned`
    Immediate(i64),
    /// Direct memory pointer
    Memory(u64),
    /// Indirect memory pointer
    Displacement(MemoryOperand),
    /// Operand the backend does not model; never rendered
    Unknown,
}

/// Operand together with its position inside the instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub kind: OperandKind,
    pub position: usize,
}

impl Operand {
    pub fn is_register(&self) -> bool {
        matches!(self.kind, OperandKind::Register(_))
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self.kind, OperandKind::Immediate(_))
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.kind, OperandKind::Memory(_))
    }

    pub fn is_displacement(&self) -> bool {
        matches!(self.kind, OperandKind::Displacement(_))
    }

    /// Signed view of an immediate or direct memory value
    pub fn signed(&self) -> Option<i64> {
        match self.kind {
            OperandKind::Immediate(v) => Some(v),
            OperandKind::Memory(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Unsigned view of an immediate or direct memory value
    pub fn unsigned(&self) -> Option<u64> {
        match self.kind {
            OperandKind::Immediate(v) => Some(v as u64),
            OperandKind::Memory(v) => Some(v),
            _ => None,
        }
    }
}

/// Decoder-owned data attached to an instruction.
///
/// Dropping the payload releases it, so release happens exactly once no
/// matter how the instruction is reset or discarded.
pub enum Payload {
    /// Raw iced-x86 decode result
    Iced(Box<iced_x86::Instruction>),
    /// Data owned by any other backend
    Opaque {
        backend: &'static str,
        data: Box<dyn Any + Send + Sync>,
    },
}

impl Payload {
    /// Name of the backend that produced the payload
    pub fn backend(&self) -> &str {
        match self {
            Payload::Iced(_) => "iced-x86",
            Payload::Opaque { backend, .. } => backend,
        }
    }

    pub fn as_iced(&self) -> Option<&iced_x86::Instruction> {
        match self {
            Payload::Iced(ins) => Some(ins.as_ref()),
            Payload::Opaque { .. } => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Payload::Opaque { data, .. } => data.downcast_ref(),
            Payload::Iced(_) => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

/// Decoded instruction at a specific address
#[derive(Debug, Default)]
pub struct Instruction {
    /// Address of the first byte
    pub address: u64,
    /// Length in bytes
    pub size: u32,
    /// Instruction mnemonic (e.g., "mov", "jmp")
    pub mnemonic: String,
    /// Operands in position order
    pub operands: Vec<Operand>,
    /// Free-text comments, append-only
    pub comments: Vec<String>,
    /// Classification bits
    pub flags: InstructionFlags,
    /// Index of the containing segment in the image's segment list
    pub segment: Option<usize>,
    payload: Option<Payload>,
}

impl Instruction {
    pub fn new(address: u64, size: u32, mnemonic: impl Into<String>) -> Self {
        Self {
            address,
            size,
            mnemonic: mnemonic.into(),
            ..Default::default()
        }
    }

    /// Address past the last byte; wraps at the top of the address space
    pub fn end_address(&self) -> u64 {
        self.address.wrapping_add(self.size as u64)
    }

    /// Check whether any of `flags` is set
    pub fn is(&self, flags: InstructionFlags) -> bool {
        self.flags.intersects(flags)
    }

    /// True only for instructions classified as invalid and nothing else
    pub fn is_invalid(&self) -> bool {
        self.flags == InstructionFlags::INVALID
    }

    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        self.comments.push(text.into());
        self
    }

    /// Append an operand, stamping its position
    pub fn op(&mut self, kind: OperandKind) -> &mut Self {
        let position = self.operands.len();
        self.operands.push(Operand { kind, position });
        self
    }

    pub fn reg(&mut self, id: RegisterId) -> &mut Self {
        self.op(OperandKind::Register(Register::new(id)))
    }

    pub fn reg_typed(&mut self, id: RegisterId, tag: u32) -> &mut Self {
        self.op(OperandKind::Register(Register::tagged(id, tag)))
    }

    pub fn imm(&mut self, value: i64) -> &mut Self {
        self.op(OperandKind::Immediate(value))
    }

    pub fn imm_unsigned(&mut self, value: u64) -> &mut Self {
        self.op(OperandKind::Immediate(value as i64))
    }

    pub fn mem(&mut self, address: u64) -> &mut Self {
        self.op(OperandKind::Memory(address))
    }

    pub fn disp(&mut self, base: RegisterId, displacement: i64) -> &mut Self {
        self.op(OperandKind::Displacement(MemoryOperand::new(
            Some(Register::new(base)),
            None,
            1,
            displacement,
        )))
    }

    pub fn disp_indexed(
        &mut self,
        base: Option<RegisterId>,
        index: Option<RegisterId>,
        scale: u32,
        displacement: i64,
    ) -> &mut Self {
        self.op(OperandKind::Displacement(MemoryOperand::new(
            base.map(Register::new),
            index.map(Register::new),
            scale,
            displacement,
        )))
    }

    pub fn set_payload(&mut self, payload: Payload) -> &mut Self {
        self.payload = Some(payload);
        self
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Clear operands and flags and release the payload.
    ///
    /// The payload is taken out before it is dropped, so a second reset without
    /// a new payload releases nothing.
    pub fn reset(&mut self) {
        self.flags = InstructionFlags::empty();
        self.operands.clear();
        drop(self.payload.take());
    }
}
