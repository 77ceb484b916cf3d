use iced_x86::{
    DecoderError, DecoderOptions, FlowControl, Mnemonic, OpKind, Register as IReg,
};

use crate::core::instruction::{Instruction, InstructionFlags, OperandKind, Payload, RegisterId};
use crate::disasm::{DecodeError, Decoder, RegisterNames};

/// x86/x64 backend built on iced-x86.
///
/// Register ids are iced's `Register` discriminants.
#[derive(Debug, Clone, Copy)]
pub struct IcedDecoder {
    bitness: u32,
}

impl IcedDecoder {
    pub fn new(bitness: u32) -> Result<Self, DecodeError> {
        match bitness {
            16 | 32 | 64 => Ok(Self { bitness }),
            other => Err(DecodeError::UnsupportedArchitecture(format!(
                "x86 with {} bits",
                other
            ))),
        }
    }

    pub fn x86_32() -> Self {
        Self { bitness: 32 }
    }

    pub fn x86_64() -> Self {
        Self { bitness: 64 }
    }

    pub fn bitness(&self) -> u32 {
        self.bitness
    }

    fn operands(&self, ins: &iced_x86::Instruction, out: &mut Instruction) {
        for i in 0..ins.op_count() {
            match ins.op_kind(i) {
                OpKind::Register => {
                    out.reg(ins.op_register(i) as RegisterId);
                }
                OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                    out.imm(ins.near_branch_target() as i64);
                }
                // Immediates as wide as their operand keep their raw value
                OpKind::Immediate8 => {
                    out.imm_unsigned(ins.immediate8() as u64);
                }
                OpKind::Immediate8_2nd => {
                    out.imm_unsigned(ins.immediate8_2nd() as u64);
                }
                OpKind::Immediate16 => {
                    out.imm_unsigned(ins.immediate16() as u64);
                }
                OpKind::Immediate32 => {
                    out.imm_unsigned(ins.immediate32() as u64);
                }
                OpKind::Immediate64 => {
                    out.imm_unsigned(ins.immediate64());
                }
                OpKind::Immediate8to16 => {
                    out.imm(ins.immediate8to16() as i64);
                }
                OpKind::Immediate8to32 => {
                    out.imm(ins.immediate8to32() as i64);
                }
                OpKind::Immediate8to64 => {
                    out.imm(ins.immediate8to64());
                }
                OpKind::Immediate32to64 => {
                    out.imm(ins.immediate32to64());
                }
                OpKind::Memory => self.memory(ins, out),
                _ => {
                    out.op(OperandKind::Unknown);
                }
            }
        }
    }

    fn memory(&self, ins: &iced_x86::Instruction, out: &mut Instruction) {
        let base = ins.memory_base();
        let index = ins.memory_index();

        if ins.is_ip_rel_memory_operand() {
            out.mem(ins.ip_rel_memory_address());
            return;
        }

        // 32-bit addressing keeps a 32-bit displacement
        let displacement = if self.bitness == 64 && !base.is_gpr32() && !index.is_gpr32() {
            ins.memory_displacement64() as i64
        } else {
            ins.memory_displacement32() as i32 as i64
        };

        if base == IReg::None && index == IReg::None {
            let address = if self.bitness == 64 {
                ins.memory_displacement64()
            } else {
                ins.memory_displacement32() as u64
            };
            out.mem(address);
            return;
        }

        let reg = |r: IReg| (r != IReg::None).then_some(r as RegisterId);
        out.disp_indexed(reg(base), reg(index), ins.memory_index_scale(), displacement);
    }

    fn flags(ins: &iced_x86::Instruction) -> InstructionFlags {
        let mut flags = match ins.flow_control() {
            FlowControl::UnconditionalBranch | FlowControl::IndirectBranch => InstructionFlags::JUMP,
            FlowControl::ConditionalBranch => InstructionFlags::JUMP | InstructionFlags::CONDITIONAL,
            FlowControl::Call | FlowControl::IndirectCall => InstructionFlags::CALL,
            FlowControl::Return => InstructionFlags::STOP,
            _ => InstructionFlags::empty(),
        };

        flags |= match ins.mnemonic() {
            Mnemonic::Nop => InstructionFlags::NOP,
            Mnemonic::Push => InstructionFlags::PUSH,
            Mnemonic::Pop => InstructionFlags::POP,
            Mnemonic::Cmp | Mnemonic::Test => InstructionFlags::COMPARE,
            Mnemonic::Add => InstructionFlags::ADD,
            Mnemonic::Sub => InstructionFlags::SUB,
            Mnemonic::Mul | Mnemonic::Imul => InstructionFlags::MUL,
            Mnemonic::Div | Mnemonic::Idiv => InstructionFlags::DIV,
            Mnemonic::And => InstructionFlags::AND,
            Mnemonic::Or => InstructionFlags::OR,
            Mnemonic::Xor => InstructionFlags::XOR,
            Mnemonic::Not => InstructionFlags::NOT,
            Mnemonic::Hlt => InstructionFlags::STOP | InstructionFlags::PRIVILEGED,
            _ => InstructionFlags::empty(),
        };

        flags
    }
}

impl RegisterNames for IcedDecoder {
    fn register_name(&self, id: RegisterId) -> String {
        IReg::values()
            .nth(id as usize)
            .map(|r| format!("{:?}", r).to_ascii_lowercase())
            .unwrap_or_else(|| format!("reg{}", id))
    }
}

impl Decoder for IcedDecoder {
    fn name(&self) -> &str {
        "iced-x86"
    }

    fn max_instruction_length(&self) -> usize {
        15
    }

    fn decode(&self, address: u64, bytes: &[u8]) -> Result<Instruction, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::InsufficientBytes);
        }

        let mut decoder =
            iced_x86::Decoder::with_ip(self.bitness, bytes, address, DecoderOptions::NONE);
        let ins = decoder.decode();

        if ins.is_invalid() {
            if decoder.last_error() == DecoderError::NoMoreBytes {
                return Err(DecodeError::InsufficientBytes);
            }
            let mut out = Instruction::new(address, 1, "db");
            out.imm(bytes[0] as i64);
            out.flags = InstructionFlags::INVALID;
            return Ok(out);
        }

        let mnemonic = format!("{:?}", ins.mnemonic()).to_ascii_lowercase();
        let mut out = Instruction::new(address, ins.len() as u32, mnemonic);
        self.operands(&ins, &mut out);
        out.flags = Self::flags(&ins);
        out.set_payload(Payload::Iced(Box::new(ins)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_mov_with_displacement() {
        // mov eax, [ebx+0x10]
        let d = IcedDecoder::x86_32();
        let ins = d.decode(0x401000, &[0x8B, 0x43, 0x10]).unwrap();

        assert_eq!(ins.mnemonic, "mov");
        assert_eq!(ins.size, 3);
        assert_eq!(ins.end_address(), 0x401003);
        assert_eq!(ins.operands.len(), 2);
        assert_eq!(ins.operands[0].kind, OperandKind::Register(crate::core::Register::new(IReg::EAX as u32)));
        match ins.operands[1].kind {
            OperandKind::Displacement(m) => {
                assert_eq!(m.base.map(|r| r.id), Some(IReg::EBX as u32));
                assert_eq!(m.index, None);
                assert_eq!(m.displacement, 0x10);
            }
            other => panic!("unexpected operand {:?}", other),
        }
        assert_eq!(ins.operands[1].position, 1);
        assert_eq!(ins.payload().map(|p| p.backend()), Some("iced-x86"));
    }

    #[test]
    fn test_negative_displacement_32bit() {
        // mov eax, [ebp-0x10]
        let d = IcedDecoder::x86_32();
        let ins = d.decode(0, &[0x8B, 0x45, 0xF0]).unwrap();
        match ins.operands[1].kind {
            OperandKind::Displacement(m) => assert_eq!(m.displacement, -0x10),
            other => panic!("unexpected operand {:?}", other),
        }
    }

    #[test]
    fn test_branch_flags_and_targets() {
        let d = IcedDecoder::x86_32();

        // call rel32 to 0x401010
        let call = d.decode(0x401000, &[0xE8, 0x0B, 0x00, 0x00, 0x00]).unwrap();
        assert!(call.is(InstructionFlags::CALL));
        assert_eq!(call.operands[0].unsigned(), Some(0x401010));

        // je +2
        let je = d.decode(0x401000, &[0x74, 0x02]).unwrap();
        assert!(je.is(InstructionFlags::JUMP));
        assert!(je.is(InstructionFlags::CONDITIONAL));

        let ret = d.decode(0x401000, &[0xC3]).unwrap();
        assert!(ret.is(InstructionFlags::STOP));

        let push = d.decode(0x401000, &[0x55]).unwrap();
        assert!(push.is(InstructionFlags::PUSH));
    }

    #[test]
    fn test_absolute_and_rip_relative_memory() {
        // call dword ptr [0x402000]
        let d32 = IcedDecoder::x86_32();
        let ins = d32.decode(0x401000, &[0xFF, 0x15, 0x00, 0x20, 0x40, 0x00]).unwrap();
        assert_eq!(ins.operands[0].kind, OperandKind::Memory(0x402000));

        // call qword ptr [rip+0x10]
        let d64 = IcedDecoder::x86_64();
        let ins = d64
            .decode(0x140001000, &[0xFF, 0x15, 0x10, 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(ins.operands[0].kind, OperandKind::Memory(0x140001016));
    }

    #[test]
    fn test_immediate_extension() {
        let d = IcedDecoder::x86_32();

        // push 0x80402000
        let push = d.decode(0x80401000, &[0x68, 0x00, 0x20, 0x40, 0x80]).unwrap();
        assert_eq!(push.operands[0].unsigned(), Some(0x8040_2000));

        // push -1 (imm8 sign-extended to 32 bits)
        let push = d.decode(0x401000, &[0x6A, 0xFF]).unwrap();
        assert_eq!(push.operands[0].signed(), Some(-1));

        // mov eax, dword ptr [0x80402000]
        let mov = d.decode(0x80401000, &[0xA1, 0x00, 0x20, 0x40, 0x80]).unwrap();
        assert_eq!(mov.operands[1].kind, OperandKind::Memory(0x8040_2000));
    }

    #[test]
    fn test_invalid_and_truncated_bytes() {
        let d = IcedDecoder::x86_64();
        assert_eq!(d.decode(0, &[]).unwrap_err(), DecodeError::InsufficientBytes);
        assert_eq!(d.decode(0, &[0x8B]).unwrap_err(), DecodeError::InsufficientBytes);

        // 0x06 (push es) does not exist in 64-bit mode
        let ins = d.decode(0x1000, &[0x06, 0x90]).unwrap();
        assert!(ins.is_invalid());
        assert_eq!(ins.mnemonic, "db");
        assert_eq!(ins.size, 1);
        assert!(ins.payload().is_none());
    }

    #[test]
    fn test_register_names() {
        let d = IcedDecoder::x86_64();
        assert_eq!(d.register_name(IReg::RAX as u32), "rax");
        assert_eq!(d.register_name(IReg::EBX as u32), "ebx");
        assert_eq!(d.register_name(100_000), "reg100000");
        assert!(IcedDecoder::new(8).is_err());
    }
}
