//! Text rendering of decoded instructions.
//!
//! The printer never fails: an address without a symbol is shown as hex.

use rayon::prelude::*;

use crate::core::instruction::{Instruction, MemoryOperand, Operand, OperandKind};
use crate::core::symbol::SymbolTable;
use crate::disasm::RegisterNames;

/// Renders instructions with the names of one register provider and one
/// symbol table
pub struct Printer<'a, R: RegisterNames + ?Sized> {
    registers: &'a R,
    symbols: Option<&'a SymbolTable>,
}

impl<'a, R: RegisterNames + ?Sized> Printer<'a, R> {
    pub fn new(registers: &'a R, symbols: Option<&'a SymbolTable>) -> Self {
        Self { registers, symbols }
    }

    /// Mnemonic followed by the rendered operands
    pub fn render(&self, instruction: &Instruction) -> String {
        self.render_with(instruction, |_, _| {})
    }

    /// Like [`render`](Self::render), calling `callback` with every operand
    /// that produced text
    pub fn render_with<F>(&self, instruction: &Instruction, mut callback: F) -> String
    where
        F: FnMut(&Operand, &str),
    {
        let mut out = instruction.mnemonic.clone();
        let mut first = true;

        for operand in &instruction.operands {
            let text = self.operand(operand);
            if text.is_empty() {
                continue;
            }

            out.push_str(if first { " " } else { ", " });
            out.push_str(&text);
            first = false;
            callback(operand, &text);
        }

        out
    }

    /// Text of one operand; empty when the operand is not renderable
    pub fn operand(&self, operand: &Operand) -> String {
        match operand.kind {
            OperandKind::Register(reg) => self.registers.register_name(reg.id),
            OperandKind::Immediate(value) => self
                .symbol_name(value as u64)
                .map(str::to_string)
                .unwrap_or_else(|| signed_hex(value)),
            OperandKind::Memory(address) => self
                .symbol_name(address)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{:#x}", address)),
            OperandKind::Displacement(mem) => self.memory(&mem),
            OperandKind::Unknown => String::new(),
        }
    }

    /// `[base + index * scale + disp]`, omitting absent terms
    pub fn memory(&self, mem: &MemoryOperand) -> String {
        let mut inner = String::new();

        if let Some(base) = mem.base {
            inner.push_str(&self.registers.register_name(base.id));
        }

        if let Some(index) = mem.index {
            if !inner.is_empty() {
                inner.push_str(" + ");
            }
            inner.push_str(&self.registers.register_name(index.id));
            if mem.scale > 1 {
                inner.push_str(&format!(" * {}", mem.scale));
            }
        }

        if mem.displacement != 0 {
            let symbol = self.symbol_name(mem.displacement as u64);
            match (symbol, inner.is_empty()) {
                (Some(name), true) => inner.push_str(name),
                (Some(name), false) => {
                    inner.push_str(" + ");
                    inner.push_str(name);
                }
                (None, true) => inner.push_str(&signed_hex(mem.displacement)),
                (None, false) if mem.displacement < 0 => {
                    inner.push_str(&format!(" - {:#x}", mem.displacement.unsigned_abs()));
                }
                (None, false) => inner.push_str(&format!(" + {:#x}", mem.displacement)),
            }
        }

        if inner.is_empty() {
            return inner;
        }
        format!("[{}]", inner)
    }

    fn symbol_name(&self, address: u64) -> Option<&'a str> {
        self.symbols?.lookup(address).map(|s| s.name.as_str())
    }
}

impl<'a, R: RegisterNames + Sync + ?Sized> Printer<'a, R> {
    /// Render a batch on the rayon pool, preserving order
    pub fn render_all(&self, instructions: &[Instruction]) -> Vec<String> {
        instructions.par_iter().map(|i| self.render(i)).collect()
    }
}

fn signed_hex(value: i64) -> String {
    if value < 0 {
        format!("-{:#x}", value.unsigned_abs())
    } else {
        format!("{:#x}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol::SymbolKind;
    use crate::core::RegisterId;

    struct Names;

    impl RegisterNames for Names {
        fn register_name(&self, id: RegisterId) -> String {
            match id {
                0 => "eax".into(),
                3 => "ebx".into(),
                6 => "esi".into(),
                other => format!("r{}", other),
            }
        }
    }

    fn symbols() -> SymbolTable {
        let mut table = SymbolTable::new();
        table.define(0x402000, "kernel32!ExitProcess", SymbolKind::Import);
        table.define(0x403000, "g_table", SymbolKind::Data);
        table
    }

    #[test]
    fn test_register_and_displacement() {
        let mut ins = Instruction::new(0x401000, 3, "mov");
        ins.reg(0).disp(3, 0x10);

        let printer = Printer::new(&Names, None);
        assert_eq!(printer.render(&ins), "mov eax, [ebx + 0x10]");
    }

    #[test]
    fn test_no_operands_no_trailing_space() {
        let ins = Instruction::new(0, 1, "ret");
        assert_eq!(Printer::new(&Names, None).render(&ins), "ret");
    }

    #[test]
    fn test_immediates() {
        let table = symbols();
        let printer = Printer::new(&Names, Some(&table));

        let mut ins = Instruction::new(0, 5, "push");
        ins.imm(0x10);
        assert_eq!(printer.render(&ins), "push 0x10");

        let mut ins = Instruction::new(0, 5, "push");
        ins.imm(-0x10);
        assert_eq!(printer.render(&ins), "push -0x10");

        let mut ins = Instruction::new(0, 5, "push");
        ins.imm_unsigned(0x402000);
        assert_eq!(printer.render(&ins), "push kernel32!ExitProcess");
    }

    #[test]
    fn test_memory_symbol_substitution() {
        let table = symbols();
        let printer = Printer::new(&Names, Some(&table));

        let mut ins = Instruction::new(0, 6, "call");
        ins.mem(0x402000);
        assert_eq!(printer.render(&ins), "call kernel32!ExitProcess");

        let mut ins = Instruction::new(0, 6, "call");
        ins.mem(0x405000);
        assert_eq!(printer.render(&ins), "call 0x405000");
    }

    #[test]
    fn test_displacement_forms() {
        let table = symbols();
        let printer = Printer::new(&Names, Some(&table));
        let render = |base, index, scale, disp| {
            let mut ins = Instruction::new(0, 1, "lea");
            ins.disp_indexed(base, index, scale, disp);
            printer.render(&ins)
        };

        assert_eq!(render(Some(3), Some(6), 4, 0x8), "lea [ebx + esi * 4 + 0x8]");
        assert_eq!(render(Some(3), Some(6), 1, 0), "lea [ebx + esi]");
        assert_eq!(render(None, Some(6), 4, 0x403000), "lea [esi * 4 + g_table]");
        assert_eq!(render(Some(3), None, 1, -0x10), "lea [ebx - 0x10]");
        assert_eq!(render(None, None, 1, 0x1234), "lea [0x1234]");
        assert_eq!(render(None, None, 1, 0x403000), "lea [g_table]");
    }

    #[test]
    fn test_empty_and_unknown_operands_skipped() {
        let mut ins = Instruction::new(0, 2, "nop");
        ins.disp_indexed(None, None, 1, 0).op(OperandKind::Unknown);
        assert_eq!(Printer::new(&Names, None).render(&ins), "nop");

        let mut ins = Instruction::new(0, 2, "mov");
        ins.reg(0).op(OperandKind::Unknown).reg(3);
        assert_eq!(Printer::new(&Names, None).render(&ins), "mov eax, ebx");
    }

    #[test]
    fn test_render_with_callback() {
        let mut ins = Instruction::new(0, 3, "mov");
        ins.reg(0).op(OperandKind::Unknown).disp(3, 0x10);

        let mut seen = Vec::new();
        let text = Printer::new(&Names, None).render_with(&ins, |op, s| {
            seen.push((op.position, s.to_string()));
        });
        assert_eq!(text, "mov eax, [ebx + 0x10]");
        assert_eq!(seen, vec![(0, "eax".to_string()), (2, "[ebx + 0x10]".to_string())]);
    }

    #[test]
    fn test_render_all_preserves_order() {
        let instructions: Vec<Instruction> = (0..64u64)
            .map(|i| {
                let mut ins = Instruction::new(i, 1, "push");
                ins.imm(i as i64);
                ins
            })
            .collect();

        let lines = Printer::new(&Names, None).render_all(&instructions);
        assert_eq!(lines.len(), 64);
        assert_eq!(lines[0], "push 0x0");
        assert_eq!(lines[63], "push 0x3f");
    }
}
