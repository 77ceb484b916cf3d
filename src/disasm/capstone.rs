use capstone::prelude::*;
use capstone::{Arch, Capstone, Mode, NO_EXTRA_MODE};
use tracing::debug;

use crate::core::instruction::RegisterId;
use crate::disasm::{DecodeError, RegisterNames};

/// Highest register id queried when building the name table
const MAX_REGISTER_ID: u16 = 512;

/// Register-name provider backed by capstone's x86 tables.
///
/// Names are read once at construction, so the provider holds no capstone
/// handle and can be shared between threads.
#[derive(Debug, Clone)]
pub struct CapstoneRegisters {
    names: Vec<Option<String>>,
}

impl CapstoneRegisters {
    /// Build the table for x86 in the given bitness
    pub fn x86(bits: u32) -> Result<Self, DecodeError> {
        let mode = match bits {
            16 => Mode::Mode16,
            32 => Mode::Mode32,
            64 => Mode::Mode64,
            other => {
                return Err(DecodeError::UnsupportedArchitecture(format!(
                    "x86 with {} bits",
                    other
                )))
            }
        };

        let cs = Capstone::new_raw(Arch::X86, mode, NO_EXTRA_MODE, None)
            .map_err(|e| DecodeError::UnsupportedArchitecture(e.to_string()))?;

        let names: Vec<Option<String>> = (0..MAX_REGISTER_ID)
            .map(|id| cs.reg_name(RegId(id)))
            .collect();
        debug!(
            registers = names.iter().filter(|n| n.is_some()).count(),
            "Capstone register table built"
        );

        Ok(Self { names })
    }

    /// Name of a capstone register id, if capstone knows it
    pub fn get(&self, id: RegisterId) -> Option<&str> {
        self.names.get(id as usize)?.as_deref()
    }
}

impl RegisterNames for CapstoneRegisters {
    fn register_name(&self, id: RegisterId) -> String {
        self.get(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("reg{}", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x86_register_names() {
        let regs = CapstoneRegisters::x86(32).unwrap();
        // X86_REG_EAX
        assert_eq!(regs.register_name(19), "eax");
        assert_eq!(regs.get(0), None);
        assert_eq!(regs.register_name(0), "reg0");
        assert!(CapstoneRegisters::x86(12).is_err());
    }
}
