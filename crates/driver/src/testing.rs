//! In-crate register file used by the unit tests.

use std::collections::HashMap;

use crate::map::{sysctl, uart};
use crate::poll::DelayCycles;
use crate::register::{Register, RegisterAccess};

/// Plain storage: reads return the last value written, no side effects.
#[derive(Debug, Default)]
pub struct FakeRegisters {
    values: HashMap<Register, u32>,
    writes: Vec<(Register, u32)>,
}

impl FakeRegisters {
    /// RCC/RCC2 at their reset values.
    pub fn tm4c_reset() -> Self {
        let mut regs = Self::default();
        regs.preset(sysctl::RCC, sysctl::RCC_RESET);
        regs.preset(sysctl::RCC2, sysctl::RCC2_RESET);
        regs.preset(Register::new(0x4000_C000, uart::CTL), uart::CTL_RESET);
        regs
    }

    /// Set a value without logging it as a write.
    pub fn preset(&mut self, reg: Register, value: u32) {
        self.values.insert(reg, value);
    }

    pub fn peek(&self, reg: Register) -> u32 {
        self.values.get(&reg).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> &[(Register, u32)] {
        &self.writes
    }
}

impl RegisterAccess for FakeRegisters {
    fn read(&mut self, reg: Register) -> u32 {
        self.peek(reg)
    }

    fn write(&mut self, reg: Register, value: u32) {
        self.values.insert(reg, value);
        self.writes.push((reg, value));
    }
}

#[derive(Debug, Default)]
pub struct CountingDelay {
    pub calls: u32,
    pub total_cycles: u64,
}

impl DelayCycles for CountingDelay {
    fn delay_cycles(&mut self, cycles: u32) {
        self.calls += 1;
        self.total_cycles += u64::from(cycles);
    }
}
