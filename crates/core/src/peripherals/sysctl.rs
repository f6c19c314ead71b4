use std::any::Any;

use tivalink_driver::map::sysctl::{self, Rcc, Rcc2, Ris};
use tivalink_driver::Crystal;

use crate::{Peripheral, SimResult, SimulationError};

const RIS: u32 = 0x050;
const RCC: u32 = 0x060;
const RCC2: u32 = 0x070;
const RCGCGPIO: u32 = 0x608;
const RCGCUART: u32 = 0x618;

const PIOSC_HZ: u32 = 16_000_000;

/// TM4C123 system control: RCC/RCC2 clock tree, PLL lock status and run-mode
/// clock gates.
///
/// The PLL starts its lock countdown whenever it is powered up or its reference
/// changes, and sets RIS.PLLLRIS once the countdown expires.
#[derive(Debug)]
pub struct SysCtl {
    rcc: u32,
    rcc2: u32,
    ris: u32,
    rcgcgpio: u32,
    rcgcuart: u32,
    crystal_hz: u32,
    lock_ticks: Option<u32>,
    countdown: Option<u32>,
}

impl SysCtl {
    pub fn new(crystal_hz: u32, lock_ticks: Option<u32>) -> Self {
        Self {
            rcc: sysctl::RCC_RESET,
            rcc2: sysctl::RCC2_RESET,
            ris: 0,
            rcgcgpio: 0,
            rcgcuart: 0,
            crystal_hz,
            lock_ticks,
            countdown: None,
        }
    }

    pub fn gpio_gates(&self) -> u32 {
        self.rcgcgpio
    }

    pub fn uart_gates(&self) -> u32 {
        self.rcgcuart
    }

    pub fn rcc(&self) -> u32 {
        self.rcc
    }

    pub fn rcc2(&self) -> u32 {
        self.rcc2
    }

    fn uses_rcc2(&self) -> bool {
        self.rcc2 & Rcc2::USERCC2.bits() != 0
    }

    pub fn pll_locked(&self) -> bool {
        self.ris & Ris::PLLLRIS.bits() != 0
    }

    pub fn pll_powered(&self) -> bool {
        if self.uses_rcc2() {
            self.rcc2 & Rcc2::PWRDN2.bits() == 0
        } else {
            self.rcc & Rcc::PWRDN.bits() == 0
        }
    }

    pub fn bypassed(&self) -> bool {
        if self.uses_rcc2() {
            self.rcc2 & Rcc2::BYPASS2.bits() != 0
        } else {
            self.rcc & Rcc::BYPASS.bits() != 0
        }
    }

    /// 0 = main oscillator, 1 = PIOSC, 2 = PIOSC / 4, 3 = LFIOSC, 7 = 32.768 kHz.
    fn oscillator_source(&self) -> u32 {
        if self.uses_rcc2() {
            (self.rcc2 & sysctl::RCC2_OSCSRC2_MASK) >> sysctl::RCC2_OSCSRC2_SHIFT
        } else {
            (self.rcc & sysctl::RCC_OSCSRC_MASK) >> 4
        }
    }

    fn oscillator_hz(&self) -> u32 {
        match self.oscillator_source() {
            0 => self.crystal_hz,
            1 => PIOSC_HZ,
            2 => PIOSC_HZ / 4,
            3 => 30_000,
            _ => 32_768,
        }
    }

    fn divisor(&self) -> u32 {
        if self.uses_rcc2() {
            ((self.rcc2 & sysctl::RCC2_SYSDIV2_MASK) >> sysctl::RCC2_SYSDIV2_SHIFT) + 1
        } else {
            ((self.rcc & sysctl::RCC_SYSDIV_MASK) >> 23) + 1
        }
    }

    /// Frequency of the system clock as the current register state selects it.
    pub fn sysclk_hz(&self) -> u32 {
        let use_sysdiv = self.rcc & Rcc::USESYSDIV.bits() != 0;
        if self.bypassed() {
            let osc = self.oscillator_hz();
            if use_sysdiv {
                osc / self.divisor()
            } else {
                osc
            }
        } else {
            // The PLL path always goes through the divider.
            sysctl::PLL_OUTPUT_HZ / self.divisor()
        }
    }

    /// Whether RCC.XTAL names a crystal the PLL can lock to and matches the board.
    fn reference_valid(&self) -> bool {
        let code = (self.rcc & sysctl::RCC_XTAL_MASK) >> sysctl::RCC_XTAL_SHIFT;
        match Crystal::from_xtal_code(code) {
            Some(crystal) => self.oscillator_source() != 0 || crystal.hz() == self.crystal_hz,
            None => false,
        }
    }

    fn restart_lock(&mut self) {
        self.ris &= !Ris::PLLLRIS.bits();
        self.countdown = if self.pll_powered() && self.reference_valid() {
            self.lock_ticks
        } else {
            None
        };
        tracing::debug!("PLL relock: {:?} cycles", self.countdown);
    }

    fn reference_bits(&self) -> (u32, u32) {
        (
            self.rcc & (sysctl::RCC_XTAL_MASK | sysctl::RCC_OSCSRC_MASK),
            self.rcc2 & sysctl::RCC2_OSCSRC2_MASK,
        )
    }

    fn write_clock(&mut self, offset: u32, value: u32) -> SimResult<()> {
        let was_bypassed = self.bypassed();
        let was_powered = self.pll_powered();
        let was_rcc2 = self.uses_rcc2();
        let reference = self.reference_bits();

        if offset == RCC {
            self.rcc = value;
        } else {
            self.rcc2 = value;
        }

        let reference_changed = reference != self.reference_bits();
        if reference_changed || (self.pll_powered() && !was_powered) || was_rcc2 != self.uses_rcc2() {
            self.restart_lock();
        }

        if reference_changed && !was_bypassed && was_powered {
            return Err(SimulationError::Sequencing(
                "oscillator changed while the PLL drives the system clock",
            ));
        }
        if was_bypassed && !self.bypassed() && !self.pll_locked() {
            return Err(SimulationError::Sequencing("PLL bypass cleared before lock"));
        }
        Ok(())
    }
}

impl Peripheral for SysCtl {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            RIS => self.ris,
            RCC => self.rcc,
            RCC2 => self.rcc2,
            RCGCGPIO => self.rcgcgpio,
            RCGCUART => self.rcgcuart,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            RIS => return Err(SimulationError::ReadOnly(offset)),
            RCC | RCC2 => return self.write_clock(offset, value),
            RCGCGPIO => self.rcgcgpio = value & 0x3F,
            RCGCUART => self.rcgcuart = value & 0xFF,
            _ => {}
        }
        Ok(())
    }

    /// Advance the PLL lock countdown by one cycle.
    fn tick(&mut self) {
        match self.countdown {
            Some(0) => {
                self.ris |= Ris::PLLLRIS.bits();
                self.countdown = None;
                tracing::debug!("PLL locked");
            }
            Some(n) => self.countdown = Some(n - 1),
            None => {}
        }
    }

    fn registers(&self) -> Vec<(u32, u32)> {
        vec![
            (RIS, self.ris),
            (RCC, self.rcc),
            (RCC2, self.rcc2),
            (RCGCGPIO, self.rcgcgpio),
            (RCGCUART, self.rcgcuart),
        ]
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
