//! System clock bring-up: default oscillator to PLL-derived clock.

use log::debug;

use crate::error::{DriverError, Result};
use crate::map::sysctl::{self, Rcc, Rcc2, Ris};
use crate::poll::{self, WaitPolicy};
use crate::register::RegisterAccess;

/// Crystal frequencies understood by RCC.XTAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crystal {
    Mhz8,
    Mhz10,
    Mhz12,
    Mhz16,
    Mhz20,
    Mhz24,
    Mhz25,
}

impl Crystal {
    const TABLE: [(Crystal, u32, u32); 7] = [
        (Crystal::Mhz8, 0x0E, 8_000_000),
        (Crystal::Mhz10, 0x10, 10_000_000),
        (Crystal::Mhz12, 0x11, 12_000_000),
        (Crystal::Mhz16, 0x15, 16_000_000),
        (Crystal::Mhz20, 0x18, 20_000_000),
        (Crystal::Mhz24, 0x19, 24_000_000),
        (Crystal::Mhz25, 0x1A, 25_000_000),
    ];

    /// Value written to RCC.XTAL.
    pub fn xtal_code(self) -> u32 {
        Self::lookup(|(c, _, _)| *c == self).1
    }

    pub fn hz(self) -> u32 {
        Self::lookup(|(c, _, _)| *c == self).2
    }

    pub fn from_xtal_code(code: u32) -> Option<Self> {
        Self::TABLE.iter().find(|(_, x, _)| *x == code).map(|e| e.0)
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::TABLE.iter().find(|(_, _, f)| *f == hz).map(|e| e.0)
    }

    fn lookup(pred: impl Fn(&(Crystal, u32, u32)) -> bool) -> (Crystal, u32, u32) {
        // Every variant has a row.
        Self::TABLE.iter().copied().find(pred).unwrap_or(Self::TABLE[3])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    pub crystal: Crystal,
    /// Divide-by applied to the 200 MHz PLL output. Values outside 2..=64 are
    /// clamped to that range.
    pub divide_by: u8,
}

impl ClockConfig {
    /// 16 MHz crystal, 200 MHz / 4 = 50 MHz.
    pub const EK_TM4C123GXL: Self = Self {
        crystal: Crystal::Mhz16,
        divide_by: 4,
    };

    /// Divide-by the hardware actually applies.
    pub fn effective_divide_by(&self) -> u8 {
        self.divide_by.clamp(2, 64)
    }

    pub fn target_hz(&self) -> u32 {
        sysctl::PLL_OUTPUT_HZ / u32::from(self.effective_divide_by())
    }

    fn sysdiv2(&self) -> u32 {
        u32::from(self.effective_divide_by() - 1)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::EK_TM4C123GXL
    }
}

/// Bring-up stage. Moves strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClockState {
    DefaultOscillator,
    SourceSelected,
    PllPoweringUp,
    PllLocked,
    DividerActive,
}

/// Proof that the system clock has been brought up, carrying its frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clocks {
    sysclk_hz: u32,
}

impl Clocks {
    pub fn sysclk_hz(&self) -> u32 {
        self.sysclk_hz
    }
}

pub fn is_pll_locked<R: RegisterAccess>(bus: &mut R) -> bool {
    Ris::from_bits_retain(bus.read(sysctl::RIS)).contains(Ris::PLLLRIS)
}

#[derive(Debug)]
pub struct ClockController {
    config: ClockConfig,
    state: ClockState,
}

impl ClockController {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            state: ClockState::DefaultOscillator,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Run the bring-up sequence, blocking until the PLL reports lock.
    pub fn bring_up_high_speed_clock<R: RegisterAccess>(&mut self, bus: &mut R) -> Clocks {
        self.program_pll(bus);
        if self.state == ClockState::PllPoweringUp {
            poll::spin_until(|| is_pll_locked(bus));
            self.advance(ClockState::PllLocked);
        }
        self.engage_pll(bus)
    }

    /// Run the bring-up sequence with a caller-chosen lock wait.
    ///
    /// On timeout the PLL stays bypassed and the controller stays in
    /// [`ClockState::PllPoweringUp`]; calling again only repeats the lock wait.
    pub fn bring_up_with<R: RegisterAccess>(
        &mut self,
        bus: &mut R,
        wait: WaitPolicy,
    ) -> Result<Clocks> {
        self.program_pll(bus);
        if self.state == ClockState::PllPoweringUp {
            wait.wait_until(|| is_pll_locked(bus))
                .map_err(|t| {
                    log::error!("PLL lock wait expired after {} polls", t.polls);
                    DriverError::PllLockTimeout { polls: t.polls }
                })?;
            self.advance(ClockState::PllLocked);
        }
        Ok(self.engage_pll(bus))
    }

    /// Steps up to and including PLL power-up. Runs once per controller.
    fn program_pll<R: RegisterAccess>(&mut self, bus: &mut R) {
        if self.state != ClockState::DefaultOscillator {
            return;
        }

        // RCC2 governs the divider and source from here on.
        bus.set_bits(sysctl::RCC2, Rcc2::USERCC2.bits());
        // Run from the raw oscillator while the source changes underneath the PLL.
        bus.set_bits(sysctl::RCC2, Rcc2::BYPASS2.bits());

        bus.clear_bits(sysctl::RCC, Rcc::USESYSDIV.bits());
        bus.write_field(
            sysctl::RCC,
            sysctl::RCC_XTAL_MASK,
            sysctl::RCC_XTAL_SHIFT,
            self.config.crystal.xtal_code(),
        );
        bus.clear_bits(sysctl::RCC2, sysctl::RCC2_OSCSRC2_MASK);
        self.advance(ClockState::SourceSelected);

        bus.clear_bits(sysctl::RCC2, Rcc2::PWRDN2.bits());
        bus.write_field(
            sysctl::RCC2,
            sysctl::RCC2_SYSDIV2_MASK,
            sysctl::RCC2_SYSDIV2_SHIFT,
            self.config.sysdiv2(),
        );
        bus.set_bits(sysctl::RCC, Rcc::USESYSDIV.bits());
        self.advance(ClockState::PllPoweringUp);
    }

    /// Switch the system clock onto the locked PLL.
    fn engage_pll<R: RegisterAccess>(&mut self, bus: &mut R) -> Clocks {
        if self.state == ClockState::PllLocked {
            bus.clear_bits(sysctl::RCC2, Rcc2::BYPASS2.bits());
            self.advance(ClockState::DividerActive);
        }
        Clocks {
            sysclk_hz: self.config.target_hz(),
        }
    }

    fn advance(&mut self, next: ClockState) {
        debug_assert!(next > self.state, "clock state moved backwards");
        debug!("clock: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
