use std::any::Any;

use tivalink_driver::map::gpio::{self, LOCK_KEY};

use crate::{Peripheral, SimResult, SimulationError};

/// TM4C123 GPIO port.
///
/// Models the address-masked data window, the LOCK/CR commit scheme that guards
/// AFSEL and DEN, and the per-pin function codes in PCTL.
#[derive(Debug)]
pub struct GpioPort {
    data: u32,
    dir: u32,
    afsel: u32,
    den: u32,
    cr: u32,
    pctl: u32,
    unlocked: bool,
}

impl GpioPort {
    /// `locked_pins` come out of reset uncommitted.
    pub fn new(locked_pins: u8) -> Self {
        Self {
            data: 0,
            dir: 0,
            afsel: 0,
            den: 0,
            cr: u32::from(!locked_pins),
            pctl: 0,
            unlocked: false,
        }
    }

    pub fn data(&self) -> u8 {
        self.data as u8
    }

    pub fn dir(&self) -> u8 {
        self.dir as u8
    }

    pub fn afsel(&self) -> u8 {
        self.afsel as u8
    }

    pub fn den(&self) -> u8 {
        self.den as u8
    }

    pub fn committed(&self) -> u8 {
        self.cr as u8
    }

    pub fn pctl(&self) -> u32 {
        self.pctl
    }

    /// Function code routed to `pin`.
    pub fn function(&self, pin: u8) -> u8 {
        ((self.pctl >> (u32::from(pin) * gpio::PCTL_FIELD_BITS)) & 0xF) as u8
    }

    /// Apply a write to a commit-protected register; uncommitted bits keep their value.
    fn protected_write(reg: &mut u32, cr: u32, offset: u32, value: u32) -> SimResult<()> {
        let value = value & 0xFF;
        let rejected = (value ^ *reg) & !cr & 0xFF;
        *reg = (*reg & !cr) | (value & cr);
        if rejected != 0 {
            return Err(SimulationError::CommitProtected {
                offset,
                pins: rejected as u8,
            });
        }
        Ok(())
    }
}

impl Peripheral for GpioPort {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            0x000..=0x3FC => self.data & (offset >> 2),
            gpio::DIR => self.dir,
            gpio::AFSEL => self.afsel,
            gpio::DEN => self.den,
            gpio::LOCK => u32::from(!self.unlocked),
            gpio::CR => self.cr,
            gpio::PCTL => self.pctl,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            0x000..=0x3FC => {
                let mask = offset >> 2;
                self.data = (self.data & !mask) | (value & mask);
            }
            gpio::DIR => self.dir = value & 0xFF,
            gpio::AFSEL => return Self::protected_write(&mut self.afsel, self.cr, offset, value),
            gpio::DEN => return Self::protected_write(&mut self.den, self.cr, offset, value),
            gpio::LOCK => self.unlocked = value == LOCK_KEY,
            gpio::CR => {
                if !self.unlocked {
                    return Err(SimulationError::CommitLocked);
                }
                self.cr = value & 0xFF;
            }
            gpio::PCTL => self.pctl = value,
            _ => {}
        }
        Ok(())
    }

    fn registers(&self) -> Vec<(u32, u32)> {
        vec![
            (gpio::DATA + 0x3FC, self.data),
            (gpio::DIR, self.dir),
            (gpio::AFSEL, self.afsel),
            (gpio::DEN, self.den),
            (gpio::LOCK, u32::from(!self.unlocked)),
            (gpio::CR, self.cr),
            (gpio::PCTL, self.pctl),
        ]
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}
