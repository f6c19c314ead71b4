//! GPIO port clock gating, pin routing and output.

use bitflags::bitflags;
use log::debug;

use crate::error::{DriverError, Result};
use crate::map::{gpio, sysctl};
use crate::register::{Register, RegisterAccess};

/// GPIO port on the APB aperture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Port {
    pub const ALL: [Port; 6] = [Port::A, Port::B, Port::C, Port::D, Port::E, Port::F];

    pub fn base(self) -> u32 {
        match self {
            Port::A => 0x4000_4000,
            Port::B => 0x4000_5000,
            Port::C => 0x4000_6000,
            Port::D => 0x4000_7000,
            Port::E => 0x4002_4000,
            Port::F => 0x4002_5000,
        }
    }

    /// Bit in RCGCGPIO.
    pub fn gate_bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Pins whose configuration is write-protected out of reset.
    pub fn locked_pins(self) -> PinMask {
        match self {
            Port::C => PinMask::from_bits_retain(0x0F),
            Port::D => PinMask::P7,
            Port::F => PinMask::P0,
            _ => PinMask::empty(),
        }
    }

    pub fn reg(self, offset: u32) -> Register {
        Register::new(self.base(), offset)
    }

    /// The data register window that only touches `pins`.
    pub fn data(self, pins: PinMask) -> Register {
        Register::new(self.base(), gpio::DATA + (u32::from(pins.bits()) << 2))
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Port::A),
            'B' => Some(Port::B),
            'C' => Some(Port::C),
            'D' => Some(Port::D),
            'E' => Some(Port::E),
            'F' => Some(Port::F),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }
}

bitflags! {
    /// Set of pins within one port.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PinMask: u8 {
        const P0 = 1 << 0;
        const P1 = 1 << 1;
        const P2 = 1 << 2;
        const P3 = 1 << 3;
        const P4 = 1 << 4;
        const P5 = 1 << 5;
        const P6 = 1 << 6;
        const P7 = 1 << 7;
    }
}

impl PinMask {
    pub fn pin(n: u8) -> Self {
        Self::from_bits_retain(1u8.checked_shl(u32::from(n)).unwrap_or(0))
    }

    fn word(self) -> u32 {
        u32::from(self.bits())
    }

    /// GPIOPCTL bits covering the pins in this mask.
    fn pctl_mask(self) -> u32 {
        (0..8u32)
            .filter(|n| self.bits() & (1 << n) != 0)
            .fold(0, |acc, n| acc | (0xF << (n * gpio::PCTL_FIELD_BITS)))
    }

    fn pctl_value(self, code: u8) -> u32 {
        (0..8u32)
            .filter(|n| self.bits() & (1 << n) != 0)
            .fold(0, |acc, n| acc | (u32::from(code) << (n * gpio::PCTL_FIELD_BITS)))
    }
}

/// How a group of pins on one port should be set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinGroupConfig {
    pub pins: PinMask,
    /// Peripheral function code routed to every pin in `pins`; `None` keeps them as GPIO.
    pub function: Option<u8>,
    /// Pins of `pins` driven as outputs. Ignored for alternate-function pins.
    pub outputs: PinMask,
    pub digital: bool,
    /// Unlock GPIOCR and commit `pins` before touching protected registers.
    pub commit_unlock: bool,
}

impl PinGroupConfig {
    pub fn alternate(pins: PinMask, function: u8) -> Self {
        Self {
            pins,
            function: Some(function),
            outputs: PinMask::empty(),
            digital: true,
            commit_unlock: false,
        }
    }

    pub fn outputs(pins: PinMask) -> Self {
        Self {
            pins,
            function: None,
            outputs: pins,
            digital: true,
            commit_unlock: false,
        }
    }

    pub fn with_commit_unlock(mut self, unlock: bool) -> Self {
        self.commit_unlock = unlock;
        self
    }
}

/// Assert the port's clock gate. Must precede every other access to the port.
pub fn enable_port<R: RegisterAccess>(bus: &mut R, port: Port) {
    bus.set_bits(sysctl::RCGCGPIO, port.gate_bit());
}

pub fn configure_pins<R: RegisterAccess>(
    bus: &mut R,
    port: Port,
    config: &PinGroupConfig,
) -> Result<()> {
    if let Some(code) = config.function {
        if code > 0xF {
            return Err(DriverError::InvalidFunctionCode(code));
        }
    }

    apply_pins(bus, port, config);
    Ok(())
}

/// Make `pins` plain digital outputs. Cannot fail: no function code is involved.
pub fn configure_outputs<R: RegisterAccess>(bus: &mut R, port: Port, pins: PinMask) {
    apply_pins(bus, port, &PinGroupConfig::outputs(pins));
}

fn apply_pins<R: RegisterAccess>(bus: &mut R, port: Port, config: &PinGroupConfig) {
    let pins = config.pins;
    debug!("gpio {:?}: configuring pins {:#04x}", port, pins.bits());

    if config.commit_unlock {
        bus.write(port.reg(gpio::LOCK), gpio::LOCK_KEY);
        bus.set_bits(port.reg(gpio::CR), pins.word());
    }

    match config.function {
        Some(code) => {
            bus.set_bits(port.reg(gpio::AFSEL), pins.word());
            bus.modify(port.reg(gpio::PCTL), pins.pctl_value(code), pins.pctl_mask());
        }
        None => {
            bus.clear_bits(port.reg(gpio::AFSEL), pins.word());
            let outputs = config.outputs & pins;
            bus.modify(port.reg(gpio::DIR), outputs.word(), (pins - outputs).word());
        }
    }

    if config.digital {
        bus.set_bits(port.reg(gpio::DEN), pins.word());
    } else {
        bus.clear_bits(port.reg(gpio::DEN), pins.word());
    }
}

/// Write `value` to the pins in `pins`, leaving every other pin untouched.
pub fn drive_pins<R: RegisterAccess>(bus: &mut R, port: Port, pins: PinMask, value: u8) {
    bus.write(port.data(pins), u32::from(value & pins.bits()));
}

pub fn read_pins<R: RegisterAccess>(bus: &mut R, port: Port, pins: PinMask) -> u8 {
    (bus.read(port.data(pins)) & pins.word()) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRegisters;

    #[test]
    fn pctl_nibbles() {
        let pins = PinMask::P6 | PinMask::P7;
        assert_eq!(pins.pctl_mask(), 0xFF00_0000);
        assert_eq!(pins.pctl_value(1), 0x1100_0000);
        assert_eq!((PinMask::P0 | PinMask::P1).pctl_value(1), 0x11);
    }

    #[test]
    fn data_window_address() {
        assert_eq!(Port::F.data(PinMask::from_bits_retain(0x0E)).addr(), 0x4002_5038);
        assert_eq!(Port::A.data(PinMask::all()).addr(), 0x4000_43FC);
    }

    #[test]
    fn configure_preserves_other_pins() {
        let mut regs = FakeRegisters::default();
        let port = Port::A;
        regs.preset(port.reg(gpio::AFSEL), 0b0100_0000);
        regs.preset(port.reg(gpio::PCTL), 0x0700_0000);
        regs.preset(port.reg(gpio::DEN), 0b1000_0000);

        configure_pins(&mut regs, port, &PinGroupConfig::alternate(PinMask::P0 | PinMask::P1, 1))
            .unwrap();

        assert_eq!(regs.peek(port.reg(gpio::AFSEL)), 0b0100_0011);
        assert_eq!(regs.peek(port.reg(gpio::PCTL)), 0x0700_0011);
        assert_eq!(regs.peek(port.reg(gpio::DEN)), 0b1000_0011);
    }

    #[test]
    fn unlock_happens_before_protected_writes() {
        let mut regs = FakeRegisters::default();
        let config = PinGroupConfig::alternate(PinMask::P6 | PinMask::P7, 1).with_commit_unlock(true);

        configure_pins(&mut regs, Port::D, &config).unwrap();

        let writes = regs.writes();
        assert_eq!(writes[0], (Port::D.reg(gpio::LOCK), gpio::LOCK_KEY));
        assert_eq!(writes[1], (Port::D.reg(gpio::CR), 0xC0));
        assert!(writes[2..]
            .iter()
            .all(|(reg, _)| *reg != Port::D.reg(gpio::LOCK)));
    }

    #[test]
    fn gpio_outputs_set_direction() {
        let mut regs = FakeRegisters::default();
        regs.preset(Port::F.reg(gpio::DIR), 0x01);
        let leds = PinMask::P1 | PinMask::P2 | PinMask::P3;

        configure_outputs(&mut regs, Port::F, leds);

        assert_eq!(regs.peek(Port::F.reg(gpio::DIR)), 0x0F);
        assert_eq!(regs.peek(Port::F.reg(gpio::AFSEL)), 0);
        assert_eq!(regs.peek(Port::F.reg(gpio::DEN)), 0x0E);
    }

    #[test]
    fn rejects_wide_function_code() {
        let mut regs = FakeRegisters::default();
        let err = configure_pins(&mut regs, Port::B, &PinGroupConfig::alternate(PinMask::P0, 0x10))
            .unwrap_err();
        assert_eq!(err, DriverError::InvalidFunctionCode(0x10));
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn drive_masks_value() {
        let mut regs = FakeRegisters::default();
        drive_pins(&mut regs, Port::F, PinMask::P1 | PinMask::P2, 0xFF);
        assert_eq!(regs.writes()[0], (Port::F.data(PinMask::P1 | PinMask::P2), 0x06));
    }
}
