//! Polled UART channels.

use log::{debug, trace};

use crate::clock::Clocks;
use crate::error::{DriverError, Result};
use crate::gpio::{self, PinGroupConfig, PinMask, Port};
use crate::map::uart::{self, Ctl, Fr, Lcrh};
use crate::map::sysctl;
use crate::poll::{self, WaitPolicy};
use crate::register::{Register, RegisterAccess};

/// One of the eight UART modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UartInstance {
    Uart0,
    Uart1,
    Uart2,
    Uart3,
    Uart4,
    Uart5,
    Uart6,
    Uart7,
}

impl UartInstance {
    pub const ALL: [UartInstance; 8] = [
        UartInstance::Uart0,
        UartInstance::Uart1,
        UartInstance::Uart2,
        UartInstance::Uart3,
        UartInstance::Uart4,
        UartInstance::Uart5,
        UartInstance::Uart6,
        UartInstance::Uart7,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn base(self) -> u32 {
        0x4000_C000 + 0x1000 * u32::from(self.index())
    }

    /// Bit in RCGCUART.
    pub fn gate_bit(self) -> u32 {
        1 << self.index()
    }

    pub fn reg(self, offset: u32) -> Register {
        Register::new(self.base(), offset)
    }
}

/// Integer and fractional parts of the baud-rate divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudDivisor {
    pub integer: u16,
    /// Sixty-fourths, 0..=63.
    pub fraction: u8,
}

impl BaudDivisor {
    /// `clock_hz / (16 * baud)`, fraction rounded to the nearest 1/64.
    pub fn compute(clock_hz: u32, baud: u32) -> Result<Self> {
        if baud == 0 {
            return Err(DriverError::InvalidBaudRate);
        }
        let clock = u64::from(clock_hz);
        let denom = 16 * u64::from(baud);

        let mut integer = clock / denom;
        let mut fraction = ((clock % denom) * 64 + denom / 2) / denom;
        if fraction == 64 {
            integer += 1;
            fraction = 0;
        }

        if integer == 0 || integer > u64::from(uart::IBRD_MASK) {
            return Err(DriverError::BaudDivisorOutOfRange { clock_hz, baud });
        }
        Ok(Self {
            integer: integer as u16,
            fraction: fraction as u8,
        })
    }

    /// The baud rate this divisor actually produces.
    pub fn effective_baud(&self, clock_hz: u32) -> u32 {
        let sixty_fourths = u64::from(self.integer) * 64 + u64::from(self.fraction);
        ((u64::from(clock_hz) * 4) / sixty_fourths) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordLength {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl WordLength {
    pub fn bits(self) -> u8 {
        match self {
            WordLength::Five => 5,
            WordLength::Six => 6,
            WordLength::Seven => 7,
            WordLength::Eight => 8,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            5 => Some(WordLength::Five),
            6 => Some(WordLength::Six),
            7 => Some(WordLength::Seven),
            8 => Some(WordLength::Eight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Frame format written to LCRH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineFormat {
    pub word_length: WordLength,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl LineFormat {
    pub const EIGHT_N_ONE: Self = Self {
        word_length: WordLength::Eight,
        stop_bits: StopBits::One,
        parity: Parity::None,
    };

    fn lcrh_bits(&self, fifo_enabled: bool) -> u32 {
        let mut flags = Lcrh::empty();
        flags.set(Lcrh::FEN, fifo_enabled);
        flags.set(Lcrh::STP2, self.stop_bits == StopBits::Two);
        match self.parity {
            Parity::None => {}
            Parity::Even => flags |= Lcrh::PEN | Lcrh::EPS,
            Parity::Odd => flags |= Lcrh::PEN,
        }
        let wlen = u32::from(self.word_length.bits() - 5) << uart::LCRH_WLEN_SHIFT;
        flags.bits() | wlen
    }
}

/// Which port pins carry a channel's RX/TX lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinBinding {
    pub port: Port,
    pub pins: PinMask,
    pub function: u8,
    /// The pins are write-protected out of reset and need a GPIOCR commit.
    pub commit_unlock: bool,
}

impl PinBinding {
    /// PA0/PA1, the USB virtual COM port on the LaunchPad.
    pub const UART0_PA0_PA1: Self = Self {
        port: Port::A,
        pins: PinMask::P0.union(PinMask::P1),
        function: 1,
        commit_unlock: false,
    };

    /// PD6/PD7; PD7 is protected out of reset.
    pub const UART2_PD6_PD7: Self = Self {
        port: Port::D,
        pins: PinMask::P6.union(PinMask::P7),
        function: 1,
        commit_unlock: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    pub instance: UartInstance,
    pub binding: PinBinding,
    pub divisor: BaudDivisor,
    pub format: LineFormat,
    pub fifo_enabled: bool,
}

impl UartConfig {
    /// 8N1 with FIFOs at `baud`, using the brought-up system clock.
    pub fn new(
        instance: UartInstance,
        binding: PinBinding,
        clocks: &Clocks,
        baud: u32,
    ) -> Result<Self> {
        Ok(Self {
            instance,
            binding,
            divisor: BaudDivisor::compute(clocks.sysclk_hz(), baud)?,
            format: LineFormat::EIGHT_N_ONE,
            fifo_enabled: true,
        })
    }
}

pub fn is_transmit_fifo_full<R: RegisterAccess>(bus: &mut R, instance: UartInstance) -> bool {
    Fr::from_bits_retain(bus.read(instance.reg(uart::FR))).contains(Fr::TXFF)
}

pub fn is_receive_fifo_empty<R: RegisterAccess>(bus: &mut R, instance: UartInstance) -> bool {
    Fr::from_bits_retain(bus.read(instance.reg(uart::FR))).contains(Fr::RXFE)
}

/// A configured UART. Only [`UartChannel::configure`] hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartChannel {
    instance: UartInstance,
}

impl UartChannel {
    pub fn configure<R: RegisterAccess>(bus: &mut R, config: &UartConfig) -> Result<Self> {
        let instance = config.instance;
        let binding = &config.binding;
        debug!(
            "uart{}: {:?} on port {:?} pins {:#04x}",
            instance.index(),
            config.divisor,
            binding.port,
            binding.pins.bits()
        );

        bus.set_bits(sysctl::RCGCUART, instance.gate_bit());

        gpio::enable_port(bus, binding.port);
        let pins = PinGroupConfig::alternate(binding.pins, binding.function)
            .with_commit_unlock(binding.commit_unlock);
        gpio::configure_pins(bus, binding.port, &pins)?;

        bus.set_bits(instance.reg(uart::CTL), Ctl::UARTEN.bits());

        // The divisor only takes effect on the LCRH write that follows.
        bus.write(instance.reg(uart::IBRD), u32::from(config.divisor.integer));
        bus.write(
            instance.reg(uart::FBRD),
            u32::from(config.divisor.fraction) & uart::FBRD_MASK,
        );

        let format_fields = Lcrh::all().bits() | uart::LCRH_WLEN_MASK;
        bus.modify(
            instance.reg(uart::LCRH),
            config.format.lcrh_bits(config.fifo_enabled),
            format_fields,
        );

        Ok(Self { instance })
    }

    pub fn instance(&self) -> UartInstance {
        self.instance
    }

    /// Spin while the transmit FIFO is full, then queue `byte`.
    pub fn transmit_byte<R: RegisterAccess>(&self, bus: &mut R, byte: u8) {
        let instance = self.instance;
        poll::spin_until(|| !is_transmit_fifo_full(bus, instance));
        self.write_data(bus, byte);
    }

    pub fn transmit_byte_with<R: RegisterAccess>(
        &self,
        bus: &mut R,
        byte: u8,
        wait: WaitPolicy,
    ) -> Result<()> {
        let instance = self.instance;
        wait.wait_until(|| !is_transmit_fifo_full(bus, instance))
            .map_err(|t| {
                log::error!("uart{}: transmit FIFO full for {} polls", instance.index(), t.polls);
                DriverError::TransmitTimeout {
                    base: instance.base(),
                    polls: t.polls,
                }
            })?;
        self.write_data(bus, byte);
        Ok(())
    }

    fn write_data<R: RegisterAccess>(&self, bus: &mut R, byte: u8) {
        trace!("uart{} tx {:#04x}", self.instance.index(), byte);
        bus.write(self.instance.reg(uart::DR), u32::from(byte));
    }

    pub fn receive_available<R: RegisterAccess>(&self, bus: &mut R) -> bool {
        !is_receive_fifo_empty(bus, self.instance)
    }

    /// Pop one byte. Only meaningful after [`Self::receive_available`] returned `true`;
    /// otherwise the value is whatever the hardware returns for an empty FIFO.
    pub fn receive_byte<R: RegisterAccess>(&self, bus: &mut R) -> u8 {
        let byte = (bus.read(self.instance.reg(uart::DR)) & uart::DR_DATA_MASK) as u8;
        trace!("uart{} rx {:#04x}", self.instance.index(), byte);
        byte
    }

    pub fn try_receive_byte<R: RegisterAccess>(&self, bus: &mut R) -> Option<u8> {
        if self.receive_available(bus) {
            Some(self.receive_byte(bus))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::gpio as gpio_map;
    use crate::testing::FakeRegisters;

    #[test]
    fn divisor_for_115200_at_50mhz() {
        let div = BaudDivisor::compute(50_000_000, 115_200).unwrap();
        assert_eq!(div, BaudDivisor { integer: 27, fraction: 8 });
    }

    #[test]
    fn divisor_matches_formula() {
        for &(clock, baud) in &[
            (16_000_000u32, 9_600u32),
            (50_000_000, 9_600),
            (80_000_000, 115_200),
            (50_000_000, 921_600),
            (16_000_000, 1_000_000),
        ] {
            let exact = f64::from(clock) / (16.0 * f64::from(baud));
            let div = BaudDivisor::compute(clock, baud).unwrap();
            let int = exact.trunc();
            let frac = ((exact - int) * 64.0).round();
            let (want_int, want_frac) = if frac == 64.0 { (int + 1.0, 0.0) } else { (int, frac) };
            assert_eq!(div.integer as f64, want_int, "{clock}/{baud}");
            assert_eq!(div.fraction as f64, want_frac, "{clock}/{baud}");
        }
    }

    #[test]
    fn divisor_rejects_out_of_range() {
        assert_eq!(BaudDivisor::compute(50_000_000, 0), Err(DriverError::InvalidBaudRate));
        assert_eq!(
            BaudDivisor::compute(1_000_000, 115_200),
            Err(DriverError::BaudDivisorOutOfRange { clock_hz: 1_000_000, baud: 115_200 })
        );
        assert!(BaudDivisor::compute(50_000_000, 40).is_err());
    }

    #[test]
    fn effective_baud_is_close() {
        let div = BaudDivisor::compute(50_000_000, 115_200).unwrap();
        let baud = div.effective_baud(50_000_000);
        assert!((115_000..=115_400).contains(&baud), "{baud}");
    }

    #[test]
    fn line_format_bits() {
        assert_eq!(LineFormat::EIGHT_N_ONE.lcrh_bits(true), 0x70);
        let seven_e_two = LineFormat {
            word_length: WordLength::Seven,
            stop_bits: StopBits::Two,
            parity: Parity::Even,
        };
        assert_eq!(seven_e_two.lcrh_bits(false), (2 << 5) | 0b1110);
    }

    fn uart0_config() -> UartConfig {
        UartConfig {
            instance: UartInstance::Uart0,
            binding: PinBinding::UART0_PA0_PA1,
            divisor: BaudDivisor { integer: 27, fraction: 8 },
            format: LineFormat::EIGHT_N_ONE,
            fifo_enabled: true,
        }
    }

    #[test]
    fn configure_writes_divisor_before_line_control() {
        let mut regs = FakeRegisters::default();
        UartChannel::configure(&mut regs, &uart0_config()).unwrap();

        let uart = UartInstance::Uart0;
        let pos = |reg| regs.writes().iter().position(|(r, _)| *r == reg).unwrap();
        let ibrd = pos(uart.reg(uart::IBRD));
        let fbrd = pos(uart.reg(uart::FBRD));
        let lcrh = pos(uart.reg(uart::LCRH));
        let gate = pos(sysctl::RCGCUART);
        assert!(gate < ibrd && ibrd < lcrh && fbrd < lcrh);

        assert_eq!(regs.peek(uart.reg(uart::IBRD)), 27);
        assert_eq!(regs.peek(uart.reg(uart::FBRD)), 8);
        assert_eq!(regs.peek(uart.reg(uart::LCRH)), 0x70);
        assert_eq!(regs.peek(uart.reg(uart::CTL)) & 1, 1);
        assert_eq!(regs.peek(Port::A.reg(gpio_map::PCTL)), 0x11);
        assert_eq!(regs.peek(sysctl::RCGCGPIO), Port::A.gate_bit());
    }

    #[test]
    fn uart2_uses_commit_unlock() {
        let mut regs = FakeRegisters::default();
        let config = UartConfig {
            instance: UartInstance::Uart2,
            binding: PinBinding::UART2_PD6_PD7,
            ..uart0_config()
        };
        UartChannel::configure(&mut regs, &config).unwrap();

        assert_eq!(regs.peek(Port::D.reg(gpio_map::LOCK)), gpio_map::LOCK_KEY);
        assert_eq!(regs.peek(Port::D.reg(gpio_map::PCTL)), 0x1100_0000);
        assert_eq!(regs.peek(sysctl::RCGCUART), 1 << 2);
        assert_eq!(UartInstance::Uart2.base(), 0x4000_E000);
    }

    #[test]
    fn transmit_waits_for_space() {
        let mut regs = FakeRegisters::default();
        let channel = UartChannel::configure(&mut regs, &uart0_config()).unwrap();
        let fr = UartInstance::Uart0.reg(uart::FR);
        regs.preset(fr, Fr::TXFF.bits());

        let err = channel
            .transmit_byte_with(&mut regs, b'x', WaitPolicy::Bounded { max_polls: 4 })
            .unwrap_err();
        assert_eq!(err, DriverError::TransmitTimeout { base: 0x4000_C000, polls: 4 });
        assert!(regs.writes().iter().all(|(r, _)| *r != UartInstance::Uart0.reg(uart::DR)));

        regs.preset(fr, Fr::TXFE.bits());
        channel.transmit_byte(&mut regs, b'x');
        assert_eq!(regs.peek(UartInstance::Uart0.reg(uart::DR)), u32::from(b'x'));
    }

    #[test]
    fn receive_checks_empty_flag() {
        let mut regs = FakeRegisters::default();
        let channel = UartChannel::configure(&mut regs, &uart0_config()).unwrap();
        regs.preset(UartInstance::Uart0.reg(uart::FR), Fr::RXFE.bits());
        assert!(!channel.receive_available(&mut regs));
        assert_eq!(channel.try_receive_byte(&mut regs), None);

        regs.preset(UartInstance::Uart0.reg(uart::FR), 0);
        regs.preset(UartInstance::Uart0.reg(uart::DR), 0x0F41);
        assert_eq!(channel.try_receive_byte(&mut regs), Some(0x41));
    }
}
