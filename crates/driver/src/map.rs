//! TM4C123 register map.
//!
//! Offsets and bit positions follow the TM4C123GH6PM datasheet. Multi-bit fields
//! are given as a `*_MASK` / `*_SHIFT` pair; single-bit flags are `bitflags`.

use bitflags::bitflags;

use crate::register::Register;

/// System control block (clocking and peripheral clock gates).
pub mod sysctl {
    use super::*;

    pub const BASE: u32 = 0x400F_E000;

    /// Raw interrupt status.
    pub const RIS: Register = Register::new(BASE, 0x050);
    /// Run-mode clock configuration.
    pub const RCC: Register = Register::new(BASE, 0x060);
    /// Run-mode clock configuration 2; overrides RCC when USERCC2 is set.
    pub const RCC2: Register = Register::new(BASE, 0x070);
    /// GPIO run-mode clock gating, one bit per port.
    pub const RCGCGPIO: Register = Register::new(BASE, 0x608);
    /// UART run-mode clock gating, one bit per instance.
    pub const RCGCUART: Register = Register::new(BASE, 0x618);

    /// Reset value of RCC.
    pub const RCC_RESET: u32 = 0x078E_3AD1;
    /// Reset value of RCC2.
    pub const RCC2_RESET: u32 = 0x0780_6810;

    /// RCC.XTAL: crystal frequency attached to the main oscillator.
    pub const RCC_XTAL_MASK: u32 = 0x1F << RCC_XTAL_SHIFT;
    pub const RCC_XTAL_SHIFT: u32 = 6;
    /// RCC.OSCSRC: legacy oscillator source.
    pub const RCC_OSCSRC_MASK: u32 = 0x3 << 4;
    /// RCC.SYSDIV: legacy system clock divisor.
    pub const RCC_SYSDIV_MASK: u32 = 0xF << 23;

    /// RCC2.OSCSRC2: oscillator source. Zero selects the main oscillator.
    pub const RCC2_OSCSRC2_MASK: u32 = 0x7 << RCC2_OSCSRC2_SHIFT;
    pub const RCC2_OSCSRC2_SHIFT: u32 = 4;
    /// RCC2.SYSDIV2: system clock divisor minus one, applied to the 200 MHz PLL output.
    pub const RCC2_SYSDIV2_MASK: u32 = 0x3F << RCC2_SYSDIV2_SHIFT;
    pub const RCC2_SYSDIV2_SHIFT: u32 = 23;

    /// PLL output frequency seen by SYSDIV2 when DIV400 is clear.
    pub const PLL_OUTPUT_HZ: u32 = 200_000_000;

    bitflags! {
        /// Single-bit fields of RCC.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Rcc: u32 {
            /// Main oscillator disable.
            const MOSCDIS = 1 << 0;
            /// PLL bypass.
            const BYPASS = 1 << 11;
            /// PLL power down.
            const PWRDN = 1 << 13;
            /// Route the system clock through the SYSDIV divider.
            const USESYSDIV = 1 << 22;
        }
    }

    bitflags! {
        /// Single-bit fields of RCC2.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Rcc2: u32 {
            /// PLL bypass while RCC2 is in use.
            const BYPASS2 = 1 << 11;
            /// PLL power down while RCC2 is in use.
            const PWRDN2 = 1 << 13;
            /// USB PLL power down.
            const USBPWRDN = 1 << 14;
            /// Least significant bit of the 400 MHz divisor.
            const SYSDIV2LSB = 1 << 22;
            /// Divide the 400 MHz PLL output instead of the 200 MHz one.
            const DIV400 = 1 << 30;
            /// RCC2 fields take precedence over RCC.
            const USERCC2 = 1 << 31;
        }
    }

    bitflags! {
        /// Raw interrupt status bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ris: u32 {
            /// Brown-out reset.
            const BORRIS = 1 << 1;
            /// Main oscillator failure.
            const MOFRIS = 1 << 3;
            /// PLL lock.
            const PLLLRIS = 1 << 6;
            /// USB PLL lock.
            const USBPLLLRIS = 1 << 7;
            /// Main oscillator power up.
            const MOSCPUPRIS = 1 << 8;
        }
    }
}

/// GPIO port register offsets (APB aperture).
pub mod gpio {
    /// Address-masked data window. Bits 9:2 of the address select the affected pins.
    pub const DATA: u32 = 0x000;
    /// Direction: 1 = output.
    pub const DIR: u32 = 0x400;
    /// Alternate function select.
    pub const AFSEL: u32 = 0x420;
    /// Digital enable.
    pub const DEN: u32 = 0x51C;
    /// Lock; writing [`LOCK_KEY`] unlocks GPIOCR.
    pub const LOCK: u32 = 0x520;
    /// Commit; pins with a clear bit ignore AFSEL/PUR/PDR/DEN writes.
    pub const CR: u32 = 0x524;
    /// Port control, one 4-bit function code (PMCn) per pin.
    pub const PCTL: u32 = 0x52C;

    /// Value that unlocks GPIOCR ("LOCK" in ASCII).
    pub const LOCK_KEY: u32 = 0x4C4F_434B;
    /// Width of one PMCn field in GPIOPCTL.
    pub const PCTL_FIELD_BITS: u32 = 4;
}

/// UART register offsets and fields.
pub mod uart {
    use super::*;

    /// Data register; low byte is the character.
    pub const DR: u32 = 0x000;
    /// Flag register.
    pub const FR: u32 = 0x018;
    /// Integer baud-rate divisor.
    pub const IBRD: u32 = 0x024;
    /// Fractional baud-rate divisor.
    pub const FBRD: u32 = 0x028;
    /// Line control. A write here latches IBRD/FBRD.
    pub const LCRH: u32 = 0x02C;
    /// Control.
    pub const CTL: u32 = 0x030;

    /// Reset value of CTL (TXE and RXE set, UART disabled).
    pub const CTL_RESET: u32 = 0x0000_0300;

    pub const DR_DATA_MASK: u32 = 0xFF;
    pub const IBRD_MASK: u32 = 0xFFFF;
    pub const FBRD_MASK: u32 = 0x3F;

    /// LCRH.WLEN: word length minus five.
    pub const LCRH_WLEN_MASK: u32 = 0x3 << LCRH_WLEN_SHIFT;
    pub const LCRH_WLEN_SHIFT: u32 = 5;

    /// Depth of each hardware FIFO.
    pub const FIFO_DEPTH: usize = 16;

    bitflags! {
        /// Flag register bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Fr: u32 {
            const CTS = 1 << 0;
            const BUSY = 1 << 3;
            /// Receive FIFO empty.
            const RXFE = 1 << 4;
            /// Transmit FIFO full.
            const TXFF = 1 << 5;
            /// Receive FIFO full.
            const RXFF = 1 << 6;
            /// Transmit FIFO empty.
            const TXFE = 1 << 7;
        }
    }

    bitflags! {
        /// Single-bit fields of the line control register.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Lcrh: u32 {
            /// Send break.
            const BRK = 1 << 0;
            /// Parity enable.
            const PEN = 1 << 1;
            /// Even parity select.
            const EPS = 1 << 2;
            /// Two stop bits.
            const STP2 = 1 << 3;
            /// FIFO enable.
            const FEN = 1 << 4;
            /// Stick parity.
            const SPS = 1 << 7;
        }
    }

    bitflags! {
        /// Control register bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ctl: u32 {
            const UARTEN = 1 << 0;
            /// Divide the UART clock by 8 instead of 16.
            const HSE = 1 << 5;
            const LBE = 1 << 7;
            const TXE = 1 << 8;
            const RXE = 1 << 9;
        }
    }
}
