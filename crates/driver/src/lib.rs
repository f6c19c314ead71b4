//! Register-level bring-up of a TM4C123: PLL clock, GPIO routing and polled UARTs,
//! plus the greeting/echo service built on top of them.
//!
//! Everything talks to hardware through [`RegisterAccess`], so the same code runs on
//! silicon via [`Mmio`] and on the host against a simulated register bus.

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod echo;
pub mod error;
pub mod gpio;
pub mod led;
pub mod map;
pub mod poll;
pub mod register;
pub mod uart;

#[cfg(test)]
mod testing;

pub use clock::{ClockConfig, ClockController, ClockState, Clocks, Crystal};
pub use echo::{ChannelBinding, EchoConfig, EchoRoute, SerialEchoService, ServiceState, GREETING};
pub use error::{DriverError, Result};
pub use gpio::{PinGroupConfig, PinMask, Port};
pub use led::{Color, LedIndicator, NoIndicator, StatusEvent, StatusIndicator};
pub use poll::{spin_until, DelayCycles, SpinDelay, WaitPolicy};
pub use register::{Mmio, Register, RegisterAccess};
pub use uart::{
    BaudDivisor, LineFormat, Parity, PinBinding, StopBits, UartChannel, UartConfig, UartInstance,
    WordLength,
};
