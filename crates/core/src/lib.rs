pub mod bus;
pub mod metrics;
pub mod peripherals;
pub mod snapshot;

use std::any::Any;


pub use bus::{ClockGate, PeripheralEntry, SimSettings, SystemBus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Access to unmapped address {0:#010x}")]
    Unmapped(u32),
    #[error("Misaligned word access at {0:#010x}")]
    Misaligned(u32),
    #[error("Access to {peripheral} at {addr:#010x} while its clock gate is off")]
    Unclocked { peripheral: String, addr: u32 },
    #[error("Write to read-only register at offset {0:#x}")]
    ReadOnly(u32),
    #[error("Byte {byte:#04x} written while the transmit FIFO was full")]
    TxOverflow { byte: u8 },
    #[error("Data register read while the receive FIFO was empty")]
    RxUnderflow,
    #[error("Write to pins {pins:#04x} at offset {offset:#x} ignored: not committed")]
    CommitProtected { offset: u32, pins: u8 },
    #[error("Write to GPIOCR while the port is locked")]
    CommitLocked,
    #[error("Sequencing violation: {0}")]
    Sequencing(&'static str),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// A memory-mapped peripheral on the simulated bus. Offsets are byte offsets from
/// the peripheral base and are always word aligned.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&mut self, offset: u32) -> SimResult<u32>;
    fn write(&mut self, offset: u32, value: u32) -> SimResult<()>;
    /// Advance by one bus cycle.
    fn tick(&mut self) {}
    /// Storage registers as `(offset, value)`, read without side effects.
    fn registers(&self) -> Vec<(u32, u32)>;
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Trait for observing bus traffic in a modular way.
pub trait AccessObserver: std::fmt::Debug + Send + Sync {
    fn on_read(&self, _addr: u32, _value: u32) {}
    fn on_write(&self, _addr: u32, _value: u32) {}
    fn on_fault(&self, _fault: &SimulationError) {}
}
