#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("PLL did not report lock after {polls} polls")]
    PllLockTimeout { polls: u32 },
    #[error("transmit FIFO of UART at {base:#x} stayed full for {polls} polls")]
    TransmitTimeout { base: u32, polls: u32 },
    #[error("baud rate must be non-zero")]
    InvalidBaudRate,
    #[error("baud divisor for {baud} baud at {clock_hz} Hz is outside 1..=65535")]
    BaudDivisorOutOfRange { clock_hz: u32, baud: u32 },
    #[error("pin function code {0:#x} does not fit in four bits")]
    InvalidFunctionCode(u8),
}

pub type Result<T> = core::result::Result<T, DriverError>;
