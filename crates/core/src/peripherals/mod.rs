pub mod gpio;
pub mod sysctl;
pub mod uart;
