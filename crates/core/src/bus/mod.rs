use std::sync::Arc;

use tivalink_driver::{Port, Register, RegisterAccess, UartInstance};

use crate::peripherals::{gpio::GpioPort, sysctl::SysCtl, uart::Uart};
use crate::snapshot::BusSnapshot;
use crate::{AccessObserver, Peripheral, SimResult, SimulationError};

/// Timing knobs of the simulated chip, in bus cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSettings {
    /// Frequency of the crystal on the main oscillator.
    pub crystal_hz: u32,
    /// Cycles from PLL power-up to lock; `None` means the PLL never locks.
    pub pll_lock_ticks: Option<u32>,
    /// Cycles per byte leaving a transmit FIFO.
    pub tx_drain_ticks: u32,
    /// Cycles per byte arriving from the wire into a receive FIFO.
    pub rx_arrival_ticks: u32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            crystal_hz: 16_000_000,
            pll_lock_ticks: Some(64),
            tx_drain_ticks: 4,
            rx_arrival_ticks: 8,
        }
    }
}

impl From<&tivalink_config::SimulationManifest> for SimSettings {
    fn from(m: &tivalink_config::SimulationManifest) -> Self {
        Self {
            crystal_hz: m.crystal_hz,
            pll_lock_ticks: m.pll_lock_ticks,
            tx_drain_ticks: m.tx_drain_ticks,
            rx_arrival_ticks: m.rx_arrival_ticks,
        }
    }
}

/// Which RCGC register bit has to be set before a peripheral answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockGate {
    Gpio(u32),
    Uart(u32),
}

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: u32,
    pub size: u32,
    pub gate: Option<ClockGate>,
    pub dev: Box<dyn Peripheral>,
}

/// Word-addressed bus connecting the simulated peripherals.
///
/// Every access costs one cycle and ticks all peripherals. Faulting accesses are
/// recorded rather than aborting: reads return zero and writes are dropped.
#[derive(Debug, Default)]
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
    pub observers: Vec<Arc<dyn AccessObserver>>,
    faults: Vec<SimulationError>,
    cycles: u64,
}

const SYSCTL: &str = "sysctl";

impl SystemBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// System control, GPIO ports A-F and UART0-7 at their datasheet addresses.
    pub fn tm4c123(settings: &SimSettings) -> Self {
        let mut bus = Self::new();
        bus.peripherals.push(PeripheralEntry {
            name: SYSCTL.to_string(),
            base: 0x400F_E000,
            size: 0x1000,
            gate: None,
            dev: Box::new(SysCtl::new(settings.crystal_hz, settings.pll_lock_ticks)),
        });
        for port in Port::ALL {
            bus.peripherals.push(PeripheralEntry {
                name: format!("gpio{:?}", port).to_lowercase(),
                base: port.base(),
                size: 0x1000,
                gate: Some(ClockGate::Gpio(port.gate_bit())),
                dev: Box::new(GpioPort::new(port.locked_pins().bits())),
            });
        }
        for uart in UartInstance::ALL {
            bus.peripherals.push(PeripheralEntry {
                name: format!("uart{}", uart.index()),
                base: uart.base(),
                size: 0x1000,
                gate: Some(ClockGate::Uart(uart.gate_bit())),
                dev: Box::new(Uart::new(settings.tx_drain_ticks, settings.rx_arrival_ticks)),
            });
        }
        bus
    }

    pub fn from_manifest(manifest: &tivalink_config::BoardManifest) -> Self {
        Self::tm4c123(&SimSettings::from(&manifest.simulation))
    }

    pub fn add_observer(&mut self, observer: Arc<dyn AccessObserver>) {
        self.observers.push(observer);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn faults(&self) -> &[SimulationError] {
        &self.faults
    }

    pub fn take_faults(&mut self) -> Vec<SimulationError> {
        std::mem::take(&mut self.faults)
    }

    /// Let `cycles` bus cycles pass without an access.
    pub fn idle(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.tick_peripherals();
        }
    }

    /// Idle until every transmit FIFO has drained onto the wire, for at most
    /// `max_cycles`. Returns whether the FIFOs emptied.
    pub fn settle(&mut self, max_cycles: u64) -> bool {
        for _ in 0..max_cycles {
            if self.transmit_idle() {
                return true;
            }
            self.tick_peripherals();
        }
        self.transmit_idle()
    }

    fn transmit_idle(&self) -> bool {
        self.peripherals
            .iter()
            .filter_map(|p| p.dev.as_any())
            .filter_map(|a| a.downcast_ref::<Uart>())
            .all(|u| u.tx_pending() == 0)
    }

    pub fn tick_peripherals(&mut self) {
        self.cycles += 1;
        for p in &mut self.peripherals {
            p.dev.tick();
        }
    }

    pub fn sysctl(&self) -> Option<&SysCtl> {
        self.device::<SysCtl>(SYSCTL)
    }

    pub fn gpio(&self, port: Port) -> Option<&GpioPort> {
        self.device::<GpioPort>(&format!("gpio{:?}", port).to_lowercase())
    }

    pub fn uart(&self, instance: UartInstance) -> Option<&Uart> {
        self.device::<Uart>(&format!("uart{}", instance.index()))
    }

    pub fn uart_mut(&mut self, instance: UartInstance) -> Option<&mut Uart> {
        let name = format!("uart{}", instance.index());
        self.peripherals
            .iter_mut()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any_mut())
            .and_then(|a| a.downcast_mut::<Uart>())
    }

    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot::capture(self)
    }

    fn device<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|a| a.downcast_ref::<T>())
    }

    fn gate_open(&self, gate: ClockGate) -> bool {
        let Some(sysctl) = self.sysctl() else {
            return true;
        };
        match gate {
            ClockGate::Gpio(bit) => sysctl.gpio_gates() & bit != 0,
            ClockGate::Uart(bit) => sysctl.uart_gates() & bit != 0,
        }
    }

    fn route(&self, addr: u32) -> SimResult<usize> {
        if addr % 4 != 0 {
            return Err(SimulationError::Misaligned(addr));
        }
        let idx = self
            .peripherals
            .iter()
            .position(|p| addr >= p.base && addr - p.base < p.size)
            .ok_or(SimulationError::Unmapped(addr))?;
        let entry = &self.peripherals[idx];
        if let Some(gate) = entry.gate {
            if !self.gate_open(gate) {
                return Err(SimulationError::Unclocked {
                    peripheral: entry.name.clone(),
                    addr,
                });
            }
        }
        Ok(idx)
    }

    pub fn read_word(&mut self, addr: u32) -> SimResult<u32> {
        let idx = self.route(addr)?;
        let entry = &mut self.peripherals[idx];
        entry.dev.read(addr - entry.base)
    }

    pub fn write_word(&mut self, addr: u32, value: u32) -> SimResult<()> {
        let idx = self.route(addr)?;
        let entry = &mut self.peripherals[idx];
        entry.dev.write(addr - entry.base, value)
    }

    fn record(&mut self, fault: SimulationError) {
        tracing::warn!("bus fault: {}", fault);
        for observer in &self.observers {
            observer.on_fault(&fault);
        }
        self.faults.push(fault);
    }
}

impl RegisterAccess for SystemBus {
    fn read(&mut self, reg: Register) -> u32 {
        let addr = reg.addr();
        let value = match self.read_word(addr) {
            Ok(v) => v,
            Err(fault) => {
                self.record(fault);
                0
            }
        };
        for observer in &self.observers {
            observer.on_read(addr, value);
        }
        self.tick_peripherals();
        value
    }

    fn write(&mut self, reg: Register, value: u32) {
        let addr = reg.addr();
        if let Err(fault) = self.write_word(addr, value) {
            self.record(fault);
        }
        for observer in &self.observers {
            observer.on_write(addr, value);
        }
        self.tick_peripherals();
    }
}
