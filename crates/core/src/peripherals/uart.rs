use std::any::Any;
use std::collections::VecDeque;

use tivalink_driver::map::uart::{self, Ctl, Fr, Lcrh};
use tivalink_driver::BaudDivisor;

use crate::{Peripheral, SimResult, SimulationError};

/// TM4C123 UART with the transmit and receive FIFOs modelled byte by byte.
///
/// The wire side is driven by the host: bytes leaving the transmit FIFO are
/// collected in [`Uart::transmitted`], and bytes queued with [`Uart::inject`] arrive
/// in the receive FIFO one at a time. Neither direction moves until the UART is
/// enabled and a baud rate has been latched by an LCRH write.
#[derive(Debug)]
pub struct Uart {
    ibrd: u32,
    fbrd: u32,
    lcrh: u32,
    ctl: u32,
    latched: Option<BaudDivisor>,
    tx_fifo: VecDeque<u8>,
    rx_fifo: VecDeque<u8>,
    wire_rx: VecDeque<u8>,
    transmitted: Vec<u8>,
    tx_drain_ticks: u32,
    rx_arrival_ticks: u32,
    tx_timer: u32,
    rx_timer: u32,
    overruns: u32,
}

impl Uart {
    pub fn new(tx_drain_ticks: u32, rx_arrival_ticks: u32) -> Self {
        Self {
            ibrd: 0,
            fbrd: 0,
            lcrh: 0,
            ctl: uart::CTL_RESET,
            latched: None,
            tx_fifo: VecDeque::new(),
            rx_fifo: VecDeque::new(),
            wire_rx: VecDeque::new(),
            transmitted: Vec::new(),
            tx_drain_ticks: tx_drain_ticks.max(1),
            rx_arrival_ticks: rx_arrival_ticks.max(1),
            tx_timer: 0,
            rx_timer: 0,
            overruns: 0,
        }
    }

    fn depth(&self) -> usize {
        if self.lcrh & Lcrh::FEN.bits() != 0 {
            uart::FIFO_DEPTH
        } else {
            1
        }
    }

    fn ctl_has(&self, flag: Ctl) -> bool {
        Ctl::from_bits_retain(self.ctl).contains(flag)
    }

    fn running(&self) -> bool {
        self.ctl_has(Ctl::UARTEN) && self.latched.is_some()
    }

    pub fn flags(&self) -> Fr {
        let mut fr = Fr::empty();
        fr.set(Fr::RXFE, self.rx_fifo.is_empty());
        fr.set(Fr::RXFF, self.rx_fifo.len() >= self.depth());
        fr.set(Fr::TXFF, self.tx_fifo.len() >= self.depth());
        fr.set(Fr::TXFE, self.tx_fifo.is_empty());
        fr.set(Fr::BUSY, !self.tx_fifo.is_empty());
        fr
    }

    /// Queue bytes on the wire towards this UART's receiver.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.wire_rx.extend(bytes.iter().copied());
    }

    /// Everything that has left the transmit FIFO so far.
    pub fn transmitted(&self) -> &[u8] {
        &self.transmitted
    }

    pub fn take_transmitted(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.transmitted)
    }

    /// Nothing queued in either direction.
    pub fn idle(&self) -> bool {
        self.tx_fifo.is_empty() && self.wire_rx.is_empty() && self.rx_fifo.is_empty()
    }

    pub fn tx_pending(&self) -> usize {
        self.tx_fifo.len()
    }

    /// Divisor captured by the last LCRH write.
    pub fn latched_divisor(&self) -> Option<BaudDivisor> {
        self.latched
    }

    pub fn line_control(&self) -> u32 {
        self.lcrh
    }

    pub fn enabled(&self) -> bool {
        self.ctl_has(Ctl::UARTEN)
    }

    /// Bytes lost because they arrived with the receive FIFO full.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}

impl Peripheral for Uart {
    fn read(&mut self, offset: u32) -> SimResult<u32> {
        Ok(match offset {
            uart::DR => {
                let byte = self.rx_fifo.pop_front().ok_or(SimulationError::RxUnderflow)?;
                u32::from(byte)
            }
            uart::FR => self.flags().bits(),
            uart::IBRD => self.ibrd,
            uart::FBRD => self.fbrd,
            uart::LCRH => self.lcrh,
            uart::CTL => self.ctl,
            _ => 0,
        })
    }

    fn write(&mut self, offset: u32, value: u32) -> SimResult<()> {
        match offset {
            uart::DR => {
                let byte = (value & uart::DR_DATA_MASK) as u8;
                if self.tx_fifo.len() >= self.depth() {
                    return Err(SimulationError::TxOverflow { byte });
                }
                self.tx_fifo.push_back(byte);
            }
            uart::FR => return Err(SimulationError::ReadOnly(offset)),
            uart::IBRD => self.ibrd = value & uart::IBRD_MASK,
            uart::FBRD => self.fbrd = value & uart::FBRD_MASK,
            uart::LCRH => {
                self.lcrh = value & 0xFF;
                self.latched = Some(BaudDivisor {
                    integer: self.ibrd as u16,
                    fraction: self.fbrd as u8,
                });
                tracing::debug!("UART latched divisor {:?}, LCRH {:#x}", self.latched, self.lcrh);
            }
            uart::CTL => self.ctl = value,
            _ => {}
        }
        Ok(())
    }

    fn tick(&mut self) {
        if !self.running() {
            return;
        }

        if self.ctl_has(Ctl::TXE) && !self.tx_fifo.is_empty() {
            self.tx_timer += 1;
            if self.tx_timer >= self.tx_drain_ticks {
                self.tx_timer = 0;
                if let Some(byte) = self.tx_fifo.pop_front() {
                    tracing::trace!("UART wire tx {:#04x}", byte);
                    self.transmitted.push(byte);
                }
            }
        }

        if self.ctl_has(Ctl::RXE) && !self.wire_rx.is_empty() {
            self.rx_timer += 1;
            if self.rx_timer >= self.rx_arrival_ticks {
                self.rx_timer = 0;
                if let Some(byte) = self.wire_rx.pop_front() {
                    if self.rx_fifo.len() < self.depth() {
                        self.rx_fifo.push_back(byte);
                    } else {
                        self.overruns += 1;
                    }
                }
            }
        }
    }

    fn registers(&self) -> Vec<(u32, u32)> {
        vec![
            (uart::FR, self.flags().bits()),
            (uart::IBRD, self.ibrd),
            (uart::FBRD, self.fbrd),
            (uart::LCRH, self.lcrh),
            (uart::CTL, self.ctl),
        ]
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_uart() -> Uart {
        let mut u = Uart::new(1, 1);
        u.write(uart::CTL, uart::CTL_RESET | Ctl::UARTEN.bits()).unwrap();
        u.write(uart::IBRD, 27).unwrap();
        u.write(uart::FBRD, 8).unwrap();
        u.write(uart::LCRH, 0x70).unwrap();
        u
    }

    #[test]
    fn divisor_latches_on_lcrh_write() {
        let mut u = Uart::new(1, 1);
        u.write(uart::IBRD, 27).unwrap();
        u.write(uart::FBRD, 8).unwrap();
        assert_eq!(u.latched_divisor(), None);
        u.write(uart::LCRH, 0x70).unwrap();
        assert_eq!(u.latched_divisor(), Some(BaudDivisor { integer: 27, fraction: 8 }));

        u.write(uart::IBRD, 13).unwrap();
        assert_eq!(u.latched_divisor().unwrap().integer, 27);
    }

    #[test]
    fn tx_fifo_fills_and_drains() {
        let mut u = running_uart();
        for b in 0..16u8 {
            u.write(uart::DR, u32::from(b)).unwrap();
        }
        assert!(u.flags().contains(Fr::TXFF));
        assert_eq!(u.write(uart::DR, 0xAA), Err(SimulationError::TxOverflow { byte: 0xAA }));

        u.tick();
        assert!(!u.flags().contains(Fr::TXFF));
        assert_eq!(u.transmitted(), &[0]);
    }

    #[test]
    fn without_fifo_depth_is_one() {
        let mut u = running_uart();
        u.write(uart::LCRH, 0x60).unwrap();
        u.write(uart::DR, 1).unwrap();
        assert!(u.flags().contains(Fr::TXFF));
    }

    #[test]
    fn rx_underflow_and_arrival() {
        let mut u = running_uart();
        assert_eq!(u.read(uart::DR), Err(SimulationError::RxUnderflow));

        u.inject(b"A");
        assert!(u.flags().contains(Fr::RXFE));
        u.tick();
        assert!(!u.flags().contains(Fr::RXFE));
        assert_eq!(u.read(uart::DR).unwrap(), 0x41);
        assert!(u.idle());
    }

    #[test]
    fn nothing_moves_before_enable() {
        let mut u = Uart::new(1, 1);
        u.write(uart::DR, 0x55).unwrap();
        u.inject(b"x");
        for _ in 0..10 {
            u.tick();
        }
        assert!(u.transmitted().is_empty());
        assert!(u.flags().contains(Fr::RXFE));
    }
}
