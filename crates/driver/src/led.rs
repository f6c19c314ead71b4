//! Status LEDs on the LaunchPad's RGB LED (PF1..PF3).

use crate::gpio::{self, PinMask, Port};
use crate::poll::DelayCycles;
use crate::register::RegisterAccess;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Blue,
    Green,
}

impl Color {
    pub fn pins(self) -> PinMask {
        match self {
            Color::Red => PinMask::P1,
            Color::Blue => PinMask::P2,
            Color::Green => PinMask::P3,
        }
    }
}

/// Points in the service where a human-visible pulse is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    ClockReady,
    RegistersConfigured,
    ByteTransmitted,
    ByteReceived,
    /// One pass of the echo loop, whether or not a byte arrived.
    ReceivePoll,
}

impl StatusEvent {
    pub fn color(self) -> Color {
        match self {
            StatusEvent::ClockReady => Color::Red,
            StatusEvent::RegistersConfigured => Color::Blue,
            StatusEvent::ByteTransmitted | StatusEvent::ByteReceived | StatusEvent::ReceivePoll => {
                Color::Green
            }
        }
    }
}

/// Something that can show service progress. Serial behaviour must not depend on it.
pub trait StatusIndicator<R: RegisterAccess> {
    fn signal(&mut self, bus: &mut R, event: StatusEvent);
}

/// Indicator that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl<R: RegisterAccess> StatusIndicator<R> for NoIndicator {
    fn signal(&mut self, _bus: &mut R, _event: StatusEvent) {}
}

const LED_PINS: PinMask = PinMask::P1.union(PinMask::P2).union(PinMask::P3);

/// Pulses the RGB LED for a fixed time per event.
#[derive(Debug)]
pub struct LedIndicator<D> {
    delay: D,
    hold_cycles: u32,
}

impl<D: DelayCycles> LedIndicator<D> {
    /// Clock port F and make the LED pins outputs.
    pub fn new<R: RegisterAccess>(bus: &mut R, delay: D, hold_cycles: u32) -> Self {
        gpio::enable_port(bus, Port::F);
        gpio::configure_outputs(bus, Port::F, LED_PINS);
        gpio::drive_pins(bus, Port::F, LED_PINS, 0);
        Self { delay, hold_cycles }
    }

    pub fn pulse<R: RegisterAccess>(&mut self, bus: &mut R, color: Color) {
        gpio::drive_pins(bus, Port::F, LED_PINS, color.pins().bits());
        self.delay.delay_cycles(self.hold_cycles);
        gpio::drive_pins(bus, Port::F, LED_PINS, 0);
        self.delay.delay_cycles(self.hold_cycles);
    }
}

impl<R: RegisterAccess, D: DelayCycles> StatusIndicator<R> for LedIndicator<D> {
    fn signal(&mut self, bus: &mut R, event: StatusEvent) {
        self.pulse(bus, event.color());
    }
}
