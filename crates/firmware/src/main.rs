#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;
use tivalink_driver::{DelayCycles, EchoConfig, LedIndicator, Mmio, SerialEchoService};

/// Cycles the LED stays lit, then dark, per status pulse.
const BLINK_HOLD: u32 = 100_000;

struct CycleDelay;

impl DelayCycles for CycleDelay {
    fn delay_cycles(&mut self, cycles: u32) {
        cortex_m::asm::delay(cycles);
    }
}

#[entry]
fn main() -> ! {
    let Some(mut mmio) = Mmio::take() else {
        loop {
            cortex_m::asm::nop();
        }
    };

    let led = LedIndicator::new(&mut mmio, CycleDelay, BLINK_HOLD);
    SerialEchoService::with_parts(mmio, led, CycleDelay, EchoConfig::EK_TM4C123GXL).run()
}
