//! Boot sequence and echo loop.

use log::{debug, error, info};

use crate::clock::{ClockConfig, ClockController, Clocks};
use crate::error::Result;
use crate::led::{NoIndicator, StatusEvent, StatusIndicator};
use crate::poll::{DelayCycles, SpinDelay, WaitPolicy};
use crate::register::RegisterAccess;
use crate::uart::{PinBinding, UartChannel, UartConfig, UartInstance};

/// Sent once on the primary channel after both channels are up.
pub const GREETING: &[u8] = b"Hello EWU IEEE, from Cody Birkland\n\r";

/// A UART module and the pins it is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBinding {
    pub instance: UartInstance,
    pub pins: PinBinding,
}

/// Where echoed bytes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoRoute {
    /// Back out of the channel they arrived on.
    #[default]
    Primary,
    /// Out of the secondary channel.
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoConfig<'a> {
    pub clock: ClockConfig,
    pub baud: u32,
    pub primary: ChannelBinding,
    pub secondary: ChannelBinding,
    pub greeting: &'a [u8],
    /// Busy-wait between greeting bytes.
    pub inter_byte_delay: u32,
    pub wait: WaitPolicy,
    pub route: EchoRoute,
}

impl EchoConfig<'static> {
    /// EK-TM4C123GXL: UART0 on the debug USB port, UART2 on PD6/PD7, 115200 8N1.
    pub const EK_TM4C123GXL: Self = Self {
        clock: ClockConfig::EK_TM4C123GXL,
        baud: 115_200,
        primary: ChannelBinding {
            instance: UartInstance::Uart0,
            pins: PinBinding::UART0_PA0_PA1,
        },
        secondary: ChannelBinding {
            instance: UartInstance::Uart2,
            pins: PinBinding::UART2_PD6_PD7,
        },
        greeting: GREETING,
        inter_byte_delay: 10_000,
        wait: WaitPolicy::Forever,
        route: EchoRoute::Primary,
    };
}

impl Default for EchoConfig<'static> {
    fn default() -> Self {
        Self::EK_TM4C123GXL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceState {
    Booting,
    ClockReady,
    ChannelsReady,
    GreetingSent,
    Echoing,
}

/// Owns the register backend for the life of the program.
#[derive(Debug)]
pub struct SerialEchoService<'a, R, I = NoIndicator, D = SpinDelay> {
    bus: R,
    indicator: I,
    delay: D,
    config: EchoConfig<'a>,
    clock: ClockController,
    clocks: Option<Clocks>,
    primary: Option<UartChannel>,
    secondary: Option<UartChannel>,
    /// Greeting bytes already handed to the primary channel.
    greeting_sent: usize,
    state: ServiceState,
}

impl<'a, R: RegisterAccess> SerialEchoService<'a, R> {
    pub fn new(bus: R, config: EchoConfig<'a>) -> Self {
        Self::with_parts(bus, NoIndicator, SpinDelay, config)
    }
}

impl<'a, R, I, D> SerialEchoService<'a, R, I, D>
where
    R: RegisterAccess,
    I: StatusIndicator<R>,
    D: DelayCycles,
{
    pub fn with_parts(bus: R, indicator: I, delay: D, config: EchoConfig<'a>) -> Self {
        Self {
            bus,
            indicator,
            delay,
            clock: ClockController::new(config.clock),
            config,
            clocks: None,
            primary: None,
            secondary: None,
            greeting_sent: 0,
            state: ServiceState::Booting,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn clocks(&self) -> Option<Clocks> {
        self.clocks
    }

    pub fn config(&self) -> &EchoConfig<'a> {
        &self.config
    }

    pub fn bus(&self) -> &R {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut R {
        &mut self.bus
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn into_bus(self) -> R {
        self.bus
    }

    /// Clock, both channels, greeting. Does nothing once the service is echoing.
    ///
    /// With [`WaitPolicy::Forever`] this only returns `Err` for an unusable baud rate;
    /// a PLL that never locks keeps it spinning.
    pub fn boot(&mut self) -> Result<()> {
        if self.state == ServiceState::Booting {
            let clocks = self
                .clock
                .bring_up_with(&mut self.bus, self.config.wait)?;
            self.clocks = Some(clocks);
            self.enter(ServiceState::ClockReady);
            self.indicator.signal(&mut self.bus, StatusEvent::ClockReady);
        }

        if let (ServiceState::ClockReady, Some(clocks)) = (self.state, self.clocks) {
            self.primary = Some(self.configure_channel(&clocks, self.config.primary)?);
            self.secondary = Some(self.configure_channel(&clocks, self.config.secondary)?);
            self.enter(ServiceState::ChannelsReady);
        }

        if self.state == ServiceState::ChannelsReady {
            self.send_greeting()?;
            self.enter(ServiceState::GreetingSent);
            self.enter(ServiceState::Echoing);
        }

        Ok(())
    }

    /// One pass of the echo loop. Boots first if needed.
    ///
    /// Returns the byte that was echoed, if one was waiting.
    pub fn poll_once(&mut self) -> Result<Option<u8>> {
        if self.state != ServiceState::Echoing {
            self.boot()?;
        }
        let (Some(primary), Some(secondary)) = (self.primary, self.secondary) else {
            return Ok(None);
        };

        self.indicator.signal(&mut self.bus, StatusEvent::ReceivePoll);
        if !primary.receive_available(&mut self.bus) {
            return Ok(None);
        }
        let byte = primary.receive_byte(&mut self.bus);
        self.indicator.signal(&mut self.bus, StatusEvent::ByteReceived);

        let out = match self.config.route {
            EchoRoute::Primary => primary,
            EchoRoute::Secondary => secondary,
        };
        out.transmit_byte_with(&mut self.bus, byte, self.config.wait)?;
        self.indicator
            .signal(&mut self.bus, StatusEvent::ByteTransmitted);
        Ok(Some(byte))
    }

    /// Boot, then echo forever.
    pub fn run(mut self) -> ! {
        if let Err(err) = self.boot() {
            error!("boot failed: {}", err);
            loop {
                core::hint::spin_loop();
            }
        }
        info!("echoing on uart{}", self.config.primary.instance.index());
        loop {
            if let Err(err) = self.poll_once() {
                error!("echo: {}", err);
            }
        }
    }

    fn configure_channel(&mut self, clocks: &Clocks, binding: ChannelBinding) -> Result<UartChannel> {
        let config = UartConfig::new(binding.instance, binding.pins, clocks, self.config.baud)?;
        let channel = UartChannel::configure(&mut self.bus, &config)?;
        self.indicator
            .signal(&mut self.bus, StatusEvent::RegistersConfigured);
        Ok(channel)
    }

    /// Resumes after the last byte that went out if an earlier attempt timed out.
    fn send_greeting(&mut self) -> Result<()> {
        let Some(primary) = self.primary else {
            return Ok(());
        };
        let greeting = self.config.greeting;
        while let Some(&byte) = greeting.get(self.greeting_sent) {
            primary.transmit_byte_with(&mut self.bus, byte, self.config.wait)?;
            self.greeting_sent += 1;
            self.indicator
                .signal(&mut self.bus, StatusEvent::ByteTransmitted);
            self.delay.delay_cycles(self.config.inter_byte_delay);
        }
        Ok(())
    }

    fn enter(&mut self, next: ServiceState) {
        debug!("service: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::Color;
    use crate::map::{sysctl, uart};
    use crate::register::Register;
    use crate::testing::{CountingDelay, FakeRegisters};

    #[derive(Debug, Default)]
    struct RecordingIndicator {
        events: Vec<StatusEvent>,
    }

    impl<R: RegisterAccess> StatusIndicator<R> for RecordingIndicator {
        fn signal(&mut self, _bus: &mut R, event: StatusEvent) {
            self.events.push(event);
        }
    }

    fn locked_registers() -> FakeRegisters {
        let mut regs = FakeRegisters::tm4c_reset();
        regs.preset(sysctl::RIS, sysctl::Ris::PLLLRIS.bits());
        regs
    }

    /// UART0 reports a full transmit FIFO once `budget` data writes have gone out.
    #[derive(Debug)]
    struct StallingUart {
        regs: FakeRegisters,
        budget: usize,
    }

    impl RegisterAccess for StallingUart {
        fn read(&mut self, reg: Register) -> u32 {
            let value = self.regs.read(reg);
            if reg == UartInstance::Uart0.reg(uart::FR) && self.budget == 0 {
                value | uart::Fr::TXFF.bits()
            } else {
                value
            }
        }

        fn write(&mut self, reg: Register, value: u32) {
            if reg == UartInstance::Uart0.reg(uart::DR) {
                self.budget = self.budget.saturating_sub(1);
            }
            self.regs.write(reg, value);
        }
    }

    fn uart0_output(regs: &FakeRegisters) -> Vec<u8> {
        let dr = UartInstance::Uart0.reg(uart::DR);
        regs.writes()
            .iter()
            .filter(|(r, _)| *r == dr)
            .map(|(_, v)| *v as u8)
            .collect()
    }

    #[test]
    fn boot_walks_every_state_once() {
        let mut service = SerialEchoService::with_parts(
            locked_registers(),
            RecordingIndicator::default(),
            CountingDelay::default(),
            EchoConfig::default(),
        );

        service.boot().unwrap();

        assert_eq!(service.state(), ServiceState::Echoing);
        assert_eq!(service.clocks().unwrap().sysclk_hz(), 50_000_000);
        assert_eq!(service.delay().calls as usize, GREETING.len());

        let events = &service.indicator().events;
        assert_eq!(events[0], StatusEvent::ClockReady);
        assert_eq!(events[1], StatusEvent::RegistersConfigured);
        assert_eq!(events[2], StatusEvent::RegistersConfigured);
        assert_eq!(events.len(), 3 + GREETING.len());

        assert_eq!(uart0_output(service.bus()), GREETING);

        let writes_after_boot = service.bus().writes().len();
        service.boot().unwrap();
        assert_eq!(service.bus().writes().len(), writes_after_boot);
    }

    #[test]
    fn poll_signals_even_without_data() {
        let mut service = SerialEchoService::with_parts(
            locked_registers(),
            RecordingIndicator::default(),
            CountingDelay::default(),
            EchoConfig::default(),
        );
        service.boot().unwrap();
        service
            .bus_mut()
            .preset(UartInstance::Uart0.reg(uart::FR), uart::Fr::RXFE.bits());

        assert_eq!(service.poll_once().unwrap(), None);
        assert_eq!(service.poll_once().unwrap(), None);

        let polls = service
            .indicator()
            .events
            .iter()
            .filter(|e| **e == StatusEvent::ReceivePoll)
            .count();
        assert_eq!(polls, 2);
        assert_eq!(StatusEvent::ReceivePoll.color(), Color::Green);
    }

    #[test]
    fn echoed_byte_signals_receive_and_transmit() {
        let mut service = SerialEchoService::with_parts(
            locked_registers(),
            RecordingIndicator::default(),
            CountingDelay::default(),
            EchoConfig::default(),
        );
        service.boot().unwrap();
        service
            .bus_mut()
            .preset(UartInstance::Uart0.reg(uart::FR), 0);
        service
            .bus_mut()
            .preset(UartInstance::Uart0.reg(uart::DR), u32::from(b'k'));

        assert_eq!(service.poll_once().unwrap(), Some(b'k'));

        let events = &service.indicator().events;
        assert_eq!(
            events[events.len() - 3..],
            [
                StatusEvent::ReceivePoll,
                StatusEvent::ByteReceived,
                StatusEvent::ByteTransmitted,
            ]
        );
        assert_eq!(StatusEvent::ByteReceived.color(), Color::Green);
    }

    #[test]
    fn secondary_route_forwards() {
        let config = EchoConfig {
            route: EchoRoute::Secondary,
            ..EchoConfig::default()
        };
        let mut service = SerialEchoService::new(locked_registers(), config);
        service.boot().unwrap();
        service.bus_mut().preset(UartInstance::Uart0.reg(uart::DR), u32::from(b'z'));

        assert_eq!(service.poll_once().unwrap(), Some(b'z'));
        assert_eq!(
            service.bus().writes().last().copied(),
            Some((UartInstance::Uart2.reg(uart::DR), u32::from(b'z')))
        );
    }

    #[test]
    fn missing_lock_fails_bounded_boot() {
        let config = EchoConfig {
            wait: WaitPolicy::Bounded { max_polls: 16 },
            ..EchoConfig::default()
        };
        let mut service = SerialEchoService::new(FakeRegisters::tm4c_reset(), config);

        assert!(service.boot().is_err());
        assert_eq!(service.state(), ServiceState::Booting);

        service
            .bus_mut()
            .preset(sysctl::RIS, sysctl::Ris::PLLLRIS.bits());
        service.boot().unwrap();

        assert_eq!(service.state(), ServiceState::Echoing);
        assert_eq!(service.clocks().unwrap().sysclk_hz(), 50_000_000);
        assert_eq!(uart0_output(service.bus()), GREETING);
    }

    #[test]
    fn greeting_resumes_after_transmit_timeout() {
        let config = EchoConfig {
            wait: WaitPolicy::Bounded { max_polls: 8 },
            ..EchoConfig::default()
        };
        let bus = StallingUart {
            regs: locked_registers(),
            budget: 5,
        };
        let mut service = SerialEchoService::with_parts(
            bus,
            RecordingIndicator::default(),
            CountingDelay::default(),
            config,
        );

        assert!(service.boot().is_err());
        assert_eq!(service.state(), ServiceState::ChannelsReady);
        assert_eq!(uart0_output(&service.bus().regs), GREETING[..5]);

        service.bus_mut().budget = usize::MAX;
        service.boot().unwrap();

        assert_eq!(service.state(), ServiceState::Echoing);
        assert_eq!(uart0_output(&service.bus().regs), GREETING);
        let sent = service
            .indicator()
            .events
            .iter()
            .filter(|e| **e == StatusEvent::ByteTransmitted)
            .count();
        assert_eq!(sent, GREETING.len());
    }
}
