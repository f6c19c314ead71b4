use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use tivalink_driver::{
    ChannelBinding, ClockConfig, Crystal, EchoConfig, EchoRoute, PinBinding, PinMask, Port,
    UartInstance, WaitPolicy, GREETING,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChannelManifest {
    pub uart: u8,
    pub port: char,
    pub pins: Vec<u8>,
    #[serde(default = "default_function")]
    pub function: u8,
    #[serde(default)]
    pub commit_unlock: bool,
}

fn default_function() -> u8 {
    1
}

impl ChannelManifest {
    fn from_binding(binding: &ChannelBinding) -> Self {
        Self {
            uart: binding.instance.index(),
            port: binding.pins.port.letter(),
            pins: (0..8).filter(|n| binding.pins.pins.contains(PinMask::pin(*n))).collect(),
            function: binding.pins.function,
            commit_unlock: binding.pins.commit_unlock,
        }
    }

    pub fn to_binding(&self) -> Result<ChannelBinding> {
        let instance = UartInstance::from_index(self.uart)
            .with_context(|| format!("No UART{} on the TM4C123 (0..=7)", self.uart))?;
        let port = Port::from_letter(self.port)
            .with_context(|| format!("No GPIO port '{}' (A..=F)", self.port))?;
        let mut pins = PinMask::empty();
        for &n in &self.pins {
            if n > 7 {
                anyhow::bail!("Pin {} out of range on port {}", n, self.port);
            }
            pins |= PinMask::pin(n);
        }
        if pins.is_empty() {
            anyhow::bail!("Channel on UART{} lists no pins", self.uart);
        }
        if self.function > 0xF {
            anyhow::bail!("Pin function {:#x} does not fit in four bits", self.function);
        }
        Ok(ChannelBinding {
            instance,
            pins: PinBinding {
                port,
                pins,
                function: self.function,
                commit_unlock: self.commit_unlock,
            },
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteManifest {
    #[default]
    Primary,
    Secondary,
}

impl From<RouteManifest> for EchoRoute {
    fn from(r: RouteManifest) -> Self {
        match r {
            RouteManifest::Primary => EchoRoute::Primary,
            RouteManifest::Secondary => EchoRoute::Secondary,
        }
    }
}

/// Timing of the simulated chip, in bus cycles.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SimulationManifest {
    #[serde(default = "default_crystal_hz")]
    pub crystal_hz: u32,
    /// Omit (or set to null) for a PLL that never locks.
    #[serde(default = "default_pll_lock_ticks")]
    pub pll_lock_ticks: Option<u32>,
    #[serde(default = "default_tx_drain_ticks")]
    pub tx_drain_ticks: u32,
    #[serde(default = "default_rx_arrival_ticks")]
    pub rx_arrival_ticks: u32,
}

fn default_crystal_hz() -> u32 {
    16_000_000
}

fn default_pll_lock_ticks() -> Option<u32> {
    Some(64)
}

fn default_tx_drain_ticks() -> u32 {
    4
}

fn default_rx_arrival_ticks() -> u32 {
    8
}

impl Default for SimulationManifest {
    fn default() -> Self {
        Self {
            crystal_hz: default_crystal_hz(),
            pll_lock_ticks: default_pll_lock_ticks(),
            tx_drain_ticks: default_tx_drain_ticks(),
            rx_arrival_ticks: default_rx_arrival_ticks(),
        }
    }
}

/// Board description. Every field defaults to the EK-TM4C123GXL LaunchPad.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct BoardManifest {
    pub name: String,
    pub crystal_hz: u32,
    pub divide_by: u8,
    pub baud: u32,
    pub greeting: String,
    pub inter_byte_delay: u32,
    /// Polls before a hardware wait gives up; unbounded when absent.
    pub max_polls: Option<u32>,
    pub route: RouteManifest,
    pub primary: ChannelManifest,
    pub secondary: ChannelManifest,
    pub simulation: SimulationManifest,
}

impl Default for BoardManifest {
    fn default() -> Self {
        let board = EchoConfig::EK_TM4C123GXL;
        Self {
            name: "ek-tm4c123gxl".to_string(),
            crystal_hz: board.clock.crystal.hz(),
            divide_by: board.clock.divide_by,
            baud: board.baud,
            greeting: String::from_utf8_lossy(GREETING).into_owned(),
            inter_byte_delay: board.inter_byte_delay,
            max_polls: None,
            route: RouteManifest::Primary,
            primary: ChannelManifest::from_binding(&board.primary),
            secondary: ChannelManifest::from_binding(&board.secondary),
            simulation: SimulationManifest::default(),
        }
    }
}

impl BoardManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open board manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse Board Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml).context("Failed to parse Board Manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if Crystal::from_hz(self.crystal_hz).is_none() {
            anyhow::bail!("Unsupported crystal frequency {} Hz", self.crystal_hz);
        }
        if !(2..=64).contains(&self.divide_by) {
            anyhow::bail!("divide_by must be in 2..=64, got {}", self.divide_by);
        }
        if self.baud == 0 {
            anyhow::bail!("baud must be greater than zero");
        }
        if self.max_polls == Some(0) {
            anyhow::bail!("max_polls must be greater than zero");
        }
        if self.simulation.tx_drain_ticks == 0 || self.simulation.rx_arrival_ticks == 0 {
            anyhow::bail!("Simulation tick counts must be greater than zero");
        }
        let primary = self.primary.to_binding().context("Invalid primary channel")?;
        let secondary = self.secondary.to_binding().context("Invalid secondary channel")?;
        if primary.instance == secondary.instance {
            anyhow::bail!("Both channels use UART{}", primary.instance.index());
        }
        Ok(())
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        match self.max_polls {
            Some(max_polls) => WaitPolicy::Bounded { max_polls },
            None => WaitPolicy::Forever,
        }
    }

    pub fn to_echo_config(&self) -> Result<EchoConfig<'_>> {
        let crystal = Crystal::from_hz(self.crystal_hz)
            .with_context(|| format!("Unsupported crystal frequency {} Hz", self.crystal_hz))?;
        Ok(EchoConfig {
            clock: ClockConfig {
                crystal,
                divide_by: self.divide_by,
            },
            baud: self.baud,
            primary: self.primary.to_binding()?,
            secondary: self.secondary.to_binding()?,
            greeting: self.greeting.as_bytes(),
            inter_byte_delay: self.inter_byte_delay,
            wait: self.wait_policy(),
            route: self.route.into(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ScenarioLimits {
    /// Echo loop iterations after boot.
    pub max_polls: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
    #[serde(default)]
    pub uart: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartEqualsAssertion {
    pub uart_equals: String,
    #[serde(default)]
    pub uart: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct NoFaultsAssertion {
    pub no_faults: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ScenarioAssertion {
    UartContains(UartContainsAssertion),
    UartEquals(UartEqualsAssertion),
    NoFaults(NoFaultsAssertion),
}

/// Scripted run of the echo service: what arrives on the wire and what must
/// come out of it.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EchoScenario {
    pub schema_version: String,
    #[serde(default)]
    pub board: Option<String>,
    /// Bytes injected on the primary channel's receive line.
    #[serde(default)]
    pub input: String,
    pub limits: ScenarioLimits,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

impl EchoScenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open echo scenario at {:?}", path.as_ref()))?;
        let scenario: Self =
            serde_yaml::from_reader(f).context("Failed to parse Echo Scenario YAML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if let Some(board) = &self.board {
            if board.trim().is_empty() {
                anyhow::bail!("Input 'board' path cannot be empty");
            }
        }

        if self.limits.max_polls == 0 {
            anyhow::bail!("Limit 'max_polls' must be greater than zero");
        }

        Ok(())
    }
}
