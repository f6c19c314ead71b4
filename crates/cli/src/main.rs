use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use tivalink_config::{BoardManifest, EchoScenario, ScenarioAssertion};
use tivalink_core::metrics::AccessMetrics;
use tivalink_core::snapshot::BusSnapshot;
use tivalink_core::SystemBus;
use tivalink_driver::{SerialEchoService, UartInstance};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

/// Cycles allowed for the transmit FIFOs to drain after the last poll.
const SETTLE_CYCLES: u64 = 100_000;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the board manifest (YAML); defaults to the EK-TM4C123GXL
    #[arg(short, long)]
    board: Option<PathBuf>,

    /// Bytes arriving on the primary channel after boot
    #[arg(short, long)]
    input: Option<String>,

    /// Echo loop iterations to run after boot (default: 2000)
    #[arg(long)]
    max_polls: Option<u32>,

    /// Echo scenario script (YAML) with input, limits and assertions
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Write a JSON report with register state to this path
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Enable register-level tracing
    #[arg(short, long)]
    trace: bool,

    /// Do not copy the primary channel's output to stdout
    #[arg(long)]
    no_uart_stdout: bool,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Status {
    Pass,
    Fail,
    Error,
}

#[derive(Serialize, Debug)]
struct AssertionResult {
    assertion: String,
    passed: bool,
}

#[derive(Serialize, Debug)]
struct AccessCounts {
    reads: u64,
    writes: u64,
    faults: u64,
}

#[derive(Serialize, Debug)]
struct RunReport {
    status: Status,
    board: String,
    sysclk_hz: Option<u32>,
    polls: u32,
    echoed: Vec<u8>,
    error: Option<String>,
    /// Captured output per UART that transmitted anything.
    uart: std::collections::BTreeMap<String, String>,
    assertions: Vec<AssertionResult>,
    accesses: AccessCounts,
    registers: BusSnapshot,
}

struct Plan {
    manifest: BoardManifest,
    input: Vec<u8>,
    max_polls: u32,
    assertions: Vec<ScenarioAssertion>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let plan = match plan(&args) {
        Ok(plan) => plan,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match run(&args, plan) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn plan(args: &Args) -> anyhow::Result<Plan> {
    let scenario = match &args.script {
        Some(path) => {
            info!("Loading echo scenario: {:?}", path);
            Some(EchoScenario::from_file(path)?)
        }
        None => None,
    };

    // A board named by the script is relative to the script's directory.
    let board_path = args.board.clone().or_else(|| {
        let scenario = scenario.as_ref()?;
        let board = scenario.board.as_ref()?;
        let base = args
            .script
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."));
        Some(base.join(board))
    });

    let manifest = match board_path {
        Some(path) => {
            info!("Loading board manifest: {:?}", path);
            BoardManifest::from_file(&path)?
        }
        None => {
            info!("Using default board configuration");
            BoardManifest::default()
        }
    };

    let input = args
        .input
        .clone()
        .or_else(|| scenario.as_ref().map(|s| s.input.clone()))
        .unwrap_or_default()
        .into_bytes();

    let max_polls = args
        .max_polls
        .or_else(|| scenario.as_ref().map(|s| s.limits.max_polls))
        .unwrap_or(2000);
    if max_polls == 0 {
        anyhow::bail!("max_polls must be greater than zero");
    }

    Ok(Plan {
        manifest,
        input,
        max_polls,
        assertions: scenario.map(|s| s.assertions).unwrap_or_default(),
    })
}

fn run(args: &Args, plan: Plan) -> anyhow::Result<u8> {
    let manifest = &plan.manifest;
    let config = manifest.to_echo_config()?;
    let primary = config.primary.instance;

    let mut bus = SystemBus::from_manifest(manifest);
    let metrics = Arc::new(AccessMetrics::new());
    bus.add_observer(metrics.clone());

    info!("Booting '{}' at {} baud", manifest.name, config.baud);
    let mut service = SerialEchoService::new(bus, config);
    let mut failure = service.boot().err();

    if failure.is_none() && !plan.input.is_empty() {
        if let Some(uart) = service.bus_mut().uart_mut(primary) {
            uart.inject(&plan.input);
        }
    }

    let mut polls = 0;
    let mut echoed = Vec::new();
    while failure.is_none() && polls < plan.max_polls {
        polls += 1;
        match service.poll_once() {
            Ok(Some(byte)) => echoed.push(byte),
            Ok(None) => {}
            Err(e) => failure = Some(e),
        }
    }
    if let Some(e) = &failure {
        error!("Driver error after {} polls: {}", polls, e);
    }

    let clocks = service.clocks();
    let mut bus = service.into_bus();
    if !bus.settle(SETTLE_CYCLES) {
        warn!("Transmit FIFOs still busy after {} cycles", SETTLE_CYCLES);
    }
    info!(
        "Finished after {} polls, {} cycles, {} faults",
        polls,
        bus.cycles(),
        bus.faults().len()
    );

    let primary_out = bus
        .uart(primary)
        .map(|u| u.transmitted().to_vec())
        .unwrap_or_default();
    if !args.no_uart_stdout {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&primary_out)?;
        stdout.flush()?;
    }

    let assertions: Vec<AssertionResult> = plan
        .assertions
        .iter()
        .map(|a| evaluate(a, &bus, primary))
        .collect();
    for result in assertions.iter().filter(|r| !r.passed) {
        warn!("Assertion failed: {}", result.assertion);
    }

    let status = if failure.is_some() {
        Status::Error
    } else if assertions.iter().all(|r| r.passed) {
        Status::Pass
    } else {
        Status::Fail
    };

    if let Some(path) = &args.snapshot {
        let report = RunReport {
            status,
            board: manifest.name.clone(),
            sysclk_hz: clocks.map(|c| c.sysclk_hz()),
            polls,
            echoed,
            error: failure.map(|e| e.to_string()),
            uart: UartInstance::ALL
                .iter()
                .filter_map(|&i| {
                    let out = bus.uart(i)?.transmitted();
                    (!out.is_empty())
                        .then(|| (format!("uart{}", i.index()), String::from_utf8_lossy(out).into_owned()))
                })
                .collect(),
            assertions,
            accesses: AccessCounts {
                reads: metrics.get_reads(),
                writes: metrics.get_writes(),
                faults: metrics.get_faults(),
            },
            registers: bus.snapshot(),
        };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot to {:?}", path))?;
        info!("Snapshot written to {:?}", path);
    }

    Ok(match status {
        Status::Pass => EXIT_PASS,
        Status::Fail => EXIT_ASSERT_FAIL,
        Status::Error => EXIT_RUNTIME_ERROR,
    })
}

fn captured(bus: &SystemBus, uart: Option<u8>, primary: UartInstance) -> String {
    let instance = uart.and_then(UartInstance::from_index).unwrap_or(primary);
    bus.uart(instance)
        .map(|u| String::from_utf8_lossy(u.transmitted()).into_owned())
        .unwrap_or_default()
}

fn evaluate(assertion: &ScenarioAssertion, bus: &SystemBus, primary: UartInstance) -> AssertionResult {
    match assertion {
        ScenarioAssertion::UartContains(a) => AssertionResult {
            assertion: format!("uart_contains: {:?}", a.uart_contains),
            passed: captured(bus, a.uart, primary).contains(&a.uart_contains),
        },
        ScenarioAssertion::UartEquals(a) => AssertionResult {
            assertion: format!("uart_equals: {:?}", a.uart_equals),
            passed: captured(bus, a.uart, primary) == a.uart_equals,
        },
        ScenarioAssertion::NoFaults(a) => AssertionResult {
            assertion: format!("no_faults: {}", a.no_faults),
            passed: bus.faults().is_empty() == a.no_faults,
        },
    }
}
