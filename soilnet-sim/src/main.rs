// Soilnet Sim - Master/satellite session simulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Soilnet Sim
//!
//! Runs a master and a satellite against each other over a simulated radio
//! pair and prints a JSON summary.
//!
//! ## Usage
//!
//! ```bash
//! # Five polling rounds with 30% of the master's frames lost
//! soilnet-sim session --rounds 5 --loss 0.3
//!
//! # Water 260 ml each round, pump time compressed 1000x
//! soilnet-sim session --irrigate --volume-ml 260 --pump-speed 1000
//!
//! # Range test: 20 beacons heard at -85 dBm
//! soilnet-sim range --count 20 --rssi -85
//! ```

mod report;

use clap::{Parser, Subcommand};
use report::{LinkSummary, RangeSummary, RoundSummary, SessionSummary};
use soilnet::pump::MemorySwitch;
use soilnet::{
    radio, survey, Beacon, FixedSoilSensor, FlowRatePump, Link, LinkConfig, LossyTransport,
    Master, PumpConfig, RadioConfig, Satellite, SatelliteConfig, Sleeper, SoilnetError,
    Transport, TransportError,
};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Soilnet master/satellite simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Poll a simulated satellite
    Session(SessionArgs),
    /// Beacon range test
    Range(RangeArgs),
}

#[derive(clap::Args, Debug)]
struct SessionArgs {
    /// Polling rounds to run
    #[arg(short, long, default_value = "3")]
    rounds: u32,

    /// Fraction of the master's frames lost in transit (0.0-1.0)
    #[arg(short, long, default_value = "0.0")]
    loss: f32,

    /// Seed for the loss simulation
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Per-attempt reply timeout in milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Send attempts per command
    #[arg(long, default_value = "5")]
    attempts: u32,

    /// Satellite reply delay in milliseconds
    #[arg(long, default_value = "500")]
    reply_delay_ms: u64,

    /// Soil temperature reported by the satellite (°C)
    #[arg(long, default_value = "21.4")]
    temperature: f64,

    /// Soil moisture count reported by the satellite
    #[arg(long, default_value = "620")]
    moisture: i64,

    /// Water once per round
    #[arg(long)]
    irrigate: bool,

    /// Forecast watering volume; without it the previous volume is reused
    #[arg(long)]
    volume_ml: Option<u32>,

    /// Pump flow rate in ml/min
    #[arg(long, default_value = "130")]
    flow_rate: f64,

    /// Pump time compression factor
    #[arg(long, default_value = "1000")]
    pump_speed: f64,

    /// Give the satellite a different network key
    #[arg(long)]
    key_mismatch: bool,
}

#[derive(clap::Args, Debug)]
struct RangeArgs {
    /// Beacons to transmit
    #[arg(short, long, default_value = "10")]
    count: u64,

    /// Milliseconds between beacons
    #[arg(long, default_value = "100")]
    interval_ms: u64,

    /// Signal strength reported by the receiver (dBm)
    #[arg(long, default_value = "-60", allow_hyphen_values = true)]
    rssi: i16,

    /// Fraction of beacons lost in transit (0.0-1.0)
    #[arg(short, long, default_value = "0.0")]
    loss: f32,
}

/// Pump sleeper running faster than real time
#[derive(Debug, Default)]
struct ScaledSleeper {
    speed: f64,
    runs: usize,
    requested: Duration,
}

impl Sleeper for ScaledSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.runs += 1;
        self.requested += duration;
        thread::sleep(duration.div_f64(self.speed));
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing; library `log` records are forwarded too
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Soilnet Sim v{} (soilnet v{})", env!("CARGO_PKG_VERSION"), soilnet::VERSION);

    let output = match args.mode {
        Mode::Session(session_args) => run_session(session_args).and_then(|s| to_json(&s)),
        Mode::Range(range_args) => run_range(range_args).and_then(|s| to_json(&s)),
    };

    match output {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Simulation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn to_json<S: serde::Serialize>(summary: &S) -> Result<String, SimError> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Errors that end a simulation run
#[derive(Debug, Error)]
enum SimError {
    #[error(transparent)]
    Link(#[from] SoilnetError),

    #[error("could not encode summary: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

fn run_session(args: SessionArgs) -> Result<SessionSummary, SimError> {
    let satellite_radio_config = if args.key_mismatch {
        RadioConfig::with_key([0x5a; 16])
    } else {
        RadioConfig::default()
    };
    let (master_radio, satellite_radio) = radio::pair(RadioConfig::default(), satellite_radio_config);

    let satellite_config = SatelliteConfig {
        reply_delay: Duration::from_millis(args.reply_delay_ms),
        pump: PumpConfig::with_flow_rate(args.flow_rate),
    };
    let pump = FlowRatePump::new(
        MemorySwitch::default(),
        ScaledSleeper {
            speed: args.pump_speed.max(1.0),
            ..Default::default()
        },
        satellite_config.pump,
    )
    .map_err(SoilnetError::from)?;
    let mut satellite = Satellite::new(
        Link::new(satellite_radio),
        FixedSoilSensor::new(args.temperature, args.moisture),
        pump,
        satellite_config,
    )?;

    let handle = thread::spawn(move || {
        match satellite.serve() {
            Err(SoilnetError::Transport(TransportError::Disconnected { .. })) => {
                info!("Master gone, satellite shutting down")
            }
            Err(e) => warn!("Satellite stopped: {}", e),
            Ok(()) => {}
        }
        let sleeper = satellite.pump().sleeper();
        (sleeper.runs, sleeper.requested)
    });

    let link_config = LinkConfig::new(Duration::from_millis(args.timeout_ms), args.attempts);
    let transport = LossyTransport::with_seed(master_radio, args.loss, args.seed);
    let mut master = Master::connect(Link::with_config(transport, link_config)?)?;

    let volume_ml = args.volume_ml;
    let mut forecast = move || volume_ml;
    let mut rounds = Vec::new();
    for round in 1..=args.rounds {
        info!("Round {}/{}", round, args.rounds);
        let alive = master.ping()?;
        let temperature = master.read_temperature()?;
        let humidity = master.read_humidity()?;
        let irrigation = if args.irrigate {
            Some(master.irrigate(&mut forecast)?.into())
        } else {
            None
        };
        rounds.push(RoundSummary {
            round,
            alive,
            temperature: temperature.into(),
            humidity: humidity.into(),
            irrigation,
        });
    }

    let link = LinkSummary::new(master.link().metrics(), &master.link().transport().metrics());
    drop(master);

    let (pump_runs, pumped) = handle
        .join()
        .map_err(|_| SimError::ThreadPanicked("satellite"))?;
    Ok(SessionSummary {
        rounds,
        link,
        pump_runs,
        pump_seconds: pumped.as_secs_f64(),
    })
}

fn run_range(args: RangeArgs) -> Result<RangeSummary, SimError> {
    let (beacon_radio, receiver) = radio::pair(RadioConfig::default(), RadioConfig::default());
    let receiver = receiver.with_rssi(args.rssi);
    let interval = Duration::from_millis(args.interval_ms);

    let count = args.count;
    let loss = args.loss;
    let handle = thread::spawn(move || {
        let mut beacon = Beacon::new(LossyTransport::new(beacon_radio, loss));
        if let Err(e) = beacon.run(count, interval) {
            warn!("Beacon stopped: {}", e);
        }
        beacon.sequence()
    });

    // Listen a little past the last beacon
    let beacons = u32::try_from(count).unwrap_or(u32::MAX);
    let window = interval.saturating_mul(beacons) + Duration::from_millis(500);
    let report = survey(receiver, window, Duration::from_secs(2))?;
    let sent = handle
        .join()
        .map_err(|_| SimError::ThreadPanicked("beacon"))?;

    Ok(RangeSummary::new(sent, &report))
}
