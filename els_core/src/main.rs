//! # ELS Motion Core
//!
//! Runs the synchronisation core against the simulation backend: a spindle
//! turning at a configured RPM and in-memory driver lines. The periodic
//! routine gets its own thread; this thread plays the control panel.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use els_common::config::LogLevel;
use els_common::consts::DEFAULT_CONFIG_PATH;
use els_core::config::{LoadedConfig, load_config};
use els_core::cycle::{CycleRunner, rt_setup};
use els_core::hal::DriveLines;
use els_core::hal::sim::{RpmRamp, SimInput, SimOutput, SimulatedSpindle};
use els_core::{Core, PositionEncoder, SharedControls, StepPulseGenerator};

/// Foreground poll period.
const FOREGROUND_PERIOD: Duration = Duration::from_millis(10);

/// ELS Motion Core: spindle-synchronised stepper control
#[derive(Parser, Debug)]
#[command(name = "els_core")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Electronic leadscrew motion core")]
struct Args {
    /// Path to the configuration TOML.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Feed to engage, by table name (default: first entry).
    #[arg(long)]
    feed: Option<String>,

    /// Run the carriage in reverse.
    #[arg(long)]
    reverse: bool,

    /// Override the simulated spindle speed [RPM].
    #[arg(long)]
    rpm: Option<u32>,

    /// Ramp the simulated spindle to this speed while running [RPM].
    #[arg(long)]
    ramp_to_rpm: Option<u32>,

    /// Stop after this many seconds (default: run until Ctrl-C).
    #[arg(long)]
    duration_secs: Option<u64>,

    /// CPU core for the periodic thread (overrides config).
    #[arg(long)]
    cpu_core: Option<usize>,

    /// SCHED_FIFO priority for the periodic thread (overrides config).
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let loaded = load_config(&args.config);
    let base_level = loaded
        .as_ref()
        .map(|l| l.config.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, base_level);

    info!("ELS Motion Core v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|loaded| run(&args, loaded));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("ELS Motion Core shutdown complete");
}

fn run(args: &Args, loaded: LoadedConfig) -> Result<(), Box<dyn std::error::Error>> {
    let LoadedConfig { config, feed_table } = loaded;
    info!(
        service = %config.shared.service_name,
        cycle_time_us = config.cycle.cycle_time_us,
        max_buffered_steps = config.drive.max_buffered_steps,
        feeds = feed_table.len(),
        representation = std::any::type_name::<els_core::ActiveFeed>(),
        "Config OK"
    );

    // ── Simulated hardware ──
    let rpm = args.rpm.unwrap_or(config.simulation.spindle_rpm);
    let spindle = Arc::new(SimulatedSpindle::new(config.machine.encoder_resolution, rpm));
    let encoder = Arc::new(PositionEncoder::new(Arc::clone(&spindle)));
    let ramp = args
        .ramp_to_rpm
        .or(config.simulation.ramp_to_rpm)
        .map(|to| RpmRamp::new(rpm, to, Duration::from_secs(config.simulation.ramp_secs as u64)));

    let step = SimOutput::new();
    let alarm_idle = config.drive.lines.alarm.polarity.level(false);
    let lines = DriveLines::new(
        step.clone(),
        SimOutput::new(),
        SimOutput::new(),
        SimInput::new(alarm_idle),
        &config.drive.lines,
    );
    let drive = StepPulseGenerator::new(lines, config.drive.max_buffered_steps);

    // ── Core ──
    let controls = Arc::new(SharedControls::new());
    let (core, handle) = Core::new(Arc::clone(&encoder), drive, feed_table, controls);

    let feed_name = match &args.feed {
        Some(name) => name.clone(),
        None => handle
            .feed_table()
            .iter()
            .next()
            .map(|(_, entry)| entry.name().to_string())
            .ok_or("feed table is empty")?,
    };
    let feed = handle.set_feed_by_name(&feed_name)?;
    handle.set_direction(args.reverse);
    handle.set_power_on(true);
    info!(feed = %feed_name, id = feed.raw(), reverse = args.reverse, rpm, "Feed engaged");

    // ── Shutdown signal ──
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    // ── Periodic context ──
    let cpu_core = args.cpu_core.unwrap_or(config.cycle.cpu_core);
    let rt_priority = args.rt_priority.unwrap_or(config.cycle.rt_priority);
    let mut runner = CycleRunner::new(core, config.cycle.cycle_time_us, Arc::clone(&running));
    let periodic = std::thread::Builder::new()
        .name("els-periodic".to_string())
        .spawn(move || {
            rt_setup(cpu_core, rt_priority)?;
            info!(cpu_core, rt_priority, "RT setup complete");
            runner.run()
        })?;

    // ── Foreground context ──
    let started = Instant::now();
    let deadline = args
        .duration_secs
        .map(|secs| started + Duration::from_secs(secs));
    let status_interval = Duration::from_millis(config.cycle.status_interval_ms as u64);
    let mut next_status = Instant::now() + status_interval;
    let mut tripped = false;

    while running.load(Ordering::SeqCst) && !periodic.is_finished() {
        if let Some(ramp) = &ramp {
            ramp.apply(&spindle, started.elapsed());
        }
        handle.set_rpm(spindle.rpm());

        let status = handle.status();
        if !tripped && status.power_on && (status.backlog_fault || status.alarm) {
            warn!(
                backlog_fault = status.backlog_fault,
                alarm = status.alarm,
                "Drive fault, powering off"
            );
            handle.set_power_on(false);
            tripped = true;
        }

        let now = Instant::now();
        if now >= next_status {
            info!(
                rpm = status.rpm,
                enabled = status.drive_enabled,
                current = status.current,
                desired = status.desired,
                steps = step.rising_edges(),
                "Status"
            );
            next_status = now + status_interval;
        }
        if deadline.is_some_and(|d| now >= d) {
            info!("Run duration elapsed");
            break;
        }

        std::thread::sleep(FOREGROUND_PERIOD);
    }

    running.store(false, Ordering::SeqCst);
    periodic
        .join()
        .map_err(|_| "periodic thread panicked")??;

    let status = handle.status();
    info!(
        current = status.current,
        desired = status.desired,
        steps = step.rising_edges(),
        "Final position"
    );
    Ok(())
}

/// Setup tracing subscriber from CLI flags and the configured base level.
fn setup_tracing(args: &Args, base: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        base.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
