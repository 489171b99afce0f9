//! # CNC Control
//!
//! Simulated controller over stdin/stdout. Stdout carries the serial
//! protocol, so all logging goes to stderr. The sender on stdin is expected
//! to follow the protocol: send a line, wait for its `ok` or `error:`, and
//! resend a line that got no answer.
//!
//! ```text
//! cnc_control config/cnc.toml
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use cnc_common::config::LogLevel;
use cnc_control::config::{ControllerConfig, load_config};
use cnc_control::dispatcher::Dispatcher;
use cnc_control::error::RunError;
use cnc_control::executor::{MotionExecutor, stepper};
use cnc_control::parser::GcodeParser;
use cnc_control::planner::Planner;
use cnc_control::queue::{MotionAdmission, MotionQueue};
use cnc_control::rt::RtSettings;
use cnc_control::runner::{SuperLoop, spawn_tick_source};
use cnc_control::serial::ChannelSerial;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// CNC Control: streaming G-code front-end
#[derive(Parser, Debug)]
#[command(name = "cnc_control")]
#[command(version)]
#[command(about = "Streaming CNC control front-end with ok/error flow control")]
struct Args {
    /// Path to the controller configuration TOML.
    #[arg(default_value = cnc_common::consts::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// CPU core to pin the tick source to (with `rt` feature).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority of the tick source (with `rt` feature).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Stop after this many loop iterations.
    #[arg(long)]
    max_iterations: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = load_config(&args.config);
    let log_level = match &config {
        Ok(c) => c.shared.log_level,
        Err(_) => LogLevel::Info,
    };
    setup_tracing(&args, log_level);

    info!("CNC Control v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(RunError::from)
        .and_then(|config| run(&args, &config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("CNC Control shutdown complete");
}

fn run(args: &Args, config: &ControllerConfig) -> Result<(), RunError> {
    let axes = config.axis_settings();
    info!(
        service = %config.shared.service_name,
        axes = axes.axis_count,
        queue_capacity = config.stream.queue_capacity,
        tick_rate_hz = config.timing.tick_rate_hz,
        "config OK"
    );

    let (executor, ticker, pulses) = stepper(&config.timing);
    let rt = cfg!(feature = "rt").then_some(RtSettings {
        cpu_core: args.cpu_core,
        priority: args.rt_priority,
    });
    let tick_source = spawn_tick_source(ticker, pulses, config.timing.tick_rate_hz, rt)?;

    let link = ChannelSerial::stdio()?;
    let queue: MotionQueue =
        MotionQueue::new(config.stream.queue_capacity, Planner::from_config(config));
    let mut dispatcher = Dispatcher::new(
        link,
        GcodeParser::new(axes.axis_count),
        queue,
        executor,
        axes,
    );
    dispatcher.send_banner();

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut super_loop = SuperLoop::new(dispatcher);
    // Input closed: finish queued motion, then exit.
    super_loop.run(&running, args.max_iterations, |d| {
        d.link().is_disconnected() && !d.queue().has_pending() && !d.executor().is_busy()
    });

    let loop_stats = *super_loop.stats();
    let dispatch_stats = *super_loop.dispatcher().stats();
    let tick_stats = tick_source.stop()?;

    info!(
        iterations = loop_stats.iterations,
        min_ns = loop_stats.min_ns,
        max_ns = loop_stats.max_ns,
        avg_ns = loop_stats.avg_ns(),
        "super-loop stats"
    );
    info!(
        lines = dispatch_stats.lines,
        acks = dispatch_stats.acks(),
        errors = dispatch_stats.errors,
        deferred = dispatch_stats.deferred,
        blocks = dispatch_stats.blocks_started,
        realtime = dispatch_stats.realtime,
        "dispatch stats"
    );
    info!(
        ticks = tick_stats.timing.iterations,
        pulses = tick_stats.pulses,
        overruns = tick_stats.timing.overruns,
        max_ns = tick_stats.timing.max_ns,
        "tick source stats"
    );
    Ok(())
}

/// Setup tracing subscriber. `RUST_LOG` wins over `--verbose`, which wins
/// over the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
