mod error;
mod format;
mod monitor;
mod settings;
mod speedtest;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use format::{format_bitrate, format_bytes_per_sec, format_latency};
use monitor::counters::SysinfoCounters;
use monitor::Monitor;
use settings::Settings;
use speedtest::{SpeedTestController, SpeedTestState};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Wall-clock jump between two display ticks that we treat as a sleep/wake cycle.
const WAKE_GAP: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "netpulse", version, about = "Network throughput, latency and speed test")]
struct Args {
    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print live throughput and latency
    Monitor {
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Run one download + upload speed test
    Speedtest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("netpulse={}", args.log_level))),
        )
        .init();

    let settings = match &args.config {
        Some(path) => Settings::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    };

    match args.command {
        Command::Monitor { seconds } => run_monitor(settings, seconds).await,
        Command::Speedtest => run_speedtest(settings).await,
    }
}

async fn run_monitor(settings: Settings, seconds: Option<u64>) -> Result<()> {
    let period = settings.monitor.throughput_interval();
    let source = SysinfoCounters::new(settings.monitor.interface_prefixes.clone());
    let mut handle = Monitor::new(settings.monitor).spawn(source);
    let mut updates = handle.subscribe_throughput();

    let stop = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(stop);

    let mut last_wall = SystemTime::now();
    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = updates.changed() => {
                changed.context("monitor stopped unexpectedly")?;
                let sample = *updates.borrow_and_update();

                let wall = SystemTime::now();
                let gap = wall.duration_since(last_wall).unwrap_or_default();
                last_wall = wall;
                if gap >= WAKE_GAP + period {
                    handle.notify_wake();
                }

                let latency = handle
                    .latest_latency()
                    .map(|p| format_latency(p.latency_ms))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "↓ {:>10}  ↑ {:>10}  ping {}",
                    format_bytes_per_sec(sample.download_bps),
                    format_bytes_per_sec(sample.upload_bps),
                    latency
                );
            }
        }
    }

    let stats = handle.latency_stats();
    println!(
        "latency over the last {} points: {} ok, {} failed, min {:.0} / avg {:.0} / max {:.0} ms, jitter {:.1} ms",
        handle.recent_latency().len(),
        stats.samples,
        stats.failures,
        stats.min_ms, stats.avg_ms, stats.max_ms, stats.jitter_ms
    );
    handle.shutdown();
    Ok(())
}

async fn run_speedtest(settings: Settings) -> Result<()> {
    let controller = SpeedTestController::new(settings.speedtest).context("building http client")?;
    let mut events = controller.subscribe();
    controller.start()?;

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                controller.cancel();
                println!("cancelled");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(SpeedTestState::Testing { progress, phase }) => {
                    println!("{:<10} {:>5.1}%", phase.label(), progress * 100.0);
                }
                Ok(state @ SpeedTestState::Completed { .. }) => {
                    let result = state.result().unwrap_or_default();
                    println!("download {}", format_bitrate(result.download_bps));
                    println!("upload   {}", format_bitrate(result.upload_bps));
                    return Ok(());
                }
                Ok(SpeedTestState::Failed) => {
                    anyhow::bail!("speed test failed: no endpoint produced a measurement");
                }
                Ok(SpeedTestState::Idle) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}
