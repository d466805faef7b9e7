//! Always-on measurements: interface throughput once per tick and a TCP
//! handshake latency probe on a slower cadence.

pub mod counters;
pub mod history;
pub mod probe;
pub mod throughput;

use crate::settings::MonitorSettings;
use counters::CounterSource;
use history::{LatencyHistory, LatencyPoint, LatencyStats};
use parking_lot::Mutex;
use probe::LatencyProbe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use throughput::{ThroughputSample, ThroughputSampler};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

pub struct Monitor {
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self { settings }
    }

    /// Spawns the throughput and latency tasks on the current runtime.
    pub fn spawn<S>(self, source: S) -> MonitorHandle
    where
        S: CounterSource + 'static,
    {
        let (throughput_tx, throughput_rx) = watch::channel(ThroughputSample::default());
        let (wake_tx, wake_rx) = watch::channel(0u64);
        let history = Arc::new(Mutex::new(LatencyHistory::new()));

        let throughput_task = tokio::spawn(run_throughput(
            source,
            self.settings.throughput_interval(),
            throughput_tx,
            wake_rx.clone(),
        ));

        let probe = LatencyProbe::new(
            self.settings.probe_host.clone(),
            self.settings.probe_port,
            self.settings.probe_timeout(),
        );
        let latency_task = tokio::spawn(run_latency(
            probe,
            self.settings.latency_interval(),
            history.clone(),
            wake_rx,
        ));

        info!(
            throughput_every = ?self.settings.throughput_interval(),
            latency_every = ?self.settings.latency_interval(),
            probe = %format!("{}:{}", self.settings.probe_host, self.settings.probe_port),
            "monitor started"
        );

        MonitorHandle {
            throughput_rx,
            history,
            wake_tx,
            tasks: vec![throughput_task, latency_task],
        }
    }
}

/// Read side of a running [`Monitor`]. Dropping it stops the monitor.
pub struct MonitorHandle {
    throughput_rx: watch::Receiver<ThroughputSample>,
    history: Arc<Mutex<LatencyHistory>>,
    wake_tx: watch::Sender<u64>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn subscribe_throughput(&self) -> watch::Receiver<ThroughputSample> {
        self.throughput_rx.clone()
    }

    pub fn recent_latency(&self) -> Vec<LatencyPoint> {
        self.history.lock().get_recent(Instant::now())
    }

    pub fn latest_latency(&self) -> Option<LatencyPoint> {
        self.history.lock().latest()
    }

    pub fn latency_stats(&self) -> LatencyStats {
        self.history.lock().stats(Instant::now())
    }

    /// Resume-from-sleep hook: drops the throughput baseline and restarts both timers.
    pub fn notify_wake(&self) {
        info!("system wake, resetting monitor timers");
        self.wake_tx.send_modify(|generation| *generation += 1);
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_throughput<S: CounterSource>(
    mut source: S,
    period: Duration,
    tx: watch::Sender<ThroughputSample>,
    mut wake_rx: watch::Receiver<u64>,
) {
    let mut sampler = ThroughputSampler::new();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = source.read();
                let sample = sampler.poll(snapshot, snapshot.timestamp);
                debug!(down = sample.download_bps, up = sample.upload_bps, "throughput sample");
                tx.send_replace(sample);
            }
            changed = wake_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                sampler.reset();
                ticker.reset();
            }
        }
    }
}

async fn run_latency(
    probe: LatencyProbe,
    period: Duration,
    history: Arc<Mutex<LatencyHistory>>,
    mut wake_rx: watch::Receiver<u64>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Probes run one at a time, so timestamps are appended in order.
                let latency_ms = probe.measure().await;
                debug!(latency_ms, "latency sample");
                history.lock().record(LatencyPoint {
                    timestamp: Instant::now(),
                    latency_ms,
                });
            }
            changed = wake_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                ticker.reset();
            }
        }
    }
}
