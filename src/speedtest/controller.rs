//! Speed test orchestration: Connecting, then Download, then Upload, then a
//! terminal Completed/Failed state.
//!
//! Only one run may be active. `start()` while a run is in progress is
//! rejected with [`Error::AlreadyRunning`] and publishes nothing. `cancel()`
//! ends the run immediately from the caller's point of view: no further state
//! is published for it, and the worker notices at its next checkpoint
//! (at most one checkpoint interval later) and drops its in-flight request.

use super::download::DownloadTest;
use super::run::{RunContext, StateBus};
use super::upload::UploadTest;
use super::{SpeedTestResult, SpeedTestState, TestPhase};
use crate::error::{Error, Result};
use crate::settings::SpeedTestSettings;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 64;
const DOWNLOAD_CEILING: f64 = 0.6;

pub struct SpeedTestController {
    bus: Arc<StateBus>,
    settings: Arc<SpeedTestSettings>,
    client: reqwest::Client,
}

impl SpeedTestController {
    pub fn new(settings: SpeedTestSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            bus: Arc::new(StateBus::new(EVENT_CAPACITY)),
            settings: Arc::new(settings),
            client,
        })
    }

    /// Every state published from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<SpeedTestState> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> SpeedTestState {
        self.bus.current()
    }

    pub fn is_running(&self) -> bool {
        self.bus.is_running()
    }

    /// Publishes `Testing(0, Connecting)` before returning, then runs both
    /// phases on a spawned task. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let first = SpeedTestState::Testing {
            progress: 0.0,
            phase: TestPhase::Connecting,
        };
        let Some(flag) = self.bus.begin(first) else {
            warn!("speed test already running, start rejected");
            return Err(Error::AlreadyRunning);
        };

        info!("speed test started");
        tokio::spawn(run_test(
            self.bus.clone(),
            self.settings.clone(),
            self.client.clone(),
            flag,
        ));
        Ok(())
    }

    /// Returns whether a run was active.
    pub fn cancel(&self) -> bool {
        let cancelled = self.bus.cancel();
        if cancelled {
            info!("speed test cancelled");
        }
        cancelled
    }
}

async fn run_test(
    bus: Arc<StateBus>,
    settings: Arc<SpeedTestSettings>,
    client: reqwest::Client,
    flag: Arc<AtomicBool>,
) {
    let mut ctx = RunContext::new(bus, flag, settings.checkpoint_interval());

    if ctx.enter_phase(TestPhase::Download, 0.0, DOWNLOAD_CEILING).is_err() {
        return;
    }
    let download = DownloadTest::new(client.clone(), settings.download_urls.clone(), settings.request_timeout());
    let Ok(download_bps) = download.run(&mut ctx).await else {
        info!("speed test stopped during download");
        return;
    };

    if ctx.enter_phase(TestPhase::Upload, DOWNLOAD_CEILING, 1.0).is_err() {
        return;
    }
    let upload = UploadTest::new(
        client,
        settings.upload_url.clone(),
        settings.upload_size_bytes,
        settings.request_timeout(),
    );
    let Ok(upload_bps) = upload.run(&mut ctx).await else {
        info!("speed test stopped during upload");
        return;
    };

    let complete = SpeedTestState::Testing {
        progress: 1.0,
        phase: TestPhase::Complete,
    };
    if ctx.publish(complete).is_err() {
        return;
    }
    tokio::time::sleep(settings.complete_pause()).await;

    let outcome = SpeedTestResult {
        download_bps,
        upload_bps,
    }
    .into_state();
    if ctx.publish(outcome).is_ok() {
        info!(download_bps, upload_bps, failed = outcome == SpeedTestState::Failed, "speed test finished");
    } else if ctx.is_cancelled() {
        info!("speed test cancelled before its result was published");
    }
}
