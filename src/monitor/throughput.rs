use super::counters::ByteCounterSnapshot;
use std::time::{Duration, Instant};
use tracing::debug;

/// A gap this long between polls means the baseline no longer describes
/// "one tick ago" (sleep, suspend, stalled scheduler).
pub const STALE_BASELINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThroughputSample {
    pub download_bps: f64,
    pub upload_bps: f64,
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    rx_bytes: u64,
    tx_bytes: u64,
    at: Instant,
}

/// Turns cumulative byte counters into per-second rates.
///
/// Not synchronized: callers confine `poll`/`reset` to one task or wrap it in a lock.
#[derive(Debug, Default)]
pub struct ThroughputSampler {
    baseline: Option<Baseline>,
}

impl ThroughputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every anomaly (first call, clock going backwards, stale baseline,
    /// counter reset) rebases and reads as zero.
    pub fn poll(&mut self, current: ByteCounterSnapshot, now: Instant) -> ThroughputSample {
        let previous = self.baseline.replace(Baseline {
            rx_bytes: current.rx_bytes,
            tx_bytes: current.tx_bytes,
            at: now,
        });

        let last = match previous {
            Some(last) if last.rx_bytes != 0 => last,
            _ => return ThroughputSample::default(),
        };

        let elapsed = match now.checked_duration_since(last.at) {
            Some(elapsed) if !elapsed.is_zero() && elapsed < STALE_BASELINE => elapsed,
            other => {
                debug!(elapsed = ?other, "throughput baseline stale, rebasing");
                return ThroughputSample::default();
            }
        };

        if current.rx_bytes < last.rx_bytes || current.tx_bytes < last.tx_bytes {
            debug!(
                rx = current.rx_bytes,
                last_rx = last.rx_bytes,
                tx = current.tx_bytes,
                last_tx = last.tx_bytes,
                "interface counters went backwards, rebasing"
            );
            return ThroughputSample::default();
        }

        let secs = elapsed.as_secs_f64();
        ThroughputSample {
            download_bps: (current.rx_bytes - last.rx_bytes) as f64 / secs,
            upload_bps: (current.tx_bytes - last.tx_bytes) as f64 / secs,
        }
    }

    /// Forgets the baseline so the next `poll` rebases silently. Call after wake from sleep.
    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(at: Instant, rx: u64, tx: u64) -> ByteCounterSnapshot {
        ByteCounterSnapshot {
            timestamp: at,
            rx_bytes: rx,
            tx_bytes: tx,
        }
    }

    fn poll_at(s: &mut ThroughputSampler, t0: Instant, ms: u64, rx: u64, tx: u64) -> ThroughputSample {
        let now = t0 + Duration::from_millis(ms);
        s.poll(snap(now, rx, tx), now)
    }

    #[test]
    fn first_poll_is_zero() {
        let mut s = ThroughputSampler::new();
        let t0 = Instant::now();
        assert_eq!(poll_at(&mut s, t0, 0, 1_000_000, 20), ThroughputSample::default());
    }

    #[test]
    fn rate_then_stale_gap() {
        let mut s = ThroughputSampler::new();
        let t0 = Instant::now();

        assert_eq!(poll_at(&mut s, t0, 0, 1000, 500), ThroughputSample::default());

        let sample = poll_at(&mut s, t0, 1000, 3000, 1500);
        assert_eq!(sample.download_bps, 2000.0);
        assert_eq!(sample.upload_bps, 1000.0);

        // 11s gap
        assert_eq!(poll_at(&mut s, t0, 12_000, 4000, 2000), ThroughputSample::default());

        // rebased at t=12s, so the next tick measures from there
        let sample = poll_at(&mut s, t0, 12_500, 5000, 2100);
        assert_eq!(sample.download_bps, 2000.0);
        assert_eq!(sample.upload_bps, 200.0);
    }

    #[test]
    fn fractional_elapsed() {
        let mut s = ThroughputSampler::new();
        let t0 = Instant::now();
        poll_at(&mut s, t0, 0, 10_000, 10_000);
        let sample = poll_at(&mut s, t0, 250, 10_500, 10_000);
        assert_eq!(sample.download_bps, 2000.0);
        assert_eq!(sample.upload_bps, 0.0);
    }

    #[test]
    fn counter_reset_rebases() {
        let mut s = ThroughputSampler::new();
        let t0 = Instant::now();
        poll_at(&mut s, t0, 0, 50_000, 50_000);
        assert_eq!(poll_at(&mut s, t0, 1000, 100, 60_000), ThroughputSample::default());

        let sample = poll_at(&mut s, t0, 2000, 1100, 61_000);
        assert_eq!(sample.download_bps, 1000.0);
        assert_eq!(sample.upload_bps, 1000.0);
    }

    #[test]
    fn tx_decrease_alone_rebases() {
        let mut s = ThroughputSampler::new();
        let t0 = Instant::now();
        poll_at(&mut s, t0, 0, 1000, 1000);
        assert_eq!(poll_at(&mut s, t0, 1000, 2000, 10), ThroughputSample::default());
    }

    #[test]
    fn zero_or_negative_elapsed_rebases() {
        let mut s = ThroughputSampler::new();
        let t0 = Instant::now() + Duration::from_secs(5);
        poll_at(&mut s, t0, 0, 1000, 1000);
        assert_eq!(poll_at(&mut s, t0, 0, 2000, 2000), ThroughputSample::default());

        let earlier = t0 - Duration::from_secs(1);
        let sample = s.poll(snap(earlier, 3000, 3000), earlier);
        assert_eq!(sample, ThroughputSample::default());
        assert!(sample.download_bps.is_finite());
    }

    #[test]
    fn reset_forces_silent_rebase() {
        let mut s = ThroughputSampler::new();
        let t0 = Instant::now();
        poll_at(&mut s, t0, 0, 1000, 1000);
        s.reset();
        assert_eq!(poll_at(&mut s, t0, 1000, 9000, 9000), ThroughputSample::default());
        let sample = poll_at(&mut s, t0, 2000, 10_000, 9_500);
        assert_eq!(sample.download_bps, 1000.0);
        assert_eq!(sample.upload_bps, 500.0);
    }

    #[test]
    fn zero_rx_baseline_counts_as_unsampled() {
        let mut s = ThroughputSampler::new();
        let t0 = Instant::now();
        poll_at(&mut s, t0, 0, 0, 0);
        assert_eq!(poll_at(&mut s, t0, 1000, 5000, 5000), ThroughputSample::default());
    }
}
