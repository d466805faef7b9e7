use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const HISTORY_WINDOW: Duration = Duration::from_secs(300);

/// Latency value recorded when a probe times out or fails to connect.
pub const LATENCY_FAILED: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyPoint {
    pub timestamp: Instant,
    /// Milliseconds, or [`LATENCY_FAILED`].
    pub latency_ms: f64,
}

impl LatencyPoint {
    pub fn is_failure(&self) -> bool {
        self.latency_ms < 0.0
    }
}

/// Aggregate view over the successful samples currently in the window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyStats {
    pub samples: usize,
    pub failures: usize,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub jitter_ms: f64,
}

/// Append-only latency samples covering the last [`HISTORY_WINDOW`].
///
/// Points must be recorded in timestamp order; pruning only ever trims the front.
#[derive(Debug)]
pub struct LatencyHistory {
    points: VecDeque<LatencyPoint>,
    window: Duration,
}

impl Default for LatencyHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistory {
    pub fn new() -> Self {
        Self::with_window(HISTORY_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            points: VecDeque::new(),
            window,
        }
    }

    pub fn record(&mut self, point: LatencyPoint) {
        let now = point.timestamp;
        self.points.push_back(point);
        self.prune(now);
    }

    pub fn get_recent(&mut self, now: Instant) -> Vec<LatencyPoint> {
        self.prune(now);
        self.points.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<LatencyPoint> {
        self.points.back().copied()
    }

    pub fn stats(&mut self, now: Instant) -> LatencyStats {
        self.prune(now);

        let ok: Vec<f64> = self
            .points
            .iter()
            .filter(|p| !p.is_failure())
            .map(|p| p.latency_ms)
            .collect();
        let failures = self.points.len() - ok.len();

        if ok.is_empty() {
            return LatencyStats {
                failures,
                ..Default::default()
            };
        }

        let avg = ok.iter().sum::<f64>() / ok.len() as f64;
        let jitter = if ok.len() > 1 {
            let variance: f64 = ok.iter().map(|&x| (x - avg).powi(2)).sum::<f64>() / (ok.len() - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        LatencyStats {
            samples: ok.len(),
            failures,
            min_ms: ok.iter().copied().fold(f64::INFINITY, f64::min),
            avg_ms: avg,
            max_ms: ok.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            jitter_ms: jitter,
        }
    }

    fn prune(&mut self, now: Instant) {
        // Early in the process lifetime `now - window` may predate the clock's origin.
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while self.points.front().is_some_and(|p| p.timestamp < cutoff) {
            self.points.pop_front();
        }
    }
}
