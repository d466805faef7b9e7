pub mod controller;
pub mod download;
mod run;
pub mod upload;

pub use controller::SpeedTestController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Connecting,
    Download,
    Upload,
    Complete,
}

impl TestPhase {
    pub fn label(self) -> &'static str {
        match self {
            TestPhase::Connecting => "Connecting",
            TestPhase::Download => "Download",
            TestPhase::Upload => "Upload",
            TestPhase::Complete => "Complete",
        }
    }
}

/// Published on every transition of a speed test run. Rates are bytes per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedTestState {
    Idle,
    Testing { progress: f64, phase: TestPhase },
    Completed { download_bps: f64, upload_bps: f64 },
    Failed,
}

impl SpeedTestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SpeedTestState::Completed { .. } | SpeedTestState::Failed)
    }

    pub fn result(&self) -> Option<SpeedTestResult> {
        match *self {
            SpeedTestState::Completed {
                download_bps,
                upload_bps,
            } => Some(SpeedTestResult {
                download_bps,
                upload_bps,
            }),
            _ => None,
        }
    }
}

/// Measured rates of one run, bytes per second. Zero means the phase produced nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedTestResult {
    pub download_bps: f64,
    pub upload_bps: f64,
}

impl SpeedTestResult {
    /// `Completed` if either phase measured something, `Failed` otherwise.
    pub fn into_state(self) -> SpeedTestState {
        if self.download_bps > 0.0 || self.upload_bps > 0.0 {
            SpeedTestState::Completed {
                download_bps: self.download_bps,
                upload_bps: self.upload_bps,
            }
        } else {
            SpeedTestState::Failed
        }
    }
}

/// Bytes per second over `elapsed`, or zero when nothing was measured.
pub(crate) fn rate(bytes: u64, elapsed: std::time::Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return 0.0;
    }
    let bps = bytes as f64 / secs;
    if bps.is_finite() {
        bps
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_positive_rate_completes() {
        let result = SpeedTestResult {
            download_bps: 0.0,
            upload_bps: 42.0,
        };
        let state = result.into_state();
        assert_eq!(
            state,
            SpeedTestState::Completed {
                download_bps: 0.0,
                upload_bps: 42.0
            }
        );
        assert_eq!(state.result(), Some(result));
    }

    #[test]
    fn nothing_measured_fails() {
        assert_eq!(SpeedTestResult::default().into_state(), SpeedTestState::Failed);
        assert_eq!(SpeedTestState::Failed.result(), None);
    }

    #[test]
    fn rate_guards_zero_elapsed() {
        assert_eq!(rate(1000, std::time::Duration::ZERO), 0.0);
        assert_eq!(rate(0, std::time::Duration::from_secs(1)), 0.0);
        assert_eq!(rate(500, std::time::Duration::from_millis(500)), 1000.0);
    }
}
