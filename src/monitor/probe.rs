use super::history::LATENCY_FAILED;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Times a single TCP handshake. The handshake duration is the signal; no
/// payload is exchanged.
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl LatencyProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Returns the handshake time in milliseconds, or [`LATENCY_FAILED`] on
    /// timeout or connection error.
    ///
    /// Connect and timer race; whichever finishes first decides the result and
    /// the other future is dropped, which closes any half-open socket.
    pub async fn measure(&self) -> f64 {
        let start = Instant::now();

        tokio::select! {
            connected = TcpStream::connect((self.host.as_str(), self.port)) => match connected {
                Ok(stream) => {
                    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                    drop(stream);
                    latency_ms
                }
                Err(e) => {
                    debug!(host = %self.host, port = self.port, error = %e, "latency probe failed");
                    LATENCY_FAILED
                }
            },
            _ = tokio::time::sleep(self.timeout) => {
                debug!(host = %self.host, port = self.port, timeout = ?self.timeout, "latency probe timed out");
                LATENCY_FAILED
            }
        }
    }
}
