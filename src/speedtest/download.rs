use super::run::{Cancelled, Outcome, RunContext};
use super::rate;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tries each candidate URL in order; the first one that yields a positive
/// rate wins. Every candidate failing reads as zero, not an error.
pub struct DownloadTest {
    client: reqwest::Client,
    urls: Vec<String>,
    timeout: Duration,
}

impl DownloadTest {
    pub fn new(client: reqwest::Client, urls: Vec<String>, timeout: Duration) -> Self {
        Self { client, urls, timeout }
    }

    pub(crate) async fn run(&self, ctx: &mut RunContext) -> Result<f64, Cancelled> {
        for url in &self.urls {
            let bps = self.measure(url, ctx).await?;
            if bps > 0.0 && bps.is_finite() {
                info!(%url, bytes_per_sec = bps, "download measured");
                return Ok(bps);
            }
            warn!(%url, "download candidate produced no measurement, trying next");
        }
        Ok(0.0)
    }

    async fn measure(&self, url: &str, ctx: &mut RunContext) -> Result<f64, Cancelled> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;

        let response = match ctx.checkpoint(self.client.get(url).send(), deadline).await {
            Outcome::Done(Ok(response)) => response,
            Outcome::Done(Err(e)) => {
                warn!(%url, error = %e, "download request failed");
                return Ok(0.0);
            }
            Outcome::TimedOut => {
                warn!(%url, timeout = ?self.timeout, "download timed out before response");
                return Ok(0.0);
            }
            Outcome::Cancelled => return Err(Cancelled),
        };

        if !response.status().is_success() {
            warn!(%url, status = %response.status(), "download endpoint rejected request");
            return Ok(0.0);
        }

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        loop {
            match ctx.checkpoint(stream.next(), deadline).await {
                Outcome::Done(Some(Ok(chunk))) => received += chunk.len() as u64,
                Outcome::Done(Some(Err(e))) => {
                    warn!(%url, error = %e, received, "download stream broke off");
                    break;
                }
                Outcome::Done(None) => break,
                Outcome::TimedOut => {
                    debug!(%url, received, "download hit timeout, measuring partial transfer");
                    break;
                }
                Outcome::Cancelled => return Err(Cancelled),
            }
        }

        Ok(rate(received, start.elapsed()))
    }
}
