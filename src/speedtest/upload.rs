use super::run::{Cancelled, Outcome, RunContext};
use super::rate;
use bytes::Bytes;
use rand::{RngCore, SeedableRng};
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_UPLOAD_SIZE: usize = 1_000_000;

/// One POST of a random payload to a single endpoint.
pub struct UploadTest {
    client: reqwest::Client,
    url: String,
    data: Bytes,
    timeout: Duration,
}

impl UploadTest {
    pub fn new(client: reqwest::Client, url: String, upload_size: usize, timeout: Duration) -> Self {
        let mut rng = rand::rngs::StdRng::from_entropy();
        let mut data = vec![0u8; upload_size];
        rng.fill_bytes(&mut data);
        Self {
            client,
            url,
            data: Bytes::from(data),
            timeout,
        }
    }

    pub(crate) async fn run(&self, ctx: &mut RunContext) -> Result<f64, Cancelled> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;

        let request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(self.data.clone())
            .send();

        match ctx.checkpoint(request, deadline).await {
            Outcome::Done(Ok(response)) if response.status().is_success() => {
                let bps = rate(self.data.len() as u64, start.elapsed());
                info!(url = %self.url, bytes_per_sec = bps, "upload measured");
                Ok(bps)
            }
            Outcome::Done(Ok(response)) => {
                warn!(url = %self.url, status = %response.status(), "upload endpoint rejected payload");
                Ok(0.0)
            }
            Outcome::Done(Err(e)) => {
                warn!(url = %self.url, error = %e, "upload request failed");
                Ok(0.0)
            }
            Outcome::TimedOut => {
                warn!(url = %self.url, timeout = ?self.timeout, "upload timed out");
                Ok(0.0)
            }
            Outcome::Cancelled => Err(Cancelled),
        }
    }
}
