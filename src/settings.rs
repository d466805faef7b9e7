use crate::error::{Error, Result};
use crate::monitor::probe::DEFAULT_PROBE_TIMEOUT;
use crate::speedtest::upload::DEFAULT_UPLOAD_SIZE;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub monitor: MonitorSettings,
    pub speedtest: SpeedTestSettings,
}

impl Settings {
    /// Loads settings from a TOML file. Keys missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let periods = [
            ("monitor.throughput_interval_ms", self.monitor.throughput_interval_ms),
            ("monitor.latency_interval_ms", self.monitor.latency_interval_ms),
            ("speedtest.checkpoint_interval_ms", self.speedtest.checkpoint_interval_ms),
        ];
        match periods.iter().find(|(_, ms)| *ms == 0) {
            Some((key, _)) => Err(Error::Config(format!("{key} must be greater than zero"))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSettings {
    pub throughput_interval_ms: u64,
    pub latency_interval_ms: u64,
    pub probe_host: String,
    pub probe_port: u16,
    pub probe_timeout_ms: u64,
    /// Interface name prefixes counted as active adapters (physical, VPN, cellular).
    pub interface_prefixes: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            throughput_interval_ms: 1000,
            latency_interval_ms: 2000,
            probe_host: "1.1.1.1".to_string(),
            probe_port: 443,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
            interface_prefixes: ["en", "eth", "wl", "wlan", "utun", "tun", "wg", "ppp", "pdp_ip", "ww", "rmnet"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl MonitorSettings {
    pub fn throughput_interval(&self) -> Duration {
        Duration::from_millis(self.throughput_interval_ms.max(1))
    }

    pub fn latency_interval(&self) -> Duration {
        Duration::from_millis(self.latency_interval_ms.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeedTestSettings {
    /// Download candidates, tried in order until one yields a usable rate.
    pub download_urls: Vec<String>,
    pub upload_url: String,
    pub request_timeout_secs: u64,
    pub upload_size_bytes: usize,
    pub checkpoint_interval_ms: u64,
    pub complete_pause_ms: u64,
}

impl Default for SpeedTestSettings {
    fn default() -> Self {
        Self {
            download_urls: vec![
                "https://speed.cloudflare.com/__down?bytes=25000000".to_string(),
                "https://proof.ovh.net/files/10Mb.dat".to_string(),
                "http://speedtest.tele2.net/10MB.zip".to_string(),
            ],
            upload_url: "https://speed.cloudflare.com/__up".to_string(),
            request_timeout_secs: 15,
            upload_size_bytes: DEFAULT_UPLOAD_SIZE,
            checkpoint_interval_ms: 500,
            complete_pause_ms: 500,
        }
    }
}

impl SpeedTestSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms.max(1))
    }

    pub fn complete_pause(&self) -> Duration {
        Duration::from_millis(self.complete_pause_ms)
    }
}
