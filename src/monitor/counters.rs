//! Cumulative interface byte counters.
//!
//! The sampler only needs "total bytes received/sent so far"; where those numbers
//! come from is behind [`CounterSource`] so the rate math can be driven by tests
//! or by other platforms' counter APIs.

use std::time::Instant;
use sysinfo::Networks;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteCounterSnapshot {
    pub timestamp: Instant,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

pub trait CounterSource: Send {
    /// Cumulative (received, sent) bytes across active, non-loopback interfaces.
    fn read(&mut self) -> ByteCounterSnapshot;
}

/// Reads counters through `sysinfo`, summing only interfaces whose name starts
/// with one of the configured prefixes.
pub struct SysinfoCounters {
    prefixes: Vec<String>,
}

impl SysinfoCounters {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    fn is_counted(&self, name: &str) -> bool {
        if is_loopback(name) {
            return false;
        }
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

impl CounterSource for SysinfoCounters {
    fn read(&mut self) -> ByteCounterSnapshot {
        let networks = Networks::new_with_refreshed_list();
        let (rx_bytes, tx_bytes) = networks
            .list()
            .iter()
            .filter(|(name, _)| self.is_counted(name))
            .fold((0u64, 0u64), |(rx, tx), (name, data)| {
                trace!(interface = %name, rx = data.total_received(), tx = data.total_transmitted());
                (
                    rx.saturating_add(data.total_received()),
                    tx.saturating_add(data.total_transmitted()),
                )
            });

        ByteCounterSnapshot {
            timestamp: Instant::now(),
            rx_bytes,
            tx_bytes,
        }
    }
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.eq_ignore_ascii_case("loopback")
}
