//! Human-readable rates for terminal output.

/// Interface throughput, 1024-based: `512 B/s`, `1.5 K/s`, `12.0 M/s`.
pub fn format_bytes_per_sec(bps: f64) -> String {
    const K: f64 = 1024.0;
    if bps < K {
        format!("{:.0} B/s", bps.max(0.0))
    } else if bps < K * K {
        format!("{:.1} K/s", bps / K)
    } else if bps < K * K * K {
        format!("{:.1} M/s", bps / (K * K))
    } else {
        format!("{:.2} G/s", bps / (K * K * K))
    }
}

/// Speed test result in bits per second, decimal steps. Input is bytes per second.
pub fn format_bitrate(bytes_per_sec: f64) -> String {
    let bits = bytes_per_sec * 8.0;
    if bits <= 0.0 {
        "n/a".to_string()
    } else if bits < 1_000.0 {
        format!("{:.0} bps", bits)
    } else if bits < 1_000_000.0 {
        format!("{:.0} Kbps", bits / 1_000.0)
    } else if bits < 1_000_000_000.0 {
        format!("{:.1} Mbps", bits / 1_000_000.0)
    } else {
        format!("{:.2} Gbps", bits / 1_000_000_000.0)
    }
}

pub fn format_latency(latency_ms: f64) -> String {
    if latency_ms < 0.0 {
        "timeout".to_string()
    } else {
        format!("{:.0} ms", latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_steps_by_1024() {
        assert_eq!(format_bytes_per_sec(0.0), "0 B/s");
        assert_eq!(format_bytes_per_sec(1023.0), "1023 B/s");
        assert_eq!(format_bytes_per_sec(1536.0), "1.5 K/s");
        assert_eq!(format_bytes_per_sec(3.0 * 1024.0 * 1024.0), "3.0 M/s");
        assert_eq!(format_bytes_per_sec(2.0 * 1024.0 * 1024.0 * 1024.0), "2.00 G/s");
    }

    #[test]
    fn bitrate_steps_by_1000() {
        assert_eq!(format_bitrate(0.0), "n/a");
        assert_eq!(format_bitrate(100.0), "800 bps");
        assert_eq!(format_bitrate(125.0), "1 Kbps");
        assert_eq!(format_bitrate(12_500_000.0), "100.0 Mbps");
        assert_eq!(format_bitrate(125_000_000.0), "1.00 Gbps");
    }

    #[test]
    fn latency_sentinel() {
        assert_eq!(format_latency(-1.0), "timeout");
        assert_eq!(format_latency(23.4), "23 ms");
    }
}
