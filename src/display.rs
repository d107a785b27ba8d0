use crate::merge::CombinedView;
use crate::models::DeviceStats;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::{self, Write};
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::warn;

/// Receives the combined view once per orchestrator cycle. Implementations
/// must return promptly; throttling is their own business.
pub trait DisplaySink {
    fn update(&mut self, view: &CombinedView);
}

/// Tabular terminal output, redrawn in place.
pub struct TerminalSink<W: Write> {
    out: W,
    min_interval: Duration,
    last_draw: Option<Instant>,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, min_interval: Duration) -> Self {
        Self {
            out,
            min_interval,
            last_draw: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, view: &CombinedView, now: DateTime<Local>) -> io::Result<()> {
        // Clear the screen and move the cursor home.
        write!(self.out, "\x1b[2J\x1b[H")?;
        writeln!(
            self.out,
            "{:<16} {:<24} {:<10} {:<10} {:>12} {:>12} {:>11} {:>11} {:<22} {:<22}",
            "IP Address",
            "Device Name",
            "Connection",
            "Interface",
            "Down Speed",
            "Up Speed",
            "Total Down",
            "Total Up",
            "Top Protocol",
            "Top Port"
        )?;
        writeln!(self.out, "{}", "-".repeat(160))?;

        for (addr, stats) in view.sorted() {
            let (protocol, port) = top_content_columns(stats);
            writeln!(
                self.out,
                "{:<16} {:<24} {:<10} {:<10} {:>12} {:>12} {:>11} {:>11} {:<22} {:<22}",
                addr.to_string(),
                stats.device_name,
                stats.connection_type.to_string(),
                stats.interface,
                format!("{}/s", human_bytes(stats.download_speed as u64)),
                format!("{}/s", human_bytes(stats.upload_speed as u64)),
                human_bytes(stats.total_downloaded),
                human_bytes(stats.total_uploaded),
                protocol,
                port
            )?;
        }

        writeln!(self.out, "\nLast updated: {}", now.format("%H:%M:%S"))?;
        writeln!(self.out, "Press Ctrl+C to exit")?;
        self.out.flush()
    }
}

impl<W: Write> DisplaySink for TerminalSink<W> {
    fn update(&mut self, view: &CombinedView) {
        let now = Instant::now();
        if let Some(last) = self.last_draw {
            if now.duration_since(last) < self.min_interval {
                return;
            }
        }
        self.last_draw = Some(now);

        if let Err(e) = self.draw(view, Local::now()) {
            warn!(error = %e, "failed to draw device table");
        }
    }
}

fn top_content_columns(stats: &DeviceStats) -> (String, String) {
    match stats.top_content() {
        Some(top) => {
            let size = human_bytes(top.bytes);
            (
                format!("{} ({})", top.protocol, size),
                format!("{} ({})", top.port, size),
            )
        }
        None => ("N/A".to_string(), "N/A".to_string()),
    }
}

/// Binary-unit size, one decimal: `512.0 B`, `1.5 KiB`, `3.2 GiB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNIT: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes < UNIT {
        return format!("{:.1} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}iB", bytes / div, prefix)
}

#[derive(Serialize)]
struct DeviceRow<'a> {
    address: &'a IpAddr,
    #[serde(flatten)]
    stats: &'a DeviceStats,
}

#[derive(Serialize)]
struct Report<'a> {
    cycle: u64,
    generated_at: DateTime<Local>,
    devices: Vec<DeviceRow<'a>>,
}

/// One JSON document per line, per cycle.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_report(&mut self, view: &CombinedView) -> io::Result<()> {
        let report = Report {
            cycle: view.cycles(),
            generated_at: Local::now(),
            devices: view
                .sorted()
                .into_iter()
                .map(|(address, stats)| DeviceRow { address, stats })
                .collect(),
        };
        serde_json::to_writer(&mut self.out, &report)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

impl<W: Write> DisplaySink for JsonSink<W> {
    fn update(&mut self, view: &CombinedView) {
        if let Err(e) = self.write_report(view) {
            warn!(error = %e, "failed to write json report");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionType, Direction, Protocol, Snapshot};
    use chrono::Utc;

    fn view() -> CombinedView {
        let mut stats = DeviceStats::new("nas.lan", ConnectionType::Ethernet, "eth0");
        stats.record_transfer(Direction::Received, 2048, Utc::now());
        stats.record_content((Protocol::Tcp, 445), 2048);
        let mut snapshot = Snapshot::new();
        snapshot.insert("192.168.1.4".parse().unwrap(), stats);
        snapshot.insert(
            "192.168.1.30".parse().unwrap(),
            DeviceStats::new("Unknown", ConnectionType::WiFi, "wlan0"),
        );
        let mut view = CombinedView::new();
        view.begin_cycle();
        view.merge(snapshot);
        view
    }

    #[test]
    fn human_readable_sizes() {
        assert_eq!(human_bytes(0), "0.0 B");
        assert_eq!(human_bytes(512), "512.0 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
        assert_eq!(human_bytes(u64::MAX), "16.0 EiB");
    }

    #[test]
    fn table_lists_devices_in_address_order() {
        let mut sink = TerminalSink::new(Vec::new(), Duration::ZERO);
        sink.update(&view());
        let text = String::from_utf8(sink.into_inner()).unwrap();

        let first = text.find("192.168.1.4").unwrap();
        let second = text.find("192.168.1.30").unwrap();
        assert!(first < second);
        assert!(text.contains("nas.lan"));
        assert!(text.contains("TCP (2.0 KiB)"));
        assert!(text.contains("445 (2.0 KiB)"));
        assert!(text.contains("N/A"));
        assert!(text.contains("Wi-Fi"));
        assert!(text.contains("Last updated:"));
    }

    #[test]
    fn table_redraw_is_throttled() {
        let mut sink = TerminalSink::new(Vec::new(), Duration::from_secs(3600));
        sink.update(&view());
        let after_first = sink.out.len();
        sink.update(&view());
        assert_eq!(sink.out.len(), after_first);
    }

    #[test]
    fn table_redraws_once_interval_passes() {
        let mut sink = TerminalSink::new(Vec::new(), Duration::from_millis(20));
        sink.update(&view());
        let after_first = sink.out.len();
        std::thread::sleep(Duration::from_millis(40));
        sink.update(&view());
        assert!(sink.out.len() > after_first);
    }

    #[test]
    fn json_report_per_cycle() {
        let mut sink = JsonSink::new(Vec::new());
        sink.update(&view());
        sink.update(&CombinedView::new());
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let report: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(report["cycle"], 1);
        assert_eq!(report["devices"][0]["address"], "192.168.1.4");
        assert_eq!(report["devices"][0]["device_name"], "nas.lan");
        assert_eq!(report["devices"][0]["bytes_received"], 2048);
        assert_eq!(report["devices"][0]["top_content"][0]["port"], 445);
        assert_eq!(report["devices"][1]["connection_type"], "Wi-Fi");

        let empty: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(empty["devices"].as_array().unwrap().len(), 0);
    }
}
