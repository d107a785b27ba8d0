use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// One interface's accumulation window, keyed by device address.
pub type Snapshot = HashMap<IpAddr, DeviceStats>;

/// Transport classification of a frame.
///
/// Variants are declared in label order so the derived `Ord` sorts the same
/// way the labels do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Protocol {
    #[serde(rename = "ICMP")]
    Icmp,
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    Unknown,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Icmp => "ICMP",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(protocol, port)`; port is 0 when the protocol has none.
pub type ContentKey = (Protocol, u16);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentStats {
    pub protocol: Protocol,
    pub port: u16,
    pub bytes: u64,
}

impl ContentStats {
    pub fn new((protocol, port): ContentKey) -> Self {
        Self {
            protocol,
            port,
            bytes: 0,
        }
    }

    pub fn key(&self) -> ContentKey {
        (self.protocol, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionType {
    #[serde(rename = "Wi-Fi")]
    WiFi,
    Ethernet,
}

impl ConnectionType {
    /// Wireless interfaces are named `wl*` on Linux, or carry "wifi" somewhere
    /// in their name on setups that rename them.
    pub fn from_interface(name: &str) -> Self {
        if name.starts_with("wl") || name.to_ascii_lowercase().contains("wifi") {
            ConnectionType::WiFi
        } else {
            ConnectionType::Ethernet
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::WiFi => f.write_str("Wi-Fi"),
            ConnectionType::Ethernet => f.write_str("Ethernet"),
        }
    }
}

/// Direction of a transfer relative to the tracked device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

pub const UNKNOWN_DEVICE: &str = "Unknown";

/// Traffic record for one local address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub total_downloaded: u64,
    pub total_uploaded: u64,
    /// Bytes per second, from the spacing of the last two frames.
    pub download_speed: f64,
    pub upload_speed: f64,
    pub last_update_time: Option<DateTime<Utc>>,
    pub device_name: String,
    pub connection_type: ConnectionType,
    pub interface: String,
    #[serde(serialize_with = "content_by_bytes")]
    pub top_content: HashMap<ContentKey, ContentStats>,
}

impl DeviceStats {
    pub fn new(
        device_name: impl Into<String>,
        connection_type: ConnectionType,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            bytes_received: 0,
            bytes_sent: 0,
            total_downloaded: 0,
            total_uploaded: 0,
            download_speed: 0.0,
            upload_speed: 0.0,
            last_update_time: None,
            device_name: device_name.into(),
            connection_type,
            interface: interface.into(),
            top_content: HashMap::new(),
        }
    }

    /// Accounts `bytes` in `direction` at `now`.
    ///
    /// The rate is a per-event value, `bytes / (now - last_update_time)`, not a
    /// windowed average, so bursty traffic gives noisy numbers. It is left
    /// untouched on the first frame and whenever the clock has not advanced.
    pub fn record_transfer(&mut self, direction: Direction, bytes: u64, now: DateTime<Utc>) {
        let elapsed = self
            .last_update_time
            .and_then(|last| (now - last).to_std().ok())
            .map(|d| d.as_secs_f64())
            .filter(|secs| *secs > 0.0);

        match direction {
            Direction::Sent => {
                if let Some(secs) = elapsed {
                    self.upload_speed = bytes as f64 / secs;
                }
                self.bytes_sent += bytes;
                self.total_uploaded += bytes;
            }
            Direction::Received => {
                if let Some(secs) = elapsed {
                    self.download_speed = bytes as f64 / secs;
                }
                self.bytes_received += bytes;
                self.total_downloaded += bytes;
            }
        }
        self.last_update_time = Some(now);
    }

    pub fn record_content(&mut self, key: ContentKey, bytes: u64) {
        self.top_content
            .entry(key)
            .or_insert_with(|| ContentStats::new(key))
            .bytes += bytes;
    }

    /// Content entry with the most bytes. Ties go to the smallest
    /// `(protocol, port)` so the choice does not depend on map order.
    pub fn top_content(&self) -> Option<&ContentStats> {
        self.top_content
            .values()
            .max_by(|a, b| a.bytes.cmp(&b.bytes).then_with(|| b.key().cmp(&a.key())))
    }
}

fn content_by_bytes<S>(content: &HashMap<ContentKey, ContentStats>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut entries: Vec<&ContentStats> = content.values().collect();
    entries.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.key().cmp(&b.key())));
    serializer.collect_seq(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn device() -> DeviceStats {
        DeviceStats::new("laptop", ConnectionType::Ethernet, "eth0")
    }

    #[test]
    fn first_frame_counts_bytes_without_rate() {
        let mut stats = device();
        stats.record_transfer(Direction::Received, 1500, t0());

        assert_eq!(stats.bytes_received, 1500);
        assert_eq!(stats.total_downloaded, 1500);
        assert_eq!(stats.download_speed, 0.0);
        assert_eq!(stats.last_update_time, Some(t0()));
    }

    #[test]
    fn rate_is_bytes_over_gap() {
        let mut stats = device();
        stats.record_transfer(Direction::Sent, 100, t0());
        stats.record_transfer(Direction::Sent, 3000, t0() + Duration::milliseconds(250));

        assert_relative_eq!(stats.upload_speed, 12_000.0);
        assert_eq!(stats.bytes_sent, 3100);
        assert_eq!(stats.total_uploaded, 3100);
        assert_eq!(stats.download_speed, 0.0);
    }

    #[test]
    fn same_instant_keeps_previous_rate() {
        let mut stats = device();
        stats.record_transfer(Direction::Received, 100, t0());
        stats.record_transfer(Direction::Received, 500, t0() + Duration::seconds(1));
        stats.record_transfer(Direction::Received, 900, t0() + Duration::seconds(1));

        assert_relative_eq!(stats.download_speed, 500.0);
        assert_eq!(stats.bytes_received, 1500);
    }

    #[test]
    fn clock_going_backwards_skips_rate() {
        let mut stats = device();
        stats.record_transfer(Direction::Received, 100, t0());
        stats.record_transfer(Direction::Received, 100, t0() - Duration::seconds(1));

        assert_eq!(stats.download_speed, 0.0);
        assert_eq!(stats.bytes_received, 200);
        assert_eq!(stats.last_update_time, Some(t0() - Duration::seconds(1)));
    }

    #[test]
    fn content_accumulates_per_key() {
        let mut stats = device();
        stats.record_content((Protocol::Tcp, 443), 1000);
        stats.record_content((Protocol::Tcp, 443), 500);
        stats.record_content((Protocol::Udp, 53), 80);

        assert_eq!(stats.top_content.len(), 2);
        assert_eq!(stats.top_content[&(Protocol::Tcp, 443)].bytes, 1500);
        assert_eq!(stats.top_content[&(Protocol::Udp, 53)].bytes, 80);
    }

    #[test]
    fn top_content_picks_largest() {
        let mut stats = device();
        stats.record_content((Protocol::Tcp, 443), 5000);
        stats.record_content((Protocol::Udp, 53), 200);

        let top = stats.top_content().unwrap();
        assert_eq!(top.key(), (Protocol::Tcp, 443));
        assert_eq!(top.bytes, 5000);
    }

    #[test]
    fn top_content_ties_prefer_lowest_key() {
        let mut stats = device();
        stats.record_content((Protocol::Udp, 53), 700);
        stats.record_content((Protocol::Tcp, 8080), 700);
        stats.record_content((Protocol::Tcp, 443), 700);
        stats.record_content((Protocol::Icmp, 0), 10);

        assert_eq!(stats.top_content().unwrap().key(), (Protocol::Tcp, 443));
    }

    #[test]
    fn top_content_empty() {
        assert!(device().top_content().is_none());
    }

    #[test]
    fn wireless_interface_names() {
        assert_eq!(ConnectionType::from_interface("wlan0"), ConnectionType::WiFi);
        assert_eq!(ConnectionType::from_interface("wlp3s0"), ConnectionType::WiFi);
        assert_eq!(ConnectionType::from_interface("usb-wifi1"), ConnectionType::WiFi);
        assert_eq!(ConnectionType::from_interface("eth0"), ConnectionType::Ethernet);
        assert_eq!(ConnectionType::from_interface("en0"), ConnectionType::Ethernet);
    }

    #[test]
    fn serializes_content_sorted_by_bytes() {
        let mut stats = device();
        stats.record_content((Protocol::Udp, 53), 10);
        stats.record_content((Protocol::Tcp, 443), 90);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["connection_type"], "Ethernet");
        assert_eq!(json["top_content"][0]["protocol"], "TCP");
        assert_eq!(json["top_content"][0]["port"], 443);
        assert_eq!(json["top_content"][1]["protocol"], "UDP");
    }
}
