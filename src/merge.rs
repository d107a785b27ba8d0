//! Folding per-interface windows into the cross-interface view.

use crate::models::{DeviceStats, Snapshot};
use std::collections::hash_map::Entry;
use std::net::IpAddr;

/// Folds `src` into `dest`.
///
/// Additive fields and content bytes are summed, including the speeds, so a
/// device seen on two interfaces shows their combined throughput. Name,
/// connection type and interface stay as the first inserted record had them.
/// Not idempotent: each snapshot must be merged exactly once, which is why
/// `src` is taken by value.
pub fn merge(dest: &mut Snapshot, src: Snapshot) {
    for (addr, stats) in src {
        match dest.entry(addr) {
            Entry::Vacant(e) => {
                e.insert(stats);
            }
            Entry::Occupied(mut e) => merge_device(e.get_mut(), stats),
        }
    }
}

fn merge_device(dest: &mut DeviceStats, src: DeviceStats) {
    dest.bytes_received += src.bytes_received;
    dest.bytes_sent += src.bytes_sent;
    dest.total_downloaded += src.total_downloaded;
    dest.total_uploaded += src.total_uploaded;
    dest.download_speed += src.download_speed;
    dest.upload_speed += src.upload_speed;
    dest.last_update_time = dest.last_update_time.max(src.last_update_time);

    for (key, content) in src.top_content {
        dest.top_content
            .entry(key)
            .and_modify(|existing| existing.bytes += content.bytes)
            .or_insert(content);
    }
}

/// Cross-interface view handed to the display each cycle.
///
/// Lifetime totals, names and content usage persist for the life of the
/// process. Window counters and speeds describe the current cycle only.
#[derive(Debug, Clone, Default)]
pub struct CombinedView {
    devices: Snapshot,
    cycles: u64,
}

impl CombinedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-cycle fields ahead of a new round of merges.
    pub fn begin_cycle(&mut self) {
        self.cycles += 1;
        for stats in self.devices.values_mut() {
            stats.bytes_received = 0;
            stats.bytes_sent = 0;
            stats.download_speed = 0.0;
            stats.upload_speed = 0.0;
        }
    }

    pub fn merge(&mut self, snapshot: Snapshot) {
        merge(&mut self.devices, snapshot);
    }

    pub fn devices(&self) -> &Snapshot {
        &self.devices
    }

    pub fn get(&self, addr: &IpAddr) -> Option<&DeviceStats> {
        self.devices.get(addr)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Devices ordered by address, for stable rendering.
    pub fn sorted(&self) -> Vec<(&IpAddr, &DeviceStats)> {
        let mut rows: Vec<_> = self.devices.iter().collect();
        rows.sort_by_key(|(addr, _)| **addr);
        rows
    }
}

impl From<Snapshot> for CombinedView {
    fn from(devices: Snapshot) -> Self {
        Self { devices, cycles: 0 }
    }
}
