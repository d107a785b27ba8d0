//! Per-interface accumulation.
//!
//! An [`Accumulator`] folds classified frames into the current window. An
//! [`InterfaceMonitor`] runs one accumulator on its own thread against a
//! [`FrameSource`], rotating the window every [`WINDOW_PERIOD`] and offering
//! each finished window on a single-slot channel.

use crate::cache::DeviceCache;
use crate::classify::{classify, Frame};
use crate::error::MonitorError;
use crate::models::{ConnectionType, DeviceStats, Direction, Snapshot};
use crate::sniff::FrameSource;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, tick, Receiver, Sender, TryRecvError, TrySendError};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::mem;
use std::net::IpAddr;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Length of one accumulation window.
pub const WINDOW_PERIOD: Duration = Duration::from_secs(5);

/// Bytes seen for one address since the accumulator started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub downloaded: u64,
    pub uploaded: u64,
}

pub struct Accumulator {
    interface: String,
    connection_type: ConnectionType,
    cache: DeviceCache,
    window: Snapshot,
    lifetime: HashMap<IpAddr, Totals>,
    frames: u64,
    unattributable: u64,
}

impl Accumulator {
    pub fn new(interface: impl Into<String>, cache: DeviceCache) -> Self {
        let interface = interface.into();
        Self {
            connection_type: ConnectionType::from_interface(&interface),
            interface,
            cache,
            window: Snapshot::new(),
            lifetime: HashMap::new(),
            frames: 0,
            unattributable: 0,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn ingest(&mut self, frame: &Frame, now: DateTime<Utc>) {
        self.frames += 1;
        let Some(class) = classify(frame) else {
            self.unattributable += 1;
            trace!(interface = %self.interface, len = frame.len, "frame has no network layer");
            return;
        };

        for update in class.updates {
            let stats = match self.window.entry(update.address) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    let name = self.cache.resolve(update.address);
                    e.insert(DeviceStats::new(name, self.connection_type, &self.interface))
                }
            };
            stats.record_transfer(update.direction, frame.len, now);
            stats.record_content(class.content, frame.len);

            let totals = self.lifetime.entry(update.address).or_default();
            match update.direction {
                Direction::Sent => totals.uploaded += frame.len,
                Direction::Received => totals.downloaded += frame.len,
            }
        }
    }

    /// Hands out the current window and starts an empty one.
    pub fn rotate(&mut self) -> Snapshot {
        mem::take(&mut self.window)
    }

    pub fn window(&self) -> &Snapshot {
        &self.window
    }

    pub fn lifetime_totals(&self, addr: &IpAddr) -> Option<Totals> {
        self.lifetime.get(addr).copied()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames dropped from per-device accounting for lack of a network layer.
    pub fn unattributable(&self) -> u64 {
        self.unattributable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

// Everything the worker takes ownership of on start. The worker holds the only
// snapshot sender, so its exit disconnects `InterfaceMonitor::snapshots`.
struct Pending {
    source: Box<dyn FrameSource>,
    accumulator: Accumulator,
    snapshot_tx: Sender<Snapshot>,
}

/// Owns one capture session and the worker thread that drains it.
pub struct InterfaceMonitor {
    interface: String,
    state: MonitorState,
    window_period: Duration,
    pending: Option<Pending>,
    snapshots: Receiver<Snapshot>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl InterfaceMonitor {
    pub fn new(interface: impl Into<String>, source: Box<dyn FrameSource>, cache: DeviceCache) -> Self {
        let interface = interface.into();
        let (snapshot_tx, snapshots) = bounded(1);
        Self {
            pending: Some(Pending {
                source,
                accumulator: Accumulator::new(interface.clone(), cache),
                snapshot_tx,
            }),
            interface,
            state: MonitorState::Idle,
            window_period: WINDOW_PERIOD,
            snapshots,
            stop_tx: None,
            worker: None,
        }
    }

    /// Overrides [`WINDOW_PERIOD`]; used by harnesses that cannot wait
    /// five seconds per window.
    pub fn with_window_period(mut self, period: Duration) -> Self {
        self.window_period = period;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), MonitorError> {
        let Some(Pending {
            source,
            accumulator,
            snapshot_tx,
        }) = self.pending.take()
        else {
            return Err(MonitorError::AlreadyStarted(self.interface.clone()));
        };

        let (stop_tx, stop_rx) = bounded(1);
        let period = self.window_period;
        let worker = thread::Builder::new()
            .name(format!("capture-{}", self.interface))
            .spawn(move || run_capture(source, accumulator, period, snapshot_tx, stop_rx))
            .map_err(|source| MonitorError::Spawn {
                interface: self.interface.clone(),
                source,
            })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        self.state = MonitorState::Running;
        info!(interface = %self.interface, "capture started");
        Ok(())
    }

    /// Stops the worker and releases the capture. No-op unless running.
    pub fn stop(&mut self) {
        if self.state != MonitorState::Running {
            return;
        }
        // Dropping the sender disconnects the worker's stop channel.
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(interface = %self.interface, "capture worker panicked");
            }
        }
        self.state = MonitorState::Stopped;
        info!(interface = %self.interface, "capture stopped");
    }

    /// Latest finished window. `Empty` when none is waiting; `Disconnected`
    /// once the worker has exited and every window has been drained.
    pub fn try_snapshot(&self) -> Result<Snapshot, TryRecvError> {
        self.snapshots.try_recv()
    }
}

impl Drop for InterfaceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(
    mut source: Box<dyn FrameSource>,
    mut accumulator: Accumulator,
    period: Duration,
    snapshots: Sender<Snapshot>,
    stop: Receiver<()>,
) {
    let ticker = tick(period);
    loop {
        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        if ticker.try_recv().is_ok() {
            let snapshot = accumulator.rotate();
            let devices = snapshot.len();
            match snapshots.try_send(snapshot) {
                Ok(()) => trace!(interface = %accumulator.interface(), devices, "window emitted"),
                Err(TrySendError::Full(_)) => {
                    debug!(interface = %accumulator.interface(), devices, "snapshot slot full, window dropped")
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }

        match source.next_frame() {
            Ok(Some(frame)) => accumulator.ingest(&frame, Utc::now()),
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "capture failed, interface leaves the active set");
                break;
            }
        }
    }
    debug!(
        interface = %accumulator.interface(),
        frames = accumulator.frames(),
        unattributable = accumulator.unattributable(),
        "capture loop exited"
    );
}
