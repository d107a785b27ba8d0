use crate::accumulator::InterfaceMonitor;
use crate::display::DisplaySink;
use crate::error::MonitorError;
use crate::merge::CombinedView;
use crossbeam_channel::{select, tick, Receiver, TryRecvError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(5);

/// Drives the monitors, merging whatever windows they have ready on every
/// master tick and handing the result to the sink.
pub struct Aggregator<D: DisplaySink> {
    monitors: Vec<InterfaceMonitor>,
    sink: D,
    refresh: Duration,
}

impl<D: DisplaySink> Aggregator<D> {
    pub fn new(monitors: Vec<InterfaceMonitor>, sink: D) -> Self {
        Self {
            monitors,
            sink,
            refresh: DEFAULT_REFRESH,
        }
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    /// Starts every monitor, dropping the ones that fail. Errors only when
    /// none are left.
    pub fn start(&mut self) -> Result<usize, MonitorError> {
        self.monitors.retain_mut(|monitor| match monitor.start() {
            Ok(()) => true,
            Err(e) => {
                warn!(interface = %monitor.interface(), error = %e, "excluding interface");
                false
            }
        });
        if self.monitors.is_empty() {
            return Err(MonitorError::NoInterfaces);
        }
        Ok(self.monitors.len())
    }

    /// Runs until `shutdown` fires or disconnects, then stops every monitor
    /// and returns the final combined view. Fails with `NoInterfaces` if every
    /// capture dies first.
    pub fn run(mut self, shutdown: Receiver<()>) -> Result<(CombinedView, D), MonitorError> {
        let active = self.start()?;
        info!(active, refresh = ?self.refresh, "aggregation loop running");

        let mut combined = CombinedView::new();
        let ticker = tick(self.refresh);
        let mut outcome = Ok(());
        loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(ticker) -> _ => {
                    outcome = run_cycle(&mut self.monitors, &mut combined, &mut self.sink);
                    if outcome.is_err() {
                        break;
                    }
                }
            }
        }

        info!("shutting down");
        for monitor in &mut self.monitors {
            monitor.stop();
        }
        outcome?;
        let Aggregator { sink, .. } = self;
        Ok((combined, sink))
    }
}

/// One master cycle: take at most one waiting window per monitor, merge it
/// and publish the result. Monitors whose worker has exited are stopped and
/// removed; fails once none remain.
pub fn run_cycle(
    monitors: &mut Vec<InterfaceMonitor>,
    combined: &mut CombinedView,
    sink: &mut dyn DisplaySink,
) -> Result<(), MonitorError> {
    combined.begin_cycle();
    monitors.retain_mut(|monitor| match monitor.try_snapshot() {
        Ok(snapshot) => {
            debug!(interface = %monitor.interface(), devices = snapshot.len(), "merging window");
            combined.merge(snapshot);
            true
        }
        Err(TryRecvError::Empty) => {
            debug!(interface = %monitor.interface(), "no window ready");
            true
        }
        Err(TryRecvError::Disconnected) => {
            warn!(interface = %monitor.interface(), "capture worker exited, removing interface");
            monitor.stop();
            false
        }
    });
    if monitors.is_empty() {
        return Err(MonitorError::NoInterfaces);
    }
    sink.update(combined);
    Ok(())
}
