//! Per-device bandwidth and protocol accounting across one or more capture
//! interfaces.

pub mod accumulator;
pub mod aggregator;
pub mod cache;
pub mod classify;
pub mod config;
pub mod display;
pub mod error;
pub mod merge;
pub mod models;
pub mod sniff;

pub use accumulator::{Accumulator, InterfaceMonitor, MonitorState, WINDOW_PERIOD};
pub use aggregator::{run_cycle, Aggregator};
pub use cache::{DeviceCache, Resolver, SystemResolver};
pub use classify::{classify, Frame, Transport};
pub use display::{DisplaySink, JsonSink, TerminalSink};
pub use error::{CaptureError, MonitorError};
pub use merge::{merge, CombinedView};
pub use models::{ConnectionType, ContentStats, DeviceStats, Protocol, Snapshot};
pub use sniff::{FrameSource, PcapSource};
