use std::io;
use thiserror::Error;

/// Failures of a live capture resource.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture on {interface}: {source}")]
    Open {
        interface: String,
        #[source]
        source: pcap::Error,
    },
    #[error("capture on {interface} failed: {source}")]
    Read {
        interface: String,
        #[source]
        source: pcap::Error,
    },
    #[error("failed to list capture devices: {0}")]
    List(#[source] pcap::Error),
    /// Raised by non-pcap sources (scripted or replayed captures).
    #[error("capture source {interface} closed: {reason}")]
    Closed { interface: String, reason: String },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor for {0} was already started")]
    AlreadyStarted(String),
    #[error("failed to spawn capture worker for {interface}: {source}")]
    Spawn {
        interface: String,
        #[source]
        source: io::Error,
    },
    #[error("no interfaces could be initialized")]
    NoInterfaces,
}
