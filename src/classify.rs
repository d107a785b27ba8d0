//! Frame classification: who took part in a frame, in which direction, and
//! under which `(protocol, port)` its bytes are filed.

use crate::models::{ContentKey, Direction, Protocol};
use std::net::IpAddr;

/// A decoded frame as handed over by a capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub len: u64,
    pub network: Option<Endpoints>,
    pub transport: Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub source: IpAddr,
    pub destination: IpAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp { destination_port: u16 },
    Udp { destination_port: u16 },
    Icmp,
    None,
}

impl Frame {
    pub fn new(len: u64, source: IpAddr, destination: IpAddr, transport: Transport) -> Self {
        Self {
            len,
            network: Some(Endpoints {
                source,
                destination,
            }),
            transport,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub address: IpAddr,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Zero, one or two updates; local-to-local traffic yields both sides.
    pub updates: Vec<DeviceUpdate>,
    pub content: ContentKey,
}

/// Returns `None` when the frame has no network layer to attribute it to.
pub fn classify(frame: &Frame) -> Option<Classification> {
    let endpoints = frame.network?;

    let mut updates = Vec::with_capacity(2);
    if is_private(&endpoints.source) {
        updates.push(DeviceUpdate {
            address: endpoints.source,
            direction: Direction::Sent,
        });
    }
    if is_private(&endpoints.destination) {
        updates.push(DeviceUpdate {
            address: endpoints.destination,
            direction: Direction::Received,
        });
    }

    Some(Classification {
        updates,
        content: content_key(&frame.transport),
    })
}

pub fn content_key(transport: &Transport) -> ContentKey {
    match *transport {
        Transport::Tcp { destination_port } => (Protocol::Tcp, destination_port),
        Transport::Udp { destination_port } => (Protocol::Udp, destination_port),
        Transport::Icmp => (Protocol::Icmp, 0),
        Transport::None => (Protocol::Unknown, 0),
    }
}

/// RFC 1918 for IPv4, unique local (fc00::/7) for IPv6.
pub fn is_private(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}
