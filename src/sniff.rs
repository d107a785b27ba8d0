// src/sniff.rs
use crate::classify::{Endpoints, Frame, Transport};
use crate::error::CaptureError;
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap::{Activated, Active, Capture, Device, Linktype, Offline};
use std::net::IpAddr;
use std::path::Path;

const SNAPLEN: i32 = 1600;
const READ_TIMEOUT_MS: i32 = 500;

/// A live stream of decoded frames. Dropping the source closes it.
pub trait FrameSource: Send {
    /// `Ok(None)` when nothing arrived within the read timeout.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}

/// Frames read through libpcap, either live (`Active`) or replayed from a
/// capture file (`Offline`).
pub struct PcapSource<T: Activated = Active> {
    interface: String,
    cap: Capture<T>,
    linktype: Linktype,
}

impl PcapSource<Active> {
    pub fn open(interface: &str) -> Result<Self, CaptureError> {
        let cap = create_capture(interface).map_err(|source| CaptureError::Open {
            interface: interface.to_string(),
            source,
        })?;
        let linktype = cap.get_datalink();

        Ok(Self {
            interface: interface.to_string(),
            cap,
            linktype,
        })
    }
}

impl PcapSource<Offline> {
    /// Replays a saved capture; the source errors out once the file is exhausted.
    pub fn from_file(path: &Path) -> Result<Self, CaptureError> {
        let interface = path.display().to_string();
        let cap = Capture::from_file(path).map_err(|source| CaptureError::Open {
            interface: interface.clone(),
            source,
        })?;
        let linktype = cap.get_datalink();

        Ok(Self {
            interface,
            cap,
            linktype,
        })
    }
}

fn create_capture(interface: &str) -> Result<Capture<Active>, pcap::Error> {
    Capture::from_device(interface)?
        .promisc(true)
        .snaplen(SNAPLEN)
        .timeout(READ_TIMEOUT_MS)
        .immediate_mode(true)
        .open()
}

impl<T: Activated + Send> FrameSource for PcapSource<T> {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        match self.cap.next() {
            Ok(packet) => Ok(Some(decode(
                self.linktype,
                u64::from(packet.header.len),
                packet.data,
            ))),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(source) => Err(CaptureError::Read {
                interface: self.interface.clone(),
                source,
            }),
        }
    }
}

/// Names of the devices pcap can capture on, with descriptions when present.
pub fn list_interfaces() -> Result<Vec<(String, Option<String>)>, CaptureError> {
    let devices = Device::list().map_err(CaptureError::List)?;
    Ok(devices.into_iter().map(|d| (d.name, d.desc)).collect())
}

/// Decodes raw link-layer bytes. Frames that fail to parse come back without
/// a network layer rather than as an error.
pub fn decode(linktype: Linktype, len: u64, data: &[u8]) -> Frame {
    let sliced = if linktype == Linktype::ETHERNET {
        SlicedPacket::from_ethernet(data).ok()
    } else {
        SlicedPacket::from_ip(data).ok()
    };

    let Some(packet) = sliced else {
        return Frame {
            len,
            network: None,
            transport: Transport::None,
        };
    };

    Frame {
        len,
        network: packet.net.as_ref().and_then(handle_ip),
        transport: packet
            .transport
            .as_ref()
            .map(handle_transport)
            .unwrap_or(Transport::None),
    }
}

#[allow(unreachable_patterns)]
fn handle_ip(net: &NetSlice) -> Option<Endpoints> {
    let (source, destination) = match net {
        NetSlice::Ipv4(ipv4) => (
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        ),
        NetSlice::Ipv6(ipv6) => (
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        ),
        _ => return None,
    };
    Some(Endpoints {
        source,
        destination,
    })
}

#[allow(unreachable_patterns)]
fn handle_transport(transport: &TransportSlice) -> Transport {
    match transport {
        TransportSlice::Tcp(tcp) => Transport::Tcp {
            destination_port: tcp.destination_port(),
        },
        TransportSlice::Udp(udp) => Transport::Udp {
            destination_port: udp.destination_port(),
        },
        TransportSlice::Icmpv4(_) | TransportSlice::Icmpv6(_) => Transport::Icmp,
        _ => Transport::None,
    }
}
