mod pcap;

use std::path::Path;
use std::time::Duration;

pub use self::pcap::parse_capture;
use crate::error::Result;
use crate::usb::signal::Speed;

/// One USB packet as seen on the wire, from PID to CRC.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Time since the unix epoch.
    pub timestamp: Duration,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkType {
    /// USB 2.0 low level packets, speed unknown.
    Usb20,
    Usb20LowSpeed,
    Usb20FullSpeed,
}

impl LinkType {
    /// Signaling implied by the link type, if any.
    pub fn speed(self) -> Option<Speed> {
        match self {
            LinkType::Usb20 => None,
            LinkType::Usb20LowSpeed => Some(Speed::Low),
            LinkType::Usb20FullSpeed => Some(Speed::Full),
        }
    }
}

/// Packets of a capture, in capture order.
#[derive(Debug)]
pub struct Capture {
    pub link_type: LinkType,
    pub packets: Vec<Packet>,
}

pub fn read_capture(path: &Path) -> Result<Capture> {
    let data = std::fs::read(path)?;
    parse_capture(&data)
}
