use std::time::Duration;

use nom::{
    bytes::complete::take,
    error::ErrorKind,
    number::complete::{be_u16, be_u32, le_u16, le_u32},
    IResult,
};
use tracing::{debug, warn};

use super::{Capture, LinkType, Packet};
use crate::error::{Error, Result};

const LINKTYPE_USB_2_0: u32 = 288;
const LINKTYPE_USB_2_0_LOW_SPEED: u32 = 293;
const LINKTYPE_USB_2_0_FULL_SPEED: u32 = 294;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolution {
    Micro,
    Nano,
}

#[derive(Debug, PartialEq)]
struct Header {
    endian: Endian,
    resolution: Resolution,
    snaplen: u32,
    network: u32,
}

#[derive(Debug, PartialEq)]
struct Record<'a> {
    timestamp: Duration,
    orig_len: u32,
    data: &'a [u8],
}

fn u16_field(endian: Endian, i: &[u8]) -> IResult<&[u8], u16> {
    match endian {
        Endian::Little => le_u16(i),
        Endian::Big => be_u16(i),
    }
}

fn u32_field(endian: Endian, i: &[u8]) -> IResult<&[u8], u32> {
    match endian {
        Endian::Little => le_u32(i),
        Endian::Big => be_u32(i),
    }
}

fn bytes(len: u32, i: &[u8]) -> IResult<&[u8], &[u8]> {
    take(len)(i)
}

fn header(i: &[u8]) -> IResult<&[u8], Header> {
    let (i, magic) = le_u32(i)?;
    let (endian, resolution) = match magic {
        0xA1B2_C3D4 => (Endian::Little, Resolution::Micro),
        0xD4C3_B2A1 => (Endian::Big, Resolution::Micro),
        0xA1B2_3C4D => (Endian::Little, Resolution::Nano),
        0x4D3C_B2A1 => (Endian::Big, Resolution::Nano),
        _ => return Err(nom::Err::Failure((i, ErrorKind::Tag))),
    };
    let (i, _version_major) = u16_field(endian, i)?;
    let (i, _version_minor) = u16_field(endian, i)?;
    let (i, _thiszone) = u32_field(endian, i)?;
    let (i, _sigfigs) = u32_field(endian, i)?;
    let (i, snaplen) = u32_field(endian, i)?;
    let (i, network) = u32_field(endian, i)?;
    Ok((
        i,
        Header {
            endian,
            resolution,
            snaplen,
            network,
        },
    ))
}

fn record<'a>(header: &Header, i: &'a [u8]) -> IResult<&'a [u8], Record<'a>> {
    let (i, ts_sec) = u32_field(header.endian, i)?;
    let (i, ts_frac) = u32_field(header.endian, i)?;
    let (i, incl_len) = u32_field(header.endian, i)?;
    let (i, orig_len) = u32_field(header.endian, i)?;
    let (i, data) = bytes(incl_len, i)?;

    let nanos = match header.resolution {
        Resolution::Micro => u64::from(ts_frac) * 1_000,
        Resolution::Nano => u64::from(ts_frac),
    };
    let timestamp = Duration::from_secs(u64::from(ts_sec)) + Duration::from_nanos(nanos);
    Ok((
        i,
        Record {
            timestamp,
            orig_len,
            data,
        },
    ))
}

fn describe(what: &str, err: nom::Err<(&[u8], ErrorKind)>) -> Error {
    Error::Capture(match err {
        nom::Err::Incomplete(_) | nom::Err::Error((_, ErrorKind::Eof)) => {
            format!("{} is truncated", what)
        }
        nom::Err::Error((_, ErrorKind::Tag)) | nom::Err::Failure((_, ErrorKind::Tag)) => {
            format!("{} has an unknown magic number", what)
        }
        nom::Err::Error((_, kind)) | nom::Err::Failure((_, kind)) => {
            format!("{} is invalid ({:?})", what, kind)
        }
    })
}

/// Parses a classic libpcap file holding USB 2.0 low level packets.
pub fn parse_capture(data: &[u8]) -> Result<Capture> {
    let (mut rest, header) = header(data).map_err(|e| describe("file header", e))?;
    let link_type = match header.network {
        LINKTYPE_USB_2_0 => LinkType::Usb20,
        LINKTYPE_USB_2_0_LOW_SPEED => LinkType::Usb20LowSpeed,
        LINKTYPE_USB_2_0_FULL_SPEED => LinkType::Usb20FullSpeed,
        other => return Err(Error::UnsupportedLinkType(other)),
    };
    debug!(?header, "pcap header");

    let mut packets = Vec::new();
    while !rest.is_empty() {
        let index = packets.len();
        let (tail, rec) =
            record(&header, rest).map_err(|e| describe(&format!("record #{}", index), e))?;
        if (rec.data.len() as u64) < u64::from(rec.orig_len) {
            warn!(
                index,
                captured = rec.data.len(),
                original = rec.orig_len,
                snaplen = header.snaplen,
                "packet truncated by the capture"
            );
        }
        packets.push(Packet {
            timestamp: rec.timestamp,
            payload: rec.data.to_vec(),
        });
        rest = tail;
    }

    Ok(Capture { link_type, packets })
}
