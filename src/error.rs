use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while turning a packet capture into a logic capture.
///
/// None of them are recoverable: the run aborts, the output archive is still sealed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unaligned sample write: {len} bytes is not a multiple of the unit size {unit_size}")]
    Alignment { len: usize, unit_size: usize },

    #[error("stall cycles must be 0 or positive, got {0}")]
    NegativeStall(i64),

    #[error(
        "packet #{packet} cannot be transferred on time: {consumed} cycles needed, \
         {expected} available (wrong signaling type?)"
    )]
    TimingOverrun {
        packet: usize,
        expected: u64,
        consumed: u64,
    },

    #[error("unknown signaling {0:?} (expected `ls` or `fs`)")]
    UnknownSignaling(String),

    #[error("{0:?} already exists")]
    Conflict(PathBuf),

    #[error("malformed packet capture: {0}")]
    Capture(String),

    #[error("unsupported capture link type {0}")]
    UnsupportedLinkType(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
