use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Names of the probes, in sample bit order (bit0 = D-, bit1 = D+).
pub const CHANNELS: [&str; 2] = ["D-", "D+"];

const DM: u8 = 0b01;
const DP: u8 = 0b10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    SE0,
    J,
    K,
    SE1,
}

impl Signal {
    /// The other differential state. Single ended states are left as is.
    pub fn toggled(self) -> Self {
        match self {
            Signal::J => Signal::K,
            Signal::K => Signal::J,
            s => s,
        }
    }
}

/// Low and full speed signaling. They only differ by their bit rate and by which line is pulled
/// up, which swaps the polarity of J and K.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Low,
    Full,
}

impl Speed {
    /// Bus clock in cycles per second.
    pub fn clock_rate(self) -> u64 {
        match self {
            Speed::Low => 1_500_000,
            Speed::Full => 12_000_000,
        }
    }

    /// Line levels of `signal` packed as a sample.
    pub fn sample(self, signal: Signal) -> u8 {
        match (signal, self) {
            (Signal::SE0, _) => 0,
            (Signal::SE1, _) => DP | DM,
            (Signal::J, Speed::Full) | (Signal::K, Speed::Low) => DP,
            (Signal::J, Speed::Low) | (Signal::K, Speed::Full) => DM,
        }
    }
}

impl FromStr for Speed {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ls" => Ok(Speed::Low),
            "fs" => Ok(Speed::Full),
            _ => Err(Error::UnknownSignaling(s.to_owned())),
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Speed::Low => "ls",
            Speed::Full => "fs",
        })
    }
}
