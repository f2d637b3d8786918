use itertools::repeat_n;

use super::signal::{Signal, Speed};
use crate::error::{Error, Result};
use crate::output::{SequentialByteSink, SessionWriter};

/// Start of packet: KJKJKJKK.
pub const SYNC: [Signal; 8] = [
    Signal::K,
    Signal::J,
    Signal::K,
    Signal::J,
    Signal::K,
    Signal::J,
    Signal::K,
    Signal::K,
];
/// End of packet: 2 bits of SE0 then back to J.
pub const EOP: [Signal; 3] = [Signal::SE0, Signal::SE0, Signal::J];

/// Number of consecutive ones after which a zero is stuffed.
const MAX_ONES: u8 = 6;

/// NRZI encodes and bit stuffs a payload, least significant bit first.
///
/// Yields one line state per bit on the wire, stuffed bits included. A clone replays the remaining
/// sequence independently.
#[derive(Debug, Clone)]
pub struct BitStuffer<'a> {
    bytes: std::slice::Iter<'a, u8>,
    shift_reg: u8,
    bits_left: u8,
    level: Signal,
    consecutive_ones: u8,
}

impl<'a> BitStuffer<'a> {
    pub fn new(payload: &'a [u8], level: Signal) -> Self {
        Self {
            bytes: payload.iter(),
            shift_reg: 0,
            bits_left: 0,
            level,
            consecutive_ones: 0,
        }
    }

    /// Line state after the last yielded bit.
    pub fn level(&self) -> Signal {
        self.level
    }
}

impl Iterator for BitStuffer<'_> {
    type Item = Signal;
    fn next(&mut self) -> Option<Signal> {
        if self.consecutive_ones == MAX_ONES {
            self.consecutive_ones = 0;
            self.level = self.level.toggled();
            return Some(self.level);
        }

        if self.bits_left == 0 {
            self.shift_reg = *self.bytes.next()?;
            self.bits_left = 8;
        }
        let bit = self.shift_reg & 1;
        self.shift_reg >>= 1;
        self.bits_left -= 1;

        if bit == 0 {
            self.level = self.level.toggled();
            self.consecutive_ones = 0;
        } else {
            self.consecutive_ones += 1;
        }
        Some(self.level)
    }
}

/// Turns bus events into samples, keeping track of the line state between calls.
pub struct Encoder<S: SequentialByteSink> {
    writer: SessionWriter<S>,
    speed: Speed,
    interpolate: usize,
    state: Signal,
}

impl<S: SequentialByteSink> Encoder<S> {
    /// `interpolate` is the number of samples per bus cycle and must not be 0.
    pub fn new(writer: SessionWriter<S>, speed: Speed, interpolate: usize) -> Self {
        assert!(interpolate > 0, "at least one sample per cycle is required");
        Self {
            writer,
            speed,
            interpolate,
            state: Signal::J,
        }
    }

    pub fn state(&self) -> Signal {
        self.state
    }

    /// Bus cycles emitted so far.
    pub fn cycles(&self) -> u64 {
        self.writer.sample_count() / self.interpolate as u64
    }

    pub fn emit_chirps<I>(&mut self, seq: I, update_state: bool) -> Result<()>
    where
        I: IntoIterator<Item = Signal>,
    {
        let speed = self.speed;
        let interpolate = self.interpolate;
        let mut last = None;
        let samples: Vec<u8> = seq
            .into_iter()
            .inspect(|&s| last = Some(s))
            .flat_map(|s| repeat_n(speed.sample(s), interpolate))
            .collect();

        self.writer.write_samples(&samples)?;
        if update_state {
            self.state = last.unwrap_or(self.state);
        }
        Ok(())
    }

    pub fn emit_sync(&mut self) -> Result<()> {
        self.emit_chirps(SYNC.iter().copied(), true)
    }

    pub fn emit_eop(&mut self) -> Result<()> {
        self.emit_chirps(EOP.iter().copied(), true)
    }

    /// Holds the bus in its current state for `cycles` cycles.
    pub fn emit_stall(&mut self, cycles: i64) -> Result<()> {
        if cycles < 0 {
            return Err(Error::NegativeStall(cycles));
        }
        let pattern = vec![self.speed.sample(self.state); self.interpolate];
        self.writer.fill_sample(&pattern, cycles as usize)
    }

    pub fn emit_bytes(&mut self, payload: &[u8]) -> Result<()> {
        let mut stuffer = BitStuffer::new(payload, self.state);
        self.emit_chirps(stuffer.by_ref(), false)?;
        self.state = stuffer.level();
        Ok(())
    }

    /// Seals the underlying session.
    pub fn finish(self) -> Result<S::Inner> {
        self.writer.close()
    }
}
