use std::fs::File;
use std::path::Path;

use itertools::Itertools;
use tracing::{debug, info};

use super::{SequentialByteSink, ZipSink};
use crate::error::{Error, Result};

/// Largest slice kept in memory before it's flushed as an archive entry (16MiB).
pub const DEFAULT_SLICE_LIMIT: usize = 16 * 1024 * 1024;

const FORMAT_VERSION: &str = "2";
const SIGROK_VERSION: &str = "0.7.1";
const CAPTURE_FILE: &str = "logic-1";

/// Largest chunk materialized at once by `fill_sample`.
const FILL_CHUNK: usize = 64 * 1024;

/// Writes a sigrok session: `version`, `metadata`, then the samples split in slices.
pub struct SessionWriter<S: SequentialByteSink> {
    sink: S,
    unit_size: usize,
    slice_limit: usize,
    slice: Vec<u8>,
    current_slice: usize,
    sample_count: u64,
}

impl SessionWriter<ZipSink<File>> {
    pub fn open(
        path: &Path,
        channels: &[&str],
        sample_rate: u64,
        overwrite: bool,
        slice_limit: usize,
    ) -> Result<Self> {
        info!(?path, sample_rate, "creating session");
        let sink = ZipSink::create(path, overwrite)?;
        Self::new(sink, channels, sample_rate, slice_limit)
    }
}

impl<S: SequentialByteSink> SessionWriter<S> {
    /// Starts a session on `sink`, writing the version and metadata entries right away.
    pub fn new(mut sink: S, channels: &[&str], sample_rate: u64, slice_limit: usize) -> Result<Self> {
        assert!(slice_limit > 0, "slices must hold at least one byte");
        let unit_size = unit_size(channels.len());

        sink.write_entry("version", FORMAT_VERSION.as_bytes())?;
        sink.write_entry(
            "metadata",
            metadata(channels, sample_rate, unit_size).as_bytes(),
        )?;

        Ok(Self {
            sink,
            unit_size,
            slice_limit,
            slice: Vec::with_capacity(slice_limit.min(FILL_CHUNK)),
            current_slice: 1,
            sample_count: 0,
        })
    }

    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// Number of samples written so far.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    fn check_alignment(&self, len: usize) -> Result<()> {
        if len % self.unit_size != 0 {
            return Err(Error::Alignment {
                len,
                unit_size: self.unit_size,
            });
        }
        Ok(())
    }

    fn finalize_current_slice(&mut self) -> Result<()> {
        let name = format!("{}-{}", CAPTURE_FILE, self.current_slice);
        debug!(slice = %name, bytes = self.slice.len(), "flushing slice");
        self.sink.write_entry(&name, &self.slice)?;
        self.slice.clear();
        self.current_slice += 1;
        Ok(())
    }

    pub fn write_samples(&mut self, mut samples: &[u8]) -> Result<()> {
        self.check_alignment(samples.len())?;
        let count = samples.len() / self.unit_size;

        loop {
            let remaining = self.slice_limit - self.slice.len();
            if samples.len() > remaining {
                let (head, tail) = samples.split_at(remaining);
                self.slice.extend_from_slice(head);
                samples = tail;
                self.finalize_current_slice()?;
            } else {
                self.slice.extend_from_slice(samples);
                break;
            }
        }
        self.sample_count += count as u64;
        Ok(())
    }

    /// Writes `pattern` `count` times.
    ///
    /// Only the whole repetition has to be aligned, not `pattern` itself.
    pub fn fill_sample(&mut self, pattern: &[u8], count: usize) -> Result<()> {
        self.check_alignment(pattern.len() * count)?;
        if pattern.is_empty() || count == 0 {
            return Ok(());
        }

        // a whole number of units per chunk keeps every partial write aligned
        let per_chunk = ((FILL_CHUNK / pattern.len()) / self.unit_size).max(1) * self.unit_size;
        let chunk = pattern.repeat(per_chunk.min(count));
        let mut left = count;
        while left > 0 {
            let n = left.min(per_chunk);
            self.write_samples(&chunk[..n * pattern.len()])?;
            left -= n;
        }
        Ok(())
    }

    /// Flushes the pending slice, even when empty, and seals the sink.
    pub fn close(mut self) -> Result<S::Inner> {
        self.finalize_current_slice()?;
        info!(
            samples = self.sample_count,
            slices = self.current_slice - 1,
            "session closed"
        );
        self.sink.close()
    }
}

/// Bytes needed to hold one sample of `channels` logic channels.
pub fn unit_size(channels: usize) -> usize {
    (channels + 7) / 8
}

fn metadata(channels: &[&str], sample_rate: u64, unit_size: usize) -> String {
    let probes = channels
        .iter()
        .enumerate()
        .map(|(i, name)| format!("probe{} = {}\n", i + 1, name))
        .join("");
    format!(
        "[global]\n\
         sigrok version = {}\n\
         \n\
         [device 1]\n\
         capturefile = {}\n\
         total probes = {}\n\
         samplerate = {}\n\
         total analog = 0\n\
         {}\
         unitsize = {}\n\
         \n",
        SIGROK_VERSION,
        CAPTURE_FILE,
        channels.len(),
        sample_rate,
        probes,
        unit_size
    )
}
