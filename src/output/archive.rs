use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::SequentialByteSink;
use crate::error::{Error, Result};

/// Deflate-compressed zip archive, the container format of sigrok sessions.
pub struct ZipSink<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
}

impl<W: Write + Seek> ZipSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            options: FileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }
}

impl ZipSink<File> {
    /// Creates the archive at `path`, replacing an existing file only when `overwrite` is set.
    pub fn create(path: &Path, overwrite: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => Error::Conflict(path.to_owned()),
            _ => Error::Io(e),
        })?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Seek> SequentialByteSink for ZipSink<W> {
    type Inner = W;

    fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    fn close(mut self) -> Result<W> {
        Ok(self.zip.finish()?)
    }
}
