mod archive;
mod session;

pub use self::archive::ZipSink;
pub use self::session::{SessionWriter, DEFAULT_SLICE_LIMIT};

use crate::error::Result;

/// Something that stores named, immutable entries one after the other.
pub trait SequentialByteSink {
    /// What is handed back once the sink is sealed.
    type Inner;

    fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()>;
    fn close(self) -> Result<Self::Inner>;
}

#[cfg(test)]
pub mod memory {
    use super::SequentialByteSink;
    use crate::error::Result;

    /// Keeps entries in memory, in write order.
    #[derive(Debug, Default)]
    pub struct MemorySink {
        pub entries: Vec<(String, Vec<u8>)>,
    }

    impl MemorySink {
        pub fn entry(&self, name: &str) -> Option<&[u8]> {
            self.entries
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, bytes)| bytes.as_slice())
        }

        /// Content of every `<prefix>-<k>` entry, in write order.
        pub fn slices(&self, prefix: &str) -> Vec<Vec<u8>> {
            let prefix = format!("{}-", prefix);
            self.entries
                .iter()
                .filter(|(n, _)| {
                    n.strip_prefix(&prefix)
                        .map(|k| k.parse::<usize>().is_ok())
                        .unwrap_or(false)
                })
                .map(|(_, bytes)| bytes.clone())
                .collect()
        }
    }

    impl SequentialByteSink for MemorySink {
        type Inner = Self;

        fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
            self.entries.push((name.to_owned(), bytes.to_vec()));
            Ok(())
        }
        fn close(self) -> Result<Self> {
            Ok(self)
        }
    }
}
