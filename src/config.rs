use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::record::RecordKind;
use crate::user::User;
use crate::{Result, SkullError};

/// estimated JSON characters of one record, used only to choose between a buffered and a
/// streamed response
pub const RECORD_WEIGHT: usize = 50;

const DEFAULT_STREAM_THRESHOLD: usize = 16 * 1024;
const DEFAULT_CHUNK_BYTES: usize = 4 * 1024;
const DEFAULT_PERSIST_THREADS: u32 = 2;
const DEFAULT_PERSIST_QUEUE: usize = 64;

/// Settings of a [`Store`](crate::Store).
///
/// ```text
/// <root>/
/// ├── alice/
/// │   ├── skull.tsv
/// │   ├── quick.tsv
/// │   └── occurrence.tsv
/// └── bob/
///     └── ...
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    file_names: HashMap<RecordKind, String>,
    stream_threshold: usize,
    chunk_bytes: usize,
    persist_threads: u32,
    persist_queue: usize,
}

impl Config {
    /// a configuration with default settings, storing data under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Config {
            root: root.into(),
            file_names: RecordKind::ALL
                .iter()
                .map(|kind| (*kind, kind.default_file_name().to_string()))
                .collect(),
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            persist_threads: DEFAULT_PERSIST_THREADS,
            persist_queue: DEFAULT_PERSIST_QUEUE,
        }
    }

    /// stores records of `kind` in a file called `name` inside each user's directory
    pub fn with_file_name(mut self, kind: RecordKind, name: impl Into<String>) -> Self {
        self.file_names.insert(kind, name.into());
        self
    }

    /// responses whose estimated size is above `bytes` are streamed instead of buffered
    pub fn with_stream_threshold(mut self, bytes: usize) -> Self {
        self.stream_threshold = bytes;
        self
    }

    /// a streamed response flushes its sink after at least `bytes` were written
    pub fn with_chunk_bytes(mut self, bytes: usize) -> Self {
        self.chunk_bytes = bytes.max(1);
        self
    }

    /// number of background threads writing collections to disk (at least one)
    pub fn with_persist_threads(mut self, threads: u32) -> Self {
        self.persist_threads = threads.max(1);
        self
    }

    /// number of pending disk writes queued before a mutation waits to hand its write off
    pub fn with_persist_queue(mut self, capacity: usize) -> Self {
        self.persist_queue = capacity.max(1);
        self
    }

    /// checks that every record kind is stored in a file of its own. Two kinds sharing a
    /// file would be written through two different locks, each overwriting the other.
    ///
    /// # Errors
    /// returns [`SkullError::Config`] naming the first pair of kinds sharing a file
    pub fn check(&self) -> Result<()> {
        let mut seen: HashMap<&str, RecordKind> = HashMap::new();
        for kind in RecordKind::ALL.iter().copied() {
            let name = self.file_name(kind);
            if let Some(other) = seen.insert(name, kind) {
                return Err(SkullError::Config(format!(
                    "{} and {} records are both stored in {:?}",
                    other, kind, name
                )));
            }
        }
        Ok(())
    }

    /// the storage root, holding one directory per user
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// the directory of `user`
    pub fn user_dir(&self, user: &User) -> PathBuf {
        self.root.join(user.name())
    }

    /// the file holding `user`'s records of `kind`
    pub fn file_path(&self, user: &User, kind: RecordKind) -> PathBuf {
        self.user_dir(user).join(self.file_name(kind))
    }

    fn file_name(&self, kind: RecordKind) -> &str {
        self.file_names
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_file_name())
    }

    /// see [`Config::with_stream_threshold`]
    pub fn stream_threshold(&self) -> usize {
        self.stream_threshold
    }

    /// see [`Config::with_chunk_bytes`]
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// see [`Config::with_persist_threads`]
    pub fn persist_threads(&self) -> u32 {
        self.persist_threads
    }

    /// see [`Config::with_persist_queue`]
    pub fn persist_queue(&self) -> usize {
        self.persist_queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_file_layout() {
        let config = Config::new("/data");
        let user = User::new("alice");
        assert_eq!(config.user_dir(&user), PathBuf::from("/data/alice"));
        assert_eq!(
            config.file_path(&user, RecordKind::Occurrence),
            PathBuf::from("/data/alice/occurrence.tsv")
        );
    }

    #[test]
    fn file_names_can_be_overridden() {
        let config = Config::new("/data").with_file_name(RecordKind::Skull, "categories");
        let user = User::new("bob");
        assert_eq!(config.file_path(&user, RecordKind::Skull), PathBuf::from("/data/bob/categories"));
        assert_eq!(config.file_path(&user, RecordKind::Quick), PathBuf::from("/data/bob/quick.tsv"));
    }

    #[test]
    fn kinds_sharing_a_file_are_rejected() {
        let config = Config::new("/data").with_file_name(RecordKind::Skull, "quick.tsv");
        match config.check() {
            Err(SkullError::Config(msg)) => assert!(msg.contains("quick.tsv"), "{}", msg),
            other => panic!("unexpected result {:?}", other),
        }

        let swapped = Config::new("/data")
            .with_file_name(RecordKind::Skull, "quick.tsv")
            .with_file_name(RecordKind::Quick, "skull.tsv");
        assert!(swapped.check().is_ok());
        assert!(Config::new("/data").check().is_ok());
    }

    #[test]
    fn pool_settings_have_a_floor() {
        let config = Config::new("/data")
            .with_persist_threads(0)
            .with_persist_queue(0)
            .with_chunk_bytes(0);
        assert_eq!(config.persist_threads(), 1);
        assert_eq!(config.persist_queue(), 1);
        assert_eq!(config.chunk_bytes(), 1);
    }
}
