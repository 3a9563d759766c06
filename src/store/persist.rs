use std::ffi::OsString;
use std::fs;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info};

use super::LockedCollection;
use crate::record::Record;
use crate::serialize::to_tsv_lines;

/// rewrites the file at `path` from a locked collection, then releases the lock.
///
/// Runs on a persistence thread. A failed write is logged and the records stay in memory,
/// they reach the disk with the next successful write of the same collection.
pub(crate) fn write_collection<T: Record>(path: PathBuf, records: LockedCollection<T>) {
    match replace_file::<T>(&path, &records) {
        Ok(()) => info!("Updated {:?} ({} records)", path, records.len()),
        Err(e) => error!("Failed to save {:?}: {}", path, e),
    }
}

/// writes every record to a temporary file next to `path` and renames it over `path`, so a
/// crash leaves either the old or the new content behind
fn replace_file<T: Record>(path: &Path, records: &[T]) -> io::Result<()> {
    let tmp = tmp_path(path);
    let mut writer = BufWriter::new(File::create(&tmp)?);
    for line in to_tsv_lines(records) {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Quick;
    use tempfile::TempDir;

    #[test]
    fn replaces_content_and_leaves_no_tmp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quick.tsv");
        fs::write(&path, "old content\n").unwrap();

        let records = vec![Quick::new(1, 2.0).unwrap(), Quick::new(3, 0.5).unwrap()];
        replace_file(&path, &records).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "1\t2\n3\t0.5\n");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn empty_collection_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quick.tsv");
        replace_file::<Quick>(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone").join("quick.tsv");
        assert!(replace_file::<Quick>(&path, &[]).is_err());
    }

    #[test]
    fn tmp_file_sits_next_to_target() {
        assert_eq!(
            tmp_path(Path::new("/data/alice/skull.tsv")),
            PathBuf::from("/data/alice/skull.tsv.tmp")
        );
    }
}
