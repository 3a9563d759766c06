use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, error, info, warn};

use super::LockedCollection;
use crate::record::Record;
use crate::Result;

/// loads every record stored in the TSV file at `path`, in file order.
///
/// A missing file is an empty collection. Lines that are not UTF-8, have the wrong number
/// of tab separators or hold a field that does not parse are logged and skipped, loading
/// carries on with the next line. Empty lines are ignored.
///
/// # Errors
/// returns an IO error if the file exists but could not be opened or read
pub fn load<T: Record>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{:?} does not exist yet", path);
            return Ok(vec![]);
        }
        Err(e) => return Err(e.into()),
    };

    let mut records = vec![];
    for (i, line) in BufReader::new(file).split(b'\n').enumerate() {
        let number = i + 1;
        let line = match String::from_utf8(line?) {
            Ok(line) => line,
            Err(_) => {
                warn!(?path, line = number, "skipping {} line that is not UTF-8", T::KIND);
                continue;
            }
        };
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if line.is_empty() {
            continue;
        }
        match T::from_tsv(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(?path, line = number, "skipping malformed {} line: {}", T::KIND, e),
        }
    }

    info!("Loaded {} {} records from {:?}", records.len(), T::KIND, path);
    Ok(records)
}

/// replaces the content of an already locked collection with what is on disk at `path`.
/// On failure the collection is left as it was.
pub(crate) fn reload_into<T: Record>(path: &Path, mut locked: LockedCollection<T>) {
    match load::<T>(path) {
        Ok(records) => *locked = records,
        Err(e) => error!("Failed to reload {:?}, keeping the records in memory: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Occurrence, Quick, Skull};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let records = load::<Quick>(&dir.path().join("quick.tsv")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("occurrence.tsv");
        fs::write(&path, "1\t2\t3\t4\n1\t2 3\t4\n").unwrap();

        let records = load::<Occurrence>(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].millis(), 4);
    }

    #[test]
    fn bad_fields_and_encodings_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("skull.tsv");
        let mut content = b"1\tcoffee\tbrown\tcup\t2.5\n".to_vec();
        content.extend_from_slice(b"-1\ttea\tgreen\tleaf\t1\n");
        content.extend_from_slice(b"2\t\xff\xfe\tred\tx\t1\n");
        content.extend_from_slice(b"\n");
        content.extend_from_slice(b"3\twater\tblue\tdrop\t0\r\n");
        content.extend_from_slice(b"4\tjuice\torange\tglass\tNaN");
        fs::write(&path, content).unwrap();

        let records = load::<Skull>(&path).unwrap();
        let names: Vec<&str> = records.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["coffee", "water"]);
    }

    #[test]
    fn last_line_needs_no_terminator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quick.tsv");
        fs::write(&path, "1\t2\n3\t4").unwrap();
        assert_eq!(load::<Quick>(&path).unwrap().len(), 2);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        // a directory where the file should be
        let path = dir.path().join("quick.tsv");
        fs::create_dir(&path).unwrap();
        assert!(load::<Quick>(&path).is_err());
    }
}
