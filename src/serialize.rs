//! Rendering of whole collections.
//!
//! A collection is sent to clients as a JSON array, either built in one buffer
//! ([`to_json_array`]) or produced chunk by chunk ([`JsonChunks`], [`write_json_chunks`])
//! when it is large. Both paths produce byte-identical output. On disk a collection is
//! one TSV line per record ([`to_tsv_lines`]). All three keep collection order.
use std::io;
use std::io::Write;

use crate::config::RECORD_WEIGHT;
use crate::record::Record;

/// renders `records` as a JSON array, `"[]"` when empty
pub fn to_json_array<T: Record>(records: &[T]) -> String {
    let mut out = String::with_capacity(2 + records.len() * RECORD_WEIGHT);
    out.push('[');
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&record.to_json());
    }
    out.push(']');
    out
}

/// An iterator over the pieces of a JSON array.
///
/// The first chunk opens the array together with the first record, every further record
/// comes with its leading comma, and the last chunk closes the array. An empty collection
/// is the single chunk `"[]"`.
pub struct JsonChunks<'a, T> {
    records: std::slice::Iter<'a, T>,
    opened: bool,
    closed: bool,
}

impl<'a, T: Record> JsonChunks<'a, T> {
    /// creates the chunk sequence for `records`
    pub fn new(records: &'a [T]) -> Self {
        JsonChunks {
            records: records.iter(),
            opened: false,
            closed: false,
        }
    }
}

impl<'a, T: Record> Iterator for JsonChunks<'a, T> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        match self.records.next() {
            Some(record) => {
                let lead = if self.opened { ',' } else { '[' };
                self.opened = true;
                let mut chunk = String::with_capacity(64);
                chunk.push(lead);
                chunk.push_str(&record.to_json());
                Some(chunk)
            }
            None => {
                self.closed = true;
                if self.opened {
                    Some("]".to_string())
                } else {
                    Some("[]".to_string())
                }
            }
        }
    }
}

/// writes `records` as a JSON array into `sink`, flushing the sink whenever at least
/// `chunk_bytes` have been written since the last flush, and once more at the end
///
/// # Errors
/// returns any IO error raised by `sink`
pub fn write_json_chunks<T: Record, W: Write>(
    records: &[T],
    sink: &mut W,
    chunk_bytes: usize,
) -> io::Result<()> {
    let mut pending = 0_usize;
    for chunk in JsonChunks::new(records) {
        sink.write_all(chunk.as_bytes())?;
        pending += chunk.len();
        if pending >= chunk_bytes {
            sink.flush()?;
            pending = 0;
        }
    }
    sink.flush()
}

/// yields the TSV line (without terminator) of every record, in collection order
pub fn to_tsv_lines<T: Record>(records: &[T]) -> impl Iterator<Item = String> + '_ {
    records.iter().map(T::to_tsv)
}
