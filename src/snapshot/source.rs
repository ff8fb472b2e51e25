//! Record sources
//!
//! A source performs one forward pass over a dump and hands each decoded
//! record to a visitor. The visitor returns `ControlFlow::Break` to stop
//! the pass early; a decode error aborts the pass and is returned.

use super::{KeyFilter, SnapshotRecord, SourceError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::ControlFlow;
use std::path::Path;

/// Result of a completed (or deliberately stopped) pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Records handed to the visitor
    pub delivered: u64,
    /// Records dropped by an upstream filter
    pub filtered: u64,
    /// The visitor asked to stop before the end of the dump
    pub stopped_early: bool,
}

/// Synchronous, finite source of snapshot records
pub trait RecordSource {
    fn scan<F>(&mut self, visit: F) -> Result<ScanOutcome, SourceError>
    where
        F: FnMut(SnapshotRecord) -> ControlFlow<()>;
}

/// Drive any fallible record iterator through a visitor
fn drive<I, F>(records: I, mut visit: F) -> Result<ScanOutcome, SourceError>
where
    I: Iterator<Item = Result<SnapshotRecord, SourceError>>,
    F: FnMut(SnapshotRecord) -> ControlFlow<()>,
{
    let mut outcome = ScanOutcome::default();
    for record in records {
        let record = record?;
        outcome.delivered += 1;
        if visit(record).is_break() {
            outcome.stopped_early = true;
            break;
        }
    }
    Ok(outcome)
}

/// Adapts an in-memory iterator of records into a source
pub struct IterSource<I> {
    records: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Result<SnapshotRecord, SourceError>>,
{
    pub fn new(records: I) -> Self {
        IterSource { records }
    }
}

impl IterSource<std::vec::IntoIter<Result<SnapshotRecord, SourceError>>> {
    /// Source over records that all decode successfully
    pub fn from_records(records: Vec<SnapshotRecord>) -> Self {
        let records: Vec<Result<SnapshotRecord, SourceError>> =
            records.into_iter().map(Ok).collect();
        IterSource::new(records.into_iter())
    }
}

impl<I> RecordSource for IterSource<I>
where
    I: Iterator<Item = Result<SnapshotRecord, SourceError>>,
{
    fn scan<F>(&mut self, visit: F) -> Result<ScanOutcome, SourceError>
    where
        F: FnMut(SnapshotRecord) -> ControlFlow<()>,
    {
        drive(&mut self.records, visit)
    }
}

/// Reads a JSON-lines export, one record object per line
///
/// Blank lines are skipped. Line numbers in decode errors are 1-based.
pub struct JsonLinesSource<R> {
    lines: JsonLines<R>,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a dump file on disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(JsonLinesSource::new(BufReader::with_capacity(64 * 1024, file)))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        JsonLinesSource {
            lines: JsonLines {
                reader,
                line_no: 0,
                buf: String::with_capacity(256),
            },
        }
    }
}

impl<R: BufRead> RecordSource for JsonLinesSource<R> {
    fn scan<F>(&mut self, visit: F) -> Result<ScanOutcome, SourceError>
    where
        F: FnMut(SnapshotRecord) -> ControlFlow<()>,
    {
        drive(&mut self.lines, visit)
    }
}

/// Line decoder behind `JsonLinesSource`
struct JsonLines<R> {
    reader: R,
    line_no: u64,
    buf: String,
}

impl<R: BufRead> Iterator for JsonLines<R> {
    type Item = Result<SnapshotRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    let line = self.buf.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(line).map_err(|e| SourceError::Decode {
                        line: self.line_no,
                        message: e.to_string(),
                    }));
                }
                Err(e) => return Some(Err(SourceError::Io(e))),
            }
        }
    }
}

/// Source wrapper that drops records whose key does not match a filter
pub struct FilteredSource<S> {
    inner: S,
    filter: KeyFilter,
}

impl<S: RecordSource> FilteredSource<S> {
    pub fn new(inner: S, filter: KeyFilter) -> Self {
        FilteredSource { inner, filter }
    }
}

impl<S: RecordSource> RecordSource for FilteredSource<S> {
    fn scan<F>(&mut self, mut visit: F) -> Result<ScanOutcome, SourceError>
    where
        F: FnMut(SnapshotRecord) -> ControlFlow<()>,
    {
        let filter = &self.filter;
        let mut delivered = 0u64;
        let mut outcome = self.inner.scan(|record| {
            if !filter.matches(&record.key) {
                return ControlFlow::Continue(());
            }
            delivered += 1;
            visit(record)
        })?;
        outcome.filtered = outcome.delivered - delivered;
        outcome.delivered = delivered;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ObjectType;
    use std::io::{Cursor, Write};

    fn dump(lines: &[&str]) -> JsonLinesSource<Cursor<Vec<u8>>> {
        let text = lines.join("\n");
        JsonLinesSource::new(Cursor::new(text.into_bytes()))
    }

    #[test]
    fn test_json_lines_delivers_in_order() {
        let mut source = dump(&[
            r#"{"db":0,"key":"a","type":"string","size":1}"#,
            "",
            r#"{"db":0,"key":"b","type":"list","size":2,"element_count":2}"#,
        ]);
        let mut keys = Vec::new();
        let outcome = source
            .scan(|record| {
                keys.push(record.key);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(outcome.delivered, 2);
        assert!(!outcome.stopped_early);
    }

    #[test]
    fn test_json_lines_stop_then_resume() {
        let mut source = dump(&[
            r#"{"db":0,"key":"a","type":"string","size":1}"#,
            r#"{"db":0,"key":"b","type":"string","size":2}"#,
            r#"{"db":0,"key":"c","type":"string","size":3}"#,
        ]);

        let mut first = Vec::new();
        let outcome = source
            .scan(|record| {
                first.push(record.key);
                ControlFlow::Break(())
            })
            .unwrap();
        assert!(outcome.stopped_early);
        assert_eq!(first, vec!["a"]);

        // The next pass picks up after the record that stopped the first one
        let mut rest = Vec::new();
        let outcome = source
            .scan(|record| {
                rest.push(record.key);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert!(!outcome.stopped_early);
        assert_eq!(rest, vec!["b", "c"]);
    }

    #[test]
    fn test_decode_error_aborts_with_line_number() {
        let mut source = dump(&[
            r#"{"db":0,"key":"a","type":"string","size":1}"#,
            r#"{"db":0,"key":"b","type":"string""#,
            r#"{"db":0,"key":"c","type":"string","size":1}"#,
        ]);
        let mut seen = 0;
        let err = source
            .scan(|_| {
                seen += 1;
                ControlFlow::Continue(())
            })
            .unwrap_err();
        assert_eq!(seen, 1);
        match err {
            SourceError::Decode { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_visitor_can_stop_early() {
        let records = (0..10)
            .map(|i| SnapshotRecord::new(0, format!("k{}", i), ObjectType::String, i))
            .collect();
        let mut source = IterSource::from_records(records);
        let mut seen = 0;
        let outcome = source
            .scan(|_| {
                seen += 1;
                if seen == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(seen, 3);
        assert!(outcome.stopped_early);
        assert_eq!(outcome.delivered, 3);
    }

    #[test]
    fn test_filtered_source_counts_dropped_records() {
        let records = vec![
            SnapshotRecord::new(0, "user:1", ObjectType::Hash, 10),
            SnapshotRecord::new(0, "session:1", ObjectType::String, 10),
            SnapshotRecord::new(0, "user:2", ObjectType::Hash, 10),
        ];
        let filter = KeyFilter::new("^user:").unwrap();
        let mut source = FilteredSource::new(IterSource::from_records(records), filter);

        let mut keys = Vec::new();
        let outcome = source
            .scan(|record| {
                keys.push(record.key);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(keys, vec!["user:1", "user:2"]);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.filtered, 1);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonLinesSource::open(dir.path().join("missing.jsonl"))
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[test]
    fn test_open_file_on_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"db":1,"key":"x","type":"set","size":7}}"#).unwrap();
        let mut source = JsonLinesSource::open(file.path()).unwrap();
        let mut sizes = Vec::new();
        source
            .scan(|record| {
                sizes.push(record.size);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(sizes, vec![7]);
    }
}
