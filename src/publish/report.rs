//! Local CSV export of the big-key list

use super::payload::format_size;
use crate::analysis::BigKeyEntry;
use std::io::{self, Write};

pub const CSV_HEADER: &str = "database,key,type,size,size_readable,element_count";

/// Write `entries` as CSV, one row per key in the given order
pub fn write_big_keys_csv<W: Write>(mut out: W, entries: &[BigKeyEntry]) -> io::Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;
    for entry in entries {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            entry.db,
            csv_field(&entry.key),
            entry.object_type,
            entry.size,
            format_size(entry.size),
            entry.element_count
        )?;
    }
    out.flush()
}

/// Quote a field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\"")).into()
    } else {
        value.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ObjectType;

    fn entry(seq: u64, key: &str, size: u64) -> BigKeyEntry {
        BigKeyEntry {
            seq,
            db: 0,
            key: key.to_string(),
            object_type: ObjectType::List,
            size,
            element_count: 4,
        }
    }

    #[test]
    fn test_csv_rows() {
        let mut out = Vec::new();
        write_big_keys_csv(&mut out, &[entry(0, "queue:jobs", 2048), entry(1, "a,\"b\"", 10)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "0,queue:jobs,list,2048,2K,4");
        assert_eq!(lines[2], "0,\"a,\"\"b\"\"\",list,10,10B,4");
    }

    #[test]
    fn test_empty_list_writes_header_only() {
        let mut out = Vec::new();
        write_big_keys_csv(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", CSV_HEADER));
    }
}
