//! Atomic JSONL shard IO.
//!
//! A shard is UTF-8, one JSON record per newline-terminated line, unsorted.
//! Writes go to `<path>.tmp` and rename over the destination, so readers
//! never observe a torn shard; a cancelled or failed write leaves the old
//! content untouched.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use cv_core::{Error, Result};

/// Write all records as one shard, atomically. An empty slice still
/// produces the (empty) shard file.
pub fn write_shard<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut buffer = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buffer, record)
            .map_err(|e| Error::Storage(format!("serialize for {}: {e}", path.display())))?;
        buffer.push(b'\n');
    }
    write_atomic(path, &buffer)
}

/// Read a shard back. An absent shard is an empty shard.
pub fn read_shard<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| {
            Error::Storage(format!(
                "corrupt shard {} at line {}: {e}",
                path.display(),
                number + 1
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Pretty-printed JSON document, written atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buffer = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Storage(format!("serialize for {}: {e}", path.display())))?;
    buffer.push(b'\n');
    write_atomic(path, &buffer)
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Storage(format!("invalid shard path {}", path.display())))?;
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    let write_result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Record {
        id: String,
        value: u32,
    }

    #[test]
    fn shard_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes/files.jsonl");

        let records = vec![
            Record {
                id: "a".into(),
                value: 1,
            },
            Record {
                id: "b".into(),
                value: 2,
            },
        ];
        write_shard(&path, &records).unwrap();

        // Newline-terminated lines, no trailing garbage.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        assert_eq!(raw.lines().count(), 2);
        assert!(!path.with_file_name("files.jsonl.tmp").exists());

        let loaded: Vec<Record> = read_shard(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn absent_shard_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Vec<Record> = read_shard(&dir.path().join("missing.jsonl")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn empty_shard_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        write_shard::<Record>(&path, &[]).unwrap();
        assert!(path.exists());
        let loaded: Vec<Record> = read_shard(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_line_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"id\":\"a\",\"value\":1}\nnot json\n").unwrap();
        let err = read_shard::<Record>(&path).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn rewrite_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shard.jsonl");
        write_shard(
            &path,
            &[Record {
                id: "old".into(),
                value: 1,
            }],
        )
        .unwrap();
        write_shard(
            &path,
            &[Record {
                id: "new".into(),
                value: 2,
            }],
        )
        .unwrap();
        let loaded: Vec<Record> = read_shard(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "new");
    }
}
