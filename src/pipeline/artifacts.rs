//! Artifact I/O
//!
//! JSONL and JSON artifact helpers shared by every stage. Writes go through
//! a temporary file and an atomic rename so a crashed phase never leaves a
//! half-written artifact behind; reads surface malformed lines individually
//! so callers can quarantine them without aborting the stream.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::{Result, TaxonomyError};

/// One line of a JSONL stream: the parsed value or a quarantineable error.
pub type JsonlLine<T> = std::result::Result<T, TaxonomyError>;

/// Read a JSONL artifact, yielding one result per non-empty line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<JsonlLine<T>>> {
    let file = fs::File::open(path).map_err(|e| {
        TaxonomyError::phase(
            "artifact-io",
            format!("missing artifact {}: {e}", path.display()),
        )
    })?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        lines.push(
            serde_json::from_str::<T>(&line).map_err(|e| TaxonomyError::InvalidJsonLine {
                path: path.display().to_string(),
                line: index + 1,
                detail: e.to_string(),
            }),
        );
    }
    Ok(lines)
}

/// Write a JSONL artifact atomically (temp file + rename).
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let tmp = temp_path(path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    {
        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        for item in items {
            serde_json::to_writer(&mut writer, item)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Write a pretty-printed JSON artifact atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = temp_path(path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rendered = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, rendered)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    #[test]
    fn jsonl_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("items.jsonl");
        let items = vec![
            serde_json::json!({"a": 1}),
            serde_json::json!({"a": 2}),
        ];
        write_jsonl(&path, &items).unwrap();

        let read: Vec<JsonlLine<Value>> = read_jsonl(&path).unwrap();
        let values: Vec<Value> = read.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, items);
    }

    #[test]
    fn malformed_lines_surface_individually() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("items.jsonl");
        fs::write(&path, "{\"ok\": 1}\nnot-json\n{\"ok\": 2}\n").unwrap();

        let read: Vec<JsonlLine<Value>> = read_jsonl(&path).unwrap();
        assert_eq!(read.len(), 3);
        assert!(read[0].is_ok());
        assert!(matches!(
            read[1].as_ref().unwrap_err(),
            TaxonomyError::InvalidJsonLine { line: 2, .. }
        ));
        assert!(read[2].is_ok());
    }

    #[test]
    fn missing_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("absent.jsonl");
        assert!(read_jsonl::<Value>(&missing).is_err());
    }

    #[test]
    fn writes_leave_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.json");
        write_json(&path, &serde_json::json!({"x": 1})).unwrap();
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.json"]);
    }
}
