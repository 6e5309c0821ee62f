//! JSONL codec: one self-describing JSON record per line.
//!
//! Appends write a whole line in a single call. Rewrites go to a temporary
//! sibling file that is renamed over the original, so a crash mid-rewrite
//! leaves either the old or the new log, never a truncated one.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{Result, StoreError};

/// Records parsed from a log, plus how many lines were unusable.
#[derive(Debug)]
pub struct LoadOutcome<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for LoadOutcome<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Encode one record as a newline-terminated JSON line.
///
/// The line is parsed back before it is returned. serde_json writes a
/// non-finite float as `null`, which the reader would later reject, so such
/// a record fails here instead of vanishing on the next load.
pub fn encode_line<T: Serialize + DeserializeOwned>(record: &T) -> Result<String> {
    let mut line = serde_json::to_string(record)?;
    if let Err(e) = serde_json::from_str::<T>(&line) {
        return Err(StoreError::Serialization(format!(
            "record does not survive encoding: {e}"
        )));
    }
    line.push('\n');
    Ok(line)
}

/// Read records from a JSONL reader.
///
/// Blank lines are ignored. Lines that fail to parse (bad JSON, wrong
/// shape, invalid UTF-8) are skipped with a warning; only I/O errors abort.
pub fn read_records<T: DeserializeOwned>(
    reader: impl BufRead,
    source: &Path,
) -> Result<LoadOutcome<T>> {
    let mut outcome = LoadOutcome::default();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let trimmed = trim_ascii(&line);
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_slice::<T>(trimmed) {
            Ok(record) => outcome.records.push(record),
            Err(e) => {
                outcome.skipped += 1;
                warn!(
                    path = %source.display(),
                    line = idx + 1,
                    error = %e,
                    content = %String::from_utf8_lossy(trimmed),
                    "skipping malformed record line"
                );
            }
        }
    }

    Ok(outcome)
}

/// Read records from a JSONL file. A missing file yields no records.
pub fn read_records_from_path<T: DeserializeOwned>(path: &Path) -> Result<LoadOutcome<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadOutcome::default()),
        Err(e) => return Err(e.into()),
    };
    read_records(BufReader::new(file), path)
}

/// Replace the file at `path` with exactly `records`, atomically.
pub fn write_records_atomic<T>(path: &Path, records: &[T]) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    let tmp_path = tmp_write_path(path);

    let write_result = (|| -> Result<()> {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            writer.write_all(encode_line(record)?.as_bytes())?;
        }
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error.into());
    }

    sync_parent_dir(path)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            File::open(parent)?.sync_all()?;
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convpipe_core::ConversionRequest;

    #[test]
    fn test_encode_line_is_single_line() {
        let line = encode_line(&ConversionRequest::new("USD", "EUR", 1.0)).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_encode_line_rejects_non_finite_amount() {
        for amount in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let request = ConversionRequest::new("USD", "EUR", amount);
            let err = encode_line(&request).unwrap_err();
            assert!(matches!(err, StoreError::Serialization(_)), "{amount}");
        }
    }

    #[test]
    fn test_atomic_write_refuses_non_finite_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.jsonl");
        write_records_atomic(&path, &[ConversionRequest::new("USD", "EUR", 1.0)]).unwrap();

        let bad = [ConversionRequest::new("USD", "EUR", f64::NAN)];
        assert!(write_records_atomic(&path, &bad).is_err());

        let kept: LoadOutcome<ConversionRequest> = read_records_from_path(&path).unwrap();
        assert_eq!(kept.records.len(), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_skips_malformed_lines() {
        let data = concat!(
            r#"{"id":"a","from":"USD","to":"EUR","amount":1.0}"#,
            "\n",
            "not json at all\n",
            "\n",
            r#"{"id":"b","from":"GBP"}"#,
            "\n",
            r#"{"id":"c","from":"JPY","to":"USD","amount":3.0}"#,
            "\r\n",
        );
        let outcome: LoadOutcome<ConversionRequest> =
            read_records(data.as_bytes(), Path::new("mem")).unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.records[0].id.as_str(), "a");
        assert_eq!(outcome.records[1].id.as_str(), "c");
    }

    #[test]
    fn test_read_skips_invalid_utf8() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
        data.extend_from_slice(br#"{"id":"a","from":"USD","to":"EUR","amount":1.0}"#);
        let outcome: LoadOutcome<ConversionRequest> =
            read_records(data.as_slice(), Path::new("mem")).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let outcome: LoadOutcome<ConversionRequest> =
            read_records_from_path(&dir.path().join("absent.jsonl")).unwrap();
        assert!(outcome.records.is_empty());
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.jsonl");

        let mut first = ConversionRequest::new("USD", "EUR", 1.0);
        first.id = "first".into();
        write_records_atomic(&path, &[first]).unwrap();

        let mut second = ConversionRequest::new("GBP", "USD", 2.0);
        second.id = "second".into();
        write_records_atomic(&path, &[second]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("first"));
        assert!(content.contains("second"));

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary file must not survive the rename");
    }
}
