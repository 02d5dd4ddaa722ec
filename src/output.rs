//! Writing JSON artifacts to the output folder.

use std::fs::{self, File};
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::error::WriteError;

/// Writes `document` to `path` as two-space indented JSON, creating parent
/// directories as needed. Existing files are overwritten.
pub fn write_json<T>(path: &Utf8Path, document: &T) -> Result<(), WriteError>
where
    T: Serialize + ?Sized,
{
    let io_error = |source| WriteError::Io {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, document).map_err(|source| {
        WriteError::Serialize {
            path: path.to_owned(),
            source,
        }
    })?;

    writer.flush().map_err(io_error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use camino::Utf8PathBuf;
    use chrono::DateTime;
    use serde::Serializer;
    use serde_json::json;

    use super::*;

    fn temp_path(dir: &tempfile::TempDir, rel: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(rel)).unwrap()
    }

    #[test]
    fn test_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "output/spa/posts/hello.html.json");

        write_json(&path, &json!({ "id": "/posts/hello.html.json" })).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n  \"id\": \"/posts/hello.html.json\"\n}");
    }

    #[test]
    fn test_non_ascii_literal_and_iso_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "doc.json");

        let date = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+02:00").unwrap();
        let mut doc = BTreeMap::new();
        doc.insert("title", json!("Zażółć gęślą jaźń"));
        doc.insert("date", json!(date));

        write_json(&path, &doc).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Zażółć gęślą jaźń"));
        assert!(text.contains("\"2024-05-01T12:00:00+02:00\""));
    }

    #[test]
    fn test_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "a.json");

        write_json(&path, &json!([1, 2, 3])).unwrap();
        write_json(&path, &json!([])).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    struct Failing;

    impl Serialize for Failing {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to serialize"))
        }
    }

    #[test]
    fn test_serialize_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "broken.json");

        let err = write_json(&path, &Failing).unwrap_err();
        assert!(matches!(err, WriteError::Serialize { .. }));
        // The handle is closed, so the file can be replaced.
        write_json(&path, &json!({})).unwrap();
    }
}
