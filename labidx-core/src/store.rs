//! Reading and writing catalog JSON files.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::{CatalogError, Result};

/// Read a catalog file. Missing or empty files are skipped with a warning
/// and yield `Ok(None)`; invalid JSON is a `CatalogParse` error.
pub fn read_catalog<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(file = %path.display(), "skipping missing catalog");
            return Ok(None);
        }
        Err(e) => return Err(CatalogError::io(path, e)),
    };
    if text.trim().is_empty() {
        warn!(file = %path.display(), "skipping empty catalog");
        return Ok(None);
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| CatalogError::CatalogParse { path: path.to_path_buf(), source })
}

/// Serialize fully, then write: a serialization failure leaves `path` untouched.
pub fn write_catalog<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = to_pretty_json(value)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }
    }
    fs::write(path, bytes).map_err(|e| CatalogError::io(path, e))
}

/// Pretty JSON with 4-space indentation and a trailing newline.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn missing_and_empty_are_skipped() {
        let td = tempfile::tempdir().unwrap();
        let missing = td.path().join("nope.json");
        assert!(read_catalog::<Value>(&missing).unwrap().is_none());
        let empty = td.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();
        assert!(read_catalog::<Value>(&empty).unwrap().is_none());
    }

    #[test]
    fn invalid_json_is_a_parse_failure() {
        let td = tempfile::tempdir().unwrap();
        let bad = td.path().join("bad.json");
        fs::write(&bad, "{\"QEMU\": [").unwrap();
        let err = read_catalog::<Value>(&bad).unwrap_err();
        assert!(matches!(err, CatalogError::CatalogParse { .. }), "{err}");
    }

    #[test]
    fn writes_four_space_indent() {
        let td = tempfile::tempdir().unwrap();
        let out = td.path().join("sub").join("x.json");
        write_catalog(&out, &serde_json::json!({"a": [1]})).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(text, "{\n    \"a\": [\n        1\n    ]\n}\n");
    }
}
