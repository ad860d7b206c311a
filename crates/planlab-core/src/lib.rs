//! Shared data model for planlab: attribute values, run records, the run
//! record store, and the small filesystem helpers every step uses.

pub mod attr;
pub mod run;
pub mod store;

pub use attr::{record_from_json, record_to_json, AttrValue, Record};
pub use run::{RunKey, RunRecord};
pub use store::{ProblemRuns, RunStore, StoreError};

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> FsError + '_ {
    move |source| FsError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub fn ensure_dir(path: &Path) -> Result<(), FsError> {
    fs::create_dir_all(path).map_err(io_err(path))
}

/// Writes through a temp file in the same directory and renames it into place.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<(), FsError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
    file.write_all(bytes).map_err(io_err(&tmp))?;
    file.sync_all().map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

pub fn atomic_write_json_pretty(path: &Path, value: &Value) -> Result<(), FsError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn sha256_file(path: &Path) -> Result<String, FsError> {
    let bytes = fs::read(path).map_err(io_err(path))?;
    Ok(sha256_bytes(&bytes))
}

/// Digest of a JSON value with object keys sorted, so semantically equal
/// experiment definitions hash the same.
pub fn canonical_json_digest(value: &Value) -> String {
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    format!("sha256:{}", sha256_bytes(&bytes))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<_, _> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_digest_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": 2, "x": [1, 2]}});
        let b = json!({"a": {"x": [1, 2], "y": 2}, "b": 1});
        assert_eq!(canonical_json_digest(&a), canonical_json_digest(&b));
        assert!(canonical_json_digest(&a).starts_with("sha256:"));
    }

    #[test]
    fn atomic_write_replaces_file_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out.json");
        atomic_write_json_pretty(&path, &json!({"v": 1})).expect("first write");
        atomic_write_json_pretty(&path, &json!({"v": 2})).expect("second write");
        let data = fs::read_to_string(&path).expect("read back");
        let value: Value = serde_json::from_str(&data).expect("json");
        assert_eq!(value["v"], 2);
        let leftovers = fs::read_dir(path.parent().expect("parent"))
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);
    }
}
