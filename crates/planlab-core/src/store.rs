use crate::attr::{record_from_json, record_to_json, AttrValue};
use crate::run::{RunKey, RunRecord};
use crate::{atomic_write_json_pretty, FsError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read run store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run store {path} is not valid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("run store {0} must contain a JSON object keyed by run id")]
    NotAnObject(String),

    #[error("run '{0}' has no algorithm/domain/problem identity")]
    MissingIdentity(String),

    #[error(transparent)]
    Write(#[from] FsError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Problems grouped by (domain, problem), runs ordered as requested.
pub type ProblemRuns<'a> = BTreeMap<(String, String), Vec<&'a RunRecord>>;

/// In-memory collection of parsed runs, keyed by run id.
#[derive(Debug, Clone, Default)]
pub struct RunStore {
    runs: BTreeMap<String, RunRecord>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Inserts a run, replacing any earlier run with the same identity.
    pub fn insert(&mut self, run: RunRecord) -> Option<RunRecord> {
        self.runs.insert(run.key.id(), run)
    }

    pub fn get(&self, key: &RunKey) -> Option<&RunRecord> {
        self.runs.get(&key.id())
    }

    pub fn runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.values()
    }

    pub fn into_runs(self) -> impl Iterator<Item = RunRecord> {
        self.runs.into_values()
    }

    /// Merges `other` into `self`; runs from `other` win on identity clashes.
    pub fn merge(&mut self, other: RunStore) {
        for (id, run) in other.runs {
            self.runs.insert(id, run);
        }
    }

    pub fn algorithms(&self) -> BTreeSet<String> {
        self.runs.values().map(|r| r.key.algorithm.clone()).collect()
    }

    pub fn domains(&self) -> BTreeSet<String> {
        self.runs.values().map(|r| r.key.domain.clone()).collect()
    }

    /// Returns a new store holding only runs of the given algorithms.
    pub fn filter_algorithms(&self, allowed: &[String]) -> RunStore {
        let allowed: BTreeSet<&str> = allowed.iter().map(|s| s.as_str()).collect();
        RunStore {
            runs: self
                .runs
                .iter()
                .filter(|(_, r)| allowed.contains(r.key.algorithm.as_str()))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
        }
    }

    /// Groups runs by (domain, problem). Runs inside a bucket follow the order
    /// of `algorithm_order`; algorithms not listed there sort after it by name.
    pub fn problem_runs(&self, algorithm_order: &[String]) -> ProblemRuns<'_> {
        let rank = |alg: &str| {
            algorithm_order
                .iter()
                .position(|a| a == alg)
                .unwrap_or(algorithm_order.len())
        };
        let mut out: ProblemRuns<'_> = BTreeMap::new();
        for run in self.runs.values() {
            out.entry(run.key.problem_key()).or_default().push(run);
        }
        for runs in out.values_mut() {
            runs.sort_by(|a, b| {
                rank(&a.key.algorithm)
                    .cmp(&rank(&b.key.algorithm))
                    .then_with(|| a.key.algorithm.cmp(&b.key.algorithm))
            });
        }
        out
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&data).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&value).map_err(|e| match e {
            StoreError::NotAnObject(_) => StoreError::NotAnObject(path.display().to_string()),
            other => other,
        })
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| StoreError::NotAnObject("<memory>".to_string()))?;
        let mut store = RunStore::new();
        for (id, props) in obj {
            let fields =
                record_from_json(props).ok_or_else(|| StoreError::MissingIdentity(id.clone()))?;
            let key = identity_of(id, props, &fields)?;
            store.insert(RunRecord::with_fields(key, fields));
        }
        Ok(store)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.runs
                .iter()
                .map(|(id, run)| {
                    let mut fields = run.fields.clone();
                    fields.extend(run.identity_fields());
                    (id.clone(), record_to_json(&fields))
                })
                .collect(),
        )
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json_pretty(path, &self.to_json())?;
        Ok(())
    }
}

fn identity_of(id: &str, props: &Value, fields: &crate::attr::Record) -> Result<RunKey> {
    let field = |name: &str| fields.get(name).and_then(AttrValue::as_str).map(String::from);
    if let (Some(a), Some(d), Some(p)) = (field("algorithm"), field("domain"), field("problem")) {
        return Ok(RunKey::new(a, d, p));
    }
    // Older property files only carry `"id": [algorithm, domain, problem]`.
    let parts = props
        .get("id")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    match parts.as_slice() {
        [a, d, p] => Ok(RunKey::new(a, d, p)),
        _ => Err(StoreError::MissingIdentity(id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(alg: &str, domain: &str, problem: &str, coverage: i64) -> RunRecord {
        let mut r = RunRecord::new(RunKey::new(alg, domain, problem));
        r.fields.insert("coverage".to_string(), AttrValue::Int(coverage));
        r
    }

    #[test]
    fn problem_runs_follow_requested_algorithm_order() {
        let mut store = RunStore::new();
        store.insert(run("a", "gripper", "p1", 1));
        store.insert(run("b", "gripper", "p1", 0));
        store.insert(run("c", "gripper", "p1", 0));
        let order = vec!["c".to_string(), "a".to_string()];
        let grouped = store.problem_runs(&order);
        let runs = &grouped[&("gripper".to_string(), "p1".to_string())];
        let algs: Vec<&str> = runs.iter().map(|r| r.key.algorithm.as_str()).collect();
        assert_eq!(algs, vec!["c", "a", "b"]);
    }

    #[test]
    fn merge_overwrites_same_identity() {
        let mut first = RunStore::new();
        first.insert(run("a", "depot", "p01", 0));
        let mut second = RunStore::new();
        second.insert(run("a", "depot", "p01", 1));
        second.insert(run("b", "depot", "p01", 1));
        first.merge(second);
        assert_eq!(first.len(), 2);
        let key = RunKey::new("a", "depot", "p01");
        assert_eq!(first.get(&key).and_then(|r| r.get("coverage")), Some(&AttrValue::Int(1)));
    }

    #[test]
    fn from_json_accepts_legacy_id_arrays() {
        let store = RunStore::from_json(&json!({
            "x": {"id": ["blind", "gripper", "prob01.pddl"], "coverage": 1}
        }))
        .expect("store");
        let key = RunKey::new("blind", "gripper", "prob01.pddl");
        assert!(store.get(&key).is_some());
    }

    #[test]
    fn from_json_rejects_runs_without_identity() {
        let err = RunStore::from_json(&json!({"x": {"coverage": 1}})).expect_err("no identity");
        assert!(matches!(err, StoreError::MissingIdentity(id) if id == "x"));
    }

    #[test]
    fn save_and_load_keep_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("properties.json");
        let mut store = RunStore::new();
        store.insert(run("blind", "gripper", "p1", 1));
        store.save(&path).expect("save");
        let loaded = RunStore::load(&path).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.algorithms().into_iter().collect::<Vec<_>>(), vec!["blind"]);
        assert_eq!(loaded.domains().into_iter().collect::<Vec<_>>(), vec!["gripper"]);
    }
}
