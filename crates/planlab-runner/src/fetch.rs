use anyhow::{anyhow, Context, Result};
use planlab_core::{record_from_json, AttrValue, RunKey, RunRecord, RunStore};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::planner::PROPERTIES;
use crate::steps::run_dirs;

/// `<exp_dir>-eval`, next to the experiment directory.
pub fn default_eval_dir(exp_dir: &Path) -> PathBuf {
    let name = exp_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "exp".to_string());
    exp_dir.with_file_name(format!("{}-eval", name))
}

pub fn eval_store_path(eval_dir: &Path) -> PathBuf {
    eval_dir.join(PROPERTIES)
}

/// Transformation applied to every fetched run, in the order given.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchFilter {
    /// Strips `<revision>-` from algorithm names.
    RemoveRevision(Vec<String>),
    /// Keeps only runs of `from`, renamed to `to`.
    Rename { from: String, to: String },
    /// Adds `evaluations_per_time` where enough states were evaluated.
    EvaluationsPerTime,
}

const MIN_EVALUATIONS_FOR_RATE: f64 = 100.0;

impl FetchFilter {
    pub fn apply(&self, run: RunRecord) -> Option<RunRecord> {
        match self {
            FetchFilter::RemoveRevision(revisions) => {
                let mut algorithm = run.key.algorithm.clone();
                for rev in revisions {
                    algorithm = algorithm.replace(&format!("{}-", rev), "");
                }
                Some(rename(run, algorithm))
            }
            FetchFilter::Rename { from, to } => {
                (&run.key.algorithm == from).then(|| rename(run, to.clone()))
            }
            FetchFilter::EvaluationsPerTime => {
                let mut run = run;
                let evaluations = run.get_f64("evaluations");
                let time = run.get_f64("search_time");
                if let (Some(evaluations), Some(time)) = (evaluations, time) {
                    if evaluations >= MIN_EVALUATIONS_FOR_RATE && time != 0.0 {
                        run.fields.insert(
                            "evaluations_per_time".to_string(),
                            AttrValue::Float(evaluations / time),
                        );
                    }
                }
                Some(run)
            }
        }
    }

    /// Fills an empty revision list from the experiment definition.
    pub fn with_default_revisions(self, revisions: &[String]) -> Self {
        match self {
            FetchFilter::RemoveRevision(list) if list.is_empty() => {
                FetchFilter::RemoveRevision(revisions.to_vec())
            }
            other => other,
        }
    }
}

fn rename(run: RunRecord, algorithm: String) -> RunRecord {
    let key = RunKey::new(algorithm, run.key.domain.clone(), run.key.problem.clone());
    let mut fields = run.fields;
    fields.insert("algorithm".to_string(), key.algorithm.as_str().into());
    RunRecord::with_fields(key, fields)
}

impl FromStr for FetchFilter {
    type Err = anyhow::Error;

    /// `remove-revision[:REV,REV]`, `rename:ALGO=NEW`, `evaluations-per-time`.
    fn from_str(s: &str) -> Result<Self> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        match (name, arg) {
            ("remove-revision", arg) => Ok(FetchFilter::RemoveRevision(
                arg.map(|a| {
                    a.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            )),
            ("rename", Some(arg)) => {
                let (from, to) = arg
                    .split_once('=')
                    .ok_or_else(|| anyhow!("invalid filter '{}': expected rename:ALGO=NEW", s))?;
                if from.is_empty() || to.is_empty() {
                    return Err(anyhow!("invalid filter '{}': empty algorithm name", s));
                }
                Ok(FetchFilter::Rename {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
            ("evaluations-per-time", None) => Ok(FetchFilter::EvaluationsPerTime),
            _ => Err(anyhow!(
                "unknown filter '{}' (expected remove-revision[:REVS], rename:ALGO=NEW or evaluations-per-time)",
                s
            )),
        }
    }
}

impl fmt::Display for FetchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFilter::RemoveRevision(revs) => write!(f, "remove-revision:{}", revs.join(",")),
            FetchFilter::Rename { from, to } => write!(f, "rename:{}={}", from, to),
            FetchFilter::EvaluationsPerTime => write!(f, "evaluations-per-time"),
        }
    }
}

/// Loads runs from an eval directory (`properties.json` at the top) or an
/// experiment directory (parsed run dirs under `runs/`).
pub fn load_source(dir: &Path) -> Result<RunStore> {
    let combined = eval_store_path(dir);
    if combined.is_file() {
        return RunStore::load(&combined).with_context(|| format!("loading {}", combined.display()));
    }
    let mut store = RunStore::new();
    for run_dir in run_dirs(dir)? {
        let path = run_dir.join(PROPERTIES);
        if !path.is_file() {
            debug!(run_dir = %run_dir.display(), "run not parsed yet, skipping");
            continue;
        }
        let data = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let value: Value =
            serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        let fields = record_from_json(&value)
            .ok_or_else(|| anyhow!("properties are not an object: {}", path.display()))?;
        let field = |name: &str| {
            fields
                .get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("{} lacks '{}'", path.display(), name))
        };
        let key = RunKey::new(field("algorithm")?, field("domain")?, field("problem")?);
        store.insert(RunRecord::with_fields(key, fields));
    }
    Ok(store)
}

#[derive(Debug, Clone)]
pub struct FetchSummary {
    pub eval_dir: PathBuf,
    pub fetched: usize,
    pub dropped: usize,
    pub total: usize,
}

/// Gathers runs from `sources` into the eval store. Filters run in order;
/// a filter returning nothing drops the run. Without `merge` the eval store
/// is rebuilt from scratch; with it, fetched runs overwrite same-id runs.
pub fn fetch(
    sources: &[PathBuf],
    eval_dir: &Path,
    filters: &[FetchFilter],
    merge: bool,
) -> Result<FetchSummary> {
    if sources.is_empty() {
        return Err(anyhow!("fetch needs at least one source directory"));
    }
    let target = eval_store_path(eval_dir);
    let mut store = if merge && target.is_file() {
        RunStore::load(&target)?
    } else {
        RunStore::new()
    };

    let mut fetched = 0;
    let mut dropped = 0;
    for source in sources {
        let mut incoming = RunStore::new();
        for run in load_source(source)?.into_runs() {
            match filters.iter().try_fold(run, |run, filter| filter.apply(run)) {
                Some(run) => {
                    incoming.insert(run);
                    fetched += 1;
                }
                None => dropped += 1,
            }
        }
        info!(source = %source.display(), runs = incoming.len(), "fetched runs");
        store.merge(incoming);
    }
    store.save(&target)?;
    Ok(FetchSummary {
        eval_dir: eval_dir.to_path_buf(),
        fetched,
        dropped,
        total: store.len(),
    })
}
