use anyhow::{anyhow, Context, Result};
use jsonschema::JSONSchema;
use planlab_core::canonical_json_digest;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::suite::{resolve_suite, Task};

const EXPERIMENT_SCHEMA: &str = include_str!("../schemas/experiment_v1.jsonschema");
const STATIC_PROPERTIES_SCHEMA: &str = include_str!("../schemas/static_properties_v1.jsonschema");

pub const SCHEMA_NAMES: &[&str] = &["experiment_v1", "static_properties_v1"];

/// Compiles one of the embedded schemas by name (with or without the
/// `.jsonschema` suffix).
pub fn compile_schema(name: &str) -> Result<JSONSchema> {
    let raw = match name.trim_end_matches(".jsonschema") {
        "experiment_v1" => EXPERIMENT_SCHEMA,
        "static_properties_v1" => STATIC_PROPERTIES_SCHEMA,
        other => {
            return Err(anyhow!(
                "unknown schema '{}' (known: {})",
                other,
                SCHEMA_NAMES.join(", ")
            ))
        }
    };
    let schema: Value = serde_json::from_str(raw)?;
    JSONSchema::compile(&schema).map_err(|e| anyhow!("invalid embedded schema {}: {}", name, e))
}

/// Validates `value`, returning every violation message.
pub fn schema_errors(schema: &JSONSchema, value: &Value) -> Vec<String> {
    match schema.validate(value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let at = e.instance_path.to_string();
                if at.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", at, e)
                }
            })
            .collect(),
    }
}

/// Reads YAML or JSON (by extension) into a JSON value.
pub fn load_document(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    if is_json {
        return serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()));
    }
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(serde_json::to_value(yaml_value)?)
}

fn validate_required_fields(json_value: &Value) -> Result<()> {
    let required: &[&str] = &[
        "/experiment/id",
        "/planner/command",
        "/suite/benchmarks_dir",
        "/suite/problems",
        "/algorithms",
    ];
    let mut missing = Vec::new();
    for pointer in required {
        let is_missing = match json_value.pointer(pointer) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            _ => false,
        };
        if is_missing {
            missing.push(*pointer);
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "experiment.yaml missing required fields:\n{}",
            missing
                .iter()
                .map(|p| format!("  - {}", p))
                .collect::<Vec<_>>()
                .join("\n")
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub time_limit_seconds: Option<u64>,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    /// Pipeline stages passed through to the driver (translate, search, ...).
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuiteConfig {
    pub benchmarks_dir: PathBuf,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlgorithmConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub driver_options: Vec<String>,
}

fn default_parsers() -> Vec<String> {
    vec!["planner".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct Experiment {
    pub experiment: ExperimentMeta,
    pub planner: PlannerConfig,
    pub suite: SuiteConfig,
    pub algorithms: Vec<AlgorithmConfig>,
    #[serde(default = "default_parsers")]
    pub parsers: Vec<String>,
    #[serde(default)]
    pub revisions: Vec<String>,
}

/// An experiment definition together with where it was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedExperiment {
    pub definition: Experiment,
    pub source_path: PathBuf,
    /// Absolute directory holding the definition file; relative paths
    /// resolve here.
    pub base_dir: PathBuf,
    pub digest: String,
    pub raw: Value,
}

impl LoadedExperiment {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = load_document(path)?;
        validate_required_fields(&raw)?;
        let schema = compile_schema("experiment_v1")?;
        let errors = schema_errors(&schema, &raw);
        if !errors.is_empty() {
            return Err(anyhow!(
                "experiment schema validation failed ({}): {}",
                path.display(),
                errors.join("; ")
            ));
        }
        let definition: Experiment = serde_json::from_value(raw.clone())?;
        let mut names: Vec<&str> = definition.algorithms.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(anyhow!("duplicate algorithm name: {}", dup[0]));
        }
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let base_dir = fs::canonicalize(parent)
            .with_context(|| format!("resolving directory of {}", path.display()))?;
        Ok(Self {
            digest: canonical_json_digest(&raw),
            definition,
            source_path: path.to_path_buf(),
            base_dir,
            raw,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.experiment.id
    }

    /// `<base>/data/<id>` unless the caller chooses another directory.
    pub fn default_exp_dir(&self) -> PathBuf {
        self.base_dir.join("data").join(self.id())
    }

    pub fn benchmarks_dir(&self) -> PathBuf {
        let dir = &self.definition.suite.benchmarks_dir;
        if dir.is_absolute() {
            dir.clone()
        } else {
            self.base_dir.join(dir)
        }
    }

    pub fn tasks(&self) -> Result<Vec<Task>> {
        resolve_suite(&self.benchmarks_dir(), &self.definition.suite.problems)
    }

    /// The planner command with a relative program path resolved against
    /// the definition's directory.
    pub fn planner_command(&self) -> Vec<String> {
        let mut command = self.definition.planner.command.clone();
        if let Some(first) = command.first_mut() {
            if first.contains('/') && Path::new(first.as_str()).is_relative() {
                *first = self.base_dir.join(first.as_str()).to_string_lossy().to_string();
            }
        }
        command
    }
}

#[derive(Debug, Clone)]
pub struct ExperimentSummary {
    pub exp_id: String,
    pub name: String,
    pub digest: String,
    pub planner_command: Vec<String>,
    pub time_limit_seconds: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub benchmarks_dir: PathBuf,
    pub suite: Vec<String>,
    pub task_count: usize,
    pub algorithms: Vec<String>,
    pub total_runs: usize,
    pub parsers: Vec<String>,
}

pub fn describe_experiment(path: &Path) -> Result<ExperimentSummary> {
    let exp = LoadedExperiment::load(path)?;
    summarize(&exp)
}

pub fn summarize(exp: &LoadedExperiment) -> Result<ExperimentSummary> {
    let task_count = exp.tasks()?.len();
    let def = &exp.definition;
    let algorithms: Vec<String> = def.algorithms.iter().map(|a| a.name.clone()).collect();
    Ok(ExperimentSummary {
        exp_id: def.experiment.id.clone(),
        name: def.experiment.name.clone(),
        digest: exp.digest.clone(),
        planner_command: exp.planner_command(),
        time_limit_seconds: def.planner.time_limit_seconds,
        memory_limit_mb: def.planner.memory_limit_mb,
        benchmarks_dir: exp.benchmarks_dir(),
        suite: def.suite.problems.clone(),
        task_count,
        total_runs: task_count * algorithms.len(),
        algorithms,
        parsers: def.parsers.clone(),
    })
}

pub const EXPERIMENT_TEMPLATE: &str = "\
experiment:
  id: ''                              # REQUIRED: directory-safe name
  name: ''
planner:
  command: []                         # REQUIRED: e.g. ['./fast-downward.py']
  time_limit_seconds: 1800
  memory_limit_mb: 4096
  components: []                      # optional driver stages
suite:
  benchmarks_dir: benchmarks          # REQUIRED
  problems: []                        # REQUIRED: 'domain' or 'domain:problem.pddl'
algorithms:                           # REQUIRED: at least one
  - name: blind
    args: ['--search', 'astar(blind())']
    driver_options: []
parsers: [planner]                    # planner | translator | dominance | fts | symbolic
revisions: []                         # prefixes stripped by remove-revision
";
