use anyhow::{anyhow, Context, Result};
use planlab_core::{
    atomic_write_bytes, atomic_write_json_pretty, ensure_dir, record_from_json, record_to_json,
    RunKey,
};
use planlab_parser::combined;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::experiment::LoadedExperiment;
use crate::planner::{
    build_command, execute, planner_digest, runs_dir, static_properties, RunPaths,
    STATIC_PROPERTIES,
};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Re-run pairs that already have static properties.
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub exp_dir: PathBuf,
    pub total: usize,
    pub executed: usize,
    pub skipped: usize,
    /// Runs whose planner exited non-zero or by signal.
    pub nonzero_exit: usize,
}

/// Runs every (algorithm, task) pair once, sequentially.
pub fn run_experiment(
    exp: &LoadedExperiment,
    exp_dir: &Path,
    options: &RunOptions,
) -> Result<RunSummary> {
    let tasks = exp.tasks()?;
    ensure_dir(exp_dir)?;
    atomic_write_json_pretty(&exp_dir.join("resolved_experiment.json"), &exp.raw)?;
    atomic_write_bytes(
        &exp_dir.join("resolved_experiment.digest"),
        exp.digest.as_bytes(),
    )?;

    let def = &exp.definition;
    let command = exp.planner_command();
    let digest = planner_digest(&command)?;
    let mut summary = RunSummary {
        exp_dir: exp_dir.to_path_buf(),
        total: tasks.len() * def.algorithms.len(),
        executed: 0,
        skipped: 0,
        nonzero_exit: 0,
    };
    info!(
        experiment = exp.id(),
        runs = summary.total,
        exp_dir = %exp_dir.display(),
        "starting experiment"
    );

    for algorithm in &def.algorithms {
        for task in &tasks {
            let key = RunKey::new(&algorithm.name, &task.domain, &task.problem);
            let paths = RunPaths::new(exp_dir, &key);
            if paths.is_complete() && !options.force {
                debug!(run = %key, "already complete, skipping");
                summary.skipped += 1;
                continue;
            }
            if paths.properties.exists() {
                fs::remove_file(&paths.properties)
                    .with_context(|| format!("removing stale {}", paths.properties.display()))?;
            }
            let cmd = build_command(&command, &def.planner, algorithm, task);
            info!(run = %key, "running planner");
            let outcome = execute(&cmd, &paths)?;
            if outcome.exit_code != Some(0) {
                summary.nonzero_exit += 1;
            }
            info!(
                run = %key,
                exit_code = ?outcome.exit_code,
                wall_clock_time = outcome.wall_clock_time,
                "planner finished"
            );
            let props = static_properties(&key, &cmd, &digest, &def.planner, &outcome);
            atomic_write_json_pretty(&paths.static_properties, &props)?;
            summary.executed += 1;
        }
    }
    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub run: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParseSummary {
    pub parsed: usize,
    pub failures: Vec<ParseFailure>,
}

/// Every run directory below `<exp_dir>/runs`, identified by its static
/// properties file.
pub fn run_dirs(exp_dir: &Path) -> Result<Vec<PathBuf>> {
    let root = runs_dir(exp_dir);
    if !root.is_dir() {
        return Err(anyhow!("no runs directory at {}", root.display()));
    }
    let mut dirs = Vec::new();
    for entry in walkdir::WalkDir::new(&root).min_depth(4).max_depth(4) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == STATIC_PROPERTIES {
            if let Some(parent) = entry.path().parent() {
                dirs.push(parent.to_path_buf());
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn read_json(path: &Path) -> Result<Value> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// (Re)parses every run log with the given presets and writes
/// `properties.json` next to it. Invalid UTF-8 in a log is replaced, not
/// fatal. A run whose log is missing or fails to parse keeps no properties
/// file; with `strict` the whole step fails afterwards.
pub fn parse_runs(exp_dir: &Path, parsers: &[String], strict: bool) -> Result<ParseSummary> {
    let extractor = combined(parsers)?;
    let mut summary = ParseSummary::default();
    for dir in run_dirs(exp_dir)? {
        let paths = RunPaths::in_dir(dir);
        let static_props = read_json(&paths.static_properties)?;
        let seed = record_from_json(&static_props).ok_or_else(|| {
            anyhow!(
                "static properties are not an object: {}",
                paths.static_properties.display()
            )
        })?;
        let run_id = json_identity(&static_props);
        let log = match fs::read(&paths.log) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                let message = format!("cannot read {}: {}", paths.log.display(), err);
                error!(run = %run_id, error = %err, "run log unreadable");
                if paths.properties.exists() {
                    fs::remove_file(&paths.properties)?;
                }
                summary.failures.push(ParseFailure {
                    run: run_id,
                    message,
                });
                continue;
            }
        };
        if log.contains(char::REPLACEMENT_CHARACTER) {
            warn!(run = %run_id, "run log is not valid UTF-8, invalid bytes replaced");
        }
        match extractor.extract(&log, seed) {
            Ok(record) => {
                atomic_write_json_pretty(&paths.properties, &record_to_json(&record))?;
                summary.parsed += 1;
            }
            Err(err) => {
                error!(run = %run_id, error = %err, "failed to parse run log");
                if paths.properties.exists() {
                    fs::remove_file(&paths.properties)?;
                }
                summary.failures.push(ParseFailure {
                    run: run_id,
                    message: err.to_string(),
                });
            }
        }
    }
    info!(
        parsed = summary.parsed,
        failed = summary.failures.len(),
        "parse step finished"
    );
    if strict && !summary.failures.is_empty() {
        return Err(anyhow!(
            "{} run(s) failed to parse:\n{}",
            summary.failures.len(),
            summary
                .failures
                .iter()
                .map(|f| format!("  - {}: {}", f.run, f.message))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }
    Ok(summary)
}

fn json_identity(props: &Value) -> String {
    let field = |name: &str| props.get(name).and_then(|v| v.as_str()).unwrap_or("?");
    format!("{}:{}:{}", field("algorithm"), field("domain"), field("problem"))
}

pub fn summary_to_json(summary: &ParseSummary) -> Value {
    json!({
        "parsed": summary.parsed,
        "failed": summary.failures.iter().map(|f| json!({
            "run": f.run,
            "message": f.message,
        })).collect::<Vec<_>>(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::os::unix::fs::PermissionsExt;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "planlab_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        fs::create_dir_all(&dir).expect("temp dir");
        dir
    }

    /// Lays out a benchmark dir, a fake planner script and a definition.
    fn setup(root: &Path, parsers: &str) -> PathBuf {
        let gripper = root.join("bench").join("gripper");
        fs::create_dir_all(&gripper).expect("bench");
        for f in ["domain.pddl", "prob01.pddl", "prob02.pddl"] {
            fs::write(gripper.join(f), "(define)").expect("pddl");
        }
        let script = root.join("planner.sh");
        fs::write(
            &script,
            "#!/bin/sh\n\
             case \"$*\" in\n\
             *prob01*) echo 'Solution found!'; echo 'Plan length: 2 step(s).'; \
             echo 'Plan cost: 2'; echo 'Expanded 7 state(s).'; exit 0 ;;\n\
             *) echo 'Search stopped without finding a solution.'; exit 5 ;;\n\
             esac\n",
        )
        .expect("script");
        let mut perms = fs::metadata(&script).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).expect("chmod");

        let path = root.join("experiment.yaml");
        fs::write(
            &path,
            format!(
                "experiment:\n  id: demo\n\
                 planner:\n  command: ['./planner.sh']\n  time_limit_seconds: 30\n\
                 suite:\n  benchmarks_dir: bench\n  problems: [gripper]\n\
                 algorithms:\n  - name: blind\n  - name: lmcut\n\
                 parsers: [{}]\n",
                parsers
            ),
        )
        .expect("yaml");
        path
    }

    #[test]
    fn run_then_parse_produces_properties_per_run() {
        let root = temp_dir("steps_run");
        let exp = LoadedExperiment::load(&setup(&root, "planner")).expect("load");
        let exp_dir = exp.default_exp_dir();

        let summary = run_experiment(&exp, &exp_dir, &RunOptions::default()).expect("run");
        assert_eq!(summary.total, 4);
        assert_eq!(summary.executed, 4);
        assert_eq!(summary.nonzero_exit, 2);

        let again = run_experiment(&exp, &exp_dir, &RunOptions::default()).expect("rerun");
        assert_eq!(again.skipped, 4);
        assert_eq!(again.executed, 0);

        let parsed = parse_runs(&exp_dir, &exp.definition.parsers, true).expect("parse");
        assert_eq!(parsed.parsed, 4);

        let props = read_json(
            &exp_dir
                .join("runs/blind/gripper/prob01.pddl")
                .join("properties.json"),
        )
        .expect("props");
        assert_eq!(props["coverage"], json!(1));
        assert_eq!(props["cost"], json!(2));
        assert_eq!(props["planner_exit_code"], json!(0));
        let unsolved = read_json(
            &exp_dir
                .join("runs/lmcut/gripper/prob02.pddl")
                .join("properties.json"),
        )
        .expect("props");
        assert_eq!(unsolved["coverage"], json!(0));
        assert_eq!(unsolved["error"], json!("unsolved-incomplete"));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn parse_failure_is_reported_and_strict_mode_fails() {
        let root = temp_dir("steps_parse");
        let exp = LoadedExperiment::load(&setup(&root, "planner")).expect("load");
        let exp_dir = exp.default_exp_dir();
        run_experiment(&exp, &exp_dir, &RunOptions::default()).expect("run");
        let broken = exp_dir.join("runs/blind/gripper/prob01.pddl/run.log");
        fs::write(&broken, "Total time: 1.2.3s\n").expect("overwrite");

        let lenient = parse_runs(&exp_dir, &exp.definition.parsers, false).expect("lenient");
        assert_eq!(lenient.parsed, 3);
        assert_eq!(lenient.failures.len(), 1);
        assert_eq!(lenient.failures[0].run, "blind:gripper:prob01.pddl");
        assert!(!broken.with_file_name("properties.json").exists());

        let err = parse_runs(&exp_dir, &exp.definition.parsers, true).expect_err("strict");
        assert!(err.to_string().contains("1 run(s) failed to parse"));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn non_utf8_log_still_parses_and_missing_log_is_a_failure() {
        let root = temp_dir("steps_bytes");
        let exp = LoadedExperiment::load(&setup(&root, "planner")).expect("load");
        let exp_dir = exp.default_exp_dir();
        run_experiment(&exp, &exp_dir, &RunOptions::default()).expect("run");
        let solved = exp_dir.join("runs/blind/gripper/prob01.pddl");
        let mut bytes = b"Solution found!\nPlan length: 2 step(s).\nPlan cost: 2\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        fs::write(solved.join("run.log"), bytes).expect("overwrite");
        let missing = exp_dir.join("runs/lmcut/gripper/prob02.pddl");
        fs::remove_file(missing.join("run.log")).expect("remove log");

        let summary = parse_runs(&exp_dir, &exp.definition.parsers, false).expect("parse");
        assert_eq!(summary.parsed, 3);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].run, "lmcut:gripper:prob02.pddl");
        assert!(summary.failures[0].message.contains("cannot read"));
        assert!(!missing.join("properties.json").exists());

        let props = read_json(&solved.join("properties.json")).expect("props");
        assert_eq!(props["cost"], json!(2));
        assert_eq!(props["coverage"], json!(1));

        assert!(parse_runs(&exp_dir, &exp.definition.parsers, true).is_err());
        let _ = fs::remove_dir_all(root);
    }
}
