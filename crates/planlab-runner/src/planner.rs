use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use planlab_core::{ensure_dir, sha256_bytes, sha256_file, RunKey};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use crate::experiment::{AlgorithmConfig, PlannerConfig};
use crate::suite::Task;

pub const RUN_LOG: &str = "run.log";
pub const RUN_ERR: &str = "run.err";
pub const STATIC_PROPERTIES: &str = "static-properties.json";
pub const PROPERTIES: &str = "properties.json";

pub fn runs_dir(exp_dir: &Path) -> PathBuf {
    exp_dir.join("runs")
}

/// Files of one run under `<exp_dir>/runs/<algorithm>/<domain>/<problem>/`.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub log: PathBuf,
    pub err: PathBuf,
    pub static_properties: PathBuf,
    pub properties: PathBuf,
}

impl RunPaths {
    pub fn new(exp_dir: &Path, key: &RunKey) -> Self {
        let dir = runs_dir(exp_dir)
            .join(&key.algorithm)
            .join(&key.domain)
            .join(&key.problem);
        Self::in_dir(dir)
    }

    pub fn in_dir(dir: PathBuf) -> Self {
        Self {
            log: dir.join(RUN_LOG),
            err: dir.join(RUN_ERR),
            static_properties: dir.join(STATIC_PROPERTIES),
            properties: dir.join(PROPERTIES),
            dir,
        }
    }

    /// A run counts as done once its static properties were written.
    pub fn is_complete(&self) -> bool {
        self.static_properties.is_file()
    }
}

/// `command + driver_options + limits + components + [domain, problem] + args`.
pub fn build_command(
    command: &[String],
    planner: &PlannerConfig,
    algorithm: &AlgorithmConfig,
    task: &Task,
) -> Vec<String> {
    let mut cmd: Vec<String> = command.to_vec();
    cmd.extend(algorithm.driver_options.iter().cloned());
    if let Some(secs) = planner.time_limit_seconds {
        cmd.push("--overall-time-limit".to_string());
        cmd.push(format!("{}s", secs));
    }
    if let Some(mb) = planner.memory_limit_mb {
        cmd.push("--overall-memory-limit".to_string());
        cmd.push(format!("{}M", mb));
    }
    cmd.extend(planner.components.iter().map(|c| format!("--{}", c)));
    cmd.push(absolute(&task.domain_file));
    cmd.push(absolute(&task.problem_file));
    cmd.extend(algorithm.args.iter().cloned());
    cmd
}

fn absolute(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

fn command_part_looks_like_path(part: &str) -> bool {
    part.starts_with('.') || part.starts_with('/') || part.contains('/') || part.ends_with(".py")
}

/// Digest of the planner entry point: the script or binary when it exists
/// on disk, the command text otherwise.
pub fn planner_digest(command: &[String]) -> Result<String> {
    let target = command
        .iter()
        .take(2)
        .find(|part| command_part_looks_like_path(part))
        .map(Path::new)
        .filter(|p| p.is_file());
    let hex = match target {
        Some(path) => sha256_file(path)?,
        None => sha256_bytes(command.join(" ").as_bytes()),
    };
    Ok(format!("sha256:{}", hex))
}

/// Single-line rendering of the command, quoted so it can be pasted into a
/// shell to reproduce the run.
pub fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:=".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `None` when the planner was terminated by a signal.
    pub exit_code: Option<i32>,
    pub wall_clock_time: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Runs the planner once inside the run directory with stdout and stderr
/// redirected to `run.log` and `run.err`.
pub fn execute(command: &[String], paths: &RunPaths) -> Result<RunOutcome> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("planner command is empty"))?;
    ensure_dir(&paths.dir)?;
    let stdout = File::create(&paths.log)
        .with_context(|| format!("creating {}", paths.log.display()))?;
    let stderr = File::create(&paths.err)
        .with_context(|| format!("creating {}", paths.err.display()))?;

    let started_at = Utc::now();
    let clock = Instant::now();
    let status = Command::new(program)
        .args(args)
        .current_dir(&paths.dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()
        .with_context(|| format!("failed to start planner {}", program))?;
    Ok(RunOutcome {
        exit_code: status.code(),
        wall_clock_time: clock.elapsed().as_secs_f64(),
        started_at,
        finished_at: Utc::now(),
    })
}

pub fn static_properties(
    key: &RunKey,
    command: &[String],
    digest: &str,
    planner: &PlannerConfig,
    outcome: &RunOutcome,
) -> Value {
    let mut props = json!({
        "algorithm": key.algorithm,
        "domain": key.domain,
        "problem": key.problem,
        "command": shell_join(command),
        "planner_digest": digest,
        "wall_clock_time": outcome.wall_clock_time,
        "started_at": outcome.started_at.to_rfc3339(),
        "finished_at": outcome.finished_at.to_rfc3339(),
    });
    if let Some(obj) = props.as_object_mut() {
        if let Some(code) = outcome.exit_code {
            obj.insert("planner_exit_code".to_string(), json!(code));
        }
        if let Some(secs) = planner.time_limit_seconds {
            obj.insert("limit_search_time".to_string(), json!(secs));
        }
        if let Some(mb) = planner.memory_limit_mb {
            obj.insert("limit_search_memory".to_string(), json!(mb));
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(time: Option<u64>, memory: Option<u64>) -> PlannerConfig {
        PlannerConfig {
            command: vec!["./fast-downward.py".to_string()],
            time_limit_seconds: time,
            memory_limit_mb: memory,
            components: vec![],
        }
    }

    fn algorithm() -> AlgorithmConfig {
        AlgorithmConfig {
            name: "blind".to_string(),
            args: vec!["--search".to_string(), "astar(blind())".to_string()],
            driver_options: vec!["--build".to_string(), "release".to_string()],
        }
    }

    fn task() -> Task {
        Task {
            domain: "gripper".to_string(),
            problem: "prob01.pddl".to_string(),
            domain_file: PathBuf::from("/bench/gripper/domain.pddl"),
            problem_file: PathBuf::from("/bench/gripper/prob01.pddl"),
        }
    }

    #[test]
    fn command_line_orders_options_files_and_args() {
        let p = planner(Some(1800), Some(4096));
        let cmd = build_command(&p.command, &p, &algorithm(), &task());
        assert_eq!(
            cmd,
            vec![
                "./fast-downward.py",
                "--build",
                "release",
                "--overall-time-limit",
                "1800s",
                "--overall-memory-limit",
                "4096M",
                "/bench/gripper/domain.pddl",
                "/bench/gripper/prob01.pddl",
                "--search",
                "astar(blind())",
            ]
        );
    }

    #[test]
    fn limits_are_omitted_when_unset() {
        let p = planner(None, None);
        let cmd = build_command(&p.command, &p, &algorithm(), &task());
        assert!(!cmd.iter().any(|c| c.starts_with("--overall")));
    }

    #[test]
    fn shell_join_quotes_search_strings() {
        let cmd = vec!["--search".to_string(), "astar(blind())".to_string()];
        assert_eq!(shell_join(&cmd), "--search 'astar(blind())'");
    }

    #[test]
    fn digest_falls_back_to_command_text() {
        let d1 = planner_digest(&["no-such-planner".to_string()]).expect("digest");
        let d2 = planner_digest(&["no-such-planner".to_string()]).expect("digest");
        assert_eq!(d1, d2);
        assert!(d1.starts_with("sha256:"));
    }

    #[cfg(unix)]
    #[test]
    fn execute_captures_streams_and_exit_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::in_dir(dir.path().join("run"));
        let cmd = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo 'Solution found!'; echo oops >&2; exit 12".to_string(),
        ];
        let outcome = execute(&cmd, &paths).expect("execute");
        assert_eq!(outcome.exit_code, Some(12));
        assert_eq!(fs::read_to_string(&paths.log).expect("log"), "Solution found!\n");
        assert_eq!(fs::read_to_string(&paths.err).expect("err"), "oops\n");
        assert!(outcome.finished_at >= outcome.started_at);
    }

    #[test]
    fn missing_program_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::in_dir(dir.path().join("run"));
        let err = execute(&["/nonexistent/planner".to_string()], &paths).expect_err("spawn");
        assert!(err.to_string().contains("failed to start planner"));
    }
}
