use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One planning problem: the unit every algorithm is run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub domain: String,
    pub problem: String,
    pub domain_file: PathBuf,
    pub problem_file: PathBuf,
}

fn is_domain_file(name: &str) -> bool {
    name.starts_with("domain") || name.ends_with("-domain.pddl")
}

/// Per-problem domain files take precedence over the shared `domain.pddl`.
fn domain_file_for(domain_dir: &Path, problem: &str) -> Result<PathBuf> {
    let stem = problem.strip_suffix(".pddl").unwrap_or(problem);
    let candidates = [
        format!("domain-{}", problem),
        format!("domain_{}", problem),
        format!("{}-domain.pddl", stem),
        "domain.pddl".to_string(),
    ];
    candidates
        .iter()
        .map(|c| domain_dir.join(c))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            anyhow!(
                "no domain file for {} in {} (tried {})",
                problem,
                domain_dir.display(),
                candidates.join(", ")
            )
        })
}

fn task(benchmarks_dir: &Path, domain: &str, problem: &str) -> Result<Task> {
    let domain_dir = benchmarks_dir.join(domain);
    let problem_file = domain_dir.join(problem);
    if !problem_file.is_file() {
        return Err(anyhow!("problem file not found: {}", problem_file.display()));
    }
    Ok(Task {
        domain: domain.to_string(),
        problem: problem.to_string(),
        domain_file: domain_file_for(&domain_dir, problem)?,
        problem_file,
    })
}

/// Expands suite entries (`domain` or `domain:problem.pddl`) into tasks,
/// in entry order and by file name within a domain.
pub fn resolve_suite(benchmarks_dir: &Path, entries: &[String]) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for entry in entries {
        match entry.split_once(':') {
            Some((domain, problem)) => tasks.push(task(benchmarks_dir, domain, problem)?),
            None => {
                let domain_dir = benchmarks_dir.join(entry);
                let mut problems: Vec<String> = fs::read_dir(&domain_dir)
                    .with_context(|| format!("reading domain directory {}", domain_dir.display()))?
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_file())
                    .filter_map(|e| e.file_name().to_str().map(String::from))
                    .filter(|name| name.ends_with(".pddl") && !is_domain_file(name))
                    .collect();
                problems.sort();
                if problems.is_empty() {
                    return Err(anyhow!("no problem files in {}", domain_dir.display()));
                }
                for problem in problems {
                    tasks.push(task(benchmarks_dir, entry, &problem)?);
                }
            }
        }
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let gripper = dir.path().join("gripper");
        fs::create_dir_all(&gripper).expect("mkdir");
        for f in ["domain.pddl", "prob02.pddl", "prob01.pddl", "README"] {
            fs::write(gripper.join(f), "(define)").expect("write");
        }
        let airport = dir.path().join("airport");
        fs::create_dir_all(&airport).expect("mkdir");
        for f in ["p01-airport-domain.pddl", "p01-airport.pddl"] {
            fs::write(airport.join(f), "(define)").expect("write");
        }
        dir
    }

    #[test]
    fn whole_domain_lists_problems_sorted_without_domain_files() {
        let dir = bench();
        let tasks = resolve_suite(dir.path(), &["gripper".to_string()]).expect("suite");
        let names: Vec<&str> = tasks.iter().map(|t| t.problem.as_str()).collect();
        assert_eq!(names, vec!["prob01.pddl", "prob02.pddl"]);
        assert!(tasks[0].domain_file.ends_with("gripper/domain.pddl"));
    }

    #[test]
    fn single_problem_uses_problem_specific_domain_file() {
        let dir = bench();
        let tasks =
            resolve_suite(dir.path(), &["airport:p01-airport.pddl".to_string()]).expect("suite");
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].domain_file.ends_with("p01-airport-domain.pddl"));
    }

    #[test]
    fn missing_problem_is_an_error() {
        let dir = bench();
        let err = resolve_suite(dir.path(), &["gripper:prob99.pddl".to_string()])
            .expect_err("missing");
        assert!(err.to_string().contains("problem file not found"));
    }
}
