//! Derived-metric functions. Each one reads the raw log and the record built
//! so far; fields they depend on may be absent, which is never an error.

use crate::error::{ParseError, Result};
use planlab_core::{AttrValue, Record};

pub const DOMINANCE_SEPARATOR: &str = "------";

pub const OUT_OF_MEMORY: &str = "out-of-memory";
pub const UNEXPLAINED_PREFIX: &str = "unexplained";

const OUT_OF_MEMORY_BANNERS: [&str; 2] = [
    "Peak memory: Failed to allocate memory. Released memory buffer.",
    "CUDD: out of memory allocating",
];

fn set(record: &mut Record, name: &str, value: impl Into<AttrValue>) {
    record.insert(name.to_string(), value.into());
}

fn set_flag(record: &mut Record, name: &str, value: bool) {
    record.insert(name.to_string(), AttrValue::flag(value));
}

/// `did_prune` is 1 iff the first-pruned banner was seen.
pub fn did_prune(_content: &str, record: &mut Record) -> Result<()> {
    let pruned = record.contains_key("dom_checked_before_first_pruned");
    set_flag(record, "did_prune", pruned);
    Ok(())
}

/// Integer prefix of a simulation-value line: `N: count` or `N(extra): count`.
fn dominance_value(line: &str) -> Option<i64> {
    let (head, _) = line.split_once(':')?;
    let number = match head.find('(') {
        Some(idx) if head.ends_with(')') => &head[..idx],
        Some(_) => return None,
        None => head,
    };
    let digits = number.strip_prefix('-').unwrap_or(number);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse::<i64>().ok()
}

#[derive(Default)]
struct DominanceScan {
    started: bool,
    variables: u64,
    fresh_any: bool,
    fresh_geq0: bool,
    fresh_geq1: bool,
    min: Option<i64>,
    max: Option<i64>,
    with_any: u64,
    with_geq0: u64,
    with_geq1: u64,
}

impl DominanceScan {
    fn separator(&mut self) {
        if self.started {
            self.variables += 1;
        } else {
            self.started = true;
        }
        self.fresh_any = true;
        self.fresh_geq0 = true;
        self.fresh_geq1 = true;
    }

    fn observe(&mut self, value: i64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        if self.fresh_any {
            self.with_any += 1;
            self.fresh_any = false;
        }
        if self.fresh_geq0 && value >= 0 {
            self.with_geq0 += 1;
            self.fresh_geq0 = false;
        }
        if self.fresh_geq1 && value >= 1 {
            self.with_geq1 += 1;
            self.fresh_geq1 = false;
        }
    }

    fn finish(&self, record: &mut Record) {
        if let Some(min) = self.min {
            set(record, "min_negative_dominance", min);
        }
        if let Some(max) = self.max {
            set(record, "max_positive_dominance", max);
        }
        set_flag(record, "has_dominance", self.max.is_some());
        set_flag(record, "has_positive_dominance", self.max.is_some_and(|m| m > 0));
        set_flag(record, "has_negative_dominance", self.min.is_some_and(|m| m < 0));
        set_flag(record, "has_qualitative_dominance", self.with_geq0 > 0);
        set(record, "num_variables_with_dominance", self.with_any as i64);
        set(record, "num_variables_with_dominance_geq0", self.with_geq0 as i64);
        set(record, "num_variables_with_dominance_geq1", self.with_geq1 as i64);
        if self.variables > 0 {
            let total = self.variables as f64;
            set(record, "percentage_variables_with_dominance", self.with_any as f64 / total);
            set(
                record,
                "percentage_variables_with_dominance_geq0",
                self.with_geq0 as f64 / total,
            );
            set(
                record,
                "percentage_variables_with_dominance_geq1",
                self.with_geq1 as f64 / total,
            );
        }
    }
}

/// Scans the separator-delimited simulation statistics (one paragraph per
/// variable) and finalizes on the first line after them that is neither a
/// value line nor an `infinity` line. Only the first block is evaluated.
pub fn numeric_dominance(content: &str, record: &mut Record) -> Result<()> {
    let mut scan = DominanceScan::default();
    for line in content.lines() {
        if line == DOMINANCE_SEPARATOR {
            scan.separator();
            continue;
        }
        if !scan.started || line.trim().is_empty() {
            continue;
        }
        if line.contains("infinity") {
            continue;
        }
        match dominance_value(line) {
            Some(value) => scan.observe(value),
            None => {
                scan.finish(record);
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Refines a generic `unexplained*` error into `out-of-memory` when one of the
/// known allocation-failure banners appears in the log.
pub fn fix_error(content: &str, record: &mut Record) -> Result<()> {
    let unexplained = record
        .get("error")
        .and_then(|v| v.as_str())
        .is_some_and(|e| e.starts_with(UNEXPLAINED_PREFIX));
    if !unexplained {
        return Ok(());
    }
    let oom = content
        .lines()
        .any(|l| OUT_OF_MEMORY_BANNERS.iter().any(|b| l.contains(b)));
    if oom {
        set(record, "error", OUT_OF_MEMORY);
    }
    Ok(())
}

/// Maps the recorded planner exit code to an `error` classification.
pub fn classify_exit_code(_content: &str, record: &mut Record) -> Result<()> {
    let label = match record.get("planner_exit_code").and_then(|v| v.as_i64()) {
        Some(0) => "success".to_string(),
        Some(1) => "unexplained-critical-error".to_string(),
        Some(2) => "input-error".to_string(),
        Some(3) => "unsupported".to_string(),
        Some(4) => "unsolvable".to_string(),
        Some(5) => "unsolved-incomplete".to_string(),
        Some(6) => OUT_OF_MEMORY.to_string(),
        Some(7) => "out-of-time".to_string(),
        Some(code) => format!("unexplained-exit-code-{}", code),
        None => "unexplained-signal".to_string(),
    };
    set(record, "error", label);
    Ok(())
}

pub fn coverage(_content: &str, record: &mut Record) -> Result<()> {
    let solved = record.contains_key("cost");
    set_flag(record, "coverage", solved);
    let unsolvable = record.get("error").and_then(|v| v.as_str()) == Some("unsolvable");
    set_flag(record, "unsolvable", unsolvable);
    Ok(())
}

/// A zero-length plan means the task was solved before search started, in
/// which case the planner reports no jump statistics.
pub fn solved_without_search(_content: &str, record: &mut Record) -> Result<()> {
    let trivial = record.get("plan_length").and_then(|v| v.as_i64()) == Some(0);
    if trivial && !record.contains_key("expansions_until_last_jump") {
        set(record, "expansions_until_last_jump", 0i64);
    }
    Ok(())
}

pub fn atomic_task_constructed(content: &str, record: &mut Record) -> Result<()> {
    let constructed = content.lines().any(|l| l == "Main task constructed");
    set_flag(record, "atomic_task_constructed", constructed);
    Ok(())
}

/// Records the CPU time of every translator step printed as
/// `Step name... [0.004s CPU, 0.005s wall-clock]` (or `Step name: [...]`)
/// under `translator_time_<step_name>`. Scanning stops at `Done!`.
pub fn translator_timestamps(content: &str, record: &mut Record) -> Result<()> {
    for line in content.lines() {
        if let Some((step, cpu)) = translator_step(line) {
            let seconds = cpu.parse::<f64>().map_err(|_| ParseError::Derived {
                function: "translator_timestamps",
                message: format!("cannot read CPU time '{}' in line '{}'", cpu, line),
            })?;
            let name = format!("translator_time_{}", step.to_lowercase().replace(' ', "_"));
            set(record, &name, seconds);
        }
        if line.starts_with("Done!") {
            break;
        }
    }
    Ok(())
}

fn translator_step(line: &str) -> Option<(&str, &str)> {
    let body = line.strip_suffix("s wall-clock]")?;
    let (head, times) = body.rsplit_once(" [")?;
    let step = head
        .strip_suffix("...")
        .or_else(|| head.strip_suffix(':'))
        .filter(|s| !s.is_empty())?;
    let (cpu, _) = times.split_once("s CPU, ")?;
    Some((step, cpu))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_error(error: &str) -> Record {
        let mut r = Record::new();
        r.insert("error".to_string(), AttrValue::from(error));
        r
    }

    fn int(record: &Record, name: &str) -> Option<i64> {
        record.get(name).and_then(|v| v.as_i64())
    }

    #[test]
    fn dominance_block_reports_extremes_and_flags() {
        let text = "Numeric LDSim computed 0.2s\n------\n-3: 4\n0: 2\n5: 1\n------\nDone initializing simulation heuristic [1.5s]\n";
        let mut record = Record::new();
        numeric_dominance(text, &mut record).expect("dominance");
        assert_eq!(int(&record, "min_negative_dominance"), Some(-3));
        assert_eq!(int(&record, "max_positive_dominance"), Some(5));
        assert_eq!(int(&record, "has_dominance"), Some(1));
        assert_eq!(int(&record, "has_positive_dominance"), Some(1));
        assert_eq!(int(&record, "has_negative_dominance"), Some(1));
        assert_eq!(int(&record, "has_qualitative_dominance"), Some(1));
        assert_eq!(int(&record, "num_variables_with_dominance"), Some(1));
        assert_eq!(
            record.get("percentage_variables_with_dominance"),
            Some(&AttrValue::Float(1.0))
        );
    }

    #[test]
    fn dominance_counts_thresholds_per_variable() {
        let text = "------\n-2: 1\n-infinity: 3\n------\n0: 1\n------\n1(eps): 2\n3: 1\n------\nend\n";
        let mut record = Record::new();
        numeric_dominance(text, &mut record).expect("dominance");
        assert_eq!(int(&record, "num_variables_with_dominance"), Some(3));
        assert_eq!(int(&record, "num_variables_with_dominance_geq0"), Some(2));
        assert_eq!(int(&record, "num_variables_with_dominance_geq1"), Some(1));
        assert_eq!(int(&record, "max_positive_dominance"), Some(3));
        let ratio = record
            .get("percentage_variables_with_dominance_geq1")
            .and_then(|v| v.as_f64())
            .expect("ratio");
        assert!((ratio - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn dominance_without_values_has_no_extremes() {
        let text = "------\n-infinity: 3\n------\nend\n";
        let mut record = Record::new();
        numeric_dominance(text, &mut record).expect("dominance");
        assert!(!record.contains_key("min_negative_dominance"));
        assert_eq!(int(&record, "has_dominance"), Some(0));
        assert_eq!(int(&record, "has_negative_dominance"), Some(0));
    }

    #[test]
    fn dominance_without_closing_line_writes_nothing() {
        let mut record = Record::new();
        numeric_dominance("------\n1: 2\n------\n", &mut record).expect("dominance");
        assert!(record.is_empty());
    }

    #[test]
    fn dominance_zero_variables_skips_ratios() {
        let mut record = Record::new();
        numeric_dominance("------\n1: 2\nend\n", &mut record).expect("dominance");
        assert_eq!(int(&record, "has_positive_dominance"), Some(1));
        assert!(!record.contains_key("percentage_variables_with_dominance"));
    }

    #[test]
    fn fix_error_reclassifies_unexplained_oom() {
        let mut record = with_error("unexplained crash");
        fix_error("foo\nCUDD: out of memory allocating 123 bytes\n", &mut record)
            .expect("fix");
        assert_eq!(record.get("error").and_then(|v| v.as_str()), Some("out-of-memory"));
    }

    #[test]
    fn fix_error_leaves_specific_errors_alone() {
        let mut record = with_error("search-exhausted");
        fix_error("CUDD: out of memory allocating\n", &mut record).expect("fix");
        assert_eq!(record.get("error").and_then(|v| v.as_str()), Some("search-exhausted"));
    }

    #[test]
    fn fix_error_keeps_unexplained_without_banner() {
        let mut record = with_error("unexplained-signal");
        fix_error("Segmentation fault\n", &mut record).expect("fix");
        assert_eq!(
            record.get("error").and_then(|v| v.as_str()),
            Some("unexplained-signal")
        );
        let mut empty = Record::new();
        fix_error("CUDD: out of memory allocating\n", &mut empty).expect("absent error");
        assert!(empty.is_empty());
    }

    #[test]
    fn exit_codes_map_to_error_labels() {
        let mut record = Record::new();
        record.insert("planner_exit_code".to_string(), AttrValue::Int(6));
        classify_exit_code("", &mut record).expect("classify");
        assert_eq!(record.get("error").and_then(|v| v.as_str()), Some("out-of-memory"));

        record.insert("planner_exit_code".to_string(), AttrValue::Int(139));
        classify_exit_code("", &mut record).expect("classify");
        assert_eq!(
            record.get("error").and_then(|v| v.as_str()),
            Some("unexplained-exit-code-139")
        );
    }

    #[test]
    fn zero_length_plan_sets_jump_expansions() {
        let mut record = Record::new();
        record.insert("plan_length".to_string(), AttrValue::Int(0));
        solved_without_search("", &mut record).expect("shortcut");
        assert_eq!(int(&record, "expansions_until_last_jump"), Some(0));
    }

    #[test]
    fn dominance_value_parsing() {
        assert_eq!(dominance_value("12: 3"), Some(12));
        assert_eq!(dominance_value("-4: 3"), Some(-4));
        assert_eq!(dominance_value("3(1): 3"), Some(3));
        assert_eq!(dominance_value("Total: 3"), None);
        assert_eq!(dominance_value("--4: 3"), None);
        assert_eq!(dominance_value("no colon"), None);
    }

    #[test]
    fn translator_steps_are_timed_until_done() {
        let text = "\
Parsing... [0.010s CPU, 0.012s wall-clock]
Computing fact groups: [0.002s CPU, 0.003s wall-clock]
Translator variables: 12
Done! [0.150s CPU, 0.160s wall-clock]
Late step... [9.000s CPU, 9.000s wall-clock]
";
        let mut record = Record::new();
        translator_timestamps(text, &mut record).expect("timestamps");
        assert_eq!(
            record.get("translator_time_parsing").and_then(|v| v.as_f64()),
            Some(0.01)
        );
        assert_eq!(
            record
                .get("translator_time_computing_fact_groups")
                .and_then(|v| v.as_f64()),
            Some(0.002)
        );
        assert!(!record.contains_key("translator_time_late_step"));
    }

    #[test]
    fn unreadable_translator_time_is_an_error() {
        let mut record = Record::new();
        let err = translator_timestamps("Parsing... [fast s CPU, 0.1s wall-clock]", &mut record)
            .expect_err("bad time");
        assert!(matches!(err, ParseError::Derived { .. }));
    }
}
