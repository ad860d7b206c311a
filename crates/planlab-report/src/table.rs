use crate::error::{ReportError, Result};
use planlab_core::RunStore;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

pub const CELL_SEPARATOR: &str = " & ";
pub const ROW_TERMINATOR: &str = " \\\\";

/// Joins cells into one typesetting table row: `a & b & c \\`.
pub fn tex_row<T: Display>(cells: &[T]) -> String {
    let mut out = String::new();
    for (idx, cell) in cells.iter().enumerate() {
        out.push_str(&cell.to_string());
        if idx + 1 == cells.len() {
            out.push_str(ROW_TERMINATOR);
        } else {
            out.push_str(CELL_SEPARATOR);
        }
    }
    out
}

pub fn bold(cell: &str) -> String {
    format!("\\textbf{{{}}}", cell)
}

/// Integral values print without a fractional part, everything else with
/// `digits` decimals.
pub fn format_number(value: f64, digits: usize) -> String {
    if (value - value.round()).abs() < 1e-9 && value.abs() < 1e15 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.*}", digits, value)
    }
}

/// Fails when a requested algorithm has no run at all in the store.
pub fn check_algorithms(store: &RunStore, requested: &[String]) -> Result<()> {
    let known = store.algorithms();
    let missing: Vec<String> = requested
        .iter()
        .filter(|a| !known.contains(*a))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(ReportError::UnknownAlgorithms {
        missing,
        known: known.into_iter().collect(),
    })
}

/// Appends `.suffix` unless the path already ends with it.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let dotted = format!(".{}", suffix);
    if path.to_string_lossy().ends_with(&dotted) {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{}{}", path.display(), dotted))
    }
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    let io = |source| ReportError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io)?;
    }
    fs::write(path, text).map_err(io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use planlab_core::{RunKey, RunRecord};

    #[test]
    fn tex_row_uses_ampersands_and_row_terminator() {
        assert_eq!(tex_row(&["", "oracle"]), " & oracle \\\\");
        assert_eq!(tex_row(&["gripper".to_string(), 3.to_string()]), "gripper & 3 \\\\");
    }

    #[test]
    fn format_number_drops_fraction_for_integers() {
        assert_eq!(format_number(12.0, 2), "12");
        assert_eq!(format_number(1.234, 2), "1.23");
    }

    #[test]
    fn check_algorithms_lists_missing_and_known() {
        let mut store = RunStore::new();
        store.insert(RunRecord::new(RunKey::new("blind", "gripper", "p1")));
        let err = check_algorithms(&store, &["blind".to_string(), "blnd".to_string()])
            .expect_err("typo must fail");
        match err {
            ReportError::UnknownAlgorithms { missing, known } => {
                assert_eq!(missing, vec!["blnd".to_string()]);
                assert_eq!(known, vec!["blind".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn with_suffix_is_idempotent() {
        let p = with_suffix(Path::new("out/plot"), "tex");
        assert_eq!(p, PathBuf::from("out/plot.tex"));
        assert_eq!(with_suffix(&p, "tex"), p);
    }
}
