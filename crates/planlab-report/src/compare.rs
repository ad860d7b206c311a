use crate::error::{ReportError, Result};
use crate::table::{bold, check_algorithms, format_number, tex_row};
use planlab_core::RunStore;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-domain sums of one attribute, one column per requested algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTable {
    pub algorithms: Vec<String>,
    pub rows: BTreeMap<String, Vec<f64>>,
    pub totals: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct DomainComparisonReport {
    pub algorithms: Vec<String>,
    pub attribute: String,
}

impl DomainComparisonReport {
    pub fn new(algorithms: Vec<String>) -> Self {
        Self {
            algorithms,
            attribute: "coverage".to_string(),
        }
    }

    pub fn compute(&self, store: &RunStore) -> Result<ComparisonTable> {
        if self.algorithms.is_empty() {
            return Err(ReportError::NoAlgorithms {
                report: "domain comparison",
            });
        }
        check_algorithms(store, &self.algorithms)?;

        let width = self.algorithms.len();
        let column = |alg: &str| self.algorithms.iter().position(|a| a == alg);
        let mut rows: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for run in store.runs() {
            let Some(col) = column(&run.key.algorithm) else {
                continue;
            };
            let row = rows
                .entry(run.key.domain.clone())
                .or_insert_with(|| vec![0.0; width]);
            // Summed rather than counted so duplicate runs are tolerated.
            if let Some(value) = run.get_f64(&self.attribute) {
                row[col] += value;
            }
        }

        let mut totals = vec![0.0; width];
        for row in rows.values() {
            for (total, value) in totals.iter_mut().zip(row) {
                *total += value;
            }
        }
        Ok(ComparisonTable {
            algorithms: self.algorithms.clone(),
            rows,
            totals,
        })
    }

    pub fn render(&self, table: &ComparisonTable) -> String {
        let mut header = vec![String::new()];
        header.extend(table.algorithms.iter().cloned());
        let mut lines = vec![tex_row(&header)];
        for (domain, values) in &table.rows {
            lines.push(tex_row(&marked_row(domain, values)));
        }
        lines.push(tex_row(&marked_row("sum", &table.totals)));
        lines.join("\n")
    }

    pub fn get_text(&self, store: &RunStore) -> Result<String> {
        Ok(self.render(&self.compute(store)?))
    }
}

/// Every cell equal to the row maximum is bold, so ties are all marked.
fn marked_row(name: &str, values: &[f64]) -> Vec<String> {
    let best = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut cells = vec![name.to_string()];
    for value in values {
        let text = format_number(*value, 2);
        cells.push(if *value == best { bold(&text) } else { text });
    }
    cells
}
