use crate::attributes::{Aggregation, Attribute};
use crate::error::Result;
use crate::table::{bold, check_algorithms, format_number, tex_row, with_suffix, write_text};
use planlab_core::RunStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const MISSING_CELL: &str = "--";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsoluteFormat {
    Html,
    Tex,
}

impl AbsoluteFormat {
    pub fn suffix(self) -> &'static str {
        match self {
            AbsoluteFormat::Html => "html",
            AbsoluteFormat::Tex => "tex",
        }
    }
}

/// One attribute's per-domain aggregates; cells follow `algorithms`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeTable {
    pub attribute: Attribute,
    pub algorithms: Vec<String>,
    pub rows: BTreeMap<String, Vec<Option<f64>>>,
    pub summary: Vec<Option<f64>>,
}

impl AttributeTable {
    fn summary_label(&self) -> &'static str {
        match self.attribute.aggregation {
            Aggregation::Sum => "sum",
            Aggregation::GeometricMean => "geometric mean",
        }
    }

    fn cell(&self, value: Option<f64>) -> String {
        value
            .map(|v| format_number(v, self.attribute.digits))
            .unwrap_or_else(|| MISSING_CELL.to_string())
    }

    /// Flags every cell holding the best value of the row.
    fn best_cells(&self, values: &[Option<f64>]) -> Vec<bool> {
        let mut best: Option<f64> = None;
        for v in values.iter().flatten() {
            if best.map_or(true, |b| self.attribute.is_better(*v, b)) {
                best = Some(*v);
            }
        }
        values
            .iter()
            .map(|v| v.is_some() && *v == best)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AbsoluteReport {
    /// Column order; empty means every algorithm in the store, by name.
    pub algorithms: Vec<String>,
    pub attributes: Vec<Attribute>,
}

impl AbsoluteReport {
    pub fn new(algorithms: Vec<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            algorithms,
            attributes,
        }
    }

    pub fn compute(&self, store: &RunStore) -> Result<Vec<AttributeTable>> {
        let algorithms: Vec<String> = if self.algorithms.is_empty() {
            store.algorithms().into_iter().collect()
        } else {
            check_algorithms(store, &self.algorithms)?;
            self.algorithms.clone()
        };
        let store = store.filter_algorithms(&algorithms);
        let problems = store.problem_runs(&algorithms);

        let mut tables = Vec::with_capacity(self.attributes.len());
        for attribute in &self.attributes {
            let mut per_domain: BTreeMap<String, Vec<Vec<f64>>> = BTreeMap::new();
            let mut overall: Vec<Vec<f64>> = vec![Vec::new(); algorithms.len()];
            for ((domain, _problem), runs) in &problems {
                let columns = per_domain
                    .entry(domain.clone())
                    .or_insert_with(|| vec![Vec::new(); algorithms.len()]);
                let values: Vec<Option<f64>> = algorithms
                    .iter()
                    .map(|alg| {
                        runs.iter()
                            .find(|r| &r.key.algorithm == alg)
                            .and_then(|r| r.get_f64(&attribute.name))
                    })
                    .collect();
                if !attribute.absolute && values.iter().any(Option::is_none) {
                    continue;
                }
                for (idx, value) in values.into_iter().enumerate() {
                    if let Some(v) = value {
                        columns[idx].push(v);
                        overall[idx].push(v);
                    }
                }
            }
            let rows = per_domain
                .into_iter()
                .map(|(domain, columns)| {
                    let cells = columns
                        .iter()
                        .map(|vals| attribute.aggregation.apply(vals))
                        .collect();
                    (domain, cells)
                })
                .collect();
            let summary = overall
                .iter()
                .map(|vals| attribute.aggregation.apply(vals))
                .collect();
            debug!(attribute = %attribute.name, "aggregated attribute");
            tables.push(AttributeTable {
                attribute: attribute.clone(),
                algorithms: algorithms.clone(),
                rows,
                summary,
            });
        }
        Ok(tables)
    }

    pub fn render_tex(&self, tables: &[AttributeTable]) -> String {
        let mut lines = Vec::new();
        for table in tables {
            lines.push(format!("% {}", table.attribute.name));
            let mut header = vec![String::new()];
            header.extend(table.algorithms.iter().cloned());
            lines.push(tex_row(&header));
            let all_rows = table
                .rows
                .iter()
                .map(|(d, v)| (d.as_str(), v))
                .chain(std::iter::once((table.summary_label(), &table.summary)));
            for (name, values) in all_rows {
                let best = table.best_cells(values);
                let mut cells = vec![name.to_string()];
                for (value, is_best) in values.iter().zip(best) {
                    let text = table.cell(*value);
                    cells.push(if is_best { bold(&text) } else { text });
                }
                lines.push(tex_row(&cells));
            }
        }
        lines.join("\n")
    }

    pub fn render_html(&self, tables: &[AttributeTable]) -> String {
        let mut body = String::new();
        for table in tables {
            body.push_str(&format!(
                "<h2 id=\"{0}\">{0}</h2>\n<table>\n<thead><tr><th>domain</th>",
                escape(&table.attribute.name)
            ));
            for alg in &table.algorithms {
                body.push_str(&format!("<th>{}</th>", escape(alg)));
            }
            body.push_str("</tr></thead>\n<tbody>\n");
            let all_rows = table
                .rows
                .iter()
                .map(|(d, v)| (d.as_str(), v, ""))
                .chain(std::iter::once((
                    table.summary_label(),
                    &table.summary,
                    " class=\"summary\"",
                )));
            for (name, values, class) in all_rows {
                body.push_str(&format!("<tr{}><td>{}</td>", class, escape(name)));
                let best = table.best_cells(values);
                for (value, is_best) in values.iter().zip(best) {
                    let text = escape(&table.cell(*value));
                    if is_best {
                        body.push_str(&format!("<td class=\"best\">{}</td>", text));
                    } else {
                        body.push_str(&format!("<td>{}</td>", text));
                    }
                }
                body.push_str("</tr>\n");
            }
            body.push_str("</tbody>\n</table>\n");
        }
        format!(
            r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Absolute report</title>
<style>
body {{ font-family: sans-serif; }}
table {{ border-collapse: collapse; margin-bottom: 2em; }}
th, td {{ border: 1px solid #ccc; padding: 2px 8px; text-align: right; }}
td:first-child {{ text-align: left; }}
td.best {{ font-weight: bold; color: #1a7f37; }}
tr.summary {{ border-top: 2px solid #333; }}
</style>
</head>
<body>
{}</body>
</html>
"##,
            body
        )
    }

    pub fn write(&self, store: &RunStore, path: &Path, format: AbsoluteFormat) -> Result<PathBuf> {
        let tables = self.compute(store)?;
        let out = with_suffix(path, format.suffix());
        let text = match format {
            AbsoluteFormat::Html => self.render_html(&tables),
            AbsoluteFormat::Tex => self.render_tex(&tables),
        };
        write_text(&out, &text)?;
        Ok(out)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use planlab_core::{AttrValue, RunKey, RunRecord};

    fn add(store: &mut RunStore, alg: &str, domain: &str, problem: &str, fields: &[(&str, i64)]) {
        let mut r = RunRecord::new(RunKey::new(alg, domain, problem));
        for (name, value) in fields {
            r.fields.insert(name.to_string(), AttrValue::Int(*value));
        }
        store.insert(r);
    }

    fn sample() -> RunStore {
        let mut s = RunStore::new();
        add(&mut s, "A", "gripper", "p1", &[("coverage", 1), ("expansions", 10)]);
        add(&mut s, "B", "gripper", "p1", &[("coverage", 1), ("expansions", 40)]);
        add(&mut s, "A", "gripper", "p2", &[("coverage", 1), ("expansions", 1000)]);
        add(&mut s, "B", "gripper", "p2", &[("coverage", 0)]);
        s
    }

    fn algs() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[test]
    fn absolute_attributes_use_every_run() {
        let report = AbsoluteReport::new(algs(), vec![Attribute::named("coverage")]);
        let tables = report.compute(&sample()).expect("compute");
        assert_eq!(tables[0].rows["gripper"], vec![Some(2.0), Some(1.0)]);
        assert_eq!(tables[0].summary, vec![Some(2.0), Some(1.0)]);
    }

    #[test]
    fn relative_attributes_use_commonly_solved_problems_only() {
        let report = AbsoluteReport::new(algs(), vec![Attribute::named("expansions")]);
        let tables = report.compute(&sample()).expect("compute");
        // p2 lacks expansions for B, so only p1 counts.
        let row = &tables[0].rows["gripper"];
        assert_eq!(row.len(), 2);
        for (cell, want) in row.iter().zip([10.0, 40.0]) {
            let got = cell.expect("value");
            assert!((got - want).abs() < 1e-9, "{} != {}", got, want);
        }
    }

    #[test]
    fn tex_marks_best_cell_by_direction() {
        let report = AbsoluteReport::new(
            algs(),
            vec![Attribute::named("coverage"), Attribute::named("expansions")],
        );
        let tables = report.compute(&sample()).expect("compute");
        let tex = report.render_tex(&tables);
        assert!(tex.contains("gripper & \\textbf{2} & 1 \\\\"));
        assert!(tex.contains("gripper & \\textbf{10} & 40 \\\\"));
        assert!(tex.contains("geometric mean & \\textbf{10} & 40 \\\\"));
    }

    #[test]
    fn html_is_written_with_suffix() {
        let report = AbsoluteReport::new(vec![], vec![Attribute::named("coverage")]);
        let dir = tempfile::tempdir().expect("tempdir");
        let out = report
            .write(&sample(), &dir.path().join("report"), AbsoluteFormat::Html)
            .expect("write");
        assert!(out.to_string_lossy().ends_with("report.html"));
        let html = std::fs::read_to_string(out).expect("read");
        assert!(html.contains("<th>A</th><th>B</th>"));
        assert!(html.contains("<td class=\"best\">2</td>"));
    }
}
