//! Paired attribute values for x/y scatter plots.
//!
//! Points are emitted as data, either a tab separated `.dat` file or a
//! pgfplots `.tex` wrapper; rendering the picture is left to the typesetter.

use crate::error::{ReportError, Result};
use crate::table::{with_suffix, write_text};
use planlab_core::{RunRecord, RunStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Assigns a point to a colour group given the two base runs (x side, y side).
pub type Categorizer = Box<dyn Fn(&RunRecord, &RunRecord) -> Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterMode {
    /// Algorithm 1 against algorithm 2.
    Pair,
    /// Algorithm 1 against the pointwise minimum of algorithms 2 and 3.
    Oracle,
    /// Algorithm 1 against the pointwise minimum of algorithms 1 and 2.
    OracleFirstAsThird,
}

impl ScatterMode {
    pub fn expected_algorithms(self) -> usize {
        match self {
            ScatterMode::Pair | ScatterMode::OracleFirstAsThird => 2,
            ScatterMode::Oracle => 3,
        }
    }

    fn report_name(self) -> &'static str {
        match self {
            ScatterMode::Pair => "scatter",
            ScatterMode::Oracle => "oracle scatter",
            ScatterMode::OracleFirstAsThird => "oracle scatter (first as third)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterFormat {
    Dat,
    Tex,
}

impl ScatterFormat {
    pub fn suffix(self) -> &'static str {
        match self {
            ScatterFormat::Dat => "dat",
            ScatterFormat::Tex => "tex",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub category: Option<String>,
    pub domain: String,
    pub problem: String,
    pub x: f64,
    pub y: f64,
}

pub struct ScatterReport {
    pub algorithms: Vec<String>,
    pub attribute: String,
    pub mode: ScatterMode,
    categorizer: Option<Categorizer>,
}

impl fmt::Debug for ScatterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatterReport")
            .field("algorithms", &self.algorithms)
            .field("attribute", &self.attribute)
            .field("mode", &self.mode)
            .field("categorized", &self.categorizer.is_some())
            .finish()
    }
}

impl ScatterReport {
    pub fn new(algorithms: Vec<String>, attribute: impl Into<String>, mode: ScatterMode) -> Self {
        Self {
            algorithms,
            attribute: attribute.into(),
            mode,
            categorizer: None,
        }
    }

    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = Some(categorizer);
        self
    }

    fn validate(&self, store: &RunStore) -> Result<()> {
        let expected = self.mode.expected_algorithms();
        if self.algorithms.len() != expected {
            return Err(ReportError::AlgorithmCount {
                report: self.mode.report_name(),
                expected,
                got: self.algorithms.clone(),
            });
        }
        crate::table::check_algorithms(store, &self.algorithms)
    }

    pub fn points(&self, store: &RunStore) -> Result<Vec<ScatterPoint>> {
        self.validate(store)?;
        let mut points = Vec::new();
        for ((domain, problem), runs) in store.problem_runs(&self.algorithms) {
            let by_alg: BTreeMap<&str, &RunRecord> = runs
                .iter()
                .map(|r| (r.key.algorithm.as_str(), *r))
                .collect();
            let sides: Option<Vec<&RunRecord>> = self
                .algorithms
                .iter()
                .map(|a| by_alg.get(a.as_str()).copied())
                .collect();
            let Some(sides) = sides else {
                debug!(%domain, %problem, "incomplete run set, no point");
                continue;
            };
            let value = |run: &RunRecord| run.get_f64(&self.attribute);

            let xy = match self.mode {
                ScatterMode::Pair => value(sides[0]).zip(value(sides[1])),
                ScatterMode::Oracle => {
                    value(sides[0]).zip(pointwise_min(value(sides[1]), value(sides[2])))
                }
                ScatterMode::OracleFirstAsThird => {
                    let x = value(sides[0]);
                    x.zip(pointwise_min(x, value(sides[1])))
                }
            };
            let Some((x, y)) = xy else {
                continue;
            };
            let category = self
                .categorizer
                .as_ref()
                .and_then(|categorize| categorize(sides[0], sides[1]));
            points.push(ScatterPoint {
                category,
                domain,
                problem,
                x,
                y,
            });
        }
        Ok(points)
    }

    /// Writes the points to `path` (suffix added if missing) and returns the
    /// path actually written.
    pub fn write(&self, store: &RunStore, path: &Path, format: ScatterFormat) -> Result<PathBuf> {
        let points = self.points(store)?;
        let out = with_suffix(path, format.suffix());
        let text = match format {
            ScatterFormat::Dat => render_dat(&points),
            ScatterFormat::Tex => self.render_tex(&points),
        };
        write_text(&out, &text)?;
        debug!(path = %out.display(), points = points.len(), "wrote scatter");
        Ok(out)
    }

    pub fn render_tex(&self, points: &[ScatterPoint]) -> String {
        let mut groups: BTreeMap<String, Vec<&ScatterPoint>> = BTreeMap::new();
        for p in points {
            let name = p.category.clone().unwrap_or_else(|| "None".to_string());
            groups.entry(name).or_default().push(p);
        }
        let y_label = match self.mode {
            ScatterMode::Pair => self.algorithms.get(1).cloned().unwrap_or_default(),
            _ => "oracle".to_string(),
        };
        let x_label = self.algorithms.first().cloned().unwrap_or_default();
        let max = points
            .iter()
            .flat_map(|p| [p.x, p.y])
            .fold(1.0_f64, f64::max);

        let mut out = String::new();
        out.push_str("\\begin{tikzpicture}\n");
        out.push_str(&format!(
            "\\begin{{axis}}[xlabel={{{}}}, ylabel={{{}}}, title={{{}}}]\n",
            x_label, y_label, self.attribute
        ));
        for (name, members) in &groups {
            out.push_str("\\addplot[only marks] coordinates {");
            for p in members {
                out.push_str(&format!(" ({}, {})", p.x, p.y));
            }
            out.push_str(" };\n");
            out.push_str(&format!("\\addlegendentry{{{}}}\n", name));
        }
        out.push_str(&format!(
            "\\addplot[no marks, dashed] coordinates {{ (0, 0) ({max}, {max}) }};\n"
        ));
        out.push_str("\\end{axis}\n\\end{tikzpicture}\n");
        out
    }
}

pub fn render_dat(points: &[ScatterPoint]) -> String {
    let mut out = String::from("# category\tdomain\tproblem\tx\ty\n");
    for p in points {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\n",
            p.category.as_deref().unwrap_or("None"),
            p.domain,
            p.problem,
            p.x,
            p.y
        ));
    }
    out
}

/// A missing side loses to the present one; two missing sides yield nothing.
fn pointwise_min(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Categorizes a point by the domain of its x-side run.
pub fn by_domain() -> Categorizer {
    Box::new(|run: &RunRecord, _: &RunRecord| Some(run.key.domain.clone()))
}
