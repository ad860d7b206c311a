use crate::error::Result;
use crate::table::{check_algorithms, tex_row};
use planlab_core::RunStore;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Per-domain count of problems solved by at least one allowed algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleTable {
    pub per_domain: BTreeMap<String, u64>,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct OracleReport {
    /// Allowed algorithms; empty means every algorithm in the store.
    pub algorithms: Vec<String>,
    pub attribute: String,
}

impl OracleReport {
    pub fn new(algorithms: Vec<String>) -> Self {
        Self {
            algorithms,
            attribute: "coverage".to_string(),
        }
    }

    pub fn compute(&self, store: &RunStore) -> Result<OracleTable> {
        check_algorithms(store, &self.algorithms)?;
        let filtered;
        let store = if self.algorithms.is_empty() {
            store
        } else {
            filtered = store.filter_algorithms(&self.algorithms);
            &filtered
        };

        let mut per_domain: BTreeMap<String, u64> =
            store.domains().into_iter().map(|d| (d, 0)).collect();
        for ((domain, problem), runs) in store.problem_runs(&self.algorithms) {
            let solved = runs
                .iter()
                .any(|run| run.get(&self.attribute).is_some_and(|v| v.is_truthy()));
            if solved {
                debug!(%domain, %problem, "solved by oracle");
                *per_domain.entry(domain).or_insert(0) += 1;
            }
        }
        let total = per_domain.values().sum();
        Ok(OracleTable { per_domain, total })
    }

    pub fn render(&self, table: &OracleTable) -> String {
        let mut lines = vec![tex_row(&["", "oracle"])];
        for (domain, count) in &table.per_domain {
            lines.push(tex_row(&[domain.clone(), count.to_string()]));
        }
        lines.push(tex_row(&["sum".to_string(), table.total.to_string()]));
        lines.join("\n")
    }

    pub fn get_text(&self, store: &RunStore) -> Result<String> {
        Ok(self.render(&self.compute(store)?))
    }
}
