use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    GeometricMean,
}

impl Aggregation {
    /// `None` when there is nothing to aggregate.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Aggregation::Sum => Some(values.iter().sum()),
            Aggregation::GeometricMean => Some(geometric_mean(values)),
        }
    }
}

/// Values at or below zero are clamped to 0.01 before taking logarithms.
/// A single value is returned as is, without the log round trip.
pub fn geometric_mean(values: &[f64]) -> f64 {
    match values {
        [] => return 0.0,
        [single] => return single.max(0.01),
        _ => {}
    }
    let log_sum: f64 = values.iter().map(|v| v.max(0.01).ln()).sum();
    (log_sum / values.len() as f64).exp()
}

/// How an attribute is compared and aggregated in tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub min_wins: bool,
    /// Absolute attributes aggregate over every run; the others only over
    /// problems where all compared algorithms have a value.
    pub absolute: bool,
    pub aggregation: Aggregation,
    pub digits: usize,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_wins: true,
            absolute: false,
            aggregation: Aggregation::Sum,
            digits: 2,
        }
    }

    pub fn min_wins(mut self, min_wins: bool) -> Self {
        self.min_wins = min_wins;
        self
    }

    pub fn absolute(mut self, absolute: bool) -> Self {
        self.absolute = absolute;
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    /// Defaults for the attributes planner logs commonly produce; any other
    /// name is summed with smaller values winning.
    pub fn named(name: &str) -> Self {
        let base = Attribute::new(name);
        match name {
            "coverage" => base.min_wins(false).absolute(true).digits(0),
            "cost" => base.digits(0),
            "expansions" | "evaluations" | "generated" | "expansions_until_last_jump" => {
                base.aggregation(Aggregation::GeometricMean)
            }
            "search_time" | "total_time" | "memory" => base.aggregation(Aggregation::GeometricMean),
            "evaluations_per_time" => base
                .min_wins(false)
                .aggregation(Aggregation::GeometricMean)
                .digits(1),
            _ => base,
        }
    }

    pub fn is_better(&self, candidate: f64, best: f64) -> bool {
        if self.min_wins {
            candidate < best
        } else {
            candidate > best
        }
    }
}

pub const DEFAULT_ATTRIBUTES: &[&str] = &[
    "coverage",
    "cost",
    "expansions",
    "expansions_until_last_jump",
    "search_time",
    "total_time",
];

pub fn default_attributes() -> Vec<Attribute> {
    DEFAULT_ATTRIBUTES.iter().map(|n| Attribute::named(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometric_mean_clamps_non_positive_values() {
        let gm = geometric_mean(&[0.0, 100.0]);
        assert!((gm - 1.0).abs() < 1e-9);
        assert!((geometric_mean(&[2.0, 8.0]) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn geometric_mean_of_one_value_is_exact() {
        assert_eq!(geometric_mean(&[10.0]), 10.0);
        assert_eq!(geometric_mean(&[-3.0]), 0.01);
        assert!((geometric_mean(&[10.0, 40.0]) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_is_absolute_and_max_wins() {
        let cov = Attribute::named("coverage");
        assert!(cov.absolute);
        assert!(cov.is_better(3.0, 2.0));
        let exp = Attribute::named("expansions");
        assert_eq!(exp.aggregation, Aggregation::GeometricMean);
        assert!(exp.is_better(2.0, 3.0));
    }

    #[test]
    fn empty_aggregation_is_none() {
        assert_eq!(Aggregation::Sum.apply(&[]), None);
        assert_eq!(Aggregation::Sum.apply(&[1.0, 2.5]), Some(3.5));
    }
}
