use crate::error::Result;
use crate::pattern::{FieldKind, Pattern};
use planlab_core::{AttrValue, Record};
use tracing::trace;

/// A post-processing step that reads the raw text and the partially filled
/// record and may add or overwrite fields.
pub type DerivedFn = fn(&str, &mut Record) -> Result<()>;

#[derive(Clone)]
pub struct Derived {
    pub name: &'static str,
    pub func: DerivedFn,
}

/// Explicit parser configuration: ordered patterns followed by ordered
/// derived-metric functions.
#[derive(Clone, Default)]
pub struct Extractor {
    patterns: Vec<Pattern>,
    derived: Vec<Derived>,
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_derived(mut self, name: &'static str, func: DerivedFn) -> Self {
        self.derived.push(Derived { name, func });
        self
    }

    /// Drops every derived function registered under `name`.
    pub fn without_derived(mut self, name: &str) -> Self {
        self.derived.retain(|d| d.name != name);
        self
    }

    pub fn push_pattern(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    pub fn push_derived(&mut self, name: &'static str, func: DerivedFn) {
        self.derived.push(Derived { name, func });
    }

    /// Appends another configuration. Its patterns run after ours, and all
    /// derived functions still run after all patterns.
    pub fn extend(&mut self, other: Extractor) {
        self.patterns.extend(other.patterns);
        self.derived.extend(other.derived);
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn derived_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.derived.iter().map(|d| d.name)
    }

    /// Applies every pattern, then every derived function, to `text`.
    /// Scalars already present in `record` are never overwritten by a pattern.
    pub fn extract(&self, text: &str, mut record: Record) -> Result<Record> {
        for pattern in &self.patterns {
            apply_pattern(pattern, text, &mut record)?;
        }
        for derived in &self.derived {
            trace!(function = derived.name, "running derived metric");
            (derived.func)(text, &mut record)?;
        }
        Ok(record)
    }
}

fn apply_pattern(pattern: &Pattern, text: &str, record: &mut Record) -> Result<()> {
    for (idx, line) in text.lines().enumerate() {
        let caps = match pattern.captures(line) {
            Some(caps) => caps,
            None => continue,
        };
        let values = pattern.coerce(&caps, idx + 1)?;
        match pattern.kind() {
            FieldKind::Scalar => {
                for (name, value) in values {
                    record.entry(name).or_insert(value);
                }
                return Ok(());
            }
            FieldKind::Accumulate { into } => {
                let entry: Record = values.into_iter().collect();
                match record
                    .entry(into.clone())
                    .or_insert_with(|| AttrValue::List(Vec::new()))
                {
                    AttrValue::List(items) => items.push(entry),
                    other => *other = AttrValue::List(vec![entry]),
                }
            }
        }
    }
    Ok(())
}
