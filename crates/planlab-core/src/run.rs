use crate::attr::{AttrValue, Record};
use std::fmt;

/// Identity of one run: a single planner invocation for an
/// (algorithm, domain, problem) triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunKey {
    pub algorithm: String,
    pub domain: String,
    pub problem: String,
}

impl RunKey {
    pub fn new(
        algorithm: impl Into<String>,
        domain: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            domain: domain.into(),
            problem: problem.into(),
        }
    }

    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.algorithm, self.domain, self.problem)
    }

    pub fn problem_key(&self) -> (String, String) {
        (self.domain.clone(), self.problem.clone())
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub key: RunKey,
    pub fields: Record,
}

impl RunRecord {
    pub fn new(key: RunKey) -> Self {
        Self {
            key,
            fields: Record::new(),
        }
    }

    pub fn with_fields(key: RunKey, fields: Record) -> Self {
        Self { key, fields }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.fields.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(|v| v.as_f64())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Identity attributes are mirrored into the field map so that property
    /// files stay self-describing.
    pub fn identity_fields(&self) -> Record {
        let mut out = Record::new();
        out.insert("algorithm".to_string(), self.key.algorithm.as_str().into());
        out.insert("domain".to_string(), self.key.domain.as_str().into());
        out.insert("problem".to_string(), self.key.problem.as_str().into());
        out
    }
}
