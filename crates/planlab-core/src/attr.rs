use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Flat mapping from attribute name to value, as produced by the parsers.
pub type Record = BTreeMap<String, AttrValue>;

/// A single parsed attribute. Booleans are stored as `Int(0)` / `Int(1)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Record>),
}

impl AttrValue {
    pub fn flag(value: bool) -> Self {
        AttrValue::Int(if value { 1 } else { 0 })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            AttrValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Zero numbers and empty strings or lists are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            AttrValue::Int(v) => *v != 0,
            AttrValue::Float(v) => *v != 0.0,
            AttrValue::Str(s) => !s.is_empty(),
            AttrValue::List(items) => !items.is_empty(),
        }
    }

    /// Numeric ordering used by scatter and absolute reports.
    pub fn numeric_cmp(&self, other: &AttrValue) -> Option<Ordering> {
        self.as_f64()?.partial_cmp(&other.as_f64()?)
    }

    /// Converts a JSON value read from a property file. `null` yields `None`
    /// (absent), booleans become 0/1 integers.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(AttrValue::flag(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(AttrValue::Int(i)),
                None => n.as_f64().map(AttrValue::Float),
            },
            Value::String(s) => Some(AttrValue::Str(s.clone())),
            Value::Array(items) => Some(AttrValue::List(
                items
                    .iter()
                    .filter_map(|item| item.as_object())
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| AttrValue::from_json(v).map(|a| (k.clone(), a)))
                            .collect::<Record>()
                    })
                    .collect(),
            )),
            Value::Object(_) => Some(AttrValue::Str(value.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Str(s) => write!(f, "{}", s),
            AttrValue::List(items) => write!(f, "[{} entries]", items.len()),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

pub fn record_from_json(value: &Value) -> Option<Record> {
    let obj = value.as_object()?;
    Some(
        obj.iter()
            .filter_map(|(k, v)| AttrValue::from_json(v).map(|a| (k.clone(), a)))
            .collect(),
    )
}

pub fn record_to_json(record: &Record) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}
