use crate::error::{ParseError, Result};
use planlab_core::AttrValue;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

/// Conversion applied to one captured group.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    Int,
    Float,
    /// Float clamped from below, so ratios and geometric means never see zero.
    FloatFloor(f64),
    /// 1 when the capture equals the sentinel, 0 otherwise.
    Sentinel(String),
    Str,
}

impl Coercion {
    pub fn apply(&self, field: &str, raw: &str, line: usize) -> Result<AttrValue> {
        let text = raw.trim();
        let fail = |expected: &'static str| ParseError::Coercion {
            field: field.to_string(),
            raw: raw.to_string(),
            expected,
            line,
        };
        match self {
            Coercion::Int => text.parse::<i64>().map(AttrValue::Int).map_err(|_| fail("integer")),
            Coercion::Float => text.parse::<f64>().map(AttrValue::Float).map_err(|_| fail("float")),
            Coercion::FloatFloor(min) => text
                .parse::<f64>()
                .map(|v| AttrValue::Float(v.max(*min)))
                .map_err(|_| fail("float")),
            Coercion::Sentinel(value) => Ok(AttrValue::flag(text == value)),
            Coercion::Str => Ok(AttrValue::Str(text.to_string())),
        }
    }
}

/// Whether a pattern fills single-valued fields or appends sub-records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// First matching line wins; later matches are ignored.
    Scalar,
    /// Every matching line appends one sub-record to the list field `into`.
    Accumulate { into: String },
}

/// Where a pattern may start matching inside a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    LineStart,
    Anywhere,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    kind: FieldKind,
    coercions: BTreeMap<String, Coercion>,
}

impl Pattern {
    /// Line-anchored single-valued pattern.
    pub fn scalar(regex: &str, fields: &[(&str, Coercion)]) -> Result<Self> {
        Self::build(regex, Anchor::LineStart, FieldKind::Scalar, fields, None)
    }

    /// Single-valued pattern that may match anywhere in a line, for banners the
    /// planner prefixes with a timestamp.
    pub fn search(regex: &str, fields: &[(&str, Coercion)]) -> Result<Self> {
        Self::build(regex, Anchor::Anywhere, FieldKind::Scalar, fields, None)
    }

    /// Line-anchored pattern whose every group shares one coercion.
    pub fn scalar_all(regex: &str, coercion: Coercion) -> Result<Self> {
        Self::build(regex, Anchor::LineStart, FieldKind::Scalar, &[], Some(coercion))
    }

    pub fn accumulate(regex: &str, into: &str, fields: &[(&str, Coercion)]) -> Result<Self> {
        Self::build(
            regex,
            Anchor::LineStart,
            FieldKind::Accumulate {
                into: into.to_string(),
            },
            fields,
            None,
        )
    }

    fn build(
        regex: &str,
        anchor: Anchor,
        kind: FieldKind,
        fields: &[(&str, Coercion)],
        default: Option<Coercion>,
    ) -> Result<Self> {
        let anchored = match anchor {
            Anchor::LineStart => format!("^(?:{})", regex),
            Anchor::Anywhere => regex.to_string(),
        };
        let compiled = Regex::new(&anchored).map_err(|source| ParseError::BadPattern {
            pattern: regex.to_string(),
            source,
        })?;
        let listed: BTreeMap<String, Coercion> = fields
            .iter()
            .map(|(name, c)| (name.to_string(), c.clone()))
            .collect();
        let mut coercions = BTreeMap::new();
        for group in compiled.capture_names().flatten() {
            let coercion = listed
                .get(group)
                .cloned()
                .or_else(|| default.clone())
                .ok_or_else(|| ParseError::UncoercedGroup {
                    pattern: regex.to_string(),
                    group: group.to_string(),
                })?;
            coercions.insert(group.to_string(), coercion);
        }
        if coercions.is_empty() {
            return Err(ParseError::NoGroups {
                pattern: regex.to_string(),
            });
        }
        Ok(Self {
            source: regex.to_string(),
            regex: compiled,
            kind,
            coercions,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.coercions.keys().map(|k| k.as_str())
    }

    pub(crate) fn captures<'t>(&self, line: &'t str) -> Option<Captures<'t>> {
        self.regex.captures(line)
    }

    /// Coerces every named group that participated in the match. Optional
    /// groups that did not participate stay absent.
    pub(crate) fn coerce(
        &self,
        caps: &Captures<'_>,
        line: usize,
    ) -> Result<Vec<(String, AttrValue)>> {
        let mut out = Vec::with_capacity(self.coercions.len());
        for (name, coercion) in &self.coercions {
            if let Some(m) = caps.name(name) {
                out.push((name.clone(), coercion.apply(name, m.as_str(), line)?));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_floor_clamps_small_values() {
        let v = Coercion::FloatFloor(0.01)
            .apply("search_time", "0", 1)
            .expect("float");
        assert_eq!(v, AttrValue::Float(0.01));
        let v = Coercion::FloatFloor(0.01)
            .apply("search_time", " 2.5 ", 1)
            .expect("float");
        assert_eq!(v, AttrValue::Float(2.5));
    }

    #[test]
    fn sentinel_maps_to_flag() {
        let c = Coercion::Sentinel("desactivated".to_string());
        assert_eq!(c.apply("p", "desactivated", 1).expect("flag"), AttrValue::Int(1));
        assert_eq!(c.apply("p", "active", 1).expect("flag"), AttrValue::Int(0));
    }

    #[test]
    fn int_coercion_reports_field_and_line() {
        let err = Coercion::Int.apply("expansions", "12x", 7).expect_err("not an int");
        match err {
            ParseError::Coercion {
                field, raw, line, ..
            } => {
                assert_eq!(field, "expansions");
                assert_eq!(raw, "12x");
                assert_eq!(line, 7);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn every_named_group_needs_a_coercion() {
        let err = Pattern::scalar(r"a (?P<x>\d+) (?P<y>\d+)", &[("x", Coercion::Int)])
            .expect_err("y has no coercion");
        assert!(matches!(err, ParseError::UncoercedGroup { group, .. } if group == "y"));
    }

    #[test]
    fn scalar_patterns_are_line_anchored() {
        let p = Pattern::scalar(r"Plan cost: (?P<cost>\d+)", &[("cost", Coercion::Int)])
            .expect("pattern");
        assert!(p.captures("Plan cost: 4").is_some());
        assert!(p.captures("[t=0.1s] Plan cost: 4").is_none());
        let s = Pattern::search(r"Plan cost: (?P<cost>\d+)", &[("cost", Coercion::Int)])
            .expect("pattern");
        assert!(s.captures("[t=0.1s] Plan cost: 4").is_some());
    }
}
