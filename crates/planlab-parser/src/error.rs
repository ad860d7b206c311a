use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("line {line}: cannot convert '{raw}' to {expected} for field '{field}'")]
    Coercion {
        field: String,
        raw: String,
        expected: &'static str,
        line: usize,
    },

    #[error("invalid pattern '{pattern}': {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("pattern '{pattern}' captures group '{group}' without a coercion")]
    UncoercedGroup { pattern: String, group: String },

    #[error("pattern '{pattern}' has no named capture groups")]
    NoGroups { pattern: String },

    #[error("unknown parser preset: {0}")]
    UnknownPreset(String),

    #[error("derived metric '{function}' failed: {message}")]
    Derived {
        function: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ParseError>;
