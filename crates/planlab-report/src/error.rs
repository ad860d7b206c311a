use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("unknown algorithms requested: {missing:?} (known algorithms: {known:?})")]
    UnknownAlgorithms {
        missing: Vec<String>,
        known: Vec<String>,
    },

    #[error("{report} needs exactly {expected} algorithms, got {got:?}")]
    AlgorithmCount {
        report: &'static str,
        expected: usize,
        got: Vec<String>,
    },

    #[error("{report} needs at least one algorithm")]
    NoAlgorithms { report: &'static str },

    #[error("failed to write report {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ReportError>;
