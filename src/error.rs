use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PopsimError {
    #[error("Failed to load dataset {path}: {reason}")]
    SourceLoad { path: PathBuf, reason: String },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Config: {0}")]
    Config(String),

    #[error("Dataset cache lock poisoned")]
    CachePoisoned,

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Failure of a single grid cell in the volatility/impact analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComputationError {
    /// Year-over-year change whose previous year has zero population.
    ZeroPopulation { year: i64 },
    /// The (0, 0) baseline has zero population in the final year.
    ZeroBaseline { year: i64 },
    /// The year range holds no years.
    EmptyYearRange,
}

impl fmt::Display for ComputationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroPopulation { year } => {
                write!(f, "division by zero: population is 0 in {year}")
            }
            Self::ZeroBaseline { year } => {
                write!(f, "division by zero: baseline population is 0 in {year}")
            }
            Self::EmptyYearRange => write!(f, "year range is empty"),
        }
    }
}

impl std::error::Error for ComputationError {}

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Projection request failed: {0}")]
    Transport(String),

    #[error("Error decoding JSON: {message}")]
    Parse { message: String, raw: String },

    #[error("Error in data structure: {0}")]
    Validation(String),
}

#[cfg(feature = "python")]
mod python {
    use pyo3::exceptions::PyRuntimeError;
    use pyo3::PyErr;

    use super::{PopsimError, ProjectionError};

    impl From<PopsimError> for PyErr {
        fn from(err: PopsimError) -> PyErr {
            PyRuntimeError::new_err(err.to_string())
        }
    }

    impl From<ProjectionError> for PyErr {
        fn from(err: ProjectionError) -> PyErr {
            PyRuntimeError::new_err(err.to_string())
        }
    }
}
