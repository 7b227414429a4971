use thiserror::Error;

use crate::core::mapping::MappingType;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown source database type: {0}")]
    UnknownSourceType(String),

    #[error("Missing value for SQL parameter ':{0}'")]
    MissingParameter(String),

    #[error("Cyclic step dependency detected at step '{0}'")]
    DependencyCycle(String),

    #[error("Step '{step}' depends on {mapping_type}, which no registered step produces and no previous run mapped")]
    UnknownDependency {
        step: String,
        mapping_type: MappingType,
    },

    #[error("Step '{0}' is registered more than once")]
    DuplicateStep(String),

    #[error("Both '{first}' and '{second}' produce {mapping_type}")]
    DuplicateProducer {
        mapping_type: MappingType,
        first: String,
        second: String,
    },

    #[error("Step '{step}' produced a row without column '{column}'")]
    MissingColumn { step: String, column: String },

    #[error("Invalid value in column '{column}': expected {expected}")]
    InvalidValue {
        column: String,
        expected: &'static str,
    },

    #[error("Set '{name}' holds tuples of {expected} values, got {actual}")]
    SetArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<ImportError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    SettingsError(#[from] toml::de::Error),
}

impl ImportError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_value<S: Into<String>>(column: S, expected: &'static str) -> Self {
        Self::InvalidValue {
            column: column.into(),
            expected,
        }
    }

    pub fn step_failed<S: Into<String>>(step: S, source: ImportError) -> Self {
        Self::StepFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Name of the failing step, if the error was raised while a step ran.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type ImportResult<T> = Result<T, ImportError>;
