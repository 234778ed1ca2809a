use thiserror::Error;

/// Failures a single scoring request can end with.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoreError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("invalid threshold {0}: must lie strictly between 0 and 1")]
    InvalidThreshold(f64),
    #[error("classifier failed: {0}")]
    Classifier(String),
}

/// Failures while loading a serialized model artifact.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
}
