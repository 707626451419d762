use std::io;
use std::path::PathBuf;

/// Represents the different types of errors that can occur while building,
/// fitting or applying a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A step requires a column the cumulative schema does not provide
    #[error("Schema mismatch in step '{step}': column '{column}' {reason}")]
    SchemaMismatch {
        step: String,
        column: String,
        reason: String,
    },
    /// An argument is outside of its accepted range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A data source or model file could not be read
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A line of a delimited text source could not be parsed
    #[error("Parse error in {path:?} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    /// Fitting or evaluation was attempted without any usable rows
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    /// Feature vectors do not share a common length
    #[error("Feature mismatch: expected {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },
    /// An image could not be decoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// Error occurred while loading or running the ONNX model
    #[error("Model error: {0}")]
    Model(String),
    /// Error occurred while normalizing or splitting text
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    /// The fitted step carries state that cannot be written to an archive
    #[error("Step '{0}' cannot be persisted")]
    NotPersistable(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn mismatch(
        step: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::SchemaMismatch {
            step: step.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }
}

impl From<ort::Error> for PipelineError {
    fn from(err: ort::Error) -> Self {
        PipelineError::Model(err.to_string())
    }
}
