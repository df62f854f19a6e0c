use thiserror::Error;

/// Result type for peak detection pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Stage has already been started and has not exited yet
    #[error("Stage '{0}' has already been started")]
    AlreadyStarted(String),

    /// A type selector did not match any registered algorithm
    #[error("Unknown {kind} algorithm '{name}'")]
    UnknownAlgorithm { kind: &'static str, name: String },

    /// A parameter bundle could not be decoded or failed validation
    #[error("Invalid parameter for {stage}: {message}")]
    InvalidParameter { stage: String, message: String },

    /// Per-item computation inside a stage failed
    #[error("Stage execution failed: {0}")]
    StageError(String),

    /// A stage stopped because its algorithm failed
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    /// Thread spawn or join error
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Shorthand for an `InvalidParameter` error
    pub fn invalid_parameter(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
