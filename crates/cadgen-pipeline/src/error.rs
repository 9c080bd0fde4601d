//! Error types for cadgen-pipeline

use cadgen_ai::Provider;
use thiserror::Error;

/// Result type alias using cadgen-pipeline Error
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Every terminal state a pipeline run can end in
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Request text was blank
    #[error("Request is empty")]
    EmptyRequest,

    /// The active provider has no API key
    #[error("No API key configured for {provider}")]
    NoCredentials { provider: Provider },

    /// Network, auth or quota failure from the provider
    #[error("Provider error: {0}")]
    Provider(#[from] cadgen_ai::Error),

    /// Nothing code-like was found in the response
    #[error("The model did not return a code block. Response starts with:\n{preview}")]
    EmptyExtraction { preview: String },

    /// Extracted text does not reference the CAD library
    #[error("The extracted code does not use build123d. Code starts with:\n{preview}")]
    MissingDomainMarkers { preview: String },

    /// Validation failed again after the corrective re-prompt
    #[error("Extraction failed after a corrective prompt: {reason}")]
    ExtractionFailed { reason: String },

    /// Safety gate matched one or more banned patterns
    #[error("Rejected for safety (banned: {})", .matches.join(", "))]
    UnsafeCodeRejected { matches: Vec<String> },

    /// Program does not parse
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// Program raised while running; carries the full trace
    #[error("{0}")]
    Runtime(String),

    /// Program ran but never bound a finished result
    #[error("NameError: `{binding}` was not assigned a finished part (expected `{binding}.part`)")]
    MissingResult { binding: String },

    /// Repair loop used every attempt
    #[error("Repair failed after {attempts} attempt(s). Last error:\n{last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Repair requested with no failing program on record
    #[error("Nothing to retry: no failed program recorded")]
    NothingToRetry,

    /// Another run is still in flight on this pipeline
    #[error("A run is already in progress")]
    Busy,

    /// The run was aborted
    #[error("Cancelled")]
    Cancelled,

    /// Execution exceeded its deadline
    #[error("Execution timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The interpreter could not be started or misbehaved
    #[error("Interpreter error: {0}")]
    Interpreter(String),
}

impl PipelineError {
    /// Whether this failure is fed back to the model by the repair loop.
    ///
    /// Only failures of the program itself qualify; safety rejections and
    /// operational errors never do.
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            PipelineError::Syntax(_)
                | PipelineError::Runtime(_)
                | PipelineError::MissingResult { .. }
                | PipelineError::Timeout { .. }
        )
    }

    /// Short machine-friendly name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::EmptyRequest => "empty_request",
            PipelineError::NoCredentials { .. } => "no_credentials",
            PipelineError::Provider(_) => "provider_error",
            PipelineError::EmptyExtraction { .. } => "empty_extraction",
            PipelineError::MissingDomainMarkers { .. } => "missing_domain_markers",
            PipelineError::ExtractionFailed { .. } => "extraction_failed",
            PipelineError::UnsafeCodeRejected { .. } => "unsafe_code_rejected",
            PipelineError::Syntax(_) => "syntax_error",
            PipelineError::Runtime(_) => "runtime_error",
            PipelineError::MissingResult { .. } => "missing_result",
            PipelineError::RetryExhausted { .. } => "retry_exhausted",
            PipelineError::NothingToRetry => "nothing_to_retry",
            PipelineError::Busy => "busy",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Interpreter(_) => "interpreter_error",
        }
    }
}
