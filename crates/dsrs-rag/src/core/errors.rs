use std::time::Duration;

/// Coarse error classification for retry and routing logic.
///
/// `Temporary` errors are generally retryable by the collaborator client;
/// `BadResponse` suggests a prompt-engineering problem; `Internal` means a code bug.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorClass {
    /// The request itself was malformed.
    BadRequest,
    /// Transient failure (network, rate limit, timeout, server 5xx).
    Temporary,
    /// The service responded, but the output couldn't be used.
    BadResponse,
    /// A bug in the calling code or an unexpected provider response.
    Internal,
}

/// The LM provider failed before returning a usable response.
#[derive(Debug, thiserror::Error)]
pub enum LmError {
    /// Could not reach the provider endpoint (DNS, connection refused, etc.).
    #[error("could not reach {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// The provider returned a rate limit response.
    #[error("rate limited by provider: {message}")]
    RateLimit { message: String },

    /// The provider returned an unexpected HTTP status.
    #[error("invalid response from provider: HTTP {status}")]
    InvalidResponse { status: u16, body: String },

    /// The request exceeded the configured timeout.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    /// A provider-specific error that doesn't fit the other categories.
    #[error("provider error from {provider}: {message}")]
    Provider { provider: String, message: String },
}

impl LmError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network { .. } => ErrorClass::Temporary,
            Self::RateLimit { .. } => ErrorClass::Temporary,
            Self::InvalidResponse { status, .. } if *status >= 500 => ErrorClass::Temporary,
            Self::InvalidResponse { .. } => ErrorClass::BadRequest,
            Self::Timeout { .. } => ErrorClass::Temporary,
            Self::Provider { .. } => ErrorClass::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::RateLimit { .. } => true,
            Self::Timeout { .. } => true,
            Self::InvalidResponse { status, .. } => *status >= 500,
            Self::Provider { .. } => false,
        }
    }
}

/// The LM response couldn't be parsed into the expected output fields.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// An expected `[[ ## field ## ]]` section marker was not found in the response.
    #[error("field `{field}` not found in response")]
    MissingField { field: String },

    /// The section marker was found, but nothing followed it.
    #[error("field `{field}` is empty in response")]
    EmptyField { field: String },
}

impl ParseError {
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field } => field,
            Self::EmptyField { field } => field,
        }
    }
}

/// Failure of one generation step (a single LM call plus output parsing).
///
/// A call can fail at three stages:
///
/// 1. **[`Lm`](PredictError::Lm)**: couldn't reach the LM or it errored.
/// 2. **[`Parse`](PredictError::Parse)**: the LM responded, but the expected
///    fields could not be extracted. Includes the raw response for debugging.
/// 3. **[`Conversion`](PredictError::Conversion)**: the fields were extracted
///    but don't fit the typed output record.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("LLM call failed")]
    Lm {
        #[source]
        source: LmError,
    },

    #[error("failed to parse LLM response")]
    Parse {
        #[source]
        source: ParseError,
        raw_response: String,
    },

    #[error("failed to convert parsed fields to output type")]
    Conversion {
        #[source]
        source: serde_json::Error,
    },
}

impl PredictError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Lm { source } => source.class(),
            Self::Parse { .. } => ErrorClass::BadResponse,
            Self::Conversion { .. } => ErrorClass::Internal,
        }
    }
}

impl From<LmError> for PredictError {
    fn from(source: LmError) -> Self {
        Self::Lm { source }
    }
}

/// The retrieval service failed to return passages.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("could not reach {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("retrieval timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("invalid response from retrieval service: HTTP {status}")]
    InvalidResponse { status: u16, body: String },

    #[error("malformed retrieval response: {message}")]
    Malformed { message: String },
}

impl RetrievalError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => ErrorClass::Temporary,
            Self::InvalidResponse { status, .. } if *status >= 500 => ErrorClass::Temporary,
            Self::InvalidResponse { .. } => ErrorClass::BadRequest,
            Self::Malformed { .. } => ErrorClass::BadResponse,
        }
    }
}

/// Failure of one pipeline run on one example.
///
/// Optimizers and the evaluation harness catch this at the example boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("retrieval failed")]
    Retrieval(#[from] RetrievalError),

    #[error("generation failed")]
    Generation(#[from] PredictError),

    #[error("example is missing input field `{field}`")]
    MissingInput { field: String },
}

/// A metric implementation failed while scoring a prediction.
#[derive(Debug, thiserror::Error)]
#[error("metric evaluation failed: {message}")]
pub struct MetricError {
    pub message: String,
}

impl MetricError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fatal optimizer failures. Per-example failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    #[error("training set is empty")]
    EmptyTrainset,

    #[error("no optimizable predictors found")]
    NoPredictors,

    #[error("invalid optimizer configuration: {0}")]
    InvalidConfig(String),

    #[error("aborted after {errors} failed examples (max_errors = {max_errors})")]
    TooManyErrors { errors: usize, max_errors: usize },

    #[error("compiled program names unknown step `{0}`")]
    UnknownStep(String),

    #[error("failed to access compiled program")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize compiled program")]
    Serde(#[from] serde_json::Error),
}

/// Fatal evaluation failures. Per-example failures are recorded, not raised.
#[derive(Debug, thiserror::Error)]
pub enum EvaluateError {
    #[error("devset is empty")]
    EmptyDevset,

    #[error("invalid evaluation configuration: {0}")]
    InvalidConfig(String),

    #[error("aborted after {errors} failed examples (max_errors = {max_errors})")]
    TooManyErrors { errors: usize, max_errors: usize },
}
