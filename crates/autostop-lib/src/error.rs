//! Error types for the auto-stop library

use thiserror::Error;

/// Failure decoding a `k=v;k=v` policy blob
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagParseError {
    #[error("tag entry '{entry}' has no '=' separator")]
    MissingSeparator { entry: String },

    #[error("tag entry '{entry}' has an empty key")]
    EmptyKey { entry: String },
}

/// A policy parameter that was present but unusable
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigValueError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Summary statistics could not be computed for a series
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("standard deviation needs at least two samples, got {len}")]
    InsufficientSamples { len: usize },

    #[error("series mean is zero, relative deviation is undefined")]
    ZeroMean,
}

/// Warning email could not be delivered
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no recipient configured for warning email")]
    NoRecipient,

    #[error("email provider rejected message: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("email transport error: {0}")]
    Transport(String),
}

/// Failure talking to the cloud management API
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("client configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CloudError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CloudError::InvalidResponse(err.to_string())
        } else {
            CloudError::Network(err.to_string())
        }
    }
}

/// Evaluation of a single VM was aborted
///
/// These never escape the batch: the orchestrator records them against the
/// VM that failed and moves on.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("instance status fetch failed: {0}")]
    Status(#[source] CloudError),

    #[error("metrics fetch failed: {0}")]
    Metrics(#[source] CloudError),

    #[error("{series} statistics: {source}")]
    Statistics {
        series: &'static str,
        #[source]
        source: StatsError,
    },

    #[error("warning state update failed: {0}")]
    WarningState(#[source] CloudError),

    #[error("deallocate request failed: {0}")]
    Stop(#[source] CloudError),
}

impl EvaluationError {
    /// Short machine-readable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationError::Status(_) => "status",
            EvaluationError::Metrics(_) => "metrics",
            EvaluationError::Statistics { .. } => "statistics",
            EvaluationError::WarningState(_) => "warning_state",
            EvaluationError::Stop(_) => "stop",
        }
    }
}
