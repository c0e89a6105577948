//! Analyzer error types.

use kotoba_bridge::BridgeError;
use thiserror::Error;

/// Errors raised while loading the tokenizer or analysing a text.
///
/// Cloneable so that every caller waiting on a shared load observes the
/// same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    /// The tokenizer module could not be fetched, compiled or started.
    #[error("failed to load tokenizer module: {0}")]
    LoadFailure(String),

    /// Tokenizing one text failed.
    #[error("analysis failed: {0}")]
    AnalysisFailure(String),

    /// The module started but never published its tokenize function.
    #[error("tokenizer function `{0}` is not available")]
    MissingExport(String),
}

impl From<BridgeError> for AnalyzerError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::MissingExport(name) => Self::MissingExport(name),
            BridgeError::LoadFailure(msg) => Self::LoadFailure(msg),
            BridgeError::ArgvOverflow { .. } => Self::LoadFailure(err.to_string()),
            other => Self::AnalysisFailure(other.to_string()),
        }
    }
}

/// A specialized Result type for analyzer operations.
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
