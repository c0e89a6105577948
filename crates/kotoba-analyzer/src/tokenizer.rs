//! The seam between the batch analyzer and whatever does the tokenizing.

use async_trait::async_trait;

use crate::error::AnalyzerResult;
use crate::token::Token;

/// Something that turns one text into tokens.
///
/// Tokenizing is synchronous and needs exclusive access; the analyzer
/// serializes calls.
pub trait Tokenizer: Send {
    /// Tokenize `text`.
    ///
    /// # Errors
    ///
    /// Returns an error when this one text cannot be analysed. Callers treat
    /// it as a per-item failure.
    fn tokenize(&mut self, text: &str) -> AnalyzerResult<Vec<Token>>;
}

/// Builds the tokenizer. Called at most once per analyzer.
#[async_trait]
pub trait TokenizerLoader: Send + Sync {
    /// The tokenizer this loader produces.
    type Tokenizer: Tokenizer;

    /// Fetch and initialize the tokenizer.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyzerError::LoadFailure`](crate::AnalyzerError::LoadFailure)
    /// if the tokenizer cannot be brought up.
    async fn load(&self) -> AnalyzerResult<Self::Tokenizer>;
}
