//! Batch analysis with a lazily loaded, shared tokenizer.

use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::error::AnalyzerResult;
use crate::script::ScriptFilter;
use crate::token::{AnalysisResult, BatchRequest, BatchResponse, Token};
use crate::tokenizer::{Tokenizer, TokenizerLoader};

/// Analyses batches of texts, loading the tokenizer on first use.
///
/// Concurrent callers share a single load attempt. A failed load is cached
/// like a successful one; build a new analyzer to retry.
pub struct BatchAnalyzer<L: TokenizerLoader> {
    loader: L,
    filter: ScriptFilter,
    tokenizer: OnceCell<AnalyzerResult<Mutex<L::Tokenizer>>>,
}

impl<L: TokenizerLoader> BatchAnalyzer<L> {
    /// An analyzer that loads its tokenizer through `loader`.
    pub fn new(loader: L) -> Self {
        Self::with_filter(loader, ScriptFilter::default())
    }

    /// An analyzer with a custom script pre-filter.
    pub fn with_filter(loader: L, filter: ScriptFilter) -> Self {
        Self {
            loader,
            filter,
            tokenizer: OnceCell::new(),
        }
    }

    /// The loader this analyzer was built with.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Make sure the tokenizer is loaded.
    ///
    /// # Errors
    ///
    /// Returns the load failure, the same one every caller sees.
    pub async fn load(&self) -> AnalyzerResult<()> {
        self.tokenizer().await.map(|_| ())
    }

    /// Whether a load attempt has finished, successfully or not.
    pub fn is_loaded(&self) -> bool {
        self.tokenizer.initialized()
    }

    async fn tokenizer(&self) -> AnalyzerResult<&Mutex<L::Tokenizer>> {
        self.tokenizer
            .get_or_init(|| async {
                let loaded = self.loader.load().await;
                if let Err(e) = &loaded {
                    warn!(error = %e, "tokenizer load failed");
                }
                loaded.map(Mutex::new)
            })
            .await
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Tokenize one text.
    ///
    /// Texts with no character from a target script come back empty
    /// without touching the tokenizer.
    ///
    /// # Errors
    ///
    /// Returns the load failure or the tokenizer's error for this text.
    pub async fn analyze_text(&self, text: &str) -> AnalyzerResult<Vec<Token>> {
        if !self.filter.matches(text) {
            debug!(len = text.len(), "no target-script characters; skipping");
            return Ok(Vec::new());
        }
        let tokenizer = self.tokenizer().await?;
        let mut tokenizer = tokenizer.lock().await;
        tokenizer.tokenize(text)
    }

    /// Tokenize every text, one result per input in input order.
    ///
    /// A failure on one text leaves that text with no tokens and does not
    /// affect the others.
    pub async fn analyze(&self, texts: &[String]) -> Vec<AnalysisResult> {
        let outcomes = join_all(texts.iter().map(|text| self.analyze_text(text))).await;
        texts
            .iter()
            .zip(outcomes)
            .map(|(text, outcome)| AnalysisResult {
                text: text.clone(),
                tokens: outcome.unwrap_or_else(|e| {
                    warn!(text = %text, error = %e, "failed to analyze text");
                    Vec::new()
                }),
            })
            .collect()
    }

    /// Answer a batch request.
    pub async fn handle(&self, request: BatchRequest) -> BatchResponse {
        info!(count = request.texts.len(), "batch analyzing texts");
        let results = self.analyze(&request.texts).await;
        info!(count = results.len(), "batch analysis complete");
        BatchResponse { results }
    }
}

impl<L: TokenizerLoader + std::fmt::Debug> std::fmt::Debug for BatchAnalyzer<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAnalyzer")
            .field("loader", &self.loader)
            .field("filter", &self.filter)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
