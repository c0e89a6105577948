//! Mock tokenizer and loader with call counters and failure injection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kotoba_analyzer::{AnalyzerError, AnalyzerResult, Token, Tokenizer, TokenizerLoader};

use crate::fixtures::char_token;

#[derive(Debug, Default)]
struct Counters {
    loads: AtomicUsize,
    tokenize_calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

/// A loader whose tokenizer emits one token per character.
///
/// Clones share counters, so a test can keep one clone and hand the other
/// to the analyzer.
#[derive(Debug, Clone, Default)]
pub struct MockLoader {
    counters: Arc<Counters>,
    load_delay: Option<Duration>,
    load_error: Option<String>,
    failing_texts: Arc<HashSet<String>>,
}

impl MockLoader {
    /// A loader that succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside `load`, so concurrent callers overlap.
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Fail every load with `message`.
    #[must_use]
    pub fn failing_load(mut self, message: impl Into<String>) -> Self {
        self.load_error = Some(message.into());
        self
    }

    /// Make tokenizing exactly `text` fail.
    #[must_use]
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failing_texts).insert(text.into());
        self
    }

    /// How many times `load` ran.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    /// How many times the tokenizer was called.
    #[must_use]
    pub fn tokenize_calls(&self) -> usize {
        self.counters.tokenize_calls.load(Ordering::SeqCst)
    }

    /// Every text the tokenizer was called with, in call order.
    #[must_use]
    pub fn seen(&self) -> Vec<String> {
        self.counters
            .seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TokenizerLoader for MockLoader {
    type Tokenizer = MockTokenizer;

    async fn load(&self) -> AnalyzerResult<MockTokenizer> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.load_error {
            return Err(AnalyzerError::LoadFailure(message.clone()));
        }
        Ok(MockTokenizer {
            counters: Arc::clone(&self.counters),
            failing_texts: Arc::clone(&self.failing_texts),
        })
    }
}

/// Tokenizer produced by [`MockLoader`].
#[derive(Debug)]
pub struct MockTokenizer {
    counters: Arc<Counters>,
    failing_texts: Arc<HashSet<String>>,
}

impl Tokenizer for MockTokenizer {
    fn tokenize(&mut self, text: &str) -> AnalyzerResult<Vec<Token>> {
        self.counters.tokenize_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.counters.seen.lock() {
            seen.push(text.to_owned());
        }
        if self.failing_texts.contains(text) {
            return Err(AnalyzerError::AnalysisFailure(format!(
                "injected failure for {text}"
            )));
        }
        Ok(text.chars().map(char_token).collect())
    }
}
