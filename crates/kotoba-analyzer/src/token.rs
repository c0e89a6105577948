//! Token model and the batch wire format.

use kotoba_bridge::HostValue;
use serde::{Deserialize, Serialize};

/// Part-of-speech prefix kagome uses for punctuation and symbols.
pub const DEFAULT_SYMBOL_MARKER: &str = "記号";

/// One morpheme as reported by the tokenizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Text as it appears in the input.
    pub surface_form: String,
    /// Katakana reading.
    #[serde(default)]
    pub reading: String,
    /// Dictionary form.
    #[serde(default)]
    pub base_form: String,
    /// Comma-joined part-of-speech hierarchy.
    #[serde(default)]
    pub pos: String,
    /// Pronunciation.
    #[serde(default)]
    pub pronunciation: String,
    /// Dictionary entry id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_id: Option<i64>,
    /// Dictionary the entry came from (`KNOWN`, `UNKNOWN`, `USER`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_type: Option<String>,
    /// Byte offset of the token in the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_position: Option<i64>,
}

impl Token {
    /// Whether a token inspector should offer this token for lookup.
    /// Symbols and punctuation are not clickable.
    #[must_use]
    pub fn is_clickable(&self, symbol_marker: &str) -> bool {
        !self.pos.starts_with(symbol_marker)
    }

    /// Read a token from the object the guest returns. Non-objects yield
    /// `None`.
    #[must_use]
    pub fn from_host(value: &HostValue) -> Option<Self> {
        if !matches!(value, HostValue::Object(_)) {
            return None;
        }
        Some(Self {
            surface_form: text_field(value, "surface_form"),
            reading: text_field(value, "reading"),
            base_form: text_field(value, "base_form"),
            pos: pos_field(value),
            pronunciation: text_field(value, "pronunciation"),
            word_id: int_field(value, "word_id"),
            word_type: Some(text_field(value, "word_type")).filter(|s| !s.is_empty()),
            word_position: int_field(value, "word_position"),
        })
    }

    /// Read the guest's tokenize result: an array of token objects, or
    /// nothing at all.
    #[must_use]
    pub fn list_from_host(value: &HostValue) -> Vec<Self> {
        match value {
            HostValue::Array(items) => items.snapshot().iter().filter_map(Self::from_host).collect(),
            _ => Vec::new(),
        }
    }
}

fn text_field(value: &HostValue, key: &str) -> String {
    let field = value.get(key);
    match field.as_str() {
        Some(s) => s.to_owned(),
        None if field.is_nullish() => String::new(),
        None => field.to_js_string(),
    }
}

// kagome hands back either the joined string or the raw feature list.
fn pos_field(value: &HostValue) -> String {
    match value.get("pos") {
        HostValue::Array(parts) => parts
            .snapshot()
            .iter()
            .map(HostValue::to_js_string)
            .collect::<Vec<_>>()
            .join(","),
        _ => text_field(value, "pos"),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn int_field(value: &HostValue, key: &str) -> Option<i64> {
    value
        .get(key)
        .as_f64()
        .filter(|n| n.is_finite() && n.fract() == 0.0)
        .map(|n| n as i64)
}

/// A batch of texts to analyse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Texts, analysed in order.
    pub texts: Vec<String>,
}

/// The tokens for one input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The input text.
    pub text: String,
    /// Its tokens; empty when the text was skipped or failed.
    pub tokens: Vec<Token>,
}

impl AnalysisResult {
    /// Tokens a token inspector offers for lookup, in order.
    pub fn clickable<'a>(&'a self, symbol_marker: &'a str) -> impl Iterator<Item = &'a Token> + 'a {
        self.tokens.iter().filter(move |t| t.is_clickable(symbol_marker))
    }
}

/// One result per request text, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Per-text results.
    pub results: Vec<AnalysisResult>,
}
