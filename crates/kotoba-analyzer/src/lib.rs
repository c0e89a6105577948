//! Kotoba Analyzer - batch Japanese morphological analysis.
//!
//! Texts go through a cheap script pre-filter; the ones that contain
//! Japanese are tokenized by a [`Tokenizer`], normally a kagome module
//! running on [`kotoba_bridge`]. The tokenizer is loaded once, on first
//! use, and shared by every caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use kotoba_analyzer::{BatchAnalyzer, ModuleSource, WasmLoader};
//!
//! # async fn demo() {
//! let loader = WasmLoader::new(ModuleSource::parse("kagome.wasm"));
//! let analyzer = BatchAnalyzer::new(loader);
//! let results = analyzer
//!     .analyze(&["猫が好きです".to_owned(), "hello".to_owned()])
//!     .await;
//! assert_eq!(results.len(), 2);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod analyzer;
pub mod error;
pub mod script;
pub mod source;
pub mod token;
pub mod tokenizer;
pub mod wasm;

pub use analyzer::BatchAnalyzer;
pub use error::{AnalyzerError, AnalyzerResult};
pub use script::{DEFAULT_SCRIPT_RANGES, ScriptFilter};
pub use source::ModuleSource;
pub use token::{AnalysisResult, BatchRequest, BatchResponse, DEFAULT_SYMBOL_MARKER, Token};
pub use tokenizer::{Tokenizer, TokenizerLoader};
pub use wasm::{DEFAULT_TOKENIZE_EXPORT, WasmLoader, WasmTokenizer};
