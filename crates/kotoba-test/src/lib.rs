//! Kotoba Test - shared test utilities for the kotoba workspace.
//!
//! Add to a crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! kotoba-test.workspace = true
//! ```
//!
//! and use from integration tests:
//!
//! ```rust,ignore
//! use kotoba_analyzer::BatchAnalyzer;
//! use kotoba_test::MockLoader;
//!
//! #[tokio::test]
//! async fn skips_latin_text() {
//!     let loader = MockLoader::new();
//!     let analyzer = BatchAnalyzer::new(loader.clone());
//!     analyzer.analyze(&["hello".to_owned()]).await;
//!     assert_eq!(loader.tokenize_calls(), 0);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod logs;
pub mod mocks;

pub use fixtures::*;
pub use logs::LogCapture;
pub use mocks::*;

/// Route `tracing` output through the test harness's captured writer.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
