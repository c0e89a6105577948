//! Where the tokenizer module comes from.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{AnalyzerError, AnalyzerResult};

/// Timeout for fetching a module over HTTP.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// A tokenizer module location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// A file on disk.
    File(PathBuf),
    /// An `http://` or `https://` URL.
    Url(String),
    /// Module bytes already in memory.
    Bytes(Arc<[u8]>),
}

impl ModuleSource {
    /// Interpret `source` as a URL when it has an HTTP scheme, otherwise as a
    /// path.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::Url(source.to_owned())
        } else {
            Self::File(PathBuf::from(source))
        }
    }

    /// Read the module bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyzerError::LoadFailure`] if the file cannot be read, the
    /// request fails, or the server answers with a non-success status.
    pub async fn fetch(&self) -> AnalyzerResult<Vec<u8>> {
        let bytes = match self {
            Self::File(path) => tokio::fs::read(path).await.map_err(|e| {
                AnalyzerError::LoadFailure(format!("failed to read {}: {e}", path.display()))
            })?,
            Self::Url(url) => fetch_url(url).await?,
            Self::Bytes(bytes) => bytes.to_vec(),
        };
        info!(source = %self, len = bytes.len(), "fetched tokenizer module");
        Ok(bytes)
    }
}

async fn fetch_url(url: &str) -> AnalyzerResult<Vec<u8>> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| AnalyzerError::LoadFailure(format!("failed to build http client: {e}")))?;

    debug!(url, "fetching tokenizer module");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AnalyzerError::LoadFailure(format!("request to {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AnalyzerError::LoadFailure(format!(
            "failed to fetch {url}: HTTP {}",
            status.as_u16()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| AnalyzerError::LoadFailure(format!("failed to read body of {url}: {e}")))?;
    Ok(body.to_vec())
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for ModuleSource {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_urls_from_paths() {
        assert_eq!(
            ModuleSource::parse("https://example.com/kagome.wasm"),
            ModuleSource::Url("https://example.com/kagome.wasm".into())
        );
        assert_eq!(
            ModuleSource::parse("assets/kagome.wasm"),
            ModuleSource::File(PathBuf::from("assets/kagome.wasm"))
        );
        assert_eq!(
            ModuleSource::parse("ftp://host/kagome.wasm"),
            ModuleSource::File(PathBuf::from("ftp://host/kagome.wasm"))
        );
    }

    #[tokio::test]
    async fn reads_files_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.wasm");
        std::fs::write(&path, b"\0asm").unwrap();
        assert_eq!(ModuleSource::File(path).fetch().await.unwrap(), b"\0asm");

        let inline = ModuleSource::Bytes(Arc::from(&b"abc"[..]));
        assert_eq!(inline.fetch().await.unwrap(), b"abc");
        assert_eq!(inline.to_string(), "<3 bytes>");
    }

    #[tokio::test]
    async fn missing_file_is_a_load_failure() {
        let err = ModuleSource::parse("/nonexistent/kagome.wasm")
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::LoadFailure(msg) if msg.contains("kagome.wasm")));
    }
}
