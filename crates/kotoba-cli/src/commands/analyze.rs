//! CLI handler for `kotoba analyze`.

use anyhow::{Context, Result, bail};
use kotoba_analyzer::{BatchAnalyzer, BatchRequest, BatchResponse};
use kotoba_config::Config;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config_bridge::{to_loader, to_script_filter};

/// How `kotoba analyze` prints its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Output {
    /// The pretty-printed JSON batch response.
    Json,
    /// Clickable surface forms, space separated, one line per text.
    Words,
}

/// Analyse `texts`, or a JSON batch request read from stdin, and print the
/// response.
pub(crate) async fn run_analyze(
    cfg: &Config,
    texts: Vec<String>,
    module: Option<&str>,
    stdin: bool,
    output: Output,
) -> Result<()> {
    let request = if stdin {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("failed to read stdin")?;
        parse_request(&input)?
    } else {
        BatchRequest { texts }
    };
    if request.texts.is_empty() {
        bail!("nothing to analyze; pass texts as arguments or use --stdin");
    }
    debug!(count = request.texts.len(), "analyze request");

    let analyzer = BatchAnalyzer::with_filter(to_loader(cfg, module), to_script_filter(cfg));
    let response = analyzer.handle(request).await;
    match output {
        Output::Json => println!(
            "{}",
            serde_json::to_string_pretty(&response).context("failed to encode response")?
        ),
        Output::Words => print!("{}", render_words(&response, &cfg.analyzer.symbol_marker)),
    }
    Ok(())
}

/// One line per result holding its clickable surface forms. Tokens whose
/// part of speech starts with `symbol_marker` are left out.
fn render_words(response: &BatchResponse, symbol_marker: &str) -> String {
    let mut out = String::new();
    for result in &response.results {
        let words: Vec<&str> = result
            .clickable(symbol_marker)
            .map(|t| t.surface_form.as_str())
            .collect();
        out.push_str(&words.join(" "));
        out.push('\n');
    }
    out
}

fn parse_request(input: &str) -> Result<BatchRequest> {
    serde_json::from_str(input).context("stdin is not a JSON batch request like {\"texts\": [...]}")
}

#[cfg(test)]
mod tests {
    use kotoba_analyzer::{AnalysisResult, Token};

    use super::*;

    #[test]
    fn parses_batch_request() {
        let req = parse_request(r#"{"texts": ["猫", "dog"]}"#).unwrap();
        assert_eq!(req.texts, vec!["猫", "dog"]);
    }

    fn token(surface: &str, pos: &str) -> Token {
        Token {
            surface_form: surface.into(),
            pos: pos.into(),
            ..Token::default()
        }
    }

    #[test]
    fn words_skip_configured_symbols() {
        let response = BatchResponse {
            results: vec![
                AnalysisResult {
                    text: "猫が好き。".into(),
                    tokens: vec![
                        token("猫", "名詞,一般"),
                        token("が", "助詞,格助詞"),
                        token("好き", "名詞,形容動詞語幹"),
                        token("。", "記号,句点"),
                    ],
                },
                AnalysisResult {
                    text: "hello".into(),
                    tokens: Vec::new(),
                },
            ],
        };
        assert_eq!(render_words(&response, "記号"), "猫 が 好き\n\n");
        assert_eq!(render_words(&response, "助詞"), "猫 好き 。\n\n");
    }

    #[test]
    fn rejects_malformed_request() {
        assert!(parse_request("[\"猫\"]").is_err());
        assert!(parse_request("").is_err());
    }
}
