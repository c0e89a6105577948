//! Batch analysis against the mock tokenizer.

use std::sync::Arc;
use std::time::Duration;

use kotoba_analyzer::{AnalyzerError, BatchAnalyzer, BatchRequest, ScriptFilter};
use kotoba_test::{MockLoader, init_test_logging};

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[tokio::test]
async fn results_follow_input_order() {
    init_test_logging();
    let loader = MockLoader::new();
    let analyzer = BatchAnalyzer::new(loader.clone());

    let results = analyzer.analyze(&texts(&["猫が好きです", "hello", "犬"])).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].text, "猫が好きです");
    assert_eq!(results[0].tokens.len(), 6);
    assert_eq!(results[0].tokens[0].surface_form, "猫");
    assert_eq!(results[1].text, "hello");
    assert!(results[1].tokens.is_empty());
    assert_eq!(results[2].tokens.len(), 1);
    assert_eq!(loader.loads(), 1);
}

#[tokio::test]
async fn non_japanese_text_never_reaches_tokenizer() {
    let loader = MockLoader::new();
    let analyzer = BatchAnalyzer::new(loader.clone());

    let results = analyzer.analyze(&texts(&["hello", "123 !?", ""])).await;

    assert!(results.iter().all(|r| r.tokens.is_empty()));
    assert_eq!(loader.tokenize_calls(), 0);
    assert_eq!(loader.loads(), 0);
    assert!(!analyzer.is_loaded());
}

#[tokio::test]
async fn mixed_text_is_tokenized_whole() {
    let loader = MockLoader::new();
    let analyzer = BatchAnalyzer::new(loader.clone());

    let tokens = analyzer.analyze_text("abc猫").await.unwrap();

    assert_eq!(tokens.len(), 4);
    assert_eq!(loader.seen(), vec!["abc猫"]);
}

#[tokio::test]
async fn one_failure_does_not_spoil_the_batch() {
    let loader = MockLoader::new().failing_on("壊れた");
    let analyzer = BatchAnalyzer::new(loader.clone());

    let results = analyzer.analyze(&texts(&["猫", "壊れた", "犬"])).await;

    assert_eq!(results[0].tokens.len(), 1);
    assert!(results[1].tokens.is_empty());
    assert_eq!(results[2].tokens.len(), 1);
    assert_eq!(loader.tokenize_calls(), 3);
}

#[tokio::test]
async fn analyze_text_surfaces_tokenizer_errors() {
    let analyzer = BatchAnalyzer::new(MockLoader::new().failing_on("壊れた"));
    assert!(matches!(
        analyzer.analyze_text("壊れた").await,
        Err(AnalyzerError::AnalysisFailure(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_load() {
    let loader = MockLoader::new().with_load_delay(Duration::from_millis(50));
    let analyzer = Arc::new(BatchAnalyzer::new(loader.clone()));

    let mut handles = Vec::new();
    for text in ["猫", "犬", "鳥", "魚"] {
        let analyzer = Arc::clone(&analyzer);
        handles.push(tokio::spawn(async move { analyzer.analyze_text(text).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 1);
    }

    assert_eq!(loader.loads(), 1);
    assert_eq!(loader.tokenize_calls(), 4);
    assert!(analyzer.is_loaded());
}

#[tokio::test]
async fn load_failure_empties_every_result_and_is_cached() {
    let loader = MockLoader::new().failing_load("no module");
    let analyzer = BatchAnalyzer::new(loader.clone());

    let results = analyzer.analyze(&texts(&["猫", "犬"])).await;
    assert!(results.iter().all(|r| r.tokens.is_empty()));

    let err = analyzer.load().await.unwrap_err();
    assert_eq!(err, AnalyzerError::LoadFailure("no module".into()));
    assert_eq!(loader.loads(), 1);
    assert_eq!(loader.tokenize_calls(), 0);
}

#[tokio::test]
async fn custom_filter_widens_target_scripts() {
    let loader = MockLoader::new();
    let analyzer = BatchAnalyzer::with_filter(loader.clone(), ScriptFilter::new(vec!['a'..='z']));

    let results = analyzer.analyze(&texts(&["hi", "猫"])).await;

    assert_eq!(results[0].tokens.len(), 2);
    assert!(results[1].tokens.is_empty());
}

#[tokio::test]
async fn handle_wraps_results_in_response() {
    let analyzer = BatchAnalyzer::new(MockLoader::new());
    let request: BatchRequest = serde_json::from_str(r#"{"texts":["猫。","ok"]}"#).unwrap();

    let response = analyzer.handle(request).await;

    assert_eq!(response.results.len(), 2);
    let period = &response.results[0].tokens[1];
    assert_eq!(period.pos, "記号,句点");
    assert!(!period.is_clickable(kotoba_analyzer::DEFAULT_SYMBOL_MARKER));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["results"][1]["text"], "ok");
    assert_eq!(json["results"][1]["tokens"].as_array().unwrap().len(), 0);
}
