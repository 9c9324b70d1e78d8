#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Query path against a mocked OpenAI-compatible server

use std::fs;

use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chapter_rag::RagError;
use chapter_rag::assistant::{Assistant, EXAMPLE_FAILURE, Session};
use chapter_rag::config::Config;
use chapter_rag::database::{IndexedRecord, KnowledgeBase};

const KEY_VARIABLE: &str = "CHAPTER_RAG_INTEGRATION_KEY";

fn record(id: &str, content: &str) -> IndexedRecord {
    IndexedRecord {
        source_id: id.to_string(),
        kind: "chapter".to_string(),
        title: id.to_string(),
        content: content.to_string(),
        position_in_source: 0,
        start_page: Some(1),
        end_page: Some(2),
        start: None,
    }
}

/// Store a two-entry knowledge base and point the config at the mock server
fn setup(server: &MockServer) -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load default config");
    config.api.base_url = format!("{}/v1", server.uri());
    config.api.api_key_env = KEY_VARIABLE.to_string();
    config.api.timeout_seconds = 5;
    config.retrieval.top_k = 1;
    config.save().expect("config should save");

    KnowledgeBase::build(
        &[vec![1.0, 0.0], vec![0.0, 1.0]],
        vec![
            record("limits", "Limits describe approach."),
            record("series", "Series add terms."),
        ],
    )
    .expect("knowledge base should build")
    .save(&config.index_path(), &config.metadata_path())
    .expect("knowledge base should save");

    (config, temp_dir)
}

fn set_key() {
    // SAFETY: tests touching this variable are serialized
    unsafe { std::env::set_var(KEY_VARIABLE, "integration-key") };
}

fn clear_key() {
    // SAFETY: tests touching this variable are serialized
    unsafe { std::env::remove_var(KEY_VARIABLE) };
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn answers_through_http_gateways() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer integration-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.0, 0.9]}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4-turbo"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Series sum terms."}}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let (config, _temp_dir) = setup(&server);
    let config_dir = config.get_base_dir().to_path_buf();
    set_key();

    let answer = tokio::task::spawn_blocking(move || {
        let config = Config::load(&config_dir).expect("saved config should load");
        let assistant = Assistant::from_config(&config).expect("assistant should start");
        let mut session = Session::new();
        assistant.answer(&mut session, "What is a series?")
    })
    .await
    .expect("blocking task should not panic")
    .expect("answer should be produced");

    clear_key();

    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].record.source_id, "series");
    assert_eq!(answer.explanation, "Series sum terms.");
    assert_eq!(answer.example, "Series sum terms.");
    assert_eq!(answer.notice, None);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn generation_outage_still_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0]}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Limits explained."}}]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let (config, _temp_dir) = setup(&server);
    set_key();

    let answer = tokio::task::spawn_blocking(move || {
        let assistant = Assistant::from_config(&config).expect("assistant should start");
        assistant.answer(&mut Session::new(), "What is a limit?")
    })
    .await
    .expect("blocking task should not panic")
    .expect("answer should be produced");

    clear_key();

    assert_eq!(answer.explanation, "Limits explained.");
    assert_eq!(answer.example, EXAMPLE_FAILURE);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn startup_fails_without_api_key() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = setup(&server);
    clear_key();

    let result = Assistant::from_config(&config);
    assert!(matches!(result, Err(RagError::Config(_))));
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn startup_fails_without_metadata() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = setup(&server);
    fs::remove_file(config.metadata_path()).expect("should remove metadata");
    set_key();

    let result = Assistant::from_config(&config);
    clear_key();

    let Err(error) = result else {
        panic!("startup should fail without metadata");
    };
    assert!(error.is_fatal());
}
