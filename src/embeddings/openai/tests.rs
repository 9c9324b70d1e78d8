use super::*;
use crate::config::ApiConfig;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn embedder_for(server: &MockServer, dimensions: Option<u32>) -> OpenAiEmbedder {
    let api = ApiConfig {
        base_url: format!("{}/v1", server.uri()),
        ..ApiConfig::default()
    };
    let client = ApiClient::new(&api, "test-key".to_string())
        .expect("client should build")
        .with_backoff_unit(Duration::ZERO);
    let config = EmbeddingConfig {
        model: "text-embedding-3-large".to_string(),
        dimensions,
    };
    OpenAiEmbedder::new(client, &config).expect("embedder should build")
}

async fn embed(embedder: OpenAiEmbedder, text: &'static str) -> Result<Vec<f32>> {
    tokio::task::spawn_blocking(move || embedder.embed(text))
        .await
        .expect("blocking task should not panic")
}

#[tokio::test(flavor = "multi_thread")]
async fn embeds_single_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_json(json!({
            "model": "text-embedding-3-large",
            "input": ["alpha beta"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
            "model": "text-embedding-3-large"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedding = embed(embedder_for(&server, None), "alpha beta")
        .await
        .expect("embedding should succeed");

    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn sends_requested_dimensions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_json(json!({
            "model": "text-embedding-3-large",
            "input": ["gamma"],
            "dimensions": 2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0]}]
        })))
        .mount(&server)
        .await;

    let embedding = embed(embedder_for(&server, Some(2)), "gamma")
        .await
        .expect("embedding should succeed");
    assert_eq!(embedding.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_dimension_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0, 0.5]}]
        })))
        .mount(&server)
        .await;

    let result = embed(embedder_for(&server, Some(2)), "gamma").await;
    assert!(matches!(
        result,
        Err(RagError::DimensionMismatch {
            expected: 2,
            found: 3
        })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_data_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let result = embed(embedder_for(&server, None), "anything").await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = embed(embedder_for(&server, None), "anything").await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_is_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = embed(embedder_for(&server, None), "anything").await;
    assert!(matches!(result, Err(RagError::Embedding(ref m)) if m.contains("401")));
}
