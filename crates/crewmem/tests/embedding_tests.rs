//! Tests for the OpenAI-compatible embedding provider against a mock server

use crewmem::embedding::{EmbeddingProvider, OpenAiEmbeddingProvider, embed_checked};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer, model: &str, dimension: usize) -> OpenAiEmbeddingProvider {
    OpenAiEmbeddingProvider::with_api_key(&format!("{}/v1", server.uri()), model, "sk-test", dimension, 5)
        .unwrap()
}

#[tokio::test]
async fn test_embed_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "hello crew",
            "dimensions": 3
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.1, 0.2, 0.3], "index": 0 }],
            "model": "text-embedding-3-small"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server, "text-embedding-3-small", 3);
    assert_eq!(provider.name(), "openai/text-embedding-3-small");
    let vector = provider.embed("hello crew").await.unwrap();
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn test_error_status_is_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = provider(&server, "text-embedding-3-small", 3)
        .embed("hello")
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("429"));
    assert!(message.contains("rate limited"));
}

#[tokio::test]
async fn test_empty_data_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let err = provider(&server, "text-embedding-3-small", 3)
        .embed("hello")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Empty embedding response"));
}

#[tokio::test]
async fn test_wrong_width_fails_dimension_check() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [0.5, 0.5] }]
        })))
        .mount(&server)
        .await;

    let provider = provider(&server, "custom-model", 4);
    let err = embed_checked(&provider, "hello", 4).await.unwrap_err();
    assert!(err.to_string().contains("store expects 4"));
}
