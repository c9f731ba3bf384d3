#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Build and query against a fake Ollama server

use qa_lookup::LookupError;
use qa_lookup::config::{OllamaConfig, RetrievalConfig};
use qa_lookup::corpus::CorpusRecord;
use qa_lookup::embeddings::OllamaClient;
use qa_lookup::indexer::IndexBuilder;
use qa_lookup::retriever::{Retriever, SearchOptions};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "all-minilm:latest";

fn client_for(server: &MockServer) -> OllamaClient {
    let address = server.address();
    let config = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: MODEL.to_string(),
        batch_size: 8,
        embedding_dimension: 3,
        ..OllamaConfig::default()
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(2)
        .with_retry_delay(Duration::from_millis(10))
}

fn records() -> Vec<CorpusRecord> {
    vec![
        CorpusRecord::new("What is FERPA?", "A student privacy law.")
            .with_category("Legal & Compliance"),
        CorpusRecord::new("Where is the office?", "Powell Library."),
    ]
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": MODEL,
            "input": ["What is FERPA? A student privacy law.", "Where is the office? Powell Library."]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[3.0, 0.0, 4.0], [0.0, 2.0, 0.0]]
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["student privacy"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.6, 0.0, 0.8]]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["parking"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.0, 0.0, -1.0]]
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn build_and_answer_through_ollama() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    let client = client_for(&server);

    let (answer, fallback, results) = tokio::task::spawn_blocking(move || {
        let built = IndexBuilder::new(&client).build(records()).expect("build succeeds");
        let retriever = Retriever::new(
            Arc::new(client),
            built.store,
            built.index,
            RetrievalConfig::default(),
        )
        .expect("pair is consistent");

        (
            retriever.answer("student privacy").expect("answer"),
            retriever.answer("parking").expect("answer"),
            retriever
                .search("student privacy", SearchOptions::new(5, -1.0))
                .expect("search"),
        )
    })
    .await
    .expect("task completes");

    assert_eq!(answer, "A student privacy law.");
    assert_eq!(fallback, RetrievalConfig::default().fallback_message);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].category, "Legal & Compliance");
    assert!((results[0].relevance_score - 1.0).abs() < 1e-5);
    assert_eq!(results[1].category, "General");
    assert!(results[1].relevance_score.abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_backend_is_an_error_not_a_fallback() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    let client = client_for(&server);

    let built = tokio::task::spawn_blocking({
        let client = client.clone();
        move || IndexBuilder::new(&client).build(records()).expect("build succeeds")
    })
    .await
    .expect("task completes");

    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let outcome = tokio::task::spawn_blocking(move || {
        let retriever = Retriever::new(
            Arc::new(client),
            built.store,
            built.index,
            RetrievalConfig::default(),
        )
        .expect("pair is consistent");
        retriever.answer("student privacy")
    })
    .await
    .expect("task completes");

    assert!(matches!(outcome, Err(LookupError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_dimension_from_backend_fails_the_build() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0], [0.0, 1.0]]
        })))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let outcome =
        tokio::task::spawn_blocking(move || IndexBuilder::new(&client).build(records()).map(|_| ()))
            .await
            .expect("task completes");

    assert!(matches!(outcome, Err(LookupError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_requires_configured_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": MODEL, "size": 45_000_000}]
        })))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let outcome = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task completes");
    assert!(outcome.is_ok(), "health check failed: {:?}", outcome);
}
