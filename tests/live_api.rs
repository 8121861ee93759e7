//! Smoke tests against the real provider APIs.
//!
//! Ignored by default; run with `cargo test -- --ignored` and the
//! matching `*_API_KEY` variables set (a `.env` file works too).

use std::sync::Arc;

use futures_util::StreamExt;
use llm_relay::{
    HttpTransport, LlmClient, ModelInfo, ModelRegistry, ProviderConfig, ProviderFactory, Request,
    ToolStrategy,
};

fn client_from_env(config: ProviderConfig, model: &str) -> LlmClient {
    let mut registry = ModelRegistry::new();
    registry.register(ModelInfo::new(model).with_tool("stream", ToolStrategy::Native));
    LlmClient::new(
        ProviderFactory::create(&config),
        Arc::new(HttpTransport::new().unwrap()),
        Arc::new(registry),
    )
}

fn env_key(name: &str) -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var(name).ok()
}

#[tokio::test]
#[ignore]
async fn live_openai_blocking() {
    let Some(key) = env_key("OPENAI_API_KEY") else {
        eprintln!("OPENAI_API_KEY not set, skipping");
        return;
    };
    let client = client_from_env(ProviderConfig::openai(key), "gpt-4o-mini");
    let response = client
        .execute(&Request::new("gpt-4o-mini").user("Reply with the single word: pong"))
        .await
        .unwrap();

    assert!(response.error.is_none(), "error: {:?}", response.error);
    assert!(response.content.to_lowercase().contains("pong"));
    assert!(response.usage.is_some());
}

#[tokio::test]
#[ignore]
async fn live_openai_streaming() {
    let Some(key) = env_key("OPENAI_API_KEY") else {
        eprintln!("OPENAI_API_KEY not set, skipping");
        return;
    };
    let client = client_from_env(ProviderConfig::openai(key), "gpt-4o-mini");
    let request = Request::new("gpt-4o-mini")
        .user("Count from 1 to 5, digits only")
        .streaming();

    let deltas: Vec<_> = client.stream(&request).await.unwrap().collect().await;
    assert!(deltas.len() > 1, "expected multiple deltas");
    assert_eq!(deltas.iter().filter(|d| d.is_done).count(), 1);
    let text: String = deltas.iter().map(|d| d.content.as_str()).collect();
    assert!(text.contains('5'));
}

#[tokio::test]
#[ignore]
async fn live_anthropic_streaming() {
    let Some(key) = env_key("ANTHROPIC_API_KEY") else {
        eprintln!("ANTHROPIC_API_KEY not set, skipping");
        return;
    };
    let client = client_from_env(
        ProviderConfig::anthropic(key),
        "claude-3-5-haiku-20241022",
    );
    let request = Request::new("claude-3-5-haiku-20241022")
        .user("Reply with the single word: pong")
        .streaming();

    let response = client.complete(&request).await.unwrap();
    assert!(response.error.is_none(), "error: {:?}", response.error);
    assert!(response.content.to_lowercase().contains("pong"));
    let usage = response.usage.expect("usage on terminal delta");
    assert!(usage.output_tokens > 0);
}

#[tokio::test]
#[ignore]
async fn live_google_streaming() {
    let Some(key) = env_key("GOOGLE_API_KEY") else {
        eprintln!("GOOGLE_API_KEY not set, skipping");
        return;
    };
    let client = client_from_env(ProviderConfig::google(key), "gemini-2.0-flash");
    let request = Request::new("gemini-2.0-flash")
        .user("Reply with the single word: pong")
        .streaming();

    let response = client.complete(&request).await.unwrap();
    assert!(response.error.is_none(), "error: {:?}", response.error);
    assert!(response.content.to_lowercase().contains("pong"));
}
