//! Provider construction from configuration

use ai_things_considered::config::{ImageConfig, ReasoningConfig};
use ai_things_considered::provider::{
    ChatMessage, CompletionOptions, ImageGenerator, ImageRequest, MockImageGenerator,
    MockProvider, ProviderFactory, ProviderType, ReasoningClient,
};

#[test]
fn gemini_serves_both_roles() {
    let reasoning = ReasoningConfig {
        api_key: Some("test-key".to_string()),
        ..ReasoningConfig::default()
    };
    let client = ProviderFactory::reasoning_client(&reasoning).unwrap();
    assert_eq!(client.provider_name(), "gemini");
    assert_eq!(client.model_name(), "gemini-2.5-flash");

    let image = ImageConfig {
        api_key: Some("test-key".to_string()),
        ..ImageConfig::default()
    };
    let generator = ProviderFactory::image_generator(&image).unwrap();
    assert_eq!(generator.model_name(), "gemini-3-pro-image-preview");
}

#[test]
fn openai_compatible_reasoning_with_custom_endpoint() {
    let reasoning = ReasoningConfig {
        provider_type: ProviderType::OpenAI,
        model: "local-model".to_string(),
        api_key: Some("sk-test".to_string()),
        endpoint: Some("http://localhost:8080/v1".to_string()),
        temperature: Some(0.2),
    };
    let client = ProviderFactory::reasoning_client(&reasoning).unwrap();
    assert_eq!(client.provider_name(), "openai");
    assert_eq!(client.model_name(), "local-model");
}

#[tokio::test]
async fn mocks_record_requests() {
    let reasoning = MockProvider::new(vec!["first".to_string()]);
    let reply = reasoning
        .complete(vec![ChatMessage::user("hello")], CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(reply.content, "first");
    assert!(reasoning
        .complete(vec![ChatMessage::user("again")], CompletionOptions::default())
        .await
        .is_err());
    assert_eq!(reasoning.requests().len(), 2);

    let images = MockImageGenerator::new(vec![1, 2, 3]).fail_first("flaky", 1);
    let request = |prompt: &str| ImageRequest {
        prompt: prompt.to_string(),
        reference_image: None,
        aspect_ratio: "2:3".to_string(),
        size: "1K".to_string(),
    };
    assert!(images.generate(&request("a flaky scene")).await.is_err());
    assert_eq!(images.generate(&request("a flaky scene")).await.unwrap().bytes, vec![1, 2, 3]);
    assert_eq!(images.calls_matching("flaky"), 2);
}
