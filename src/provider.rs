//! Model Provider Abstraction
//!
//! Interfaces to the two remote collaborators the pipeline depends on: a reasoning
//! backend (story selection, optional scene writing) and an image-generation backend
//! (panel rendering). Gemini serves both roles; any OpenAI-compatible endpoint can serve
//! as the reasoning backend.

use crate::config::{ImageConfig, ReasoningConfig};
use crate::error::ApiError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Reasoning backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Gemini,
    OpenAI,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Gemini => write!(f, "gemini"),
            ProviderType::OpenAI => write!(f, "openai"),
        }
    }
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Completion options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Reasoning backend client
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Generate a completion from a list of messages
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// One image-generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub reference_image: Option<Vec<u8>>,
    pub aspect_ratio: String,
    pub size: String,
}

/// Image bytes returned by the backend, plus any text it sent alongside
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub text: Option<String>,
}

/// Image-generation backend client
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage, ApiError>;

    fn model_name(&self) -> &str;
}

// Helper function to map HTTP errors to ApiError
fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), error.to_string())
    } else if error.is_timeout() {
        ApiError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

fn map_status(status: u16, body: String) -> ApiError {
    match status {
        401 | 403 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", body)),
        429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", body)),
        404 => ApiError::ProviderModelNotFound(format!("Model not found: {}", body)),
        _ => ApiError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, body
        )),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(map_status(status, error_text))
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

fn build_provider_http_client() -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

// OpenAI-compatible API request/response structures
#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

fn role_to_string(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

/// OpenAI-compatible reasoning client
pub struct OpenAIClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Result<Self, ApiError> {
        let client = build_provider_http_client()?;
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReasoningClient for OpenAIClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|msg| OpenAIMessage {
                    role: role_to_string(msg.role).to_string(),
                    content: msg.content,
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;
        let response = check_status(response).await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::InvalidResponse("No choices in response".to_string()))?;
        let usage = completion.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        });

        Ok(CompletionResponse {
            content: choice.message.content,
            model: completion.model,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// Gemini generateContent response structures
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: Option<String>,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn first_candidate(self) -> Result<(Candidate, Option<UsageMetadata>, Option<String>), ApiError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ApiError::InvalidResponse(format!(
                "Prompt blocked: {}",
                reason
            )));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::InvalidResponse("No candidates in response".to_string()))?;
        Ok((candidate, self.usage_metadata, self.model_version))
    }
}

/// Google Generative Language client; serves as reasoning and image backend
pub struct GeminiClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Result<Self, ApiError> {
        let client = build_provider_http_client()?;
        let base_url = base_url
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());

        Ok(Self {
            client,
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn generate_content(
        &self,
        body: serde_json::Value,
    ) -> Result<GenerateContentResponse, ApiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_http_error)?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        let system: Vec<String> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.clone())
            .collect();
        let contents: Vec<serde_json::Value> = messages
            .into_iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                let role = if m.role == MessageRole::Assistant {
                    "model"
                } else {
                    "user"
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system.join("\n\n")}]});
        }
        let mut generation_config = serde_json::Map::new();
        if let Some(temp) = options.temperature {
            generation_config.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max) = options.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = serde_json::Value::Object(generation_config);
        }

        let (candidate, usage, model_version) = self.generate_content(body).await?.first_candidate()?;
        let content: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let usage = usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            model: model_version.unwrap_or_else(|| self.model.clone()),
            usage,
            finish_reason: candidate.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage, ApiError> {
        let mut parts = vec![json!({"text": request.prompt})];
        if let Some(reference) = &request.reference_image {
            let mime_type = image::guess_format(reference)
                .map(|f| f.to_mime_type())
                .unwrap_or("image/png");
            parts.push(json!({
                "inlineData": {"mimeType": mime_type, "data": BASE64.encode(reference)}
            }));
        }

        let body = json!({
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.aspect_ratio,
                    "imageSize": request.size,
                },
            },
        });

        let (candidate, _, _) = self.generate_content(body).await?.first_candidate()?;
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

        let mut text = None;
        for part in parts {
            if let Some(inline) = part.inline_data {
                let bytes = BASE64.decode(inline.data.as_bytes()).map_err(|e| {
                    ApiError::InvalidResponse(format!("Image data is not valid base64: {}", e))
                })?;
                return Ok(GeneratedImage {
                    bytes,
                    mime_type: inline.mime_type,
                    text,
                });
            }
            if part.text.is_some() {
                text = part.text;
            }
        }

        Err(ApiError::InvalidResponse(match text {
            Some(t) => format!("No image data in response (model said: {})", t),
            None => "No image data in response".to_string(),
        }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Builds provider clients from configuration
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn reasoning_client(config: &ReasoningConfig) -> Result<Arc<dyn ReasoningClient>, ApiError> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            ApiError::ConfigError(format!(
                "No API key configured for {} reasoning provider",
                config.provider_type
            ))
        })?;
        match config.provider_type {
            ProviderType::Gemini => Ok(Arc::new(GeminiClient::new(
                config.model.clone(),
                api_key,
                config.endpoint.clone(),
            )?)),
            ProviderType::OpenAI => Ok(Arc::new(OpenAIClient::new(
                config.model.clone(),
                api_key,
                config.endpoint.clone(),
            )?)),
        }
    }

    pub fn image_generator(config: &ImageConfig) -> Result<Arc<dyn ImageGenerator>, ApiError> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            ApiError::ConfigError("No API key configured for image provider".to_string())
        })?;
        Ok(Arc::new(GeminiClient::new(
            config.model.clone(),
            api_key,
            config.endpoint.clone(),
        )?))
    }
}

/// Mock reasoning client that replays scripted responses (for testing)
pub struct MockProvider {
    provider_name: String,
    model_name: String,
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Scripted results; `Err` entries surface as request failures
    pub fn with_results(responses: Vec<Result<String, String>>) -> Self {
        Self {
            provider_name: "mock".to_string(),
            model_name: "mock-model".to_string(),
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Messages received so far, one entry per call
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ReasoningClient for MockProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError> {
        self.requests.lock().push(messages);
        let next = self.responses.lock().pop_front();
        match next {
            Some(Ok(content)) => Ok(CompletionResponse {
                content,
                model: self.model_name.clone(),
                usage: TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            }),
            Some(Err(message)) => Err(ApiError::ProviderRequestFailed(message)),
            None => Err(ApiError::ProviderError(
                "Mock provider has no scripted responses left".to_string(),
            )),
        }
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Mock image generator (for testing). Every request succeeds with `image` unless a
/// failure rule matches a substring of its prompt.
pub struct MockImageGenerator {
    image: Vec<u8>,
    rules: Mutex<Vec<FailureRule>>,
    calls: Mutex<Vec<ImageRequest>>,
}

struct FailureRule {
    needle: String,
    /// `None` fails forever
    remaining: Option<u32>,
}

impl MockImageGenerator {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `times` requests whose prompt contains `needle`
    pub fn fail_first(self, needle: impl Into<String>, times: u32) -> Self {
        self.rules.lock().push(FailureRule {
            needle: needle.into(),
            remaining: Some(times),
        });
        self
    }

    /// Fail every request whose prompt contains `needle`
    pub fn always_fail(self, needle: impl Into<String>) -> Self {
        self.rules.lock().push(FailureRule {
            needle: needle.into(),
            remaining: None,
        });
        self
    }

    pub fn calls(&self) -> Vec<ImageRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.prompt.contains(needle))
            .count()
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage, ApiError> {
        self.calls.lock().push(request.clone());

        let mut rules = self.rules.lock();
        if let Some(rule) = rules
            .iter_mut()
            .find(|r| request.prompt.contains(&r.needle) && r.remaining != Some(0))
        {
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(ApiError::ProviderRateLimit(format!(
                "scripted failure for '{}'",
                rule.needle
            )));
        }

        Ok(GeneratedImage {
            bytes: self.image.clone(),
            mime_type: Some("image/png".to_string()),
            text: None,
        })
    }

    fn model_name(&self) -> &str {
        "mock-image-model"
    }
}
