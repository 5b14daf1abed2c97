//! OpenAI-compatible chat-completions client for vision models.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GatewayError, VisionGateway};
use crate::sanitize::truncate;

/// Maximum length for error bodies carried into errors and logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct HttpGatewayConfig {
    /// Base URL up to, not including, `/chat/completions`.
    pub base_url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
    pub max_tokens: u32,
}

pub struct HttpVisionGateway {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    timeout: Duration,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request<'a>(
    image_jpeg: &[u8],
    prompt: &'a str,
    model: &'a str,
    max_tokens: u32,
) -> ChatRequest<'a> {
    let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image_jpeg));
    ChatRequest {
        model,
        max_tokens,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text { text: prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ],
        }],
    }
}

/// Extracts the first choice's text from a chat-completions response body.
fn parse_response(body: &str) -> Result<String, GatewayError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GatewayError::MalformedResponse("no choices in response".to_string()))?;

    if content.trim().is_empty() {
        return Err(GatewayError::EmptyResponse);
    }
    Ok(content)
}

impl HttpVisionGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let base = config.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(GatewayError::Config("base URL is empty".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base),
            api_key: config.api_key,
            timeout: config.timeout,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.timeout.as_secs())
        } else {
            GatewayError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl VisionGateway for HttpVisionGateway {
    async fn query(
        &self,
        image_jpeg: &[u8],
        prompt: &str,
        model: &str,
    ) -> Result<String, GatewayError> {
        let request = build_request(image_jpeg, prompt, model, self.max_tokens);
        debug!(model, image_bytes = image_jpeg.len(), "Sending vision request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_LENGTH),
            });
        }

        parse_response(&body)
    }
}
