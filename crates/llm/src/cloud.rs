//! Chat-completions text provider (`POST {base}/v1/chat/completions`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use storyboard_core::generation::{GenerationError, TextProvider};
use storyboard_core::prompts::SYSTEM_PROMPT;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 4096;

/// Error bodies included in messages are cut to this many chars.
const MAX_BODY_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
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

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

pub struct CloudChatProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl CloudChatProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn map_reqwest(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else {
            GenerationError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl TextProvider for CloudChatProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        tracing::debug!(model = %self.model, "Calling chat completions");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_BODY_CHARS).collect(),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.map_reqwest(e))?;
        let tokens = parsed.usage.as_ref().and_then(|u| u.total_tokens);
        let content = first_content(parsed)?;
        tracing::info!(model = %self.model, chars = content.chars().count(), tokens, "Chat completion succeeded");
        Ok(content)
    }
}

fn first_content(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GenerationError::Failed("chat completion returned no content".to_string()))
}
