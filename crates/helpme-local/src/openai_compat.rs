use helpme_core::{Error, Result, Summarizer, SummaryRequest, VisionRequest, VisionSummarizer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::env;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Budget for the first attempt; a timed-out call is retried once without a limit.
pub const DEFAULT_FIRST_ATTEMPT_TIMEOUT_MS: u64 = 30_000;

fn base_url_from_env() -> Option<String> {
    env("HELPME_OPENAI_BASE_URL")
}

fn api_key_from_env() -> Option<String> {
    env("HELPME_OPENAI_API_KEY").or_else(|| env("OPENAI_API_KEY"))
}

fn model_from_env() -> Option<String> {
    env("HELPME_OPENAI_MODEL")
}

fn vision_model_from_env() -> Option<String> {
    env("HELPME_OPENAI_VISION_MODEL")
}

/// Chat-completions client for any OpenAI-compatible endpoint. Serves both text summaries and
/// image (data URL) summaries.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    vision_model: String,
    first_attempt_timeout: Duration,
}

impl OpenAiCompatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            vision_model: model.clone(),
            model,
            first_attempt_timeout: Duration::from_millis(DEFAULT_FIRST_ATTEMPT_TIMEOUT_MS),
        }
    }

    /// Requires an API key unless `HELPME_OPENAI_BASE_URL` points at a local server.
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let base_url = base_url_from_env();
        let api_key = api_key_from_env();
        if base_url.is_none() && api_key.is_none() {
            return Err(Error::NotConfigured(
                "missing OPENAI_API_KEY (or HELPME_OPENAI_API_KEY)".to_string(),
            ));
        }
        let model = model_from_env().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut c = Self::new(
            client,
            base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model,
        );
        if let Some(vm) = vision_model_from_env() {
            c.vision_model = vm;
        }
        Ok(c)
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }

    pub fn with_first_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.first_attempt_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn send_once(
        &self,
        req: &ChatCompletionsRequest,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(t) = timeout {
            rb = rb.timeout(t);
        }
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb.json(req).send().await.map_err(crate::map_reqwest_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "openai_compat chat.completions HTTP {status}"
            )));
        }

        let parsed: ChatCompletionsResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(e.to_string())
            } else {
                Error::Upstream(e.to_string())
            }
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Upstream("empty completion".to_string()))
    }

    /// One bounded attempt; if (and only if) it timed out, one more attempt with no timeout.
    async fn send(&self, req: &ChatCompletionsRequest) -> Result<String> {
        match self.send_once(req, Some(self.first_attempt_timeout)).await {
            Err(e) if e.is_timeout() => {
                tracing::warn!(
                    model = %req.model,
                    timeout_ms = self.first_attempt_timeout.as_millis() as u64,
                    "completion timed out; retrying once without timeout"
                );
                self.send_once(req, None).await
            }
            other => other,
        }
    }
}

#[async_trait::async_trait]
impl Summarizer for OpenAiCompatClient {
    async fn summarize(&self, req: &SummaryRequest) -> Result<String> {
        let body = ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message::text("system", &req.instructions),
                Message::text("user", &req.content),
            ],
            max_tokens: Some(req.max_tokens),
            temperature: req.temperature,
            stream: Some(false),
        };
        self.send(&body).await
    }
}

#[async_trait::async_trait]
impl VisionSummarizer for OpenAiCompatClient {
    async fn summarize_image(&self, req: &VisionRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !req.instructions.is_empty() {
            messages.push(Message::text("system", &req.instructions));
        }
        messages.push(Message {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: req.prompt.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{}", req.mime_type, req.image_base64),
                    },
                },
            ]),
        });
        let body = ChatCompletionsRequest {
            model: self.vision_model.clone(),
            messages,
            max_tokens: Some(req.max_tokens),
            temperature: None,
            stream: Some(false),
        };
        self.send(&body).await
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: String,
    content: MessageContent,
}

impl Message {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Text(content.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
