//! Page reading with a fallback chain: direct fetch, structured extraction, and finally a
//! headless-browser screenshot described by a vision model.

use helpme_core::{
    Error, FetchBackend, FetchRequest, FetchResponse, PageRenderer, Result, ResultEnvelope,
    Summarizer, SummaryRequest, VisionRequest, VisionSummarizer,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{extract, imaging, prompts, DIRECT_FETCH_TIMEOUT_SECS};

pub const UNREADABLE_PAGE_MESSAGE: &str = "Sorry, I couldn't access this webpage.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DirectFetch,
    StructuredExtract,
    ScreenshotFallback,
}

/// Why the chain skipped ahead to the screenshot stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// The site answered 403.
    Forbidden,
    /// Any other non-2xx status, transport error, timeout, or unusable URL.
    FetchFailed,
    /// The page parsed to nothing usable, or summarizing it failed.
    ExtractFailed,
}

/// Decide what follows a direct fetch: `None` moves on to extraction.
pub fn classify_fetch(outcome: &Result<FetchResponse>) -> Option<Fallback> {
    match outcome {
        Ok(resp) if resp.is_success() => None,
        Ok(resp) if resp.status == 403 => Some(Fallback::Forbidden),
        Ok(_) | Err(_) => Some(Fallback::FetchFailed),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    pub url: String,
    pub topic: Option<String>,
    /// Where the request came from, e.g. a follow-up on an earlier search.
    pub context: Option<String>,
}

impl ReadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: Option<String>) -> Self {
        self.topic = topic.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub fetch_timeout_ms: u64,
    pub max_image_width: u32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: DIRECT_FETCH_TIMEOUT_SECS * 1000,
            max_image_width: imaging::DEFAULT_MAX_WIDTH,
        }
    }
}

/// Outcome of one read, with the stages it went through.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub path: Vec<Stage>,
    pub fallback: Option<Fallback>,
    pub envelope: ResultEnvelope,
}

#[derive(Clone)]
pub struct ContentRetriever {
    fetcher: Arc<dyn FetchBackend>,
    summarizer: Arc<dyn Summarizer>,
    vision: Arc<dyn VisionSummarizer>,
    renderer: Arc<dyn PageRenderer>,
    config: RetrieverConfig,
}

impl ContentRetriever {
    pub fn new(
        fetcher: Arc<dyn FetchBackend>,
        summarizer: Arc<dyn Summarizer>,
        vision: Arc<dyn VisionSummarizer>,
        renderer: Arc<dyn PageRenderer>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            fetcher,
            summarizer,
            vision,
            renderer,
            config,
        }
    }

    pub fn renderer(&self) -> &Arc<dyn PageRenderer> {
        &self.renderer
    }

    pub async fn retrieve(&self, req: &ReadRequest) -> Retrieval {
        let mut path = vec![Stage::DirectFetch];
        let fetched = self
            .fetcher
            .fetch(&FetchRequest::new(req.url.clone()).with_timeout_ms(self.config.fetch_timeout_ms))
            .await;

        let fallback = match (classify_fetch(&fetched), fetched) {
            (None, Ok(resp)) => {
                path.push(Stage::StructuredExtract);
                match self.summarize_page(&resp.text_lossy(), req).await {
                    Ok(summary) => {
                        return Retrieval {
                            path,
                            fallback: None,
                            envelope: ResultEnvelope::text(summary),
                        };
                    }
                    Err(e) => {
                        tracing::warn!(url = %req.url, error = %e, "extraction failed; falling back to screenshot");
                        Fallback::ExtractFailed
                    }
                }
            }
            (fb, outcome) => {
                let fb = fb.unwrap_or(Fallback::FetchFailed);
                match outcome {
                    Ok(resp) => {
                        tracing::warn!(url = %req.url, status = resp.status, trigger = ?fb, "direct fetch refused; falling back to screenshot")
                    }
                    Err(e) => {
                        tracing::warn!(url = %req.url, error = %e, trigger = ?fb, "direct fetch failed; falling back to screenshot")
                    }
                }
                fb
            }
        };

        path.push(Stage::ScreenshotFallback);
        let envelope = match self.describe_screenshot(req).await {
            Ok(text) => ResultEnvelope::text(text),
            Err(e) => {
                tracing::error!(url = %req.url, error = %e, "screenshot fallback failed");
                ResultEnvelope::failure(UNREADABLE_PAGE_MESSAGE, e.to_string()).with_kind(e.kind())
            }
        };
        Retrieval {
            path,
            fallback: Some(fallback),
            envelope,
        }
    }

    async fn summarize_page(&self, html: &str, req: &ReadRequest) -> Result<String> {
        let content = extract::extract_structured(html, req.topic.as_deref())?;
        let body = extract::render_for_summary(&content);
        self.summarizer
            .summarize(&SummaryRequest {
                instructions: prompts::WEBPAGE_SYSTEM.to_string(),
                content: prompts::webpage_user(req.context.as_deref(), req.topic.as_deref(), &body),
                max_tokens: prompts::WEBPAGE_MAX_TOKENS,
                temperature: Some(prompts::WEBPAGE_TEMPERATURE),
            })
            .await
    }

    async fn describe_screenshot(&self, req: &ReadRequest) -> Result<String> {
        // Removed when dropped, whichever way this function exits.
        let shot = tempfile::Builder::new()
            .prefix("helpme-shot-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| Error::Io(e.to_string()))?
            .into_temp_path();

        self.renderer.screenshot(&req.url, &shot).await?;
        let bytes = tokio::fs::read(&shot)
            .await
            .map_err(|e| Error::Io(format!("reading screenshot: {e}")))?;
        let max_width = self.config.max_image_width;
        let image = tokio::task::spawn_blocking(move || imaging::prepare_image(&bytes, max_width))
            .await
            .map_err(|e| Error::Io(format!("image worker: {e}")))??;

        self.vision
            .summarize_image(&VisionRequest {
                instructions: prompts::SCREENSHOT_SYSTEM.to_string(),
                prompt: prompts::screenshot_prompt(&req.url, req.topic.as_deref()),
                image_base64: image.base64,
                mime_type: image.mime_type.to_string(),
                max_tokens: prompts::SCREENSHOT_MAX_TOKENS,
            })
            .await
    }
}
