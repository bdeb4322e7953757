use helpme_core::{Error, FetchBackend, FetchRequest, FetchResponse, Result};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod dates;
pub mod extract;
pub mod geo;
pub mod imaging;
pub mod openai_compat;
pub mod prompts;
pub mod render_playwright;
pub mod retriever;
pub mod screen;
pub mod search;
pub mod shellout;

/// Identity sent on direct fetches. Plenty of sites reject obvious bot user agents outright.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Direct fetch budget (seconds).
pub const DIRECT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Hard cap on bytes read from a page body.
const MAX_BODY_BYTES: usize = 5_000_000;

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn map_reqwest_err(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_builder() {
        Error::InvalidUrl(e.to_string())
    } else {
        Error::Network(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(DIRECT_FETCH_TIMEOUT_SECS))
            .timeout(Duration::from_secs(DIRECT_FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { client })
    }

    fn apply_headers(
        mut rb: reqwest::RequestBuilder,
        headers: &BTreeMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                rb = rb.header(name, value);
            }
        }
        rb
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let t_req = std::time::Instant::now();
        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        rb = Self::apply_headers(rb, &req.headers);
        let resp = rb.send().await.map_err(map_reqwest_err)?;
        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_err)?;
            if bytes.len().saturating_add(chunk.len()) > MAX_BODY_BYTES {
                let can_take = MAX_BODY_BYTES.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                tracing::debug!(url = %req.url, "body truncated at {MAX_BODY_BYTES} bytes");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("network_fetch".to_string(), t_req.elapsed().as_millis());
        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            content_type,
            bytes,
            timings_ms,
        })
    }
}
