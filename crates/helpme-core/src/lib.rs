use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub mod envelope;

pub use envelope::{Payload, ResultEnvelope, BUSY_MESSAGE};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("upstream api failed: {0}")]
    Upstream(String),
    #[error("parse failed: {0}")]
    Parse(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure classes. Every [`Error`] variant maps onto exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AccessDenied,
    TransientNetwork,
    UpstreamApi,
    InvalidArgument,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::TransientNetwork => "transient_network",
            Self::UpstreamApi => "upstream_api",
            Self::InvalidArgument => "invalid_argument",
            Self::Configuration => "configuration",
        }
    }

    pub fn retryable(self) -> bool {
        match self {
            Self::TransientNetwork | Self::UpstreamApi => true,
            // Changing the input (or the environment) is required for these.
            Self::NotFound | Self::AccessDenied | Self::InvalidArgument | Self::Configuration => {
                false
            }
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::Network(_) | Self::Timeout(_) => ErrorKind::TransientNetwork,
            Self::Upstream(_) | Self::Render(_) | Self::Parse(_) => ErrorKind::UpstreamApi,
            Self::InvalidArgument(_) | Self::InvalidUrl(_) => ErrorKind::InvalidArgument,
            Self::NotConfigured(_) | Self::Io(_) => ErrorKind::Configuration,
        }
    }

    /// A short sentence suitable for speech. Corrective messages (bad input, nothing found)
    /// are spoken as-is; everything else gets a generic apology.
    pub fn spoken(&self) -> String {
        match self {
            Self::InvalidArgument(m) | Self::NotFound(m) => m.clone(),
            Self::InvalidUrl(_) => "That doesn't look like a valid web address.".to_string(),
            Self::AccessDenied(_) => "That site refused my request.".to_string(),
            Self::Network(_) | Self::Timeout(_) => {
                "I couldn't reach the service I needed. Please try again.".to_string()
            }
            Self::Upstream(_) | Self::Render(_) | Self::Parse(_) => {
                "The service I rely on didn't respond properly.".to_string()
            }
            Self::NotConfigured(_) | Self::Io(_) => {
                "That feature isn't set up on this machine yet.".to_string()
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the whole request (connect + body).
    pub timeout_ms: Option<u64>,
    /// Extra request headers (the fetcher sets its own browser-like `User-Agent`).
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub timings_ms: BTreeMap<String, u128>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain HTTP GET. Non-2xx statuses are returned as responses, not errors, so callers can
/// tell "forbidden" apart from transport failures.
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, max_results: usize) -> Self {
        Self {
            query: query.into(),
            max_results: Some(max_results),
            timeout_ms: None,
        }
    }
}

/// One search hit, in provider relevance order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

impl SearchResult {
    /// The title, or "Untitled" when the provider gave none.
    pub fn display_title(&self) -> &str {
        let t = self.title.trim();
        if t.is_empty() {
            "Untitled"
        } else {
            t
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMatch {
    /// Tag name of the matching element (`p`, `h1`, `h2`, `h3`, `li`).
    pub kind: String,
    pub text: String,
}

/// Structured text pulled out of one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedContent {
    pub title: String,
    pub headings: Vec<String>,
    pub paragraphs: Vec<String>,
    pub list_items: Vec<String>,
    pub topic_matches: Vec<TopicMatch>,
}

impl RetrievedContent {
    pub fn is_empty(&self) -> bool {
        self.headings.is_empty() && self.paragraphs.is_empty() && self.list_items.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequest {
    /// System instructions.
    pub instructions: String,
    /// User content to summarize.
    pub content: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, req: &SummaryRequest) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionRequest {
    /// System instructions (omitted from the request when empty).
    pub instructions: String,
    /// Text sent alongside the image.
    pub prompt: String,
    pub image_base64: String,
    pub mime_type: String,
    pub max_tokens: u32,
}

#[async_trait::async_trait]
pub trait VisionSummarizer: Send + Sync {
    async fn summarize_image(&self, req: &VisionRequest) -> Result<String>;
}

/// Headless browser: render `url` and write a full-page PNG to `dest`.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn screenshot(&self, url: &str, dest: &Path) -> Result<()>;
    /// Release any long-lived browser resources.
    async fn shutdown(&self) {}
}

/// Captures the current display as encoded image bytes (PNG).
///
/// Implementations may block; callers run them on a blocking worker.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub distance_miles: f64,
    pub formatted_time: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycle,
}

impl TravelMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "driving" | "drive" | "car" | "fastest" => Some(Self::Driving),
            "walking" | "walk" | "pedestrian" => Some(Self::Walking),
            "bicycle" | "bike" | "cycling" => Some(Self::Bicycle),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<Option<Location>>;
}

#[async_trait::async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(&self, origin: &Location, destination: &Location, mode: TravelMode)
        -> Result<Route>;
}
