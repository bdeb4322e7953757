//! The assistant's capabilities: every public operation returns a [`ResultEnvelope`] and,
//! apart from the highlighted-text stub, runs behind the single-flight gate.

use helpme_core::{
    Error, FetchBackend, Geocoder, Location, PageRenderer, Payload, ResultEnvelope, RouteProvider,
    ScreenCapture, SearchProvider, SearchQuery, SearchResponse, Summarizer, SummaryRequest,
    TravelMode, VisionRequest, VisionSummarizer,
};
use helpme_local::retriever::{ContentRetriever, ReadRequest, RetrieverConfig};
use helpme_local::{dates, geo, imaging, prompts};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AssistantConfig;
use crate::dispatch::{HandlerError, OrSay, SingleFlight};
use crate::session::{CacheKey, SessionState};

pub const SEARCH_FAILED_MESSAGE: &str = "Sorry, I encountered an error while searching.";
pub const SUMMARY_FAILED_MESSAGE: &str = "An error occurred while processing the search results.";
pub const SCREEN_FAILED_MESSAGE: &str = "Sorry, I couldn't explain what's on your screen.";
pub const LOCATION_FAILED_MESSAGE: &str = "Sorry, I couldn't look up that location.";
pub const DISTANCE_FAILED_MESSAGE: &str = "Sorry, I encountered an error calculating the distance.";
pub const DIRECTIONS_FAILED_MESSAGE: &str = "Sorry, I encountered an error getting directions.";
pub const ARGS_NOT_UNDERSTOOD_MESSAGE: &str = "Sorry, I couldn't understand the details of that request.";
pub const HIGHLIGHTED_TEXT_MESSAGE: &str = "Highlighted text functionality not implemented yet.";

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct WebSearchArgs {
    /// What to search for. Relative dates ("today", "next week") are resolved first.
    #[serde(default)]
    pub topic: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct WebReadArgs {
    /// Absolute http(s) URL.
    #[serde(default)]
    pub url: String,
    /// Optional focus for the explanation.
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct ReadSearchResultArgs {
    /// 1-based position in the most recent search results.
    #[serde(default)]
    pub result_number: i64,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct LocationArgs {
    /// Place name or address.
    #[serde(default)]
    pub place: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct DistanceArgs {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[cfg_attr(feature = "stdio", derive(schemars::JsonSchema))]
pub struct DirectionsArgs {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    /// driving (default), walking or bicycle.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
struct DirectionsPayload {
    distance: f64,
    time: String,
    steps: Vec<String>,
    formatted_response: String,
}

/// External services the capabilities call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn SearchProvider>,
    pub summarizer: Arc<dyn Summarizer>,
    pub vision: Arc<dyn VisionSummarizer>,
    pub screen: Arc<dyn ScreenCapture>,
    pub geocoder: Arc<dyn Geocoder>,
    /// `None` when no routing service is configured.
    pub router: Option<Arc<dyn RouteProvider>>,
    pub retriever: ContentRetriever,
}

/// Stand-in for a service whose credentials are missing. Every call says so.
struct Unconfigured(String);

#[async_trait::async_trait]
impl SearchProvider for Unconfigured {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn search(&self, _q: &SearchQuery) -> helpme_core::Result<SearchResponse> {
        Err(Error::NotConfigured(self.0.clone()))
    }
}

#[async_trait::async_trait]
impl Summarizer for Unconfigured {
    async fn summarize(&self, _req: &SummaryRequest) -> helpme_core::Result<String> {
        Err(Error::NotConfigured(self.0.clone()))
    }
}

#[async_trait::async_trait]
impl VisionSummarizer for Unconfigured {
    async fn summarize_image(&self, _req: &VisionRequest) -> helpme_core::Result<String> {
        Err(Error::NotConfigured(self.0.clone()))
    }
}

fn parse_args<T: DeserializeOwned + Default>(args: serde_json::Value) -> Result<T, Error> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).map_err(|e| {
        tracing::debug!(error = %e, "capability arguments did not match");
        Error::InvalidArgument(ARGS_NOT_UNDERSTOOD_MESSAGE.to_string())
    })
}

fn required<'a>(value: &'a str, ask: &str) -> Result<&'a str, Error> {
    let v = value.trim();
    if v.is_empty() {
        Err(Error::InvalidArgument(ask.to_string()))
    } else {
        Ok(v)
    }
}

pub struct Assistant {
    deps: Collaborators,
    flight: SingleFlight,
    session: tokio::sync::Mutex<SessionState>,
    zone: dates::ReferenceZone,
    max_search_results: usize,
    max_image_width: u32,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("search", &self.deps.search.name())
            .field("busy", &self.flight.is_busy())
            .finish()
    }
}

impl Assistant {
    pub fn new(deps: Collaborators, cfg: &AssistantConfig) -> Self {
        Self {
            deps,
            flight: SingleFlight::new(),
            session: tokio::sync::Mutex::new(SessionState::new(cfg.cache_capacity)),
            zone: cfg.reference_zone,
            max_search_results: cfg.max_search_results,
            max_image_width: cfg.max_image_width,
        }
    }

    /// Wire the real services. Missing credentials degrade the affected capabilities to a
    /// spoken "not set up" failure instead of refusing to start.
    pub fn from_config(cfg: &AssistantConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("helpme/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Io(format!("http client: {e}")))?;

        let (summarizer, vision): (Arc<dyn Summarizer>, Arc<dyn VisionSummarizer>) =
            match helpme_local::openai_compat::OpenAiCompatClient::from_env(http.clone()) {
                Ok(c) => {
                    let c = Arc::new(c.with_first_attempt_timeout(std::time::Duration::from_millis(
                        cfg.summarizer_timeout_ms,
                    )));
                    (c.clone() as Arc<dyn Summarizer>, c as Arc<dyn VisionSummarizer>)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "summarizer not configured");
                    let u = Arc::new(Unconfigured(e.to_string()));
                    (u.clone() as Arc<dyn Summarizer>, u as Arc<dyn VisionSummarizer>)
                }
            };

        let search = helpme_local::search::provider_from_env(&cfg.search_provider, http.clone())
            .unwrap_or_else(|e| {
                tracing::warn!(provider = %cfg.search_provider, error = %e, "search not configured");
                Arc::new(Unconfigured(e.to_string())) as Arc<dyn SearchProvider>
            });

        let router = match geo::MapQuestRouter::from_env(http.clone()) {
            Ok(r) => Some(Arc::new(r) as Arc<dyn RouteProvider>),
            Err(e) => {
                tracing::info!(error = %e, "directions disabled");
                None
            }
        };

        let fetcher: Arc<dyn FetchBackend> = Arc::new(helpme_local::LocalFetcher::new()?);
        let renderer: Arc<dyn PageRenderer> = Arc::new(
            helpme_local::render_playwright::PlaywrightRenderer::from_env()
                .with_wait_ms(cfg.render_wait_ms),
        );
        let retriever = ContentRetriever::new(
            fetcher,
            summarizer.clone(),
            vision.clone(),
            renderer,
            RetrieverConfig {
                fetch_timeout_ms: cfg.fetch_timeout_ms,
                max_image_width: cfg.max_image_width,
            },
        );

        Ok(Self::new(
            Collaborators {
                search,
                summarizer,
                vision,
                screen: Arc::new(helpme_local::screen::ShellScreenCapture::detect()),
                geocoder: Arc::new(geo::NominatimGeocoder::new(http)),
                router,
                retriever,
            },
            cfg,
        ))
    }

    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    pub async fn web_search(&self, topic: &str) -> ResultEnvelope {
        self.flight
            .dispatch("web_search", self.search_and_summarize(topic))
            .await
    }

    pub async fn web_read(&self, url: &str, topic: Option<&str>) -> ResultEnvelope {
        self.flight
            .dispatch("web_read", self.read_page(url, topic))
            .await
    }

    pub async fn read_search_result(&self, result_number: i64) -> ResultEnvelope {
        self.flight
            .dispatch("read_search_result", async {
                let link = {
                    let session = self.session.lock().await;
                    session.result(result_number)?.link.clone()
                };
                self.read_page(&link, None).await
            })
            .await
    }

    pub async fn list_search_results(&self) -> ResultEnvelope {
        self.flight
            .dispatch("list_search_results", async {
                let listing = self.session.lock().await.listing()?;
                Ok::<_, HandlerError>(ResultEnvelope::text(listing))
            })
            .await
    }

    pub async fn explain_screen(&self) -> ResultEnvelope {
        self.flight
            .dispatch("explain_screen", self.describe_screen())
            .await
    }

    /// Not wired to any selection source yet; answers even while another request runs.
    pub async fn get_highlighted_text(&self) -> ResultEnvelope {
        ResultEnvelope::text(HIGHLIGHTED_TEXT_MESSAGE)
    }

    pub async fn get_location(&self, place: &str) -> ResultEnvelope {
        self.flight
            .dispatch("get_location", self.locate(place))
            .await
    }

    pub async fn get_distance(&self, origin: &str, destination: &str) -> ResultEnvelope {
        self.flight
            .dispatch("get_distance", async {
                let (a, b) = self
                    .locate_pair(origin, destination)
                    .await
                    .or_say(DISTANCE_FAILED_MESSAGE)?;
                Ok::<_, HandlerError>(ResultEnvelope::text(geo::format_distance(&a, &b)))
            })
            .await
    }

    pub async fn get_directions(
        &self,
        origin: &str,
        destination: &str,
        mode: Option<&str>,
    ) -> ResultEnvelope {
        self.flight
            .dispatch("get_directions", self.directions(origin, destination, mode))
            .await
    }

    /// Route a capability by name with JSON arguments (`null` means no arguments).
    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> ResultEnvelope {
        macro_rules! with_args {
            ($ty:ty, |$a:ident| $body:expr) => {
                match parse_args::<$ty>(args) {
                    Ok($a) => $body,
                    Err(e) => ResultEnvelope::from_error(&e),
                }
            };
        }
        match name {
            "web_search" => with_args!(WebSearchArgs, |a| self.web_search(&a.topic).await),
            "web_read" => with_args!(WebReadArgs, |a| self
                .web_read(&a.url, a.topic.as_deref())
                .await),
            "read_search_result" => with_args!(ReadSearchResultArgs, |a| self
                .read_search_result(a.result_number)
                .await),
            "list_search_results" => self.list_search_results().await,
            "explain_screen" => self.explain_screen().await,
            "get_highlighted_text" => self.get_highlighted_text().await,
            "get_location" => with_args!(LocationArgs, |a| self.get_location(&a.place).await),
            "get_distance" => with_args!(DistanceArgs, |a| self
                .get_distance(&a.origin, &a.destination)
                .await),
            "get_directions" => with_args!(DirectionsArgs, |a| self
                .get_directions(&a.origin, &a.destination, a.mode.as_deref())
                .await),
            other => ResultEnvelope::from_error(&Error::InvalidArgument(format!(
                "I don't have a capability called {other}."
            ))),
        }
    }

    /// Release the headless browser and forget the session.
    pub async fn shutdown(&self) {
        self.deps.retriever.renderer().shutdown().await;
        self.session.lock().await.clear();
        tracing::info!("assistant shut down");
    }

    async fn search_and_summarize(&self, topic: &str) -> Result<ResultEnvelope, HandlerError> {
        let topic = required(topic, "What would you like me to search for?")?;
        let processed = dates::rewrite_relative_dates(topic, self.zone.now());
        if processed != topic {
            tracing::info!(original = %topic, processed = %processed, "resolved relative dates");
        }

        let resp = self
            .deps
            .search
            .search(&SearchQuery::new(processed.clone(), self.max_search_results))
            .await
            .or_say(SEARCH_FAILED_MESSAGE)?;
        tracing::info!(provider = %resp.provider, results = resp.results.len(), "search finished");
        self.session
            .lock()
            .await
            .replace_results(resp.results.clone());
        if resp.results.is_empty() {
            return Err(Error::NotFound(format!("I couldn't find any results for {topic}.")).into());
        }

        let today = dates::long_date(&self.zone.now());
        let summary = self
            .deps
            .summarizer
            .summarize(&SummaryRequest {
                instructions: prompts::search_system(&today),
                content: prompts::search_user(&processed, topic, &resp.results),
                max_tokens: prompts::SEARCH_MAX_TOKENS,
                temperature: None,
            })
            .await
            .or_say(SUMMARY_FAILED_MESSAGE)?;
        Ok(ResultEnvelope::text(summary))
    }

    /// Shared by `web_read` and `read_search_result`; runs inside whichever gate admitted it.
    async fn read_page(&self, url: &str, topic: Option<&str>) -> Result<ResultEnvelope, HandlerError> {
        let url = required(url, "Which web page would you like me to read?")?;
        let topic = topic.map(str::trim).filter(|t| !t.is_empty());
        let context = self.session.lock().await.follow_up_context();
        let key = CacheKey::new(&format!("{url} {}", topic.unwrap_or("")), context.as_deref());
        if let Some(hit) = self.session.lock().await.cached(&key).await {
            tracing::debug!(url, "page summary served from cache");
            return Ok(hit);
        }

        let req = ReadRequest::new(url)
            .with_topic(topic.map(str::to_string))
            .with_context(context);
        let retrieval = self.deps.retriever.retrieve(&req).await;
        tracing::info!(
            url,
            path = ?retrieval.path,
            fallback = ?retrieval.fallback,
            ok = retrieval.envelope.is_success(),
            "page read"
        );
        self.session
            .lock()
            .await
            .remember(key, &retrieval.envelope)
            .await;
        Ok(retrieval.envelope)
    }

    async fn describe_screen(&self) -> Result<ResultEnvelope, HandlerError> {
        let screen = self.deps.screen.clone();
        let max_width = self.max_image_width;
        let image = tokio::task::spawn_blocking(move || {
            let bytes = screen.capture()?;
            imaging::prepare_image(&bytes, max_width)
        })
        .await
        .map_err(|e| Error::Io(format!("screen worker: {e}")))
        .and_then(|r| r)
        .or_say(SCREEN_FAILED_MESSAGE)?;
        tracing::debug!(width = image.width, height = image.height, "screen captured");

        let text = self
            .deps
            .vision
            .summarize_image(&VisionRequest {
                instructions: String::new(),
                prompt: prompts::SCREEN_PROMPT.to_string(),
                image_base64: image.base64,
                mime_type: image.mime_type.to_string(),
                max_tokens: prompts::SCREEN_MAX_TOKENS,
            })
            .await
            .or_say(SCREEN_FAILED_MESSAGE)?;
        Ok(ResultEnvelope::text(text))
    }

    async fn geocode(&self, place: &str) -> Result<Location, Error> {
        self.deps
            .geocoder
            .geocode(place)
            .await?
            .ok_or_else(|| Error::NotFound(format!("I couldn't find a place called {place}.")))
    }

    async fn locate(&self, place: &str) -> Result<ResultEnvelope, HandlerError> {
        let place = required(place, "Which place should I look up?")?;
        let key = CacheKey::new(&format!("location:{place}"), None);
        if let Some(hit) = self.session.lock().await.cached(&key).await {
            return Ok(hit);
        }
        let location = self.geocode(place).await.or_say(LOCATION_FAILED_MESSAGE)?;
        let envelope = ResultEnvelope::success(Payload::structured(&location));
        self.session.lock().await.remember(key, &envelope).await;
        Ok(envelope)
    }

    async fn locate_pair(&self, origin: &str, destination: &str) -> Result<(Location, Location), Error> {
        let origin = required(origin, "Where are you starting from?")?;
        let destination = required(destination, "Where would you like to go?")?;
        let a = self.geocode(origin).await?;
        let b = self.geocode(destination).await?;
        Ok((a, b))
    }

    async fn directions(
        &self,
        origin: &str,
        destination: &str,
        mode: Option<&str>,
    ) -> Result<ResultEnvelope, HandlerError> {
        let mode = TravelMode::parse(mode.unwrap_or("")).ok_or_else(|| {
            Error::InvalidArgument(
                "I can give driving, walking or bicycle directions.".to_string(),
            )
        })?;
        let router = self.deps.router.clone().ok_or_else(|| {
            HandlerError::new(
                "Directions aren't set up on this machine yet.",
                Error::NotConfigured("no routing service configured".to_string()),
            )
        })?;
        let (a, b) = self
            .locate_pair(origin, destination)
            .await
            .or_say(DIRECTIONS_FAILED_MESSAGE)?;
        let route = router
            .route(&a, &b, mode)
            .await
            .or_say(DIRECTIONS_FAILED_MESSAGE)?;
        let payload = DirectionsPayload {
            distance: route.distance_miles,
            time: route.formatted_time.clone(),
            formatted_response: geo::format_directions(origin.trim(), destination.trim(), &route),
            steps: route.steps,
        };
        Ok(ResultEnvelope::success(Payload::structured(&payload)))
    }
}
