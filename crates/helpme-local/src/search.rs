use helpme_core::{Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::env;

pub const GOOGLE_CSE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
pub const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

fn google_api_key_from_env() -> Option<String> {
    env("HELPME_GOOGLE_API_KEY").or_else(|| env("WEB_SEARCH_API_KEY"))
}

fn google_engine_id_from_env() -> Option<String> {
    env("HELPME_SEARCH_ENGINE_ID").or_else(|| env("SEARCH_ENGINE_ID"))
}

fn brave_api_key_from_env() -> Option<String> {
    env("HELPME_BRAVE_API_KEY").or_else(|| env("BRAVE_SEARCH_API_KEY"))
}

fn map_send_err(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Network(e.to_string())
    }
}

/// Google Programmable Search (Custom Search JSON API).
#[derive(Debug, Clone)]
pub struct GoogleCseProvider {
    client: reqwest::Client,
    api_key: String,
    engine_id: String,
    endpoint: String,
}

impl GoogleCseProvider {
    pub fn new(client: reqwest::Client, api_key: String, engine_id: String) -> Self {
        Self {
            client,
            api_key,
            engine_id,
            endpoint: GOOGLE_CSE_ENDPOINT.to_string(),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = google_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing HELPME_GOOGLE_API_KEY (or WEB_SEARCH_API_KEY)".to_string(),
            )
        })?;
        let engine_id = google_engine_id_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing HELPME_SEARCH_ENGINE_ID (or SEARCH_ENGINE_ID)".to_string(),
            )
        })?;
        let mut p = Self::new(client, api_key, engine_id);
        if let Some(ep) = env("HELPME_GOOGLE_CSE_ENDPOINT") {
            p.endpoint = ep;
        }
        Ok(p)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct GoogleCseResponse {
    #[serde(default)]
    items: Vec<GoogleCseItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleCseItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    link: String,
}

#[async_trait::async_trait]
impl SearchProvider for GoogleCseProvider {
    fn name(&self) -> &'static str {
        "google_cse"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);
        // The API refuses `num` above 10.
        let num = q.max_results.unwrap_or(10).clamp(1, 10);

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", q.query.as_str()),
            ])
            .query(&[("num", num.to_string())])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(map_send_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("google cse HTTP {status}")));
        }

        let parsed: GoogleCseResponse = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let results = parsed
            .items
            .into_iter()
            .map(|it| SearchResult {
                title: it.title.unwrap_or_default(),
                snippet: it.snippet.unwrap_or_default(),
                link: it.link,
            })
            .collect();

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
        Ok(SearchResponse {
            results,
            provider: self.name().to_string(),
            timings_ms,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BraveSearchProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl BraveSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = brave_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing HELPME_BRAVE_API_KEY (or BRAVE_SEARCH_API_KEY)".to_string(),
            )
        })?;
        Ok(Self {
            client,
            api_key,
            endpoint: env("HELPME_BRAVE_ENDPOINT").unwrap_or_else(|| BRAVE_ENDPOINT.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BraveWebSearchResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    results: Option<Vec<BraveWebResult>>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for BraveSearchProvider {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let timeout_ms = timeout_ms_from_query(q);

        let mut req = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", q.query.as_str())]);
        if let Some(n) = q.max_results {
            req = req.query(&[("count", n.to_string())]);
        }

        let resp = req
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(map_send_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("brave search HTTP {status}")));
        }

        let parsed: BraveWebSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let mut out = Vec::new();
        if let Some(results) = parsed.web.and_then(|w| w.results) {
            for r in results {
                out.push(SearchResult {
                    title: r.title.unwrap_or_default(),
                    snippet: r.description.unwrap_or_default(),
                    link: r.url,
                });
            }
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
        Ok(SearchResponse {
            results: out,
            provider: "brave".to_string(),
            timings_ms,
        })
    }
}

/// Pick a provider by name (`google` or `brave`).
pub fn provider_from_env(
    name: &str,
    client: reqwest::Client,
) -> Result<std::sync::Arc<dyn SearchProvider>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "google" | "google_cse" => Ok(std::sync::Arc::new(GoogleCseProvider::from_env(client)?)),
        "brave" => Ok(std::sync::Arc::new(BraveSearchProvider::from_env(client)?)),
        other => Err(Error::NotConfigured(format!(
            "unknown search provider: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/customsearch/v1")
    }

    #[tokio::test]
    async fn google_cse_keeps_provider_order_and_sends_num() {
        let app = Router::new().route(
            "/customsearch/v1",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("num").map(String::as_str), Some("10"));
                assert_eq!(q.get("cx").map(String::as_str), Some("cx1"));
                Json(serde_json::json!({
                    "items": [
                        {"title": "B first", "snippet": "s1", "link": "https://b.example"},
                        {"snippet": "s2", "link": "https://a.example"}
                    ]
                }))
            }),
        );
        let ep = serve(app).await;
        let p = GoogleCseProvider::new(reqwest::Client::new(), "k".into(), "cx1".into())
            .with_endpoint(ep);
        let out = p.search(&SearchQuery::new("rust", 25)).await.unwrap();
        assert_eq!(out.provider, "google_cse");
        assert_eq!(out.results.len(), 2);
        assert_eq!(out.results[0].link, "https://b.example");
        assert_eq!(out.results[1].display_title(), "Untitled");
    }

    #[tokio::test]
    async fn google_cse_without_items_is_empty_not_an_error() {
        let app = Router::new().route(
            "/customsearch/v1",
            get(|| async { Json(serde_json::json!({"kind": "customsearch#search"})) }),
        );
        let ep = serve(app).await;
        let p = GoogleCseProvider::new(reqwest::Client::new(), "k".into(), "cx".into())
            .with_endpoint(ep);
        let out = p.search(&SearchQuery::new("nothing", 10)).await.unwrap();
        assert!(out.results.is_empty());
    }

    #[tokio::test]
    async fn http_error_is_upstream() {
        let app = Router::new().route(
            "/customsearch/v1",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota") }),
        );
        let ep = serve(app).await;
        let p = GoogleCseProvider::new(reqwest::Client::new(), "k".into(), "cx".into())
            .with_endpoint(ep);
        let err = p.search(&SearchQuery::new("q", 10)).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)), "{err}");
    }

    #[test]
    fn parses_minimal_brave_shape() {
        let js = r#"{"web":{"results":[{"url":"https://example.com","title":"Example","description":"Hello"}]}}"#;
        let parsed: BraveWebSearchResponse = serde_json::from_str(js).unwrap();
        let rs = parsed.web.unwrap().results.unwrap();
        assert_eq!(rs[0].url, "https://example.com");
        assert_eq!(rs[0].description.as_deref(), Some("Hello"));
    }

    #[test]
    fn unknown_provider_is_a_configuration_error() {
        let err = provider_from_env("altavista", reqwest::Client::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotConfigured(_)));
    }
}
