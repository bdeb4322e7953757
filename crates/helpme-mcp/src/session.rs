use helpme_core::{Error, ResultEnvelope, SearchResult};
use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const DEFAULT_CACHE_CAPACITY: u64 = 128;

/// Cache key: the request text plus a hash of the context it was asked in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    context_hash: u64,
}

impl CacheKey {
    pub fn new(query: &str, context: Option<&str>) -> Self {
        let mut h = DefaultHasher::new();
        context.hash(&mut h);
        Self {
            query: query.trim().to_string(),
            context_hash: h.finish(),
        }
    }
}

/// Per-assistant conversational state: the latest search results and a small result cache.
pub struct SessionState {
    last_search_results: Vec<SearchResult>,
    cache: Cache<CacheKey, ResultEnvelope>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("last_search_results", &self.last_search_results.len())
            .field("cache_entries", &self.cache.entry_count())
            .finish()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl SessionState {
    pub fn new(cache_capacity: u64) -> Self {
        Self {
            last_search_results: Vec::new(),
            cache: Cache::builder().max_capacity(cache_capacity).build(),
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.last_search_results
    }

    /// Replace (never extend) the remembered results.
    pub fn replace_results(&mut self, results: Vec<SearchResult>) {
        self.last_search_results = results;
    }

    /// "Following up on search about: <first title>" when there is a previous search.
    pub fn follow_up_context(&self) -> Option<String> {
        self.last_search_results
            .first()
            .map(|r| format!("Following up on search about: {}", r.display_title()))
    }

    /// Result `n`, counted from 1.
    pub fn result(&self, n: i64) -> Result<&SearchResult, Error> {
        if self.last_search_results.is_empty() {
            return Err(Error::NotFound(
                "I don't have any recent search results to reference. Please perform a search first."
                    .to_string(),
            ));
        }
        let count = self.last_search_results.len();
        usize::try_from(n)
            .ok()
            .filter(|i| (1..=count).contains(i))
            .and_then(|i| self.last_search_results.get(i - 1))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Please specify a result number between 1 and {count}."
                ))
            })
    }

    /// Numbered listing of the remembered results.
    pub fn listing(&self) -> Result<String, Error> {
        if self.last_search_results.is_empty() {
            return Err(Error::NotFound(
                "I don't have any recent search results to show. Please perform a search first."
                    .to_string(),
            ));
        }
        let mut s = String::from("Here are the recent search results:");
        for (i, r) in self.last_search_results.iter().enumerate() {
            s.push_str(&format!("\n{}. {}", i + 1, r.display_title()));
        }
        Ok(s)
    }

    pub async fn cached(&self, key: &CacheKey) -> Option<ResultEnvelope> {
        self.cache.get(key).await
    }

    /// Only successes are remembered.
    pub async fn remember(&self, key: CacheKey, envelope: &ResultEnvelope) {
        if envelope.is_success() {
            self.cache.insert(key, envelope.clone()).await;
        }
    }

    pub fn clear(&mut self) {
        self.last_search_results.clear();
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(n: usize) -> Vec<SearchResult> {
        (1..=n)
            .map(|i| SearchResult {
                title: if i == 2 { String::new() } else { format!("Title {i}") },
                snippet: format!("snippet {i}"),
                link: format!("https://r{i}.example"),
            })
            .collect()
    }

    #[test]
    fn result_numbers_are_one_based_and_bounded() {
        let mut s = SessionState::default();
        assert!(matches!(s.result(1), Err(Error::NotFound(_))));
        s.replace_results(results(3));
        for n in 1..=3 {
            assert_eq!(s.result(n).unwrap().link, format!("https://r{n}.example"));
        }
        for bad in [0, 4, -1] {
            match s.result(bad) {
                Err(Error::InvalidArgument(m)) => {
                    assert_eq!(m, "Please specify a result number between 1 and 3.")
                }
                other => panic!("{bad}: {other:?}"),
            }
        }
    }

    #[test]
    fn listing_has_one_line_per_result_in_order() {
        let mut s = SessionState::default();
        let err = s.listing().unwrap_err();
        assert!(err.spoken().contains("Please perform a search first."));
        s.replace_results(results(3));
        let text = s.listing().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Here are the recent search results:",
                "1. Title 1",
                "2. Untitled",
                "3. Title 3",
            ]
        );
    }

    #[test]
    fn replace_is_wholesale() {
        let mut s = SessionState::default();
        s.replace_results(results(3));
        s.replace_results(Vec::new());
        assert!(s.results().is_empty());
        assert!(s.follow_up_context().is_none());
        s.replace_results(results(1));
        assert_eq!(
            s.follow_up_context().as_deref(),
            Some("Following up on search about: Title 1")
        );
    }

    #[tokio::test]
    async fn cache_keeps_only_successes() {
        let mut s = SessionState::default();
        let k = CacheKey::new("https://a.example", Some("ctx"));
        s.remember(k.clone(), &ResultEnvelope::failure("no", "x")).await;
        assert!(s.cached(&k).await.is_none());
        s.remember(k.clone(), &ResultEnvelope::text("yes")).await;
        assert_eq!(s.cached(&k).await.unwrap().as_text(), Some("yes"));
        assert!(s
            .cached(&CacheKey::new("https://a.example", None))
            .await
            .is_none());
        s.clear();
        assert!(s.cached(&k).await.is_none());
    }
}
