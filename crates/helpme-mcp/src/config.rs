use std::path::PathBuf;

use helpme_local::dates::ReferenceZone;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A setting that was present but unusable. Collected while reading the environment and
/// logged once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: &'static str,
    pub value: String,
}

impl ConfigWarning {
    pub fn log(&self) {
        tracing::warn!(key = self.key, value = %self.value, "ignoring unusable setting");
    }
}

fn env_parse<T: std::str::FromStr>(
    key: &'static str,
    default: T,
    warnings: &mut Vec<ConfigWarning>,
) -> T {
    match env(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warnings.push(ConfigWarning { key, value: raw });
            default
        }),
        None => default,
    }
}

fn has_env(key: &str) -> bool {
    env(key).is_some()
}

/// Parse `+HH:MM` / `-HH:MM` (or plain seconds) into an offset east of UTC.
pub fn parse_utc_offset(s: &str) -> Option<i32> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i32>() {
        return Some(secs);
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => (1, s),
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(sign * (h * 3600 + m * 60))
}

/// Everything the assistant needs to know about its environment, read once at startup.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// `google` (default) or `brave`.
    pub search_provider: String,
    pub max_search_results: usize,
    /// Where relative dates ("today") are anchored.
    pub reference_zone: ReferenceZone,
    pub fetch_timeout_ms: u64,
    pub summarizer_timeout_ms: u64,
    pub render_wait_ms: u64,
    pub max_image_width: u32,
    pub cache_capacity: u64,
    pub lock_file: PathBuf,
    /// `None` disables file logging.
    pub log_dir: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            search_provider: "google".to_string(),
            max_search_results: 10,
            reference_zone: ReferenceZone::default(),
            fetch_timeout_ms: helpme_local::DIRECT_FETCH_TIMEOUT_SECS * 1000,
            summarizer_timeout_ms: helpme_local::openai_compat::DEFAULT_FIRST_ATTEMPT_TIMEOUT_MS,
            render_wait_ms: helpme_local::render_playwright::DEFAULT_WAIT_MS,
            max_image_width: helpme_local::imaging::DEFAULT_MAX_WIDTH,
            cache_capacity: crate::session::DEFAULT_CACHE_CAPACITY,
            lock_file: crate::guard::default_lock_path(),
            log_dir: Some(PathBuf::from("logs")),
        }
    }
}

impl AssistantConfig {
    /// Read the process environment. Unusable values fall back to their defaults and are
    /// returned as warnings for the caller to log.
    pub fn from_env() -> (Self, Vec<ConfigWarning>) {
        let d = Self::default();
        let mut warnings = Vec::new();

        let mut reference_zone = match env("HELPME_TZ") {
            Some(raw) => ReferenceZone::named(&raw).unwrap_or_else(|| {
                warnings.push(ConfigWarning {
                    key: "HELPME_TZ",
                    value: raw,
                });
                d.reference_zone
            }),
            None => d.reference_zone,
        };
        // A fixed offset, when given, takes precedence over the named zone.
        if let Some(raw) = env("HELPME_UTC_OFFSET") {
            match parse_utc_offset(&raw).and_then(ReferenceZone::fixed) {
                Some(z) => reference_zone = z,
                None => warnings.push(ConfigWarning {
                    key: "HELPME_UTC_OFFSET",
                    value: raw,
                }),
            }
        }

        let log_dir = match env("HELPME_LOG_DIR") {
            Some(v) if v.eq_ignore_ascii_case("off") => None,
            Some(v) => Some(PathBuf::from(v)),
            None => d.log_dir.clone(),
        };
        let cfg = Self {
            search_provider: env("HELPME_SEARCH_PROVIDER").unwrap_or(d.search_provider),
            max_search_results: env_parse(
                "HELPME_MAX_SEARCH_RESULTS",
                d.max_search_results,
                &mut warnings,
            )
            .clamp(1, 10),
            reference_zone,
            fetch_timeout_ms: env_parse("HELPME_FETCH_TIMEOUT_MS", d.fetch_timeout_ms, &mut warnings),
            summarizer_timeout_ms: env_parse(
                "HELPME_SUMMARIZER_TIMEOUT_MS",
                d.summarizer_timeout_ms,
                &mut warnings,
            ),
            render_wait_ms: env_parse("HELPME_RENDER_WAIT_MS", d.render_wait_ms, &mut warnings),
            max_image_width: env_parse("HELPME_MAX_IMAGE_WIDTH", d.max_image_width, &mut warnings),
            cache_capacity: env_parse("HELPME_CACHE_CAPACITY", d.cache_capacity, &mut warnings),
            lock_file: env("HELPME_LOCK_FILE")
                .map(PathBuf::from)
                .unwrap_or(d.lock_file),
            log_dir,
        };
        (cfg, warnings)
    }

    /// Which external services have credentials. Booleans only, never values.
    pub fn configured_report() -> serde_json::Value {
        serde_json::json!({
            "openai": has_env("HELPME_OPENAI_API_KEY") || has_env("OPENAI_API_KEY") || has_env("HELPME_OPENAI_BASE_URL"),
            "google_cse": (has_env("HELPME_GOOGLE_API_KEY") || has_env("WEB_SEARCH_API_KEY"))
                && (has_env("HELPME_SEARCH_ENGINE_ID") || has_env("SEARCH_ENGINE_ID")),
            "brave": has_env("HELPME_BRAVE_API_KEY") || has_env("BRAVE_SEARCH_API_KEY"),
            "mapquest": has_env("HELPME_MAPQUEST_API_KEY") || has_env("MAPQUEST_API_KEY"),
        })
    }
}

/// Load `KEY=VALUE` lines from the file named by `HELPME_ENV_FILE`, if set.
///
/// Never overrides a variable already present in the process environment and never logs
/// values. Returns how many variables were set.
pub fn load_env_file_from_env() -> usize {
    match env("HELPME_ENV_FILE") {
        Some(p) => match std::fs::read_to_string(&p) {
            Ok(txt) => apply_env_lines(&txt),
            Err(_) => 0,
        },
        None => 0,
    }
}

fn apply_env_lines(txt: &str) -> usize {
    let mut n = 0;
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
            n += 1;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_offsets() {
        assert_eq!(parse_utc_offset("-06:00"), Some(-21600));
        assert_eq!(parse_utc_offset("+05:30"), Some(19800));
        assert_eq!(parse_utc_offset("3600"), Some(3600));
        assert_eq!(parse_utc_offset("-5"), Some(-5));
        assert_eq!(parse_utc_offset("+25:00"), None);
        assert_eq!(parse_utc_offset("central"), None);
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = AssistantConfig::default();
        assert_eq!(c.search_provider, "google");
        assert_eq!(c.max_search_results, 10);
        assert_eq!(c.reference_zone.label(), "America/Chicago");
        assert_eq!(c.fetch_timeout_ms, 10_000);
        assert_eq!(c.summarizer_timeout_ms, 30_000);
        assert_eq!(c.cache_capacity, 128);
    }

    #[test]
    fn bad_settings_become_warnings_not_log_lines() {
        // No other unit test goes through from_env.
        std::env::set_var("HELPME_TZ", "Atlantis/Lost_City");
        std::env::set_var("HELPME_CACHE_CAPACITY", "lots");
        let (c, warnings) = AssistantConfig::from_env();
        std::env::remove_var("HELPME_TZ");
        std::env::remove_var("HELPME_CACHE_CAPACITY");

        assert_eq!(c.reference_zone, ReferenceZone::default());
        assert_eq!(c.cache_capacity, 128);
        let keys: Vec<&str> = warnings.iter().map(|w| w.key).collect();
        assert!(keys.contains(&"HELPME_TZ"), "{keys:?}");
        assert!(keys.contains(&"HELPME_CACHE_CAPACITY"), "{keys:?}");
        assert!(warnings.iter().any(|w| w.value == "lots"));
    }

    #[test]
    fn env_lines_never_override() {
        std::env::set_var("HELPME_TEST_ENV_PRESET", "kept");
        let n = apply_env_lines(
            "# comment\n\nHELPME_TEST_ENV_PRESET=replaced\nHELPME_TEST_ENV_NEW = \"fresh\"\nnot a pair\n=orphan\n",
        );
        assert_eq!(n, 1);
        assert_eq!(std::env::var("HELPME_TEST_ENV_PRESET").unwrap(), "kept");
        assert_eq!(std::env::var("HELPME_TEST_ENV_NEW").unwrap(), "fresh");
    }
}
