use std::time::Duration;

pub fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env(key).and_then(|s| s.parse::<T>().ok())
}

pub fn env_bool(key: &str) -> Option<bool> {
    env(key).map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// First non-empty value among `keys`.
pub(crate) fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env(k))
}

/// Knobs for page fetching and caching.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub page_timeout: Duration,
    pub search_timeout: Duration,
    /// Single-page lookups outside the research loop.
    pub aux_timeout: Duration,
    /// Per-engine search budget; 0 disables throttling.
    pub search_rpm: u32,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_dir: Option<std::path::PathBuf>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(60),
            search_timeout: Duration::from_secs(60),
            aux_timeout: Duration::from_secs(10),
            search_rpm: 30,
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
            cache_dir: None,
        }
    }
}

impl FetchSettings {
    /// Defaults overridden by `DEEPSCOUT_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            page_timeout: env_parse("DEEPSCOUT_REQUEST_TIMEOUT_S")
                .map(Duration::from_secs)
                .unwrap_or(d.page_timeout),
            search_timeout: env_parse("DEEPSCOUT_SEARCH_TIMEOUT_S")
                .map(Duration::from_secs)
                .unwrap_or(d.search_timeout),
            aux_timeout: env_parse("DEEPSCOUT_AUX_TIMEOUT_S")
                .map(Duration::from_secs)
                .unwrap_or(d.aux_timeout),
            search_rpm: env_parse("DEEPSCOUT_SEARCH_RPM").unwrap_or(d.search_rpm),
            cache_enabled: env_bool("DEEPSCOUT_CACHE_ENABLED").unwrap_or(d.cache_enabled),
            cache_ttl: env_parse("DEEPSCOUT_CACHE_TTL_S")
                .map(Duration::from_secs)
                .unwrap_or(d.cache_ttl),
            cache_dir: env("DEEPSCOUT_CACHE_DIR").map(std::path::PathBuf::from),
        }
    }
}
