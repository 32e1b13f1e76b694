use deepscout_core::{Error, ExtractedData, FetchOptions, PageContent, PageFetcher, Result};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;

pub mod cache;
pub mod config;
pub mod decode;
pub mod extract;
pub mod gemini;
pub mod limiter;
pub mod links;
pub mod llm;
pub mod ollama;
pub mod openai_compat;
pub mod retry;
pub mod search;

pub use cache::{DiskCache, PageCache};
pub use config::FetchSettings;
pub use limiter::RateLimiter;
pub use retry::RetryPolicy;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (iPad; CPU OS 14_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/93.0.4577.63 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:90.0) Gecko/20100101 Firefox/90.0",
];

/// A browser-like user agent, picked uniformly per request.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Shared HTTP client for page and search-engine fetches.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}

/// Fetches pages over HTTP, turns them into snippets, and caches the result per URL.
///
/// Implements [`PageFetcher`]: every failure (transport, non-2xx, undecodable body) is
/// logged and yields empty content, which is never cached.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: reqwest::Client,
    cache: Arc<PageCache>,
}

impl ContentFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let cache = if settings.cache_enabled {
            let c = PageCache::new(settings.cache_ttl);
            match &settings.cache_dir {
                Some(dir) => c.with_disk(DiskCache::new(dir.clone())),
                None => c,
            }
        } else {
            PageCache::disabled()
        };
        Ok(Self {
            client: http_client(settings.page_timeout)?,
            cache: Arc::new(cache),
        })
    }

    pub fn with_cache(client: reqwest::Client, cache: Arc<PageCache>) -> Self {
        Self { client, cache }
    }

    /// Same cache, different client (e.g. a shorter timeout for one-off lookups).
    pub fn with_client(&self, client: reqwest::Client) -> Self {
        Self {
            client,
            cache: self.cache.clone(),
        }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    async fn fetch_uncached(&self, url: &str, snippet_len: usize) -> Option<extract::ExtractedPage> {
        let resp = match self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(url, error = %e, "request error fetching page");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            match status {
                reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    tracing::info!(url, status = status.as_u16(), "page access throttled or forbidden");
                }
                _ => tracing::warn!(url, status = status.as_u16(), "failed to fetch page"),
            }
            return None;
        }
        tracing::debug!(url, status = status.as_u16(), "fetched page");

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(url, error = %e, "failed to read page body");
                return None;
            }
        };

        let ct = extract::content_type_lc_prefix(content_type.as_deref());
        if ct == "application/pdf" || extract::bytes_look_like_pdf(&bytes) {
            let owned = bytes.to_vec();
            let text = tokio::task::spawn_blocking(move || extract::pdf_to_text(&owned)).await;
            return match text {
                Ok(Ok(t)) if !t.trim().is_empty() => {
                    Some(extract::extract_plain(&t, url, snippet_len))
                }
                Ok(Ok(_)) => {
                    tracing::warn!(url, "pdf has no text layer");
                    None
                }
                Ok(Err(e)) => {
                    tracing::warn!(url, error = %e, "pdf extraction failed");
                    None
                }
                Err(e) => {
                    tracing::error!(url, error = %e, "pdf extraction task failed");
                    None
                }
            };
        }

        let (text, source) = decode::decode_body(&bytes, content_type.as_deref());
        tracing::debug!(url, ?source, "decoded page body");
        if text.trim().is_empty() {
            return None;
        }
        if ct == "text/plain" {
            return Some(extract::extract_plain(&text, url, snippet_len));
        }
        Some(extract::extract_page(&text, url, snippet_len))
    }
}

/// Keep only the extras the caller asked for.
fn project(mut content: PageContent, opts: &FetchOptions) -> PageContent {
    if !opts.extract_links {
        content.extracted.links = None;
    }
    if !opts.extract_emails {
        content.extracted.emails = None;
    }
    content
}

#[async_trait::async_trait]
impl PageFetcher for ContentFetcher {
    async fn fetch_page(&self, url: &str, opts: &FetchOptions) -> PageContent {
        if let Some(hit) = self.cache.get(url).await {
            return project(hit, opts);
        }

        let Some(page) = self.fetch_uncached(url, opts.snippet_len).await else {
            return PageContent::default();
        };
        let full = PageContent {
            snippets: vec![page.snippet],
            references: vec![url.to_string()],
            extracted: ExtractedData {
                links: Some(page.links),
                emails: Some(page.emails),
            },
        };
        self.cache.put(url, &full).await;
        project(full, opts)
    }
}
