use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("No results found")]
    NoResults,
    #[error("render failed: {0}")]
    Render(String),
}

impl Error {
    /// Errors worth another attempt under a retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Llm(_) | Error::Fetch(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-call knobs for the content fetcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum characters of page text kept in the snippet (title prefix excluded).
    pub snippet_len: usize,
    pub extract_links: bool,
    pub extract_emails: bool,
}

impl FetchOptions {
    pub fn snippet(snippet_len: usize) -> Self {
        Self {
            snippet_len,
            extract_links: false,
            extract_emails: false,
        }
    }
}

/// Optional per-page extras. Absent fields were not requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<String>>,
}

impl ExtractedData {
    pub fn is_empty(&self) -> bool {
        self.links.is_none() && self.emails.is_none()
    }
}

/// Result of fetching one URL. Empty on every failure path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageContent {
    pub snippets: Vec<String>,
    pub references: Vec<String>,
    pub extracted: ExtractedData,
}

impl PageContent {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

/// Extracted data tagged with the URL it came from (`{url, data}` on the wire).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedRecord {
    pub url: String,
    pub data: ExtractedData,
}

/// Output of one search -> fetch -> summarize pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationRecord {
    pub summaries: Vec<String>,
    pub references: Vec<String>,
    pub extracted: Vec<ExtractedRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineId {
    Google,
    DuckDuckGo,
    Bing,
    Yahoo,
    Brave,
    LinkedIn,
}

impl EngineId {
    pub const ALL: [EngineId; 6] = [
        EngineId::Google,
        EngineId::DuckDuckGo,
        EngineId::Bing,
        EngineId::Yahoo,
        EngineId::Brave,
        EngineId::LinkedIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::Google => "google",
            EngineId::DuckDuckGo => "duckduckgo",
            EngineId::Bing => "bing",
            EngineId::Yahoo => "yahoo",
            EngineId::Brave => "brave",
            EngineId::LinkedIn => "linkedin",
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(EngineId::Google),
            "duckduckgo" | "ddg" => Ok(EngineId::DuckDuckGo),
            "bing" => Ok(EngineId::Bing),
            "yahoo" => Ok(EngineId::Yahoo),
            "brave" => Ok(EngineId::Brave),
            "linkedin" => Ok(EngineId::LinkedIn),
            other => Err(Error::NotSupported(format!("unknown search engine: {other}"))),
        }
    }
}

/// Normalize a candidate URL: ensure a scheme, require a host, drop the query string.
///
/// Returns `None` for anything that does not look like an absolute web URL.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else if has_opaque_scheme(raw) {
        return None;
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{raw}")
    };
    let parsed = url::Url::parse(&with_scheme).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().filter(|h| !h.is_empty())?;
    let s = with_scheme.split('?').next().unwrap_or("").to_string();
    Some(s)
}

// `mailto:x`, `javascript:y` and friends; `host:8080/path` is not a scheme.
fn has_opaque_scheme(raw: &str) -> bool {
    let head = raw.split('/').next().unwrap_or("");
    match head.split_once(':') {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
                && !(rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty())
        }
        None => false,
    }
}

/// One search backend: query string in, candidate URLs out.
#[async_trait::async_trait]
pub trait SearchEngine: Send + Sync {
    fn id(&self) -> EngineId;
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

/// Retrieves a page and turns it into snippets. Never fails: errors yield empty content.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str, opts: &FetchOptions) -> PageContent;
}

/// A text-generation backend (prompt in, raw text out).
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    fn model(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}
