use crate::config::env;
use crate::limiter::{per_minute, RateLimiter};
use deepscout_core::{normalize_url, EngineId, Error, Result, SearchEngine};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

fn endpoint_from_env(id: EngineId) -> Option<String> {
    env(&format!(
        "DEEPSCOUT_{}_ENDPOINT",
        id.as_str().to_ascii_uppercase()
    ))
}

fn selector(css: &str) -> Option<html_scraper::Selector> {
    html_scraper::Selector::parse(css).ok()
}

/// Order-preserving dedupe of normalized URLs.
#[derive(Default)]
struct UrlCollector {
    seen: HashSet<String>,
    out: Vec<String>,
}

impl UrlCollector {
    fn push_raw(&mut self, raw: &str) {
        if let Some(u) = normalize_url(raw) {
            if self.seen.insert(u.clone()) {
                self.out.push(u);
            }
        }
    }

    fn finish(self) -> Vec<String> {
        self.out
    }
}

/// HTTP side shared by the scraping adapters: one GET per query against the engine's
/// result page.
#[derive(Debug, Clone)]
struct ResultPage {
    client: reqwest::Client,
    endpoint: String,
}

impl ResultPage {
    fn new(client: reqwest::Client, id: EngineId, default_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint_from_env(id).unwrap_or_else(|| default_endpoint.to_string()),
        }
    }

    /// Throttling (429/403) is logged and reported as an empty page; any other failure is
    /// an error for the registry to log.
    async fn fetch(&self, id: EngineId, params: &[(&str, &str)]) -> Result<String> {
        let url = url::Url::parse_with_params(&self.endpoint, params)
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::random_user_agent())
            .send()
            .await
            .map_err(|e| Error::Search(format!("{id}: {e}")))?;
        let status = resp.status();
        tracing::info!(engine = %id, status = status.as_u16(), "search status");
        match status {
            s if s.is_success() => {}
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                tracing::info!(engine = %id, "rate limit hit (429)");
                return Ok(String::new());
            }
            reqwest::StatusCode::FORBIDDEN => {
                tracing::info!(engine = %id, "access forbidden (403)");
                return Ok(String::new());
            }
            s => {
                return Err(Error::Search(format!(
                    "{id}: HTTP {}",
                    s.as_u16()
                )))
            }
        }
        resp.text()
            .await
            .map_err(|e| Error::Search(format!("{id}: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct GoogleSearch {
    page: ResultPage,
}

impl GoogleSearch {
    pub const DEFAULT_ENDPOINT: &'static str = "https://www.google.com/search";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            page: ResultPage::new(client, EngineId::Google, Self::DEFAULT_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.page.endpoint = endpoint.into();
        self
    }

    /// First link of each organic result block.
    pub fn parse_results(html: &str, _query: &str) -> Vec<String> {
        let (Some(block), Some(link)) = (selector("div.tF2Cxc"), selector("a[href]")) else {
            return Vec::new();
        };
        let doc = html_scraper::Html::parse_document(html);
        let mut urls = UrlCollector::default();
        for el in doc.select(&block) {
            if let Some(href) = el.select(&link).next().and_then(|a| a.value().attr("href")) {
                urls.push_raw(href);
            }
        }
        urls.finish()
    }
}

#[async_trait::async_trait]
impl SearchEngine for GoogleSearch {
    fn id(&self) -> EngineId {
        EngineId::Google
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let html = self
            .page
            .fetch(self.id(), &[("q", query), ("num", "20")])
            .await?;
        Ok(Self::parse_results(&html, query))
    }
}

#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    page: ResultPage,
}

impl DuckDuckGoSearch {
    pub const DEFAULT_ENDPOINT: &'static str = "https://html.duckduckgo.com/html/";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            page: ResultPage::new(client, EngineId::DuckDuckGo, Self::DEFAULT_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.page.endpoint = endpoint.into();
        self
    }

    // Result anchors point at `//duckduckgo.com/l/?uddg=<target>&rut=...`.
    fn unwrap_redirect(href: &str) -> Option<String> {
        let base = url::Url::parse("https://html.duckduckgo.com/").ok()?;
        let abs = base.join(href).ok()?;
        let target = abs
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
        Some(target.unwrap_or_else(|| abs.to_string()))
    }

    pub fn parse_results(html: &str, _query: &str) -> Vec<String> {
        let Some(sel) = selector("a.result__a[href]") else {
            return Vec::new();
        };
        let doc = html_scraper::Html::parse_document(html);
        let mut urls = UrlCollector::default();
        for a in doc.select(&sel) {
            if let Some(target) = a.value().attr("href").and_then(Self::unwrap_redirect) {
                urls.push_raw(&target);
            }
        }
        urls.finish()
    }
}

#[async_trait::async_trait]
impl SearchEngine for DuckDuckGoSearch {
    fn id(&self) -> EngineId {
        EngineId::DuckDuckGo
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let html = self.page.fetch(self.id(), &[("q", query)]).await?;
        Ok(Self::parse_results(&html, query))
    }
}

#[derive(Debug, Clone)]
pub struct BingSearch {
    page: ResultPage,
}

impl BingSearch {
    pub const DEFAULT_ENDPOINT: &'static str = "https://www.bing.com/search";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            page: ResultPage::new(client, EngineId::Bing, Self::DEFAULT_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.page.endpoint = endpoint.into();
        self
    }

    /// Every link inside an organic result item.
    pub fn parse_results(html: &str, _query: &str) -> Vec<String> {
        let Some(sel) = selector("li.b_algo a[href]") else {
            return Vec::new();
        };
        let doc = html_scraper::Html::parse_document(html);
        let mut urls = UrlCollector::default();
        for a in doc.select(&sel) {
            if let Some(href) = a.value().attr("href") {
                urls.push_raw(href);
            }
        }
        urls.finish()
    }
}

#[async_trait::async_trait]
impl SearchEngine for BingSearch {
    fn id(&self) -> EngineId {
        EngineId::Bing
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let html = self.page.fetch(self.id(), &[("q", query)]).await?;
        Ok(Self::parse_results(&html, query))
    }
}

fn yahoo_redirect_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/RU=(.*?)/RK=").expect("static yahoo redirect regex"))
}

#[derive(Debug, Clone)]
pub struct YahooSearch {
    page: ResultPage,
}

impl YahooSearch {
    pub const DEFAULT_ENDPOINT: &'static str = "https://search.yahoo.com/search";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            page: ResultPage::new(client, EngineId::Yahoo, Self::DEFAULT_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.page.endpoint = endpoint.into();
        self
    }

    fn unwrap_redirect(href: &str) -> String {
        match yahoo_redirect_re().captures(href).and_then(|c| c.get(1)) {
            Some(m) => percent_decode_str(m.as_str()).decode_utf8_lossy().into_owned(),
            None => href.to_string(),
        }
    }

    pub fn parse_results(html: &str, _query: &str) -> Vec<String> {
        let Some(sel) = selector(r#"div[class^="dd"] a[href]"#) else {
            return Vec::new();
        };
        let doc = html_scraper::Html::parse_document(html);
        let mut urls = UrlCollector::default();
        for a in doc.select(&sel) {
            if let Some(href) = a.value().attr("href") {
                urls.push_raw(&Self::unwrap_redirect(href));
            }
        }
        urls.finish()
    }
}

#[async_trait::async_trait]
impl SearchEngine for YahooSearch {
    fn id(&self) -> EngineId {
        EngineId::Yahoo
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let html = self.page.fetch(self.id(), &[("p", query)]).await?;
        Ok(Self::parse_results(&html, query))
    }
}

#[derive(Debug, Clone)]
pub struct BraveSearch {
    page: ResultPage,
}

impl BraveSearch {
    pub const DEFAULT_ENDPOINT: &'static str = "https://search.brave.com/search";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            page: ResultPage::new(client, EngineId::Brave, Self::DEFAULT_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.page.endpoint = endpoint.into();
        self
    }

    pub fn parse_results(html: &str, _query: &str) -> Vec<String> {
        let Some(sel) = selector("a.result-title[href]") else {
            return Vec::new();
        };
        let doc = html_scraper::Html::parse_document(html);
        let mut urls = UrlCollector::default();
        for a in doc.select(&sel) {
            if let Some(href) = a.value().attr("href") {
                urls.push_raw(href);
            }
        }
        urls.finish()
    }
}

#[async_trait::async_trait]
impl SearchEngine for BraveSearch {
    fn id(&self) -> EngineId {
        EngineId::Brave
    }

    // Brotli bodies are decoded by the client.
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let html = self.page.fetch(self.id(), &[("q", query)]).await?;
        Ok(Self::parse_results(&html, query))
    }
}

#[derive(Debug, Clone)]
pub struct LinkedInSearch {
    page: ResultPage,
}

impl LinkedInSearch {
    pub const DEFAULT_ENDPOINT: &'static str = "https://www.linkedin.com/search/results/all/";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            page: ResultPage::new(client, EngineId::LinkedIn, Self::DEFAULT_ENDPOINT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.page.endpoint = endpoint.into();
        self
    }

    /// Company named in a `"<who> at <company>"` query, lowercased.
    fn company_context(query: &str) -> Option<String> {
        let q = query.to_lowercase();
        let company = q.split(" at ").nth(1)?.trim().to_string();
        (!company.is_empty()).then_some(company)
    }

    /// Profile (`/in/`) links only. With a company context, the card's name/subtitle text
    /// must mention the company.
    pub fn parse_results(html: &str, query: &str) -> Vec<String> {
        let (Some(card), Some(link), Some(name), Some(subtitle)) = (
            selector("div.entity-result__item"),
            selector("a.app-aware-link[href]"),
            selector("span.entity-result__title-text"),
            selector("div.entity-result__primary-subtitle"),
        ) else {
            return Vec::new();
        };
        let company = Self::company_context(query);
        let doc = html_scraper::Html::parse_document(html);
        let mut urls = UrlCollector::default();
        for el in doc.select(&card) {
            let Some(href) = el.select(&link).next().and_then(|a| a.value().attr("href")) else {
                continue;
            };
            let Some(profile) = normalize_url(href) else {
                continue;
            };
            if !profile.contains("/in/") {
                continue;
            }
            if let Some(company) = &company {
                let mut text = String::new();
                for part in el.select(&name).chain(el.select(&subtitle)) {
                    text.push_str(&part.text().collect::<String>().trim().to_lowercase());
                    text.push(' ');
                }
                if !text.contains(company.as_str()) {
                    continue;
                }
            }
            urls.push_raw(&profile);
        }
        urls.finish()
    }
}

#[async_trait::async_trait]
impl SearchEngine for LinkedInSearch {
    fn id(&self) -> EngineId {
        EngineId::LinkedIn
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let html = self.page.fetch(self.id(), &[("keywords", query)]).await?;
        Ok(Self::parse_results(&html, query))
    }
}

/// The same requests-per-minute budget for every engine. Zero means unlimited.
pub fn search_rate_limits(requests_per_minute: u32) -> RateLimiter {
    let limiter = RateLimiter::new();
    for id in EngineId::ALL {
        limiter.set_limit(id.as_str(), per_minute(requests_per_minute));
    }
    limiter
}

/// Engine id -> adapter. Adding a backend means registering one more adapter.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    engines: HashMap<EngineId, Arc<dyn SearchEngine>>,
    limiter: Option<Arc<RateLimiter>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All six scraping adapters sharing one client.
    pub fn with_defaults(client: reqwest::Client) -> Self {
        let mut r = Self::new();
        r.register(Arc::new(GoogleSearch::new(client.clone())));
        r.register(Arc::new(DuckDuckGoSearch::new(client.clone())));
        r.register(Arc::new(BingSearch::new(client.clone())));
        r.register(Arc::new(YahooSearch::new(client.clone())));
        r.register(Arc::new(BraveSearch::new(client.clone())));
        r.register(Arc::new(LinkedInSearch::new(client)));
        r
    }

    /// Gate each adapter call on the limiter, keyed by engine name.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn register(&mut self, engine: Arc<dyn SearchEngine>) {
        self.engines.insert(engine.id(), engine);
    }

    pub fn get(&self, id: EngineId) -> Option<Arc<dyn SearchEngine>> {
        self.engines.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<EngineId> {
        let mut ids: Vec<_> = self.engines.keys().copied().collect();
        ids.sort();
        ids
    }

    fn resolve(&self, names: &[String]) -> Vec<Arc<dyn SearchEngine>> {
        let mut picked = BTreeSet::new();
        for name in names {
            match name.parse::<EngineId>() {
                Ok(id) if self.engines.contains_key(&id) => {
                    picked.insert(id);
                }
                Ok(id) => tracing::warn!(engine = %id, "search engine not registered"),
                Err(_) => tracing::warn!(engine = %name, "unknown search engine"),
            }
        }
        picked.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Run the named adapters concurrently and union their results.
    ///
    /// A failing adapter is logged and contributes nothing.
    pub async fn search_all(&self, query: &str, engines: &[String]) -> BTreeSet<String> {
        let selected = self.resolve(engines);
        let calls = selected.into_iter().map(|engine| {
            let limiter = self.limiter.clone();
            async move {
                let id = engine.id();
                if let Some(l) = &limiter {
                    l.acquire(id.as_str()).await;
                }
                match engine.search(query).await {
                    Ok(urls) => {
                        tracing::info!(engine = %id, count = urls.len(), "search results");
                        urls
                    }
                    Err(e) => {
                        tracing::error!(engine = %id, error = %e, "search failed");
                        Vec::new()
                    }
                }
            }
        });
        let results = futures::future::join_all(calls).await;
        let out: BTreeSet<String> = results.into_iter().flatten().collect();
        tracing::debug!(query, urls = ?out, "combined search results");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, routing::get, Router};
    use std::time::Duration;

    #[test]
    fn google_takes_first_link_per_result() {
        let html = r#"
            <div class="g"><div class="tF2Cxc">
              <a href="https://example.com/a?utm=1">A</a>
              <a href="https://webcache.example/a">cached</a>
            </div></div>
            <div class="tF2Cxc"><a href="https://example.org/b">B</a></div>
            <div class="other"><a href="https://ads.example/x">ad</a></div>"#;
        assert_eq!(
            GoogleSearch::parse_results(html, "q"),
            vec!["https://example.com/a", "https://example.org/b"]
        );
    }

    #[test]
    fn duckduckgo_unwraps_redirects() {
        let html = r#"
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage%3Fx%3D1&rut=abc">r</a>
            <a class="result__a" href="https://direct.example/p">d</a>
            <a class="result__snippet" href="https://snippet.example/">s</a>"#;
        assert_eq!(
            DuckDuckGoSearch::parse_results(html, "q"),
            vec!["https://example.com/page", "https://direct.example/p"]
        );
    }

    #[test]
    fn bing_collects_all_links_in_result_items() {
        let html = r#"<ol>
            <li class="b_algo"><h2><a href="https://one.example/">1</a></h2>
              <a href="https://one.example/deep">deep</a></li>
            <li class="b_ad"><a href="https://ad.example/">ad</a></li>
            <li class="b_algo"><a href="https://one.example/">dup</a></li></ol>"#;
        assert_eq!(
            BingSearch::parse_results(html, "q"),
            vec!["https://one.example/", "https://one.example/deep"]
        );
    }

    #[test]
    fn yahoo_decodes_ru_redirects() {
        let html = r#"<div class="dd algo">
            <a href="https://r.search.yahoo.com/_ylt=x/RU=https%3a%2f%2fexample.net%2fdoc/RK=2/RS=y">t</a>
            </div>
            <div class="ddx"><a href="example.org/plain">p</a></div>
            <div class="compText"><a href="https://skip.example/">s</a></div>"#;
        assert_eq!(
            YahooSearch::parse_results(html, "q"),
            vec!["https://example.net/doc", "https://example.org/plain"]
        );
    }

    #[test]
    fn brave_reads_result_titles() {
        let html = r#"<a class="result-title svelte" href="https://brave.example/r">r</a>
            <a class="nav" href="https://nav.example/">n</a>"#;
        assert_eq!(
            BraveSearch::parse_results(html, "q"),
            vec!["https://brave.example/r"]
        );
    }

    const LINKEDIN_HTML: &str = r#"
        <div class="entity-result__item">
          <a class="app-aware-link" href="https://www.linkedin.com/in/jane?trk=x">Jane</a>
          <span class="entity-result__title-text">Jane Doe</span>
          <div class="entity-result__primary-subtitle">Engineer at Acme</div>
        </div>
        <div class="entity-result__item">
          <a class="app-aware-link" href="https://www.linkedin.com/in/john">John</a>
          <span class="entity-result__title-text">John Roe</span>
          <div class="entity-result__primary-subtitle">Chef at Bistro</div>
        </div>
        <div class="entity-result__item">
          <a class="app-aware-link" href="https://www.linkedin.com/company/acme">Acme</a>
        </div>"#;

    #[test]
    fn linkedin_keeps_profiles_only() {
        assert_eq!(
            LinkedInSearch::parse_results(LINKEDIN_HTML, "engineers"),
            vec![
                "https://www.linkedin.com/in/jane",
                "https://www.linkedin.com/in/john"
            ]
        );
    }

    #[test]
    fn linkedin_filters_on_company_context() {
        assert_eq!(
            LinkedInSearch::parse_results(LINKEDIN_HTML, "Engineer at ACME"),
            vec!["https://www.linkedin.com/in/jane"]
        );
    }

    #[test]
    fn drifted_markup_degrades_to_no_results() {
        let html = "<html><body><p>nothing recognizable</p></body></html>";
        assert!(GoogleSearch::parse_results(html, "q").is_empty());
        assert!(DuckDuckGoSearch::parse_results(html, "q").is_empty());
        assert!(LinkedInSearch::parse_results("", "q").is_empty());
    }

    struct Fixed(EngineId, Vec<&'static str>);

    #[async_trait::async_trait]
    impl SearchEngine for Fixed {
        fn id(&self) -> EngineId {
            self.0
        }

        async fn search(&self, _query: &str) -> Result<Vec<String>> {
            Ok(self.1.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Broken(EngineId);

    #[async_trait::async_trait]
    impl SearchEngine for Broken {
        fn id(&self) -> EngineId {
            self.0
        }

        async fn search(&self, _query: &str) -> Result<Vec<String>> {
            Err(Error::Search("boom".into()))
        }
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn urls_from_several_engines_are_deduplicated() {
        let mut r = EngineRegistry::new();
        r.register(Arc::new(Fixed(
            EngineId::Google,
            vec!["https://a.example/", "https://b.example/"],
        )));
        r.register(Arc::new(Fixed(
            EngineId::Bing,
            vec!["https://b.example/", "https://c.example/"],
        )));
        let out = r.search_all("q", &names(&["google", "bing"])).await;
        assert_eq!(
            out.into_iter().collect::<Vec<_>>(),
            vec![
                "https://a.example/",
                "https://b.example/",
                "https://c.example/"
            ]
        );
    }

    #[tokio::test]
    async fn failures_and_unknown_names_are_isolated() {
        let mut r = EngineRegistry::new();
        r.register(Arc::new(Broken(EngineId::Yahoo)));
        r.register(Arc::new(Fixed(EngineId::Brave, vec!["https://ok.example/"])));
        let out = r
            .search_all("q", &names(&["yahoo", "brave", "altavista", "bing"]))
            .await;
        assert_eq!(out.len(), 1);
        assert!(out.contains("https://ok.example/"));
    }

    #[tokio::test(start_paused = true)]
    async fn limited_engines_are_spaced_between_searches() {
        let mut r = EngineRegistry::new();
        r.register(Arc::new(Fixed(EngineId::Google, vec!["https://a.example/"])));
        let r = r.with_limiter(Arc::new(search_rate_limits(60)));

        let start = tokio::time::Instant::now();
        r.search_all("q", &names(&["google"])).await;
        assert!(start.elapsed() < Duration::from_millis(10));
        r.search_all("q", &names(&["google"])).await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn zero_budget_means_unlimited() {
        let l = search_rate_limits(0);
        assert_eq!(l.limit_for("google"), None);
        assert_eq!(search_rate_limits(30).limit_for("bing"), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn empty_engine_list_yields_nothing() {
        let r = EngineRegistry::with_defaults(reqwest::Client::new());
        assert_eq!(r.ids().len(), 6);
        assert!(r.search_all("q", &[]).await.is_empty());
    }

    async fn serve(app: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn adapter_sends_query_and_parses_the_page() {
        let app = Router::new().route(
            "/search",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let term = q.get("q").cloned().unwrap_or_default();
                let num = q.get("num").cloned().unwrap_or_default();
                axum::response::Html(format!(
                    r#"<div class="tF2Cxc"><a href="https://hit.example/{}/{}">x</a></div>"#,
                    term.replace(' ', "-"),
                    num
                ))
            }),
        );
        let addr = serve(app).await;
        let g = GoogleSearch::new(crate::http_client(Duration::from_secs(5)).unwrap())
            .with_endpoint(format!("http://{addr}/search"));
        let urls = g.search("rust async").await.unwrap();
        assert_eq!(urls, vec!["https://hit.example/rust-async/20"]);
    }

    #[tokio::test]
    async fn throttled_engine_returns_zero_results() {
        let app = Router::new().route("/", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let addr = serve(app).await;
        let b = BraveSearch::new(crate::http_client(Duration::from_secs(5)).unwrap())
            .with_endpoint(format!("http://{addr}/"));
        assert!(b.search("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_errors_surface_as_search_errors() {
        let app = Router::new().route("/", get(|| async { StatusCode::BAD_GATEWAY }));
        let addr = serve(app).await;
        let b = BingSearch::new(crate::http_client(Duration::from_secs(5)).unwrap())
            .with_endpoint(format!("http://{addr}/"));
        assert!(matches!(b.search("q").await, Err(Error::Search(_))));
    }
}
