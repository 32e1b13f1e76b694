use crate::config::{disk_cache_dir_from_env, ResearchConfig};
use crate::render::render_pdf;
use crate::report::{self, OutputFormat};
use crate::research::{ResearchRequest, Researcher};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use deepscout_core::{ExtractedRecord, FetchOptions, PageFetcher};
use deepscout_local::llm::{backend_from_env, default_rate_limits, LlmService};
use deepscout_local::search::{search_rate_limits, EngineRegistry};
use deepscout_local::{http_client, ContentFetcher, FetchSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Client timeout for model calls; backends set tighter per-request limits.
const LLM_CLIENT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("No results found")]
    NotFound,
    #[error("{0}")]
    Internal(String),
}

impl From<deepscout_core::Error> for ApiError {
    fn from(e: deepscout_core::Error) -> Self {
        match e {
            deepscout_core::Error::NoResults => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Long-lived handles shared by every request.
pub struct AppState {
    pub registry: Arc<EngineRegistry>,
    pub fetcher: Arc<dyn PageFetcher>,
    /// Fetcher for single-page lookups (`/api/summarize_website`).
    pub lookup_fetcher: Arc<dyn PageFetcher>,
    pub llm: LlmService,
    pub config: ResearchConfig,
}

impl AppState {
    pub fn new(
        registry: Arc<EngineRegistry>,
        fetcher: Arc<dyn PageFetcher>,
        llm: LlmService,
        config: ResearchConfig,
    ) -> Self {
        Self {
            registry,
            lookup_fetcher: fetcher.clone(),
            fetcher,
            llm,
            config,
        }
    }

    pub fn with_lookup_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.lookup_fetcher = fetcher;
        self
    }

    /// Wire the real adapters, fetcher and model backend from `DEEPSCOUT_*` settings.
    pub fn from_env(model_override: Option<String>) -> deepscout_core::Result<Self> {
        let mut settings = FetchSettings::from_env();
        if settings.cache_enabled && settings.cache_dir.is_none() {
            settings.cache_dir = disk_cache_dir_from_env();
        }
        let fetcher = ContentFetcher::new(&settings)?;
        let lookup_fetcher = fetcher.with_client(http_client(settings.aux_timeout)?);
        let registry = EngineRegistry::with_defaults(http_client(settings.search_timeout)?)
            .with_limiter(Arc::new(search_rate_limits(settings.search_rpm)));
        let backend = backend_from_env(http_client(LLM_CLIENT_TIMEOUT)?, model_override)?;
        let llm = LlmService::new(backend, Arc::new(default_rate_limits()));
        tracing::info!(
            backend = llm.backend_name(),
            model = llm.model(),
            cache_dir = ?settings.cache_dir,
            search_rpm = settings.search_rpm,
            "service configured"
        );
        Ok(Self::new(
            Arc::new(registry),
            Arc::new(fetcher),
            llm,
            ResearchConfig::from_env(),
        )
        .with_lookup_fetcher(Arc::new(lookup_fetcher)))
    }

    /// A fresh orchestrator (and worker pool) for one request.
    pub fn researcher(&self) -> Researcher {
        Researcher::new(
            self.registry.clone(),
            self.fetcher.clone(),
            self.llm.clone(),
            self.config.clone(),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResearchBody {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub search_engines: Option<Vec<String>>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub extract_links: bool,
    #[serde(default)]
    pub extract_emails: bool,
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub download_pdf: Option<bool>,
}

impl ResearchBody {
    fn query(&self) -> Result<&str, ApiError> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ApiError::BadRequest("No query provided".to_string()))
    }

    fn engines(&self, config: &ResearchConfig) -> Vec<String> {
        self.search_engines
            .clone()
            .unwrap_or_else(|| config.default_engines.clone())
    }
}

#[derive(Debug, Serialize)]
pub struct ResearchResponse {
    pub explanation: serde_json::Value,
    pub references: Vec<String>,
    pub elapsed_time: String,
    pub extracted_data: Vec<ExtractedRecord>,
    pub current_query: String,
    pub iteration: usize,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeBody {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PdfBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

/// `attachment` disposition; the name is form-encoded so it is always a valid header.
fn attachment(name_stem: &str, suffix: &str) -> Result<HeaderValue, ApiError> {
    let stem: String = url::form_urlencoded::byte_serialize(name_stem.as_bytes()).collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{stem}{suffix}\""))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn pdf_response(bytes: Vec<u8>, disposition: HeaderValue) -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

async fn deep_research(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResearchBody>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let query = body.query()?;
    let format = OutputFormat::parse(body.output_format.as_deref().unwrap_or("markdown"));
    let researcher = state.researcher();
    let request = ResearchRequest {
        query: query.to_string(),
        engines: body.engines(&state.config),
        max_iterations: state.config.iterations(body.max_iterations),
        fetch: FetchOptions {
            snippet_len: state.config.deep_snippet_len,
            extract_links: body.extract_links,
            extract_emails: body.extract_emails,
        },
    };
    tracing::info!(query, format = format.as_str(), "deep research");

    let outcome = researcher.run(&request).await?;
    let explanation =
        report::synthesize(researcher.llm(), query, &format, &outcome.summaries).await?;

    if body.download_pdf.unwrap_or(true) {
        let text = explanation.to_document_text();
        let references = outcome.references.clone();
        let bytes = tokio::task::spawn_blocking(move || render_pdf("", &text, &references, today()))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;
        return Ok(pdf_response(bytes, attachment(query, "_report.pdf")?));
    }

    let response = ResearchResponse {
        explanation: report::shape_explanation(&format, &explanation)?,
        references: outcome.references,
        elapsed_time: format!("{:.2} seconds", started.elapsed().as_secs_f64()),
        extracted_data: outcome.extracted,
        current_query: outcome.current_query,
        iteration: outcome.iterations,
    };
    Ok(Json(response).into_response())
}

async fn online(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResearchBody>,
) -> Result<Json<crate::research::OnlineAnswer>, ApiError> {
    let query = body.query()?;
    let answer = state
        .researcher()
        .online(query, &body.engines(&state.config))
        .await?;
    Ok(Json(answer))
}

async fn summarize_website(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SummarizeBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let url = body
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No URL provided".to_string()))?;
    let researcher = Researcher::new(
        state.registry.clone(),
        state.lookup_fetcher.clone(),
        state.llm.clone(),
        state.config.clone(),
    );
    match researcher.summarize_website(url).await {
        Ok(Some(summary)) => Ok(Json(serde_json::json!({ "summary": summary }))),
        Ok(None) => Err(ApiError::BadRequest(
            "Could not fetch website content".to_string(),
        )),
        Err(e) => {
            tracing::error!(url, error = %e, "website summarization failed");
            Err(ApiError::Internal("Website summarization failed.".to_string()))
        }
    }
}

async fn generate_pdf(Json(body): Json<PdfBody>) -> Result<Response, ApiError> {
    let content = body
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No content provided".to_string()))?;
    let title = body
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Research Report".to_string());
    let disposition = attachment(&title.replace(' ', "_"), "_Report.pdf")?;
    let links = body.links;
    let bytes = tokio::task::spawn_blocking(move || render_pdf(&title, &content, &links, today()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(pdf_response(bytes, disposition))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "backend": state.llm.backend_name(),
        "model": state.llm.model(),
        "engines": state.registry.ids().iter().map(|id| id.as_str()).collect::<Vec<_>>(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/deep_research", post(deep_research))
        .route("/api/online", post(online))
        .route("/api/summarize_website", post(summarize_website))
        .route("/api/generate_pdf", post(generate_pdf))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, bind: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_form_encoded() {
        let v = attachment("rust async & tokio", "_report.pdf").unwrap();
        assert_eq!(
            v.to_str().unwrap(),
            "attachment; filename=\"rust+async+%26+tokio_report.pdf\""
        );
    }

    #[test]
    fn no_results_maps_to_404_detail() {
        let resp = ApiError::from(deepscout_core::Error::NoResults).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = ApiError::from(deepscout_core::Error::Llm("boom".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_or_blank_query_is_rejected() {
        let body = ResearchBody {
            query: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(body.query(), Err(ApiError::BadRequest(_))));
        assert!(ResearchBody::default().query().is_err());
    }
}
