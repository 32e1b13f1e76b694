use crate::config::env;
use crate::gemini::GeminiClient;
use crate::limiter::{per_minute, RateLimiter};
use crate::ollama::OllamaClient;
use crate::openai_compat::OpenAiCompatClient;
use crate::retry::RetryPolicy;
use deepscout_core::{Error, Result, TextGenerator};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};

/// How the caller wants the model's reply interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// A post-processed model reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Generated {
    Text(String),
    Json(serde_json::Value),
    Rows(Vec<Vec<String>>),
    /// Structured output was requested but the reply did not parse.
    Malformed { error: String, raw_text: String },
}

impl Generated {
    pub fn malformed(error: &str, raw_text: &str) -> Self {
        Generated::Malformed {
            error: error.to_string(),
            raw_text: raw_text.to_string(),
        }
    }
}

fn space_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"  +").expect("static space regex"))
}

fn json_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```json\n?|```|[\s]*//.*|[\s]*/\*[\s\S]*?\*/[\s]*")
            .expect("static json cleanup regex")
    })
}

fn json_fences() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```json\n?|```").expect("static json fence regex"))
}

/// Normalize a markdown reply: no code fences, single spaces, one blank line between
/// lines. Consecutive table rows stay adjacent so the table survives.
pub fn clean_markdown(raw: &str) -> String {
    let unfenced = raw.replace("```markdown", "").replace("```", "");
    let mut out = String::with_capacity(unfenced.len());
    let mut prev_row = false;
    for line in unfenced.split('\n').filter(|l| !l.is_empty()) {
        let line = space_runs().replace_all(line, " ");
        let row = line.trim_start().starts_with('|');
        if !out.is_empty() {
            out.push_str(if row && prev_row { "\n" } else { "\n\n" });
        }
        out.push_str(&line);
        prev_row = row;
    }
    out.trim().to_string()
}

/// Parse a JSON reply, tolerating code fences and comment lines.
///
/// Fences are stripped first; comment stripping only runs if that is not enough, since it
/// also eats `//` inside string values.
pub fn parse_json_reply(raw: &str) -> Generated {
    let fenced = json_fences().replace_all(raw, "");
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(fenced.trim()) {
        return Generated::Json(v);
    }
    let cleaned = json_noise().replace_all(raw, "");
    match serde_json::from_str::<serde_json::Value>(cleaned.trim()) {
        Ok(v) => Generated::Json(v),
        Err(e) => {
            tracing::warn!(error = %e, "invalid JSON, returning raw text");
            Generated::malformed("Invalid JSON", raw)
        }
    }
}

pub fn parse_csv_reply(raw: &str) -> Generated {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());
    let mut rows = Vec::new();
    for rec in rdr.records() {
        match rec {
            Ok(r) => rows.push(r.iter().map(|c| c.to_string()).collect()),
            Err(e) => {
                tracing::warn!(error = %e, "invalid CSV, returning raw text");
                return Generated::malformed("Invalid CSV", raw);
            }
        }
    }
    Generated::Rows(rows)
}

pub fn postprocess(raw: &str, format: ResponseFormat) -> Generated {
    match format {
        ResponseFormat::Text => Generated::Text(clean_markdown(raw)),
        ResponseFormat::Json => parse_json_reply(raw),
        ResponseFormat::Csv => parse_csv_reply(raw),
    }
}

/// Known per-model request budgets.
pub fn default_rate_limits() -> RateLimiter {
    RateLimiter::new()
        .with_limit("gemini-2.0-flash", per_minute(15))
        .with_limit("gemini-2.0-flash-thinking-exp-01-21", per_minute(10))
}

/// A text generator wrapped with rate limiting, retry and reply post-processing.
#[derive(Clone)]
pub struct LlmService {
    backend: Arc<dyn TextGenerator>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl LlmService {
    pub fn new(backend: Arc<dyn TextGenerator>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            backend,
            limiter,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Raw reply. Each attempt waits for the model's rate-limit slot.
    pub async fn generate_raw(&self, prompt: &str) -> Result<String> {
        let backend = &self.backend;
        let limiter = &self.limiter;
        let model = backend.model();
        self.retry
            .run("llm.generate", || async move {
                limiter.acquire(model).await;
                backend.generate(prompt).await
            })
            .await
    }

    pub async fn generate(&self, prompt: &str, format: ResponseFormat) -> Result<Generated> {
        let raw = self.generate_raw(prompt).await?;
        Ok(postprocess(&raw, format))
    }

    /// Markdown-cleaned text reply.
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let raw = self.generate_raw(prompt).await?;
        Ok(clean_markdown(&raw))
    }

    /// Free-form rephrasings of `query`, one per non-empty line. Failures yield none.
    pub async fn alternative_queries(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            "Suggest 3 refined search queries for '{query}', optimizing for broad and effective web results."
        );
        match self.generate_raw(&prompt).await {
            Ok(reply) => reply
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "error generating alternative queries");
                Vec::new()
            }
        }
    }
}

/// Pick a backend from `DEEPSCOUT_LLM_BACKEND` (`gemini` by default, `openai_compat`, `ollama`).
pub fn backend_from_env(
    client: reqwest::Client,
    model_override: Option<String>,
) -> Result<Arc<dyn TextGenerator>> {
    let which = env("DEEPSCOUT_LLM_BACKEND").unwrap_or_else(|| "gemini".to_string());
    match which.to_ascii_lowercase().as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::from_env(client, model_override)?)),
        "openai_compat" | "openai" => {
            Ok(Arc::new(OpenAiCompatClient::from_env(client, model_override)?))
        }
        "ollama" => Ok(Arc::new(OllamaClient::from_env(client, model_override)?)),
        other => Err(Error::NotSupported(format!("unknown llm backend: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails `failures` times, then echoes the prompt.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TextGenerator for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn model(&self) -> &str {
            "gemini-2.0-flash"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(Error::Llm(format!("attempt {n} failed")))
            } else {
                Ok(prompt.to_string())
            }
        }
    }

    fn service(failures: usize) -> (LlmService, Arc<Flaky>) {
        let backend = Arc::new(Flaky {
            failures,
            calls: AtomicUsize::new(0),
        });
        let svc = LlmService::new(backend.clone(), Arc::new(RateLimiter::new()))
            .with_retry(RetryPolicy::immediate(3));
        (svc, backend)
    }

    #[test]
    fn markdown_is_normalized() {
        let raw = "```markdown\n# Title\n\n\n\nSome   text  here\n```";
        assert_eq!(clean_markdown(raw), "# Title\n\nSome text here");
    }

    #[test]
    fn table_rows_stay_adjacent() {
        let raw = "Intro\n| A | B |\n|---|---|\n\n| 1 | 2 |\nOutro";
        assert_eq!(
            clean_markdown(raw),
            "Intro\n\n| A | B |\n|---|---|\n| 1 | 2 |\n\nOutro"
        );
    }

    #[test]
    fn json_fences_and_comments_are_tolerated() {
        let raw = "```json\n{\"a\": 1, // note\n \"b\": 2}\n```";
        assert_eq!(
            parse_json_reply(raw),
            Generated::Json(serde_json::json!({"a": 1, "b": 2}))
        );

        let raw = "```json\n{\"url\": \"https://x.example/\"}\n```";
        assert_eq!(
            parse_json_reply(raw),
            Generated::Json(serde_json::json!({"url": "https://x.example/"}))
        );

        let raw = "{\"a\": 1 /* inline */}";
        assert_eq!(
            parse_json_reply(raw),
            Generated::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn invalid_json_carries_raw_text() {
        match parse_json_reply("not json at all") {
            Generated::Malformed { error, raw_text } => {
                assert_eq!(error, "Invalid JSON");
                assert_eq!(raw_text, "not json at all");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn csv_rows_are_ragged_tolerant() {
        assert_eq!(
            parse_csv_reply("a,b\n1,\"x, y\",3\n"),
            Generated::Rows(vec![
                vec!["a".into(), "b".into()],
                vec!["1".into(), "x, y".into(), "3".into()],
            ])
        );
    }

    #[test]
    fn malformed_serializes_as_error_object() {
        let v = serde_json::to_value(Generated::malformed("Invalid CSV", "raw")).unwrap();
        assert_eq!(v, serde_json::json!({"error": "Invalid CSV", "raw_text": "raw"}));
    }

    #[tokio::test]
    async fn two_failures_then_success_is_invisible_to_the_caller() {
        let (svc, backend) = service(2);
        let out = svc.generate("hello", ResponseFormat::Text).await.unwrap();
        assert_eq!(out, Generated::Text("hello".into()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn three_failures_propagate() {
        let (svc, backend) = service(3);
        assert!(matches!(svc.generate_raw("x").await, Err(Error::Llm(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn alternative_queries_are_trimmed_lines_or_empty_on_failure() {
        let (svc, _) = service(0);
        let alts = svc.alternative_queries("rust").await;
        assert_eq!(
            alts,
            vec!["Suggest 3 refined search queries for 'rust', optimizing for broad and effective web results."]
        );

        let (svc, _) = service(10);
        assert!(svc.alternative_queries("rust").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_spaced_by_the_model_limit() {
        let backend = Arc::new(Flaky {
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let svc = LlmService::new(backend, Arc::new(default_rate_limits()));
        let start = tokio::time::Instant::now();
        svc.generate_raw("a").await.unwrap();
        svc.generate_raw("b").await.unwrap();
        svc.generate_raw("c").await.unwrap();
        // 15 rpm -> 4s spacing; the first call is free.
        assert!(start.elapsed() >= Duration::from_secs(8));
    }
}
