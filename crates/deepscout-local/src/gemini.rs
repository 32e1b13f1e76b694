//! Gemini text backend (Generative Language API, `generateContent`).

use crate::config::{env, env_any};
use deepscout_core::{Error, Result, TextGenerator};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub fn gemini_api_key_from_env() -> Option<String> {
    env_any(&["DEEPSCOUT_GEMINI_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"])
}

pub fn gemini_model_from_env() -> String {
    env("DEEPSCOUT_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

#[derive(Debug, Serialize)]
struct ReqPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct ReqContent {
    parts: Vec<ReqPart>,
}

#[derive(Debug, Serialize)]
struct GeminiReq {
    contents: Vec<ReqContent>,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Result<Self> {
        let key = gemini_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing DEEPSCOUT_GEMINI_API_KEY (or GEMINI_API_KEY)".to_string(),
            )
        })?;
        let model = model_override.unwrap_or_else(gemini_model_from_env);
        let mut c = Self::new(client, key, model);
        if let Some(base) = env("DEEPSCOUT_GEMINI_BASE_URL") {
            c.base_url = base;
        }
        Ok(c)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// `candidates[0].content.parts[*].text`, newline-joined.
fn candidate_text(v: &serde_json::Value) -> Option<String> {
    let parts = v
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    (!texts.is_empty()).then(|| texts.join("\n"))
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let req = GeminiReq {
            contents: vec![ReqContent {
                parts: vec![ReqPart {
                    text: prompt.to_string(),
                }],
            }],
        };
        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!("gemini generateContent HTTP {status}")));
        }
        let v: serde_json::Value = resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        candidate_text(&v).ok_or_else(|| Error::Llm("gemini returned no candidates".to_string()))
    }
}
