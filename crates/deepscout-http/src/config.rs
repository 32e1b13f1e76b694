use deepscout_core::EngineId;
use deepscout_local::config::{env, env_bool, env_parse};
use std::path::PathBuf;

/// Per-user persistent cache location, falling back to the temp dir.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("deepscout-cache")
}

/// Disk tier location: `DEEPSCOUT_CACHE_DIR`, else the default dir when
/// `DEEPSCOUT_DISK_CACHE` is on, else none.
pub fn disk_cache_dir_from_env() -> Option<PathBuf> {
    env("DEEPSCOUT_CACHE_DIR").map(PathBuf::from).or_else(|| {
        env_bool("DEEPSCOUT_DISK_CACHE")
            .unwrap_or(false)
            .then(default_cache_dir)
    })
}

/// Split a comma/whitespace-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Orchestration knobs shared by every research request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchConfig {
    /// Width of the per-request worker pool.
    pub workers: usize,
    /// Estimated tokens per summarized chunk.
    pub chunk_token_budget: usize,
    /// Divisor for the chars -> tokens estimate.
    pub chars_per_token: usize,
    pub max_iterations: usize,
    /// Hard ceiling on iterations, whatever a request asks for.
    pub max_iterations_cap: usize,
    pub snippet_len: usize,
    pub deep_snippet_len: usize,
    pub default_engines: Vec<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            chunk_token_budget: 25_000,
            chars_per_token: 4,
            max_iterations: 3,
            max_iterations_cap: 5,
            snippet_len: 5_000,
            deep_snippet_len: 10_000,
            default_engines: EngineId::ALL.iter().map(|e| e.as_str().to_string()).collect(),
        }
    }
}

impl ResearchConfig {
    /// Iterations for one job: the requested count (or the default), within `1..=cap`.
    pub fn iterations(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.max_iterations)
            .clamp(1, self.max_iterations_cap.max(1))
    }

    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            workers: env_parse("DEEPSCOUT_WORKERS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(d.workers),
            chunk_token_budget: env_parse("DEEPSCOUT_CHUNK_TOKENS").unwrap_or(d.chunk_token_budget),
            chars_per_token: env_parse("DEEPSCOUT_CHARS_PER_TOKEN")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(d.chars_per_token),
            max_iterations: env_parse("DEEPSCOUT_MAX_ITERATIONS").unwrap_or(d.max_iterations),
            max_iterations_cap: env_parse("DEEPSCOUT_MAX_ITERATIONS_CAP")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(d.max_iterations_cap),
            snippet_len: env_parse("DEEPSCOUT_SNIPPET_LENGTH").unwrap_or(d.snippet_len),
            deep_snippet_len: env_parse("DEEPSCOUT_DEEP_SNIPPET_LENGTH")
                .unwrap_or(d.deep_snippet_len),
            default_engines: env("DEEPSCOUT_ENGINES")
                .map(|s| split_list(&s))
                .unwrap_or(d.default_engines),
        }
    }
}
