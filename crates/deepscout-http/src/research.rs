use crate::config::ResearchConfig;
use crate::pool::WorkerPool;
use crate::summarize::ChunkSummarizer;
use deepscout_core::{Error, ExtractedRecord, FetchOptions, PageContent, PageFetcher, Result};
use deepscout_local::llm::LlmService;
use deepscout_local::search::EngineRegistry;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const REFINEMENT_PROMPT: &str = "Analyze the following research summaries to identify key themes and entities. \
Suggest 3-5 new, more specific search queries that are *directly related* to the original topic: '{original_query}'. \
Identify any gaps in the current research and suggest queries to address those gaps. \
Do not suggest overly broad or generic queries. Focus on refining the search and addressing specific aspects. \
Prioritize queries that are likely to yield *different* results than the previous searches.";

pub fn refinement_prompt(original_query: &str, summaries: &[String]) -> String {
    format!(
        "{}\n\nResearch Summaries:\n{}",
        REFINEMENT_PROMPT.replace("{original_query}", original_query),
        summaries.join("\n")
    )
}

/// Next query from a refinement reply: the first three non-empty lines, space-joined.
pub fn refine_query(reply: &str) -> String {
    reply
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn online_prompt(query: &str, content: &str) -> String {
    format!(
        "Analyze web content for: '{query}'. Extract key facts, figures, and details. Be concise. \
         Content:\n\n{content}\n\nProvide a fact-based summary."
    )
}

pub fn website_prompt(content: &str) -> String {
    format!("Summarize the following webpage content concisely:\n\n{content}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Searching,
    Summarizing,
    Refining,
    Done,
}

#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub query: String,
    pub engines: Vec<String>,
    pub max_iterations: usize,
    pub fetch: FetchOptions,
}

/// Everything the loop accumulated, in append order across iterations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResearchOutcome {
    pub summaries: Vec<String>,
    pub references: Vec<String>,
    pub extracted: Vec<ExtractedRecord>,
    pub current_query: String,
    pub iterations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnlineAnswer {
    pub explanation: String,
    pub references: Vec<String>,
}

/// Request-scoped orchestrator: owns its worker pool, borrows the long-lived services.
#[derive(Clone)]
pub struct Researcher {
    registry: Arc<EngineRegistry>,
    fetcher: Arc<dyn PageFetcher>,
    llm: LlmService,
    pool: WorkerPool,
    summarizer: ChunkSummarizer,
    config: ResearchConfig,
}

impl Researcher {
    pub fn new(
        registry: Arc<EngineRegistry>,
        fetcher: Arc<dyn PageFetcher>,
        llm: LlmService,
        config: ResearchConfig,
    ) -> Self {
        let pool = WorkerPool::new(config.workers);
        let summarizer = ChunkSummarizer::new(
            fetcher.clone(),
            llm.clone(),
            pool.clone(),
            config.chunk_token_budget,
            config.chars_per_token,
        );
        Self {
            registry,
            fetcher,
            llm,
            pool,
            summarizer,
            config,
        }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn llm(&self) -> &LlmService {
        &self.llm
    }

    /// Fan out `query`; if nothing comes back, try model-suggested rephrasings in order and
    /// keep the first that yields anything.
    pub async fn search_with_fallback(
        &self,
        query: &str,
        engines: &[String],
    ) -> Result<BTreeSet<String>> {
        let urls = self.registry.search_all(query, engines).await;
        if !urls.is_empty() {
            return Ok(urls);
        }
        tracing::warn!(query, "initial search found nothing, trying alternatives");
        let alternatives = self.llm.alternative_queries(query).await;
        if alternatives.is_empty() {
            tracing::warn!("no alternative queries generated");
        }
        for alt in &alternatives {
            let urls = self.registry.search_all(alt, engines).await;
            if !urls.is_empty() {
                tracing::info!(alternative = %alt, count = urls.len(), "results found with alternative");
                return Ok(urls);
            }
        }
        Err(Error::NoResults)
    }

    fn enter(&self, state: LoopState, iteration: usize, query: &str) {
        tracing::info!(?state, iteration = iteration + 1, query, "research loop");
    }

    /// The search -> summarize -> refine loop.
    ///
    /// Runs at most `max_iterations` passes and stops early, without refining, after a pass
    /// that produced no summaries. Zero results on the very first search is `NoResults`.
    pub async fn run(&self, req: &ResearchRequest) -> Result<ResearchOutcome> {
        let max = req.max_iterations.max(1);
        let mut out = ResearchOutcome {
            current_query: req.query.clone(),
            ..ResearchOutcome::default()
        };

        for iteration in 0..max {
            out.iterations = iteration + 1;
            self.enter(LoopState::Searching, iteration, &out.current_query);
            let urls = match self.search_with_fallback(&out.current_query, &req.engines).await {
                Ok(urls) => urls,
                Err(Error::NoResults) if iteration > 0 => {
                    tracing::info!(query = %out.current_query, "refined query found nothing");
                    BTreeSet::new()
                }
                Err(e) => return Err(e),
            };
            tracing::debug!(iteration = iteration + 1, ?urls, "urls to fetch");

            self.enter(LoopState::Summarizing, iteration, &out.current_query);
            let record = self
                .summarizer
                .summarize_urls(urls, &out.current_query, &req.fetch)
                .await;
            let produced = !record.summaries.is_empty();
            out.summaries.extend(record.summaries);
            out.references.extend(record.references);
            out.extracted.extend(record.extracted);

            if iteration + 1 >= max {
                break;
            }
            if !produced {
                tracing::info!(iteration = iteration + 1, "no summaries for refinement, stopping");
                break;
            }

            self.enter(LoopState::Refining, iteration, &out.current_query);
            let reply = self
                .llm
                .generate_text(&refinement_prompt(&req.query, &out.summaries))
                .await?;
            let next = refine_query(&reply);
            if next.is_empty() {
                tracing::info!("refinement produced no query, stopping");
                break;
            }
            out.current_query = next;
        }

        self.enter(LoopState::Done, out.iterations.saturating_sub(1), &out.current_query);
        Ok(out)
    }

    /// Single pass: search (with fallback), fetch every hit, one fact summary.
    pub async fn online(&self, query: &str, engines: &[String]) -> Result<OnlineAnswer> {
        let urls = self.search_with_fallback(query, engines).await?;
        let opts = FetchOptions::snippet(self.config.snippet_len);
        let mut batch = self.pool.batch::<PageContent>();
        for url in urls {
            let fetcher = self.fetcher.clone();
            let opts = opts.clone();
            batch.spawn(async move { fetcher.fetch_page(&url, &opts).await });
        }

        let mut snippets = Vec::new();
        let mut references = Vec::new();
        while let Some(page) = batch.next().await {
            snippets.extend(page.snippets);
            references.extend(page.references);
        }
        let explanation = self
            .llm
            .generate_text(&online_prompt(query, &snippets.join("\n\n")))
            .await?;
        Ok(OnlineAnswer {
            explanation,
            references,
        })
    }

    /// Summary of one page, or `None` when the page could not be fetched.
    pub async fn summarize_website(&self, url: &str) -> Result<Option<String>> {
        let page = self
            .fetcher
            .fetch_page(url, &FetchOptions::snippet(self.config.snippet_len))
            .await;
        if page.is_empty() {
            return Ok(None);
        }
        let summary = self
            .llm
            .generate_text(&website_prompt(&page.snippets.join("\n\n")))
            .await?;
        Ok(Some(summary))
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use deepscout_core::{EngineId, SearchEngine, TextGenerator};
    use deepscout_local::{RateLimiter, RetryPolicy};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns URLs for exact query matches only.
    pub struct ScriptedEngine {
        pub id: EngineId,
        pub hits: HashMap<String, Vec<String>>,
    }

    #[async_trait::async_trait]
    impl SearchEngine for ScriptedEngine {
        fn id(&self) -> EngineId {
            self.id
        }

        async fn search(&self, query: &str) -> Result<Vec<String>> {
            Ok(self.hits.get(query).cloned().unwrap_or_default())
        }
    }

    /// Every URL yields one snippet naming it, unless listed as dead.
    pub struct EchoFetcher {
        pub dead: Vec<String>,
    }

    #[async_trait::async_trait]
    impl PageFetcher for EchoFetcher {
        async fn fetch_page(&self, url: &str, _opts: &FetchOptions) -> PageContent {
            if self.dead.iter().any(|d| d == url) {
                return PageContent::default();
            }
            PageContent {
                snippets: vec![format!("### {url}\n\ncontent of {url}\n")],
                references: vec![url.to_string()],
                extracted: Default::default(),
            }
        }
    }

    /// Answers by prompt kind and records every prompt.
    #[derive(Default)]
    pub struct ScriptedLlm {
        pub alternatives: String,
        pub refinements: String,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn count(&self, prefix: &str) -> usize {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.starts_with(prefix))
                .count()
        }
    }

    #[async_trait::async_trait]
    impl TextGenerator for ScriptedLlm {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.starts_with("Suggest 3 refined") {
                Ok(self.alternatives.clone())
            } else if prompt.starts_with("Analyze the following research summaries") {
                Ok(self.refinements.clone())
            } else if prompt.starts_with("Analyze snippets") {
                Ok("chunk summary".to_string())
            } else {
                Ok("final answer".to_string())
            }
        }
    }

    pub fn researcher(
        engines: Vec<ScriptedEngine>,
        fetcher: EchoFetcher,
        llm: Arc<ScriptedLlm>,
    ) -> Researcher {
        let mut registry = EngineRegistry::new();
        for e in engines {
            registry.register(Arc::new(e));
        }
        let service = LlmService::new(llm, Arc::new(RateLimiter::new()))
            .with_retry(RetryPolicy::immediate(3));
        Researcher::new(
            Arc::new(registry),
            Arc::new(fetcher),
            service,
            ResearchConfig::default(),
        )
    }

    pub fn hits(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(q, urls)| (q.to_string(), urls.iter().map(|u| u.to_string()).collect()))
            .collect()
    }
}
