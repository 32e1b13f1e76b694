use crate::pool::WorkerPool;
use deepscout_core::{ExtractedRecord, FetchOptions, IterationRecord, PageContent, PageFetcher};
use deepscout_local::llm::LlmService;
use std::sync::Arc;

pub const SUMMARY_PROMPT: &str = "Analyze snippets for: '{query}'. Extract key facts, figures, and insights. \
Be concise, ignore irrelevant content, and prioritize authoritative sources. \
Focus on the main topic and avoid discussing the research process itself.\n\nContent Snippets:";

pub fn summary_prompt(query: &str, chunk: &[String]) -> String {
    format!(
        "{}\n\n{}",
        SUMMARY_PROMPT.replace("{query}", query),
        chunk.join("\n\n")
    )
}

/// Groups snippets into chunks whose estimated token cost stays within a budget.
///
/// A snippet that alone exceeds the budget still becomes its own chunk.
#[derive(Debug, Clone)]
pub struct ChunkAccumulator {
    budget: usize,
    chars_per_token: usize,
    current: Vec<String>,
    tokens: usize,
}

impl ChunkAccumulator {
    pub fn new(budget: usize, chars_per_token: usize) -> Self {
        Self {
            budget,
            chars_per_token: chars_per_token.max(1),
            current: Vec::new(),
            tokens: 0,
        }
    }

    pub fn estimate(&self, text: &str) -> usize {
        text.chars().count() / self.chars_per_token
    }

    pub fn pending_tokens(&self) -> usize {
        self.tokens
    }

    /// Add a snippet; returns the previous chunk if this snippet would overflow it.
    pub fn push(&mut self, snippet: String) -> Option<Vec<String>> {
        let cost = self.estimate(&snippet);
        let flushed = if self.tokens + cost > self.budget && !self.current.is_empty() {
            self.tokens = 0;
            Some(std::mem::take(&mut self.current))
        } else {
            None
        };
        self.current.push(snippet);
        self.tokens += cost;
        flushed
    }

    /// Whatever is left once input is exhausted.
    pub fn finish(&mut self) -> Option<Vec<String>> {
        self.tokens = 0;
        let rest = std::mem::take(&mut self.current);
        (!rest.is_empty()).then_some(rest)
    }
}

/// Fetches a URL batch concurrently and summarizes the snippets chunk by chunk.
#[derive(Clone)]
pub struct ChunkSummarizer {
    fetcher: Arc<dyn PageFetcher>,
    llm: LlmService,
    pool: WorkerPool,
    budget: usize,
    chars_per_token: usize,
}

impl ChunkSummarizer {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        llm: LlmService,
        pool: WorkerPool,
        budget: usize,
        chars_per_token: usize,
    ) -> Self {
        Self {
            fetcher,
            llm,
            pool,
            budget,
            chars_per_token,
        }
    }

    async fn summarize_chunk(&self, query: &str, chunk: Vec<String>, out: &mut IterationRecord) {
        if chunk.iter().all(|s| s.trim().is_empty()) {
            return;
        }
        tracing::debug!(snippets = chunk.len(), "summarizing chunk");
        match self.llm.generate_text(&summary_prompt(query, &chunk)).await {
            Ok(summary) => out.summaries.push(summary),
            Err(e) => tracing::error!(error = %e, "chunk summary failed, dropping chunk"),
        }
    }

    /// Fetch every URL on the pool and summarize results as they complete.
    ///
    /// Summary and reference order follow completion order, not input order.
    pub async fn summarize_urls<I>(&self, urls: I, query: &str, opts: &FetchOptions) -> IterationRecord
    where
        I: IntoIterator<Item = String>,
    {
        let mut batch = self.pool.batch::<(String, PageContent)>();
        for url in urls {
            let fetcher = self.fetcher.clone();
            let opts = opts.clone();
            batch.spawn(async move {
                let content = fetcher.fetch_page(&url, &opts).await;
                (url, content)
            });
        }

        let mut out = IterationRecord::default();
        let mut acc = ChunkAccumulator::new(self.budget, self.chars_per_token);
        while let Some((url, content)) = batch.next().await {
            if content.is_empty() {
                tracing::debug!(url, "no content");
            }
            out.references.extend(content.references);
            out.extracted.push(ExtractedRecord {
                url,
                data: content.extracted,
            });
            for snippet in content.snippets {
                if let Some(chunk) = acc.push(snippet) {
                    self.summarize_chunk(query, chunk, &mut out).await;
                }
            }
        }
        if let Some(chunk) = acc.finish() {
            self.summarize_chunk(query, chunk, &mut out).await;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepscout_core::{Error, ExtractedData, Result, TextGenerator};
    use deepscout_local::{RateLimiter, RetryPolicy};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapFetcher(HashMap<String, String>);

    #[async_trait::async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch_page(&self, url: &str, opts: &FetchOptions) -> PageContent {
            match self.0.get(url) {
                Some(snippet) => PageContent {
                    snippets: vec![snippet.clone()],
                    references: vec![url.to_string()],
                    extracted: ExtractedData {
                        links: opts.extract_links.then(Vec::new),
                        emails: None,
                    },
                },
                None => PageContent::default(),
            }
        }
    }

    /// Records prompts; fails any prompt containing "POISON".
    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait::async_trait]
    impl TextGenerator for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn model(&self) -> &str {
            "recorder"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            if prompt.contains("POISON") {
                return Err(Error::Llm("refused".into()));
            }
            let mut p = self.0.lock().unwrap();
            p.push(prompt.to_string());
            Ok(format!("summary {}", p.len()))
        }
    }

    fn summarizer(pages: &[(&str, String)], budget: usize) -> (ChunkSummarizer, Arc<Recorder>) {
        let fetcher = Arc::new(MapFetcher(
            pages
                .iter()
                .map(|(u, s)| (u.to_string(), s.clone()))
                .collect(),
        ));
        let rec = Arc::new(Recorder::default());
        let llm = LlmService::new(rec.clone(), Arc::new(RateLimiter::new()))
            .with_retry(RetryPolicy::immediate(3));
        (
            ChunkSummarizer::new(fetcher, llm, WorkerPool::new(10), budget, 4),
            rec,
        )
    }

    #[test]
    fn second_snippet_flushes_the_first_when_over_budget() {
        let mut acc = ChunkAccumulator::new(100, 4);
        let a = "a".repeat(300);
        let b = "b".repeat(300);
        assert!(acc.push(a.clone()).is_none());
        assert_eq!(acc.pending_tokens(), 75);
        assert_eq!(acc.push(b.clone()), Some(vec![a]));
        assert_eq!(acc.finish(), Some(vec![b]));
        assert_eq!(acc.finish(), None);
    }

    #[test]
    fn oversized_snippet_becomes_its_own_chunk() {
        let mut acc = ChunkAccumulator::new(10, 4);
        assert!(acc.push("x".repeat(400)).is_none());
        assert_eq!(acc.push("y".into()).map(|c| c.len()), Some(1));
    }

    #[test]
    fn prompt_embeds_query_and_chunk() {
        let p = summary_prompt("rust", &["one".into(), "two".into()]);
        assert!(p.starts_with("Analyze snippets for: 'rust'."));
        assert!(p.ends_with("Content Snippets:\n\none\n\ntwo"));
    }

    #[tokio::test]
    async fn two_pages_over_budget_make_two_summaries() {
        let pages = [
            ("https://a.example/", "a".repeat(300)),
            ("https://b.example/", "b".repeat(300)),
        ];
        let (s, rec) = summarizer(&pages, 100);
        let urls = pages.iter().map(|(u, _)| u.to_string());
        let out = s
            .summarize_urls(urls, "q", &FetchOptions::snippet(10_000))
            .await;

        assert_eq!(out.summaries.len(), 2);
        let prompts = rec.0.lock().unwrap().clone();
        assert_eq!(prompts.len(), 2);
        for p in &prompts {
            let has_a = p.contains(&"a".repeat(300));
            let has_b = p.contains(&"b".repeat(300));
            assert!(has_a ^ has_b, "each chunk holds exactly one snippet");
        }
        let mut refs = out.references.clone();
        refs.sort();
        assert_eq!(refs, vec!["https://a.example/", "https://b.example/"]);
        assert_eq!(out.extracted.len(), 2);
    }

    #[tokio::test]
    async fn small_pages_share_one_chunk_and_failures_are_skipped() {
        let pages = [
            ("https://a.example/", "alpha".to_string()),
            ("https://b.example/", "beta".to_string()),
        ];
        let (s, rec) = summarizer(&pages, 25_000);
        let urls = vec![
            "https://a.example/".to_string(),
            "https://missing.example/".to_string(),
            "https://b.example/".to_string(),
        ];
        let opts = FetchOptions {
            snippet_len: 100,
            extract_links: true,
            extract_emails: false,
        };
        let out = s.summarize_urls(urls, "q", &opts).await;
        assert_eq!(out.summaries, vec!["summary 1".to_string()]);
        assert_eq!(rec.0.lock().unwrap().len(), 1);
        assert_eq!(out.references.len(), 2);
        assert_eq!(out.extracted.len(), 3);
        let missing = out
            .extracted
            .iter()
            .find(|r| r.url == "https://missing.example/")
            .unwrap();
        assert!(missing.data.is_empty());
    }

    #[tokio::test]
    async fn failed_chunk_summary_is_dropped() {
        let pages = [
            ("https://a.example/", format!("POISON {}", "p".repeat(400))),
        ];
        let (s, _) = summarizer(&pages, 25_000);
        let out = s
            .summarize_urls(vec!["https://a.example/".to_string()], "q", &FetchOptions::snippet(1_000))
            .await;
        assert!(out.summaries.is_empty());
        assert_eq!(out.references, vec!["https://a.example/".to_string()]);
    }

    proptest! {
        #[test]
        fn chunks_respect_budget_unless_single(lens in proptest::collection::vec(0usize..2_000, 0..40), budget in 1usize..400) {
            let mut acc = ChunkAccumulator::new(budget, 4);
            let mut chunks = Vec::new();
            for n in lens {
                if let Some(c) = acc.push("x".repeat(n)) {
                    chunks.push(c);
                }
            }
            chunks.extend(acc.finish());
            for c in chunks {
                let total: usize = c.iter().map(|s| s.len() / 4).sum();
                prop_assert!(total <= budget || c.len() == 1);
            }
        }
    }
}
