use crate::table::{parse_markdown_table, to_markdown};
use deepscout_core::{Error, Result};
use deepscout_local::llm::{Generated, LlmService, ResponseFormat};
use serde::Serialize;

pub const NO_CONTENT: &str = "No relevant content found for the given query.";

pub const TABLE_PROMPT: &str = "Create a detailed comparison table analyzing: '{query}'.\n\n\
**Strict Table Formatting:**\n\
*   **Markdown table ONLY.**\n\
*   **Structure:** Header row, separator row (---), data rows.\n\
*   **Rows:** Start and end with a pipe (|), spaces around pipes.\n\
*   **Separator:** Three dashes (---) per column, alignment colons (:---:).\n\
*   **Cells:** Concise (max 2-3 lines), consistent capitalization, 'N/A' for empty.\n\
*   **NO line breaks within cells.** Use <br> for internal line breaks if absolutely necessary.\n\
**Content Guidelines:**\n\
*   3-5 relevant columns.\n\
*   4-8 data rows.\n\
*   Proper alignment (usually center or left).\n\
*   Verify all pipe and spacing rules.\n\
*   **Output ONLY the table, NO extra text.**";

/// Requested shape of the final report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Csv,
    /// Any format string mentioning "table", kept verbatim.
    Table(String),
    Other(String),
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.contains("table") {
            return OutputFormat::Table(trimmed.to_string());
        }
        match lower.as_str() {
            "" | "markdown" | "md" => OutputFormat::Markdown,
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Table(s) | OutputFormat::Other(s) => s,
        }
    }

    pub fn wants_table(&self) -> bool {
        matches!(self, OutputFormat::Table(_))
    }

    pub fn response_format(&self) -> ResponseFormat {
        match self {
            OutputFormat::Json => ResponseFormat::Json,
            OutputFormat::Csv => ResponseFormat::Csv,
            _ => ResponseFormat::Text,
        }
    }
}

/// The synthesized report, as returned under `explanation`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Explanation {
    Text(String),
    Json(serde_json::Value),
    Rows(Vec<Vec<String>>),
    Error { error: String, raw_text: String },
}

impl From<Generated> for Explanation {
    fn from(g: Generated) -> Self {
        match g {
            Generated::Text(t) => Explanation::Text(t),
            Generated::Json(v) => Explanation::Json(v),
            Generated::Rows(r) => Explanation::Rows(r),
            Generated::Malformed { error, raw_text } => Explanation::Error { error, raw_text },
        }
    }
}

impl Explanation {
    /// Markdown-ish text for the document renderer.
    pub fn to_document_text(&self) -> String {
        match self {
            Explanation::Text(t) => t.clone(),
            Explanation::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            Explanation::Rows(rows) => to_markdown(rows),
            Explanation::Error { raw_text, .. } => raw_text.clone(),
        }
    }
}

pub fn report_structure(table: bool) -> String {
    let mut s = String::from(
        "**Structure your report with clear headings and subheadings.**\n\
         Use bullet points and numbered lists where appropriate.\n\
         Include a concise introduction and conclusion.\n\n",
    );
    if table {
        s.push_str(
            "**Include a comparison table summarizing key findings.**  \
             Use the detailed table formatting guidelines provided earlier.\n",
        );
    } else {
        s.push_str("**Do NOT include a table.** Focus on a narrative report.\n");
    }
    s
}

pub fn build_final_prompt(query: &str, format: &OutputFormat, summaries: &[String]) -> String {
    let report = format!(
        "DEEP RESEARCH REPORT: Synthesize a comprehensive report from web research on: '{query}'.\n\n\
         {}\n\nResearch Summaries (all iterations):\n{}\n\nGenerate the report in Markdown.",
        report_structure(format.wants_table()),
        summaries.join("\n\n"),
    );
    if format.wants_table() {
        format!("{}\n\n{report}", TABLE_PROMPT.replace("{query}", query))
    } else {
        report
    }
}

/// One final generation call over every accumulated summary.
///
/// Malformed structured replies come back as [`Explanation::Error`]; only a failed
/// generation call is an `Err`.
pub async fn synthesize(
    llm: &LlmService,
    query: &str,
    format: &OutputFormat,
    summaries: &[String],
) -> Result<Explanation> {
    if summaries.is_empty() {
        return Ok(Explanation::Text(NO_CONTENT.to_string()));
    }
    let prompt = build_final_prompt(query, format, summaries);
    let generated = llm.generate(&prompt, format.response_format()).await?;
    if !format.wants_table() {
        return Ok(generated.into());
    }

    let raw = match generated {
        Generated::Text(t) => t,
        other => return Ok(other.into()),
    };
    let rows = parse_markdown_table(&raw);
    if rows.is_empty() {
        tracing::warn!("table parsing failed, returning raw response");
        return Ok(Explanation::Error {
            error: "Failed to parse table".to_string(),
            raw_text: raw,
        });
    }
    Ok(Explanation::Rows(rows))
}

fn rows_to_csv(rows: &[Vec<String>]) -> Result<String> {
    let mut w = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        w.write_record(row).map_err(|e| Error::Render(e.to_string()))?;
    }
    let bytes = w.into_inner().map_err(|e| Error::Render(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::Render(e.to_string()))
}

/// The `explanation` value for a response in `format`.
pub fn shape_explanation(format: &OutputFormat, explanation: &Explanation) -> Result<serde_json::Value> {
    match (format, explanation) {
        (OutputFormat::Csv, Explanation::Rows(rows)) => Ok(serde_json::Value::String(rows_to_csv(rows)?)),
        (OutputFormat::Csv, Explanation::Error { raw_text, .. }) => {
            Ok(serde_json::Value::String(raw_text.clone()))
        }
        _ => serde_json::to_value(explanation).map_err(|e| Error::Render(e.to_string())),
    }
}
