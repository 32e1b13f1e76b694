use crate::links;

const MAX_LINKS: usize = 500;
const MAX_EMAILS: usize = 200;

/// Everything pulled out of one page. Links and emails are always computed so a cached
/// page can answer any combination of extraction flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: String,
    /// Title-prefixed, bounded snippet.
    pub snippet: String,
    pub text_chars: usize,
    pub links: Vec<String>,
    pub emails: Vec<String>,
}

/// Best-effort sniff for PDF bytes (magic header).
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

pub(crate) fn content_type_lc_prefix(ct: Option<&str>) -> String {
    ct.unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Extract text from a PDF body (in-memory bytes).
///
/// Extraction quality varies by PDF (text layer vs scanned images).
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
}

fn is_hidden_container(name: &str) -> bool {
    matches!(name, "script" | "style" | "noscript" | "template" | "title")
}

/// Visible page text: script/style content dropped, all whitespace collapsed to single spaces.
///
/// The `<title>` is left out here; it already heads the snippet.
pub fn visible_text(doc: &html_scraper::Html) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| is_hidden_container(e.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        words.extend(text.split_whitespace());
    }
    collapse_whitespace(&excise_replacement_chars(&words.join(" ")))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Lone surrogates (e.g. `&#xD800;`) come out of decoding as U+FFFD; drop them.
fn excise_replacement_chars(s: &str) -> String {
    if s.contains('\u{FFFD}') {
        s.chars().filter(|c| *c != '\u{FFFD}').collect()
    } else {
        s.to_string()
    }
}

fn page_title(doc: &html_scraper::Html) -> Option<String> {
    let sel = html_scraper::Selector::parse("title").ok()?;
    let el = doc.select(&sel).next()?;
    let t = el.text().collect::<Vec<_>>().join(" ");
    let t = t.split_whitespace().collect::<Vec<_>>().join(" ");
    (!t.is_empty()).then_some(t)
}

fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte, _)) => &s[..byte],
        None => s,
    }
}

pub fn format_snippet(title: &str, text: &str, snippet_len: usize) -> String {
    format!("### {title}\n\n{}\n", take_chars(text, snippet_len))
}

/// Parse an HTML page into a bounded snippet plus discovered links and emails.
pub fn extract_page(html: &str, url: &str, snippet_len: usize) -> ExtractedPage {
    let doc = html_scraper::Html::parse_document(html);
    let text = visible_text(&doc);
    let title = page_title(&doc).unwrap_or_else(|| url.to_string());
    let snippet = format_snippet(&title, &text, snippet_len);
    ExtractedPage {
        text_chars: text.chars().count(),
        links: links::extract_links(&doc, Some(url), MAX_LINKS),
        emails: links::extract_emails(html, MAX_EMAILS),
        title,
        snippet,
    }
}

/// Same shape as [`extract_page`] for plain text bodies (PDF text, text/plain).
pub fn extract_plain(text: &str, url: &str, snippet_len: usize) -> ExtractedPage {
    let collapsed = collapse_whitespace(&excise_replacement_chars(text));
    ExtractedPage {
        title: url.to_string(),
        snippet: format_snippet(url, &collapsed, snippet_len),
        text_chars: collapsed.chars().count(),
        links: Vec::new(),
        emails: links::extract_emails(text, MAX_EMAILS),
    }
}
