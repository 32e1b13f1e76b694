use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Extract (deduped, first-seen order) absolute links from a parsed page.
///
/// - Resolves relative links against `base_url` when provided.
/// - Skips fragment-only, `javascript:` and `mailto:` hrefs.
/// - Drops fragments.
/// - Returns at most `max_links`.
pub fn extract_links(
    doc: &html_scraper::Html,
    base_url: Option<&str>,
    max_links: usize,
) -> Vec<String> {
    let max_links = max_links.min(500);
    if max_links == 0 {
        return Vec::new();
    }

    let base = base_url.and_then(|u| url::Url::parse(u).ok());
    let sel = match html_scraper::Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for el in doc.select(&sel) {
        if out.len() >= max_links {
            break;
        }
        let href = match el.value().attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let href_lc = href.to_ascii_lowercase();
        if href_lc.starts_with("javascript:") || href_lc.starts_with("mailto:") {
            continue;
        }

        let abs = if let Ok(u) = url::Url::parse(href) {
            u
        } else if let Some(b) = &base {
            match b.join(href) {
                Ok(u) => u,
                Err(_) => continue,
            }
        } else {
            continue;
        };

        let mut u = abs;
        u.set_fragment(None);
        let s = u.to_string();
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    out
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("static email regex")
    })
}

/// Email-like strings in `text`, deduped in first-seen order.
pub fn extract_emails(text: &str, max_emails: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for m in email_re().find_iter(text) {
        if out.len() >= max_emails {
            break;
        }
        let s = m.as_str().to_string();
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    out
}
