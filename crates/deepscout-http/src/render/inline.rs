//! Inline markdown (`**bold**`, `*italic*`, `` `code` ``, `[text](url)`) into styled spans.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
    pub link: Option<String>,
}

impl Span {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: Style::default(),
            link: None,
        }
    }

    pub fn linked(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            link: Some(url.into()),
            ..Self::plain(text)
        }
    }
}

/// `[text](url)` at the start of `s`: (text, url, remainder).
fn link_at(s: &str) -> Option<(&str, &str, &str)> {
    let body = s.strip_prefix('[')?;
    let mid = body.find("](")?;
    let text = &body[..mid];
    let after = &body[mid + 2..];
    let end = after.find(')')?;
    if text.contains(['[', '\n']) {
        return None;
    }
    Some((text, &after[..end], &after[end + 1..]))
}

fn flush(plain: &mut String, style: Style, out: &mut Vec<Span>) {
    if !plain.is_empty() {
        out.push(Span {
            text: std::mem::take(plain),
            style,
            link: None,
        });
    }
}

fn parse(text: &str, style: Style, out: &mut Vec<Span>) {
    let mut plain = String::new();
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if let Some((label, url, after)) = link_at(rest) {
            flush(&mut plain, style, out);
            out.push(Span {
                text: label.to_string(),
                style,
                link: Some(url.to_string()),
            });
            rest = after;
            continue;
        }
        if let Some(r) = rest.strip_prefix('`') {
            if let Some(end) = r.find('`') {
                flush(&mut plain, style, out);
                out.push(Span {
                    text: r[..end].to_string(),
                    style: Style { code: true, ..style },
                    link: None,
                });
                rest = &r[end + 1..];
                continue;
            }
        }
        if let Some(r) = rest.strip_prefix("**") {
            if let Some(end) = r.find("**").filter(|&e| e > 0) {
                flush(&mut plain, style, out);
                parse(&r[..end], Style { bold: true, ..style }, out);
                rest = &r[end + 2..];
                continue;
            }
        }
        if let Some(r) = rest.strip_prefix('*') {
            if let Some(end) = r.find('*').filter(|&e| e > 0) {
                flush(&mut plain, style, out);
                parse(&r[..end], Style { italic: true, ..style }, out);
                rest = &r[end + 1..];
                continue;
            }
        }
        plain.push(c);
        rest = &rest[c.len_utf8()..];
    }
    flush(&mut plain, style, out);
}

pub fn spans(text: &str) -> Vec<Span> {
    let mut raw = Vec::new();
    parse(text.trim(), Style::default(), &mut raw);

    let mut out: Vec<Span> = Vec::with_capacity(raw.len());
    for span in raw {
        match out.last_mut() {
            Some(prev) if prev.style == span.style && prev.link.is_none() && span.link.is_none() => {
                prev.text.push_str(&span.text);
            }
            _ => out.push(span),
        }
    }
    out
}
