//! Paginated A4 report layout on top of `printpdf`'s built-in fonts.

use super::blocks::{scan, Block};
use super::inline::{spans, Span, Style};
use deepscout_core::{Error, Result};
use printpdf::path::PaintMode;
use printpdf::{
    Actions, BuiltinFont, Color, IndirectFontRef, LinkAnnotation, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Rect, Rgb,
};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const INCH: f32 = 25.4;
const MARGIN: f32 = 0.7 * INCH;
const PT: f32 = 25.4 / 72.0;
const CONTENT_W: f32 = PAGE_W - 2.0 * MARGIN;

const TITLE: u32 = 0x1a237e;
const H1: u32 = 0x283593;
const H2: u32 = 0x3949ab;
const H3: u32 = 0x455a64;
const BODY: u32 = 0x212121;
const LINK: u32 = 0x1565c0;
const MUTED: u32 = 0x757575;
const HEADER_FILL: u32 = 0xf5f5f5;
const GRID: u32 = 0xe0e0e0;
const ROW_FILLS: [u32; 2] = [0xffffff, 0xf8f9fa];

pub const FOOTER_PREFIX: &str = "Generated by DeepScout";

fn color(hex: u32) -> Color {
    let c = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
    Color::Rgb(Rgb::new(c(16), c(8), c(0), None))
}

/// Built-in fonts are WinAnsi: Latin-1 passes through, common typography is mapped, anything
/// else becomes `?`.
fn printable(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201c}' | '\u{201d}' => '"',
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            '\u{2022}' | '\u{00b7}' => '*',
            '\u{00a0}' | '\t' => ' ',
            '\u{2026}' => '.',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            '\u{00a1}'..='\u{00ff}' => c,
            _ => '?',
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
}

impl Face {
    fn for_style(style: Style) -> Self {
        match (style.code, style.bold, style.italic) {
            (true, _, _) => Face::Mono,
            (false, true, true) => Face::BoldItalic,
            (false, true, false) => Face::Bold,
            (false, false, true) => Face::Italic,
            (false, false, false) => Face::Regular,
        }
    }

    /// Approximate advance of one character, in ems.
    fn advance(self, c: char) -> f32 {
        if self == Face::Mono {
            return 0.6;
        }
        let base = match c {
            ' ' | 'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' | 'I' => 0.278,
            'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' => 0.333,
            'm' | 'w' | 'M' | 'W' | '@' => 0.86,
            '0'..='9' => 0.556,
            c if c.is_ascii_uppercase() => 0.68,
            _ => 0.53,
        };
        match self {
            Face::Bold | Face::BoldItalic => base * 1.06,
            _ => base,
        }
    }

    fn width_mm(self, text: &str, size: f32) -> f32 {
        text.chars().map(|c| self.advance(c)).sum::<f32>() * size * PT
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    bold_italic: IndirectFontRef,
    mono: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference) -> Result<Self> {
        let add = |f: BuiltinFont| doc.add_builtin_font(f).map_err(|e| Error::Render(e.to_string()));
        Ok(Self {
            regular: add(BuiltinFont::Helvetica)?,
            bold: add(BuiltinFont::HelveticaBold)?,
            italic: add(BuiltinFont::HelveticaOblique)?,
            bold_italic: add(BuiltinFont::HelveticaBoldOblique)?,
            mono: add(BuiltinFont::Courier)?,
        })
    }

    fn get(&self, face: Face) -> &IndirectFontRef {
        match face {
            Face::Regular => &self.regular,
            Face::Bold => &self.bold,
            Face::Italic => &self.italic,
            Face::BoldItalic => &self.bold_italic,
            Face::Mono => &self.mono,
        }
    }
}

/// A word with no break opportunity before it when `glued`.
#[derive(Debug, Clone)]
struct Word {
    text: String,
    face: Face,
    color: u32,
    glued: bool,
    link: Option<String>,
}

fn words(spans: &[Span], base_color: u32, force: Option<Face>) -> Vec<Word> {
    let mut out: Vec<Word> = Vec::new();
    let mut at_boundary = true;
    for span in spans {
        let face = force.unwrap_or_else(|| Face::for_style(span.style));
        let color = if span.link.is_some() { LINK } else { base_color };
        for (i, piece) in span.text.split(char::is_whitespace).enumerate() {
            if piece.is_empty() {
                at_boundary = true;
                continue;
            }
            let glued = i == 0 && !at_boundary && !out.is_empty();
            out.push(Word {
                text: printable(piece),
                face,
                color,
                glued,
                link: span.link.clone(),
            });
            at_boundary = false;
        }
    }
    out
}

/// Split a word that cannot fit on any line into pieces that do.
fn break_word(word: &Word, size: f32, max_w: f32) -> Vec<Word> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.text.chars() {
        current.push(c);
        if word.face.width_mm(&current, size) > max_w && current.chars().count() > 1 {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(c);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Word {
            text,
            glued: i > 0 || word.glued,
            ..word.clone()
        })
        .collect()
}

/// Greedy line filling. `first_w` applies to the first line only.
fn wrap(words: Vec<Word>, size: f32, first_w: f32, rest_w: f32) -> Vec<Vec<Word>> {
    let space = Face::Regular.width_mm(" ", size);
    let mut lines: Vec<Vec<Word>> = Vec::new();
    let mut line: Vec<Word> = Vec::new();
    let mut used = 0.0f32;

    let max_for = |n: usize| if n == 0 { first_w } else { rest_w };
    let mut queue: std::collections::VecDeque<Word> = words.into();
    while let Some(word) = queue.pop_front() {
        let limit = max_for(lines.len());
        let w = word.face.width_mm(&word.text, size);
        if w > rest_w.min(limit) && word.text.chars().count() > 1 {
            let parts = break_word(&word, size, rest_w.min(limit));
            if parts.len() > 1 {
                for p in parts.into_iter().rev() {
                    queue.push_front(p);
                }
                continue;
            }
        }
        let gap = if line.is_empty() || word.glued { 0.0 } else { space };
        if !line.is_empty() && used + gap + w > limit {
            lines.push(std::mem::take(&mut line));
            used = w;
            line.push(Word { glued: true, ..word });
            continue;
        }
        used += gap + w;
        line.push(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn line_width(line: &[Word], size: f32) -> f32 {
    let space = Face::Regular.width_mm(" ", size);
    line.iter()
        .enumerate()
        .map(|(i, w)| {
            let gap = if i == 0 || w.glued { 0.0 } else { space };
            gap + w.face.width_mm(&w.text, size)
        })
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
}

struct TextStyle {
    size: f32,
    color: u32,
    face: Option<Face>,
    align: Align,
    first_indent: f32,
    left_indent: f32,
}

struct Writer {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    fonts: Fonts,
    footer: String,
    y: f32,
    pages: usize,
}

impl Writer {
    fn new(doc_title: &str, footer: String) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(doc_title, Mm(PAGE_W), Mm(PAGE_H), "content");
        let fonts = Fonts::load(&doc)?;
        let layer = doc.get_page(page).get_layer(layer);
        let w = Self {
            doc,
            layer,
            fonts,
            footer,
            y: PAGE_H - MARGIN,
            pages: 1,
        };
        w.draw_footer();
        Ok(w)
    }

    fn draw_footer(&self) {
        let size = 9.0;
        let text = printable(&self.footer);
        let width = Face::Regular.width_mm(&text, size);
        self.layer.set_fill_color(color(MUTED));
        self.layer.use_text(
            text,
            size,
            Mm(MARGIN + (CONTENT_W - width).max(0.0) / 2.0),
            Mm(MARGIN / 2.0),
            self.fonts.get(Face::Regular),
        );
    }

    fn new_page(&mut self) {
        self.pages += 1;
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_W), Mm(PAGE_H), format!("page {}", self.pages));
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_H - MARGIN;
        self.draw_footer();
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    fn gap_pt(&mut self, pt: f32) {
        self.y -= pt * PT;
    }

    fn draw_line(&self, line: &[Word], size: f32, x: f32, baseline: f32) {
        let space = Face::Regular.width_mm(" ", size);
        let mut cursor = x;
        for (i, w) in line.iter().enumerate() {
            if i > 0 && !w.glued {
                cursor += space;
            }
            self.layer.set_fill_color(color(w.color));
            self.layer
                .use_text(w.text.clone(), size, Mm(cursor), Mm(baseline), self.fonts.get(w.face));
            let width = w.face.width_mm(&w.text, size);
            if let Some(url) = &w.link {
                self.link(url, cursor, baseline, width, size);
            }
            cursor += width;
        }
    }

    /// Clickable area over one drawn run.
    fn link(&self, url: &str, x: f32, baseline: f32, width: f32, size: f32) {
        let rect = Rect::new(
            Mm(x),
            Mm(baseline - size * 0.25 * PT),
            Mm(x + width),
            Mm(baseline + size * 0.8 * PT),
        );
        self.layer.add_link_annotation(LinkAnnotation::new(
            rect,
            None,
            None,
            Actions::uri(url.to_string()),
            None,
        ));
    }

    fn text(&mut self, spans: &[Span], style: &TextStyle) {
        let leading = style.size * 1.25 * PT;
        let first_w = CONTENT_W - style.left_indent - style.first_indent;
        let rest_w = CONTENT_W - style.left_indent;
        let lines = wrap(words(spans, style.color, style.face), style.size, first_w, rest_w);
        for (i, line) in lines.iter().enumerate() {
            self.ensure(leading);
            self.y -= leading;
            let indent = style.left_indent + if i == 0 { style.first_indent } else { 0.0 };
            let x = match style.align {
                Align::Left => MARGIN + indent,
                Align::Center => {
                    MARGIN + indent + ((CONTENT_W - indent) - line_width(line, style.size)).max(0.0) / 2.0
                }
            };
            self.draw_line(line, style.size, x, self.y + style.size * 0.25 * PT);
        }
    }

    fn heading(&mut self, level: u8, text: &str) {
        let (size, c) = match level {
            1 => (18.0, H1),
            2 => (16.0, H2),
            _ => (14.0, H3),
        };
        self.gap_pt(size * 0.5);
        self.ensure(size * 2.5 * PT);
        self.text(
            &spans(text),
            &TextStyle {
                size,
                color: c,
                face: Some(Face::Bold),
                align: Align::Left,
                first_indent: 0.0,
                left_indent: 0.0,
            },
        );
        self.gap_pt(size * 0.3);
    }

    fn fill_rect(&self, x: f32, y: f32, w: f32, h: f32, fill: u32) {
        self.layer.set_fill_color(color(fill));
        self.layer
            .add_rect(Rect::new(Mm(x), Mm(y), Mm(x + w), Mm(y + h)).with_mode(PaintMode::Fill));
    }

    fn stroke_rect(&self, x: f32, y: f32, w: f32, h: f32) {
        self.layer.set_outline_color(color(GRID));
        self.layer.set_outline_thickness(1.0);
        self.layer
            .add_rect(Rect::new(Mm(x), Mm(y), Mm(x + w), Mm(y + h)).with_mode(PaintMode::Stroke));
    }

    /// One grid row; cells wrap within equal-width columns.
    fn table_row(&mut self, cells: &[String], cols: usize, header: bool, fill: u32) {
        let (size, face, text_color, pad) = if header {
            (10.0, Face::Bold, TITLE, 8.0 * PT)
        } else {
            (9.0, Face::Regular, BODY, 6.0 * PT)
        };
        let col_w = CONTENT_W / cols as f32;
        let inner_w = (col_w - 2.0 * 4.0 * PT).max(4.0);
        let leading = size * 1.2 * PT;

        let wrapped: Vec<Vec<Vec<Word>>> = (0..cols)
            .map(|i| {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                let force = header.then_some(face);
                wrap(words(&spans(cell), text_color, force), size, inner_w, inner_w)
            })
            .collect();
        let max_lines = wrapped.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let height = max_lines as f32 * leading + 2.0 * pad;

        self.ensure(height);
        let top = self.y;
        let bottom = top - height;
        for i in 0..cols {
            let x = MARGIN + i as f32 * col_w;
            self.fill_rect(x, bottom, col_w, height, fill);
            self.stroke_rect(x, bottom, col_w, height);
        }
        for (i, lines) in wrapped.iter().enumerate() {
            let x = MARGIN + i as f32 * col_w + 4.0 * PT;
            let mut baseline = top - pad - leading + size * 0.25 * PT;
            for line in lines {
                self.draw_line(line, size, x, baseline);
                baseline -= leading;
            }
        }
        self.y = bottom;
    }

    fn table(&mut self, header: &[String], rows: &[Vec<String>]) {
        let cols = header.len().max(1);
        self.table_row(header, cols, true, HEADER_FILL);
        for (i, row) in rows.iter().enumerate() {
            self.table_row(row, cols, false, ROW_FILLS[i % 2]);
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, text } => self.heading(*level, text),
            Block::Paragraph(text) => {
                self.text(
                    &spans(text),
                    &TextStyle {
                        size: 11.0,
                        color: BODY,
                        face: None,
                        align: Align::Left,
                        first_indent: 0.25 * INCH,
                        left_indent: 0.0,
                    },
                );
                self.gap_pt(4.0);
            }
            Block::Bullet(text) => {
                let mut s = vec![Span::plain("- ")];
                s.extend(spans(text));
                self.text(
                    &s,
                    &TextStyle {
                        size: 11.0,
                        color: BODY,
                        face: None,
                        align: Align::Left,
                        first_indent: 0.0,
                        left_indent: 0.5 * INCH,
                    },
                );
                self.gap_pt(2.0);
            }
            Block::Table { header, rows } => self.table(header, rows),
            Block::Spacer(pt) => self.gap_pt(*pt),
        }
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc
            .save_to_bytes()
            .map_err(|e| Error::Render(e.to_string()))
    }
}

pub fn format_date(date: chrono::NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

/// Lay out a markdown-ish report as a PDF.
///
/// References, when present, go on their own page as a numbered list. Every page carries a
/// footer with `date`.
pub fn render_pdf(
    title: &str,
    text: &str,
    references: &[String],
    date: chrono::NaiveDate,
) -> Result<Vec<u8>> {
    let date = format_date(date);
    let doc_title = if title.trim().is_empty() {
        "Research Report"
    } else {
        title
    };
    let mut w = Writer::new(doc_title, format!("{FOOTER_PREFIX}  {date}"))?;

    if !title.trim().is_empty() {
        w.text(
            &[Span::plain(title.trim())],
            &TextStyle {
                size: 24.0,
                color: TITLE,
                face: Some(Face::Bold),
                align: Align::Center,
                first_indent: 0.0,
                left_indent: 0.0,
            },
        );
        w.gap_pt(6.0);
    }
    w.text(
        &[Span::plain(date.as_str())],
        &TextStyle {
            size: 9.0,
            color: MUTED,
            face: Some(Face::Regular),
            align: Align::Center,
            first_indent: 0.0,
            left_indent: 0.0,
        },
    );
    w.gap_pt(0.2 * 72.0);

    let blocks = scan(text);
    tracing::debug!(blocks = blocks.len(), "rendering report");
    for block in &blocks {
        w.block(block);
    }

    if !references.is_empty() {
        w.new_page();
        w.heading(1, "References");
        w.gap_pt(0.1 * 72.0);
        for (i, r) in references.iter().enumerate() {
            w.text(
                &[
                    Span::plain(format!("[{}]", i + 1)),
                    Span::linked(format!(" {r}"), r.as_str()),
                ],
                &TextStyle {
                    size: 10.0,
                    color: LINK,
                    face: Some(Face::Regular),
                    align: Align::Left,
                    first_indent: 0.0,
                    left_indent: 0.5 * INCH,
                },
            );
            w.gap_pt(2.0);
        }
    }

    tracing::info!(pages = w.pages, "pdf rendered");
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn plain_words(text: &str) -> Vec<Word> {
        words(&[Span::plain(text)], BODY, None)
    }

    #[test]
    fn date_uses_long_month_form() {
        assert_eq!(format_date(date()), "March 05, 2024");
    }

    #[test]
    fn typography_is_mapped_to_ascii() {
        assert_eq!(printable("\u{201c}a\u{201d} \u{2014} b\u{2026} \u{4e2d}"), "\"a\" - b. ?");
    }

    #[test]
    fn latin1_letters_pass_through() {
        let latin = "caf\u{e9} \u{fc}ber Espa\u{f1}a \u{a9}";
        assert_eq!(printable(latin), latin);
        assert_eq!(printable("\u{0100}\u{4e2d}"), "??");
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn markdown_links_and_references_become_uri_actions() {
        let text = "See [the tokio docs](https://docs.example/tokio) for details.";
        let refs = vec!["https://ref.example/one".to_string()];
        let bytes = render_pdf("Links", text, &refs, date()).unwrap();
        assert!(contains(&bytes, b"/URI"));
        assert!(contains(&bytes, b"https://docs.example/tokio"));
        assert!(contains(&bytes, b"https://ref.example/one"));
    }

    #[test]
    fn styled_runs_glue_to_neighbouring_text() {
        let w = words(&spans("foo**bar** baz"), BODY, None);
        let glued: Vec<bool> = w.iter().map(|w| w.glued).collect();
        assert_eq!(glued, vec![false, true, false]);
        assert_eq!(w[1].face, Face::Bold);
    }

    #[test]
    fn wrapping_respects_width() {
        let text = "lorem ipsum dolor sit amet ".repeat(40);
        let lines = wrap(plain_words(&text), 11.0, 100.0, 120.0);
        assert!(lines.len() > 3);
        assert!(line_width(&lines[0], 11.0) <= 100.0);
        for l in &lines[1..] {
            assert!(line_width(l, 11.0) <= 120.0);
        }
        let total: usize = lines.iter().map(Vec::len).sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn overlong_words_are_broken() {
        let url = format!("https://example.com/{}", "a".repeat(400));
        let lines = wrap(plain_words(&url), 10.0, 80.0, 80.0);
        assert!(lines.len() > 1);
        let joined: String = lines.iter().flatten().map(|w| w.text.as_str()).collect();
        assert_eq!(joined, url);
    }

    #[test]
    fn renders_a_pdf_with_tables_and_references() {
        let mut text = String::from("# Findings\n\nIntro with **bold** and `code`.\n\n");
        text.push_str("| Name | Value |\n|---|---|\n| a | 1 |\n| b | 2 |\n\n");
        for i in 0..120 {
            text.push_str(&format!("- bullet number {i} with [a link](https://x.example/{i})\n"));
        }
        let refs = vec!["https://a.example/".to_string(), "https://b.example/".to_string()];
        let bytes = render_pdf("Report", &text, &refs, date()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn empty_report_still_renders() {
        let bytes = render_pdf("", "", &[], date()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
