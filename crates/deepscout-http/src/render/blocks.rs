//! Line classification for report text.
//!
//! The scanner is a small state machine: at most one of a paragraph or a table is pending at
//! any time, and every transition that leaves a state goes through a named flush.

/// Vertical gap after a blank line, in points (0.05 in).
pub const BLANK_GAP_PT: f32 = 3.6;
/// Vertical gap after a table, in points (0.1 in).
pub const TABLE_GAP_PT: f32 = 7.2;

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    Bullet(String),
    Table { header: Vec<String>, rows: Vec<Vec<String>> },
    Spacer(f32),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScanState {
    #[default]
    Neutral,
    Paragraph(Vec<String>),
    Table(Vec<String>),
}

/// Header cells plus data rows (everything after the separator line).
///
/// Needs at least two non-empty lines.
pub fn parse_table_block(lines: &[String]) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let rows: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if rows.len() < 2 {
        return None;
    }
    let cells = |row: &str| -> Vec<String> {
        row.trim_matches('|')
            .split('|')
            .map(|c| c.trim().to_string())
            .collect()
    };
    let header = cells(rows[0]);
    let data = rows[2..].iter().map(|r| cells(r)).collect();
    Some((header, data))
}

fn is_table_row(line: &str, next: Option<&str>) -> bool {
    line.contains('|') && (line.matches('|').count() > 1 || next.is_some_and(|n| n.contains('|')))
}

fn heading(line: &str) -> Option<(u8, &str)> {
    if let Some(t) = line.strip_prefix("# ") {
        Some((1, t))
    } else if let Some(t) = line.strip_prefix("## ") {
        Some((2, t))
    } else {
        line.strip_prefix("### ").map(|t| (3, t))
    }
}

fn bullet(line: &str) -> Option<&str> {
    line.strip_prefix("* ").or_else(|| line.strip_prefix("- "))
}

#[derive(Debug, Default)]
struct Scanner {
    state: ScanState,
    out: Vec<Block>,
}

impl Scanner {
    fn flush_paragraph(&mut self) {
        let ScanState::Paragraph(lines) = &self.state else {
            return;
        };
        let text = lines.join(" ");
        self.state = ScanState::Neutral;
        self.out.push(Block::Paragraph(text));
    }

    fn flush_table(&mut self) {
        let ScanState::Table(lines) = &self.state else {
            return;
        };
        let parsed = parse_table_block(lines);
        if parsed.is_none() {
            tracing::debug!(lines = lines.len(), "dropping malformed table");
        }
        self.state = ScanState::Neutral;
        if let Some((header, rows)) = parsed {
            self.out.push(Block::Table { header, rows });
            self.out.push(Block::Spacer(TABLE_GAP_PT));
        }
    }

    fn flush(&mut self) {
        match self.state {
            ScanState::Paragraph(_) => self.flush_paragraph(),
            ScanState::Table(_) => self.flush_table(),
            ScanState::Neutral => {}
        }
    }

    fn blank(&mut self) {
        self.flush();
        self.out.push(Block::Spacer(BLANK_GAP_PT));
    }

    fn table_row(&mut self, line: &str) {
        self.flush_paragraph();
        match &mut self.state {
            ScanState::Table(rows) => rows.push(line.to_string()),
            state => *state = ScanState::Table(vec![line.to_string()]),
        }
    }

    fn text(&mut self, line: &str) {
        match &mut self.state {
            ScanState::Paragraph(lines) => lines.push(line.to_string()),
            state => *state = ScanState::Paragraph(vec![line.to_string()]),
        }
    }

    /// One line of input. A non-table line ends a pending table and is then reconsidered
    /// from the neutral state.
    fn line(&mut self, line: &str, next: Option<&str>) {
        if line.is_empty() {
            self.blank();
            return;
        }
        if is_table_row(line, next) {
            self.table_row(line);
            return;
        }
        if matches!(self.state, ScanState::Table(_)) {
            self.flush_table();
        }
        if let Some((level, text)) = heading(line) {
            self.flush_paragraph();
            self.out.push(Block::Heading {
                level,
                text: text.to_string(),
            });
        } else if let Some(text) = bullet(line) {
            self.flush_paragraph();
            self.out.push(Block::Bullet(text.to_string()));
        } else {
            self.text(line);
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_paragraph();
        self.flush_table();
        self.out
    }
}

pub fn scan(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut scanner = Scanner::default();
    for (i, raw) in lines.iter().enumerate() {
        scanner.line(raw.trim(), lines.get(i + 1).copied());
    }
    scanner.finish()
}
