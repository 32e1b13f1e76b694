//! Markdown table replies into rows of cells.

fn is_separator(cells: &[String], line: &str) -> bool {
    cells.len() > 1
        && line
            .chars()
            .all(|c| matches!(c, '-' | ':' | '|' | ' '))
}

fn normalize_row(line: &str) -> String {
    line.trim()
        .trim_matches('|')
        .replace(" | ", "|")
        .replace("| ", "|")
        .replace(" |", "|")
}

/// Parse a markdown table.
///
/// The first all-dash/colon line is taken as the header separator and skipped; later ones
/// are kept as data. Every row is padded with empty cells to the first row's width.
pub fn parse_markdown_table(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut separator_seen = false;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let normalized = normalize_row(line);
        let cells: Vec<String> = normalized
            .split('|')
            .map(|c| c.trim().to_string())
            .collect();
        if !separator_seen && is_separator(&cells, &normalized) {
            separator_seen = true;
            continue;
        }
        rows.push(cells);
    }

    if let Some(width) = rows.first().map(Vec::len) {
        for row in rows.iter_mut() {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
    }
    rows
}

/// Pipe-joined rows with a separator after the header.
pub fn to_markdown(rows: &[Vec<String>]) -> String {
    let mut out = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        out.push(format!("| {} |", row.join(" | ")));
        if i == 0 {
            let sep = vec!["---"; row.len()].join(" | ");
            out.push(format!("| {sep} |"));
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn simple_table() {
        assert_eq!(
            parse_markdown_table("| A | B |\n|---|---|\n| 1 | 2 |"),
            s(&[&["A", "B"], &["1", "2"]])
        );
    }

    #[test]
    fn aligned_separator_and_ragged_rows() {
        let text = "\n| Name | Size | Notes |\n|:---:|:---|---:|\n| a | 1 |\n|b|2|x|\n";
        assert_eq!(
            parse_markdown_table(text),
            s(&[&["Name", "Size", "Notes"], &["a", "1", ""], &["b", "2", "x"]])
        );
    }

    #[test]
    fn only_first_separator_is_skipped() {
        let text = "| A | B |\n|---|---|\n| 1 | 2 |\n|---|---|";
        let rows = parse_markdown_table(text);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["---", "---"]);
    }

    #[test]
    fn prose_becomes_single_cell_rows() {
        assert_eq!(parse_markdown_table("just words"), s(&[&["just words"]]));
        assert!(parse_markdown_table("  \n \n").is_empty());
    }

    proptest! {
        #[test]
        fn reparse_of_serialized_table_is_stable(
            rows in proptest::collection::vec(
                proptest::collection::vec("[A-Za-z0-9][A-Za-z0-9 ]{0,8}[A-Za-z0-9]", 3),
                1..6,
            )
        ) {
            let first = parse_markdown_table(&to_markdown(&rows));
            let second = parse_markdown_table(&to_markdown(&first));
            prop_assert_eq!(&first, &rows);
            prop_assert_eq!(first, second);
        }
    }
}
