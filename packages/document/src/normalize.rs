//! Whitespace cleanup for extracted page text.
//!
//! PDF text extraction pads lines with trailing spaces and emits long runs
//! of blank lines for layout gaps. Both only cost prompt tokens.

use std::sync::LazyLock;

use regex::Regex;

/// Spaces and tabs at the end of a line.
static TRAILING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").expect("valid regex"));

/// Three or more consecutive line breaks.
static BLANK_RUNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Trims trailing spaces/tabs from every line, collapses three or more
/// consecutive line breaks into a single blank line, and trims the result.
#[must_use]
pub fn normalize_page_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = TRAILING_RE.replace_all(&text, "");
    let text = BLANK_RUNS_RE.replace_all(&text, "\n\n");

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_whitespace_and_blank_runs() {
        let raw = "  Provider: ACME Clinic   \r\n\r\n\r\n\r\nCPT 99213\t\n\n\nTotal $120.00  \n\n";
        assert_eq!(
            normalize_page_text(raw),
            "Provider: ACME Clinic\n\nCPT 99213\n\nTotal $120.00"
        );
    }

    #[test]
    fn keeps_single_blank_lines() {
        assert_eq!(normalize_page_text("a\n\nb\nc"), "a\n\nb\nc");
    }

    #[test]
    fn normalizes_many_pages_consistently() {
        let pages: Vec<String> = (0..50)
            .map(|i| normalize_page_text(&format!("page {i}   \n\n\n\nend")))
            .collect();
        assert_eq!(pages[0], "page 0\n\nend");
        assert_eq!(pages[49], "page 49\n\nend");
    }
}
