//! Knowledge-base text normalization applied before chunking

use once_cell::sync::Lazy;
use regex::Regex;

/// Any horizontal whitespace run (everything whitespace except newline)
static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());

/// Trailing spaces at the end of a line
static TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m) +$").unwrap());

/// Two or more blank lines in a row
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[^\S\n]*\n){2,}").unwrap());

/// Indentation in front of a section heading
static INDENTED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^ +(Section \d+:)").unwrap());

/// Section heading at the start of a line
pub(crate) static SECTION_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Section \d+:").unwrap());

/// Typographic characters replaced by plain ASCII
const ASCII_REPLACEMENTS: &[(char, &str)] = &[
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{2014}', "-"),
    ('\u{2013}', "-"),
];

/// Deterministic, pure text cleanup for knowledge-base documents
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize raw knowledge-base text.
    ///
    /// Applying the result a second time yields the same string.
    pub fn normalize(&self, raw: &str) -> String {
        let text = raw.replace("\r\n", "\n").replace('\r', "\n");
        let text = Self::to_ascii_punctuation(&text);
        let text = HORIZONTAL_WS.replace_all(&text, " ");
        let text = TRAILING_WS.replace_all(&text, "");
        let text = INDENTED_HEADING.replace_all(&text, "$1");
        let text = Self::space_after_header_colons(&text);
        let text = Self::separate_section_headings(&text);
        let text = BLANK_RUNS.replace_all(&text, "\n\n");

        let normalized = text.trim().to_string();
        tracing::debug!(
            raw_len = raw.len(),
            normalized_len = normalized.len(),
            "Normalized knowledge-base text"
        );
        normalized
    }

    fn to_ascii_punctuation(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match ASCII_REPLACEMENTS.iter().find(|(from, _)| *from == c) {
                Some((_, to)) => out.push_str(to),
                None => out.push(c),
            }
        }
        out
    }

    /// `Note:see below` becomes `Note: see below` and `Warranty:2 years` becomes
    /// `Warranty: 2 years`; `10:30` and `http://` are untouched
    fn space_after_header_colons(text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 16);
        let mut prev: Option<char> = None;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            out.push(c);
            let next = chars.peek().copied();
            if c == ':'
                && prev.is_some_and(is_word_char)
                && next.is_some_and(|next| {
                    next.is_alphabetic()
                        || (next.is_ascii_digit() && !prev.is_some_and(|p| p.is_ascii_digit()))
                })
            {
                out.push(' ');
            }
            prev = Some(c);
        }

        out
    }

    /// Ensure every heading line is preceded by a blank line
    fn separate_section_headings(text: &str) -> String {
        let mut lines: Vec<&str> = Vec::new();

        for line in text.split('\n') {
            if SECTION_HEADING.is_match(line) {
                if let Some(prev) = lines.last() {
                    if !prev.trim().is_empty() {
                        lines.push("");
                    }
                }
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Convenience wrapper around [`TextNormalizer::normalize`]
pub fn normalize(raw: &str) -> String {
    TextNormalizer::new().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_horizontal_whitespace() {
        assert_eq!(normalize("a   b\t\tc"), "a b c");
        assert_eq!(normalize("line one   \nline two"), "line one\nline two");
    }

    #[test]
    fn test_collapses_blank_line_runs() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(normalize("a\n  \n \n\nb"), "a\n\nb");
        assert_eq!(normalize("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_trims_document() {
        assert_eq!(normalize("  \n\nhello\n\n  "), "hello");
    }

    #[test]
    fn test_ascii_punctuation() {
        let raw = "\u{201C}Smart\u{201D} \u{2018}home\u{2019} \u{2014} hub \u{2013} v2";
        assert_eq!(normalize(raw), "\"Smart\" 'home' - hub - v2");
    }

    #[test]
    fn test_heading_gets_blank_line() {
        let raw = "Intro text\nSection 1: Returns\nBody\nSection 2: Shipping\nMore";
        assert_eq!(
            normalize(raw),
            "Intro text\n\nSection 1: Returns\nBody\n\nSection 2: Shipping\nMore"
        );
    }

    #[test]
    fn test_header_colon_spacing() {
        assert_eq!(normalize("Policy:AP-001"), "Policy: AP-001");
        assert_eq!(normalize("Section 4:Warranty"), "Section 4: Warranty");
        assert_eq!(normalize("Open 10:30 daily"), "Open 10:30 daily");
        assert_eq!(normalize("see https://example.com"), "see https://example.com");
        assert_eq!(normalize("Already: spaced"), "Already: spaced");
        assert_eq!(normalize("Warranty:2 years"), "Warranty: 2 years");
        assert_eq!(normalize("Model AP-100:3 units"), "Model AP-100:3 units");
        assert_eq!(normalize("Ratio 16:9"), "Ratio 16:9");
    }

    #[test]
    fn test_indented_headings_start_sections() {
        let raw = "Intro text.\n  Section 1: Returns\nReturn within 60 days.\n\t Section 2: Shipping\nShips in 5 days.";
        let normalized = normalize(raw);
        assert_eq!(
            normalized,
            "Intro text.\n\nSection 1: Returns\nReturn within 60 days.\n\nSection 2: Shipping\nShips in 5 days."
        );

        let sections: Vec<String> = crate::ingestion::DocumentChunker::new(500, 50)
            .chunk_document(&normalized)
            .into_iter()
            .map(|c| c.section)
            .collect();
        assert_eq!(sections, vec!["General", "Section 1: Returns", "Section 2: Shipping"]);
    }

    #[test]
    fn test_idempotent() {
        let raw = "  Section 1:Intro \u{2014} \u{201C}hi\u{201D}\n\n\n\nText:more\r\nSection 2: Next\n\n\n";
        let once = normalize(raw);
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t\n "), "");
    }
}
