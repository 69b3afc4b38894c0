// Text Processing Service
// Input classification and plain-text helpers shared by the pipeline

use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

fn open_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([a-zA-Z][^>]*?)>").unwrap())
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

/// Whether the input should take the HTML path.
///
/// Cheap markup checks first; otherwise ask the parser whether it found any
/// element at all.
pub fn is_html(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    if text.contains("</") || text.contains("/>") || open_tag_re().is_match(text) {
        return true;
    }

    Html::parse_fragment(text)
        .root_element()
        .descendants()
        .skip(1)
        .any(|n| n.value().is_element())
}

/// Unicode word count (UAX #29 word boundaries, words only).
pub fn count_words(text: &str) -> usize {
    text.unicode_words().count()
}

/// Collapse runs of three or more newlines to one blank line and trim.
pub fn collapse_blank_lines(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    blank_run_re()
        .replace_all(&normalized, "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_html() {
        assert!(is_html("<p>Hello</p>"));
        assert!(is_html("line<br/>break"));
        assert!(is_html("<img src=x>"));
        assert!(!is_html("Just some text, 3 < 4 and 5 > 2."));
        assert!(!is_html("   "));
        assert!(!is_html(""));
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words("Hello, world!"), 2);
        assert_eq!(count_words("Привет мир"), 2);
        assert_eq!(count_words("  "), 0);
        assert_eq!(count_words("[Words: 7]"), 2);
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("\nA\n\n\n\nB\r\nC\n"), "A\n\nB\nC");
    }
}
