// Word-count marker
// Appends a visible "[Words: N]" block, at most once

use regex::Regex;
use std::sync::OnceLock;

use super::html_nodes::{visible_text_runs, MarkupKind};
use super::text_processor::count_words;

fn trailing_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[Words:\s*(\d+)\]\s*$").unwrap())
}

pub fn format_marker(n: usize) -> String {
    format!("[Words: {}]", n)
}

/// N of a trailing `[Words: N]`, if the text ends with one.
pub fn trailing_marker_count(text: &str) -> Option<usize> {
    trailing_marker_re()
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Drop a trailing marker, e.g. one the model added on its own.
pub fn strip_trailing_marker(text: &str) -> String {
    trailing_marker_re().replace(text, "").trim_end().to_string()
}

/// Append the marker as a trailing line of plain text.
///
/// Returns the marked text and the N its marker states. A marker already
/// at the end is kept as is.
pub fn mark_plain(text: &str) -> (String, usize) {
    if let Some(n) = trailing_marker_count(text) {
        return (text.to_string(), n);
    }
    let body = text.trim_end();
    if body.is_empty() {
        return (format_marker(0), 0);
    }
    let n = count_words(body);
    (format!("{}\n{}", body, format_marker(n)), n)
}

/// Append the marker as a trailing paragraph of the page body.
///
/// Documents get the paragraph right before `</body>`; if that cannot be
/// located the marker goes on as a plain trailing line instead. Returns the
/// marked HTML and the N its marker states, counted over visible text only.
pub fn mark_html(html: &str) -> (String, usize) {
    let runs = visible_text_runs(html);
    if let Some(n) = runs.last().and_then(|last| trailing_marker_count(last)) {
        return (html.to_string(), n);
    }

    let n = count_words(&runs.join(" "));
    let marker = format_marker(n);
    let paragraph = format!("<p>{}</p>", marker);

    let marked = if MarkupKind::detect(html) == MarkupKind::Document {
        match html.to_ascii_lowercase().rfind("</body>") {
            Some(pos) => format!("{}{}{}", &html[..pos], paragraph, &html[pos..]),
            None => format!("{}\n{}", html, marker),
        }
    } else {
        format!("{}{}", html, paragraph)
    };
    (marked, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_marker_appended_once() {
        let (once, n) = mark_plain("one two three");
        assert_eq!(once, "one two three\n[Words: 3]");
        assert_eq!(n, 3);
        assert_eq!(mark_plain(&once), (once.clone(), 3));
    }

    #[test]
    fn test_existing_marker_not_doubled() {
        let text = "Seven words are written right here now.\n[Words: 7]";
        assert_eq!(mark_plain(text), (text.to_string(), 7));
        assert_eq!(mark_plain("x [Words:7]  \n"), ("x [Words:7]  \n".to_string(), 7));
    }

    #[test]
    fn test_reported_count_matches_kept_marker() {
        let (text, n) = mark_plain("Edited text here.\n[Words: 3]");
        assert_eq!(text, "Edited text here.\n[Words: 3]");
        assert_eq!(n, 3);

        let (html, n) = mark_html("<p>one two</p><p>[Words: 2]</p>");
        assert_eq!(html, "<p>one two</p><p>[Words: 2]</p>");
        assert_eq!(n, 2);
    }

    #[test]
    fn test_html_fragment_gets_trailing_paragraph() {
        let (out, n) = mark_html("<p>Hello <b>brave</b> world</p>");
        assert_eq!(out, "<p>Hello <b>brave</b> world</p><p>[Words: 3]</p>");
        assert_eq!(n, 3);
        assert_eq!(mark_html(&out).0, out);
    }

    #[test]
    fn test_html_document_marker_inside_body() {
        let html = "<html><head><title>Ignore me</title></head><body><p>a b</p></body></html>";
        let (out, _) = mark_html(html);
        assert_eq!(
            out,
            "<html><head><title>Ignore me</title></head><body><p>a b</p><p>[Words: 2]</p></body></html>"
        );
    }

    #[test]
    fn test_uppercase_body_tag_is_a_document() {
        let (out, n) = mark_html("<BODY class=\"x\"><p>a</p>");
        assert_eq!(out, "<BODY class=\"x\"><p>a</p>\n[Words: 1]");
        assert_eq!(n, 1);
    }

    #[test]
    fn test_uppercase_closing_body_found() {
        let (out, _) = mark_html("<BODY><P>a b</P></BODY>");
        assert_eq!(out, "<BODY><P>a b</P><p>[Words: 2]</p></BODY>");
    }

    #[test]
    fn test_html_without_closing_body_falls_back_to_line() {
        let (out, _) = mark_html("<body><p>a</p>");
        assert_eq!(out, "<body><p>a</p>\n[Words: 1]");
    }

    #[test]
    fn test_visible_word_count_ignores_tags_and_scripts() {
        let html = r#"<div class="x"><script>var a = 1;</script><p>One <a href="/long/url">two</a></p></div>"#;
        let (out, n) = mark_html(html);
        assert_eq!(n, 2);
        assert!(out.ends_with("<p>[Words: 2]</p>"));
    }

    #[test]
    fn test_strip_trailing_marker() {
        assert_eq!(strip_trailing_marker("text\n[Words: 12]\n"), "text");
        assert_eq!(strip_trailing_marker("no marker"), "no marker");
        assert_eq!(trailing_marker_count("text\n[Words: 12]\n"), Some(12));
        assert_eq!(trailing_marker_count("no marker"), None);
    }
}
