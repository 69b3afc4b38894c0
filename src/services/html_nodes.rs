// HTML Text Node Service
// Swaps readable text leaves for id placeholders and writes edited text back.
//
// A placeholder is the text node itself with its content replaced by
// U+E000 <id> U+E001. Markup, attributes and whitespace-only leaves are never
// touched, so the skeleton re-serializes to the input up to html5ever's own
// normalization.

use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::OnceLock;
use tracing::debug;

use crate::models::{EditedMap, TextNodeMap, TextNodeRecord};

const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// Removed before tokenizing; their content must never reach the model.
const STRIPPED_ELEMENTS: &str = "script, style, noscript";

/// Raw-text containers: the serializer writes their text unescaped, so it is
/// never tokenized and passes through untouched.
const OPAQUE_CONTAINERS: &[&str] = &["xmp", "plaintext", "iframe", "noembed", "noframes"];

/// Containers whose text is not part of the visible page.
const HIDDEN_CONTAINERS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "title", "iframe", "noembed", "noframes",
];

fn inside_any<'a>(mut ancestors: impl Iterator<Item = &'a Node>, containers: &[&str]) -> bool {
    ancestors.any(|a| {
        a.as_element()
            .map_or(false, |e| containers.contains(&e.name()))
    })
}

fn stripped_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse(STRIPPED_ELEMENTS).unwrap())
}

fn body_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("body").unwrap())
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("\u{E000}([^\u{E001}]*)\u{E001}").unwrap())
}

fn document_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<!doctype|<html[\s>]|<head[\s>]|<body[\s>]").unwrap())
}

/// Whether the markup is a whole page or a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    /// Serialized with doctype/html/head/body.
    Document,
    /// Serialized as the bare children of the fragment root.
    Fragment,
}

impl MarkupKind {
    pub fn detect(html: &str) -> Self {
        if document_re().is_match(html) {
            Self::Document
        } else {
            Self::Fragment
        }
    }

    fn parse(self, html: &str) -> Html {
        match self {
            Self::Document => Html::parse_document(html),
            Self::Fragment => Html::parse_fragment(html),
        }
    }

    fn serialize(self, doc: &Html) -> String {
        match self {
            Self::Document => doc.html(),
            Self::Fragment => doc.root_element().inner_html(),
        }
    }
}

/// Serialized HTML with every tokenized text leaf replaced by its placeholder.
#[derive(Debug, Clone)]
pub struct Skeleton {
    html: String,
    kind: MarkupKind,
}

impl Skeleton {
    pub fn as_str(&self) -> &str {
        &self.html
    }

    pub fn kind(&self) -> MarkupKind {
        self.kind
    }
}

/// Sequential id source scoped to one tokenization call.
#[derive(Debug, Default)]
struct IdCounter {
    issued: usize,
}

impl IdCounter {
    fn next_id(&mut self) -> String {
        self.issued += 1;
        format!("t{}", self.issued)
    }
}

fn placeholder(id: &str) -> String {
    format!("{}{}{}", PLACEHOLDER_OPEN, id, PLACEHOLDER_CLOSE)
}

/// Subtree that holds the readable content: `<body>` for documents, the
/// fragment root otherwise.
fn content_root(doc: &Html) -> ElementRef<'_> {
    doc.select(body_selector())
        .next()
        .unwrap_or_else(|| doc.root_element())
}

fn strip_invisible(doc: &mut Html) {
    let ids: Vec<_> = doc.select(stripped_selector()).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Split `html` into a placeholder skeleton and the ordered id -> text mapping.
pub fn tokenize(html: &str) -> (Skeleton, TextNodeMap) {
    let kind = MarkupKind::detect(html);
    let mut doc = kind.parse(html);
    strip_invisible(&mut doc);

    let targets: Vec<_> = content_root(&doc)
        .descendants()
        .filter_map(|node| {
            let text: &str = node.value().as_text()?;
            if text.trim().is_empty()
                || inside_any(node.ancestors().map(|a| a.value()), OPAQUE_CONTAINERS)
            {
                return None;
            }
            let parent_tag = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_lowercase()))
                .filter(|name| name != "html")
                .unwrap_or_else(|| "div".to_string());
            Some((node.id(), text.to_string(), parent_tag))
        })
        .collect();

    let mut counter = IdCounter::default();
    let mut mapping = TextNodeMap::new();

    for (node_id, text, parent_tag) in targets {
        let id = counter.next_id();
        if let Some(mut node) = doc.tree.get_mut(node_id) {
            if let Node::Text(t) = node.value() {
                t.text = placeholder(&id).as_str().into();
            }
        }
        mapping.push(TextNodeRecord {
            id,
            text,
            parent_tag,
        });
    }

    debug!(
        "[HTML_NODES] tokenized {} text nodes ({:?})",
        mapping.len(),
        kind
    );

    let skeleton = Skeleton {
        html: kind.serialize(&doc),
        kind,
    };
    (skeleton, mapping)
}

fn fill_placeholders(text: &str, edited: &EditedMap, mapping: &TextNodeMap) -> String {
    placeholder_re()
        .replace_all(text, |caps: &Captures| {
            let id = &caps[1];
            edited
                .get(id)
                .map(String::as_str)
                .or_else(|| mapping.get(id).map(|r| r.text.as_str()))
                .unwrap_or_default()
                .to_string()
        })
        .into_owned()
}

/// Put edited text back into the skeleton.
///
/// Ids missing from `edited` fall back to the source text in `mapping`.
/// Every placeholder marker is consumed, whether or not its id is known.
pub fn reassemble(skeleton: &Skeleton, edited: &EditedMap, mapping: &TextNodeMap) -> String {
    let mut doc = skeleton.kind.parse(&skeleton.html);

    // Reparsing can merge neighbouring placeholders into one text node.
    let marked: Vec<_> = doc
        .tree
        .root()
        .descendants()
        .filter(|n| {
            n.value()
                .as_text()
                .map_or(false, |t| t.contains(PLACEHOLDER_OPEN))
        })
        .map(|n| n.id())
        .collect();

    for node_id in marked {
        if let Some(mut node) = doc.tree.get_mut(node_id) {
            if let Node::Text(t) = node.value() {
                let restored = fill_placeholders(&t.text, edited, mapping);
                t.text = restored.as_str().into();
            }
        }
    }

    skeleton.kind.serialize(&doc)
}

/// Trimmed, non-empty visible text runs in document order.
pub fn visible_text_runs(html: &str) -> Vec<String> {
    let doc = MarkupKind::detect(html).parse(html);

    doc.root_element()
        .descendants()
        .filter_map(|node| {
            let text: &str = node.value().as_text()?;
            let trimmed = text.trim();
            if trimmed.is_empty() || inside_any(node.ancestors().map(|a| a.value()), HIDDEN_CONTAINERS) {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edits(pairs: &[(&str, &str)]) -> EditedMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tag_preservation() {
        let (skeleton, mapping) = tokenize("<p>Hello <b>world</b></p>");
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("t1").unwrap().text, "Hello ");
        assert_eq!(mapping.get("t1").unwrap().parent_tag, "p");
        assert_eq!(mapping.get("t2").unwrap().text, "world");
        assert_eq!(mapping.get("t2").unwrap().parent_tag, "b");

        let out = reassemble(&skeleton, &edits(&[("t1", "Hi "), ("t2", "earth")]), &mapping);
        assert_eq!(out, "<p>Hi <b>earth</b></p>");
    }

    #[test]
    fn test_round_trip_identity_without_edits() {
        let input = r#"<div class="card" id="x"><h2>Title</h2><p>One &amp; two <a href="/a?b=1&amp;c=2">link</a></p><img src="x.png" alt="pic"><br>tail</div>"#;
        let (skeleton, mapping) = tokenize(input);
        let out = reassemble(&skeleton, &mapping.original_texts(), &mapping);

        let expected = Html::parse_fragment(input).root_element().inner_html();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_whitespace_only_leaves_untouched() {
        let input = "<ul>\n  <li>One</li>\n  <li>Two</li>\n</ul>";
        let (skeleton, mapping) = tokenize(input);
        assert_eq!(mapping.len(), 2);

        let out = reassemble(&skeleton, &edits(&[("t1", "Uno"), ("t2", "Dos")]), &mapping);
        assert_eq!(out, "<ul>\n  <li>Uno</li>\n  <li>Dos</li>\n</ul>");
    }

    #[test]
    fn test_scripts_and_styles_never_reach_mapping() {
        let input = "<div><style>p{color:red}</style><script>var secret = 1;</script><noscript>enable js</noscript><p>Visible</p></div>";
        let (skeleton, mapping) = tokenize(input);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("t1").unwrap().text, "Visible");
        assert!(!skeleton.as_str().contains("secret"));
        assert!(!skeleton.as_str().contains("color:red"));
    }

    #[test]
    fn test_ids_are_sequential_in_document_order() {
        let (_, mapping) = tokenize("<h1>A</h1><p>B <i>C</i> D</p><footer>E</footer>");
        let ids: Vec<&str> = mapping.ids().collect();
        assert_eq!(ids, vec!["t1", "t2", "t3", "t4", "t5"]);
        let texts: Vec<&str> = mapping.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B ", "C", " D", "E"]);
    }

    #[test]
    fn test_each_run_tokenizes_from_t1() {
        let (_, first) = tokenize("<p>a</p><p>b</p>");
        let (_, second) = tokenize("<p>c</p>");
        assert_eq!(first.ids().last(), Some("t2"));
        assert_eq!(second.ids().next(), Some("t1"));
    }

    #[test]
    fn test_bare_text_defaults_parent_to_div() {
        let (_, mapping) = tokenize("loose text <em>x</em>");
        assert_eq!(mapping.get("t1").unwrap().parent_tag, "div");
        assert_eq!(mapping.get("t2").unwrap().parent_tag, "em");
    }

    #[test]
    fn test_missing_edit_falls_back_to_source_text() {
        let (skeleton, mapping) = tokenize("<p>keep me</p><p>change me</p>");
        let out = reassemble(&skeleton, &edits(&[("t2", "changed")]), &mapping);
        assert_eq!(out, "<p>keep me</p><p>changed</p>");
    }

    #[test]
    fn test_no_placeholder_leaks_into_output() {
        let (skeleton, mapping) = tokenize("<p>a</p><div><span>b</span></div>");
        assert!(skeleton.as_str().contains(PLACEHOLDER_OPEN));
        let out = reassemble(&skeleton, &EditedMap::new(), &TextNodeMap::new());
        assert!(!out.contains(PLACEHOLDER_OPEN));
        assert!(!out.contains(PLACEHOLDER_CLOSE));
        assert!(!out.contains("t1"));
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn test_edited_text_is_escaped() {
        let (skeleton, mapping) = tokenize("<p>x</p>");
        let out = reassemble(&skeleton, &edits(&[("t1", "a < b & c")]), &mapping);
        assert_eq!(out, "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn test_neighbours_merged_by_script_removal() {
        let (skeleton, mapping) = tokenize("<p>Hello <script>x()</script>world</p>");
        assert_eq!(mapping.len(), 2);
        let out = reassemble(&skeleton, &edits(&[("t1", "Hi "), ("t2", "earth")]), &mapping);
        assert_eq!(out, "<p>Hi earth</p>");
    }

    #[test]
    fn test_full_document_keeps_head() {
        let input = "<!DOCTYPE html><html><head><title>Doc</title></head><body><p>Hello</p></body></html>";
        let (skeleton, mapping) = tokenize(input);
        assert_eq!(skeleton.kind(), MarkupKind::Document);
        assert_eq!(mapping.len(), 1);

        let out = reassemble(&skeleton, &edits(&[("t1", "Howdy")]), &mapping);
        assert!(out.starts_with("<!DOCTYPE html>"));
        assert!(out.contains("<title>Doc</title>"));
        assert!(out.contains("<body><p>Howdy</p></body>"));
    }

    #[test]
    fn test_raw_text_containers_are_not_tokenized() {
        let input = "<xmp>a b</xmp><iframe>fallback words</iframe><p>x</p>";
        let (skeleton, mapping) = tokenize(input);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("t1").unwrap().text, "x");
        assert_eq!(mapping.get("t1").unwrap().parent_tag, "p");

        let out = reassemble(&skeleton, &edits(&[("t1", "y")]), &mapping);
        assert_eq!(out, "<xmp>a b</xmp><iframe>fallback words</iframe><p>y</p>");
    }

    #[test]
    fn test_markup_in_edited_text_stays_text() {
        let (skeleton, mapping) = tokenize("<xmp>raw</xmp><p>x</p>");
        let out = reassemble(&skeleton, &edits(&[("t1", "c </xmp><b>bold</b>")]), &mapping);

        let reparsed = Html::parse_fragment(&out);
        let bold = Selector::parse("b").unwrap();
        assert_eq!(reparsed.select(&bold).count(), 0);
        assert!(out.starts_with("<xmp>raw</xmp><p>c &lt;/xmp&gt;"));
    }

    #[test]
    fn test_visible_text_runs_skip_hidden_content() {
        let runs = visible_text_runs(
            "<html><head><title>T</title><style>b{}</style></head><body><p>One</p> <p>Two <b>three</b></p></body></html>",
        );
        assert_eq!(runs, vec!["One", "Two", "three"]);

        let runs = visible_text_runs("<p>shown</p><iframe>fallback</iframe><noembed>alt</noembed>");
        assert_eq!(runs, vec!["shown"]);
    }
}
