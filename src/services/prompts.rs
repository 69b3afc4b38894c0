// Prompt templates for the rewrite calls

use crate::services::providers::JsonMode;

pub const EDITOR_SYSTEM_PROMPT: &str = "You are a careful, detail-oriented text editor.";

/// Instructions for one JSON batch of HTML text nodes.
pub fn html_json_prompt(wc_tol: u32, parents_json: &str, json_mode: JsonMode) -> String {
    let mut prompt = format!(
        r#"You will receive a JSON object mapping {{id: text}}; each value is a text node taken from an HTML document.
Edit every value so it reads naturally for a native speaker while keeping its meaning, tone, punctuation and references.
Write each value in the SAME language it is written in. Do NOT translate.

Constraints per value:
- Word count: stay within ±{wc_tol}% of that value's original word count.
- Do NOT add or remove HTML tags. You are editing text content only.
- Keep names, numbers, dates, URLs and titles unchanged.
- Keep leading and trailing spaces of each value as they are.
- Do not add markers such as [Words: N].

Return ONLY a valid JSON object with exactly the same keys and the edited strings as values.

Parent tag of each id, for style reference only (do not include in the output):
{parents_json}
"#
    );

    if json_mode == JsonMode::BestEffort {
        prompt.push_str("\nYour entire reply must be the JSON object: no prose, no code fences.\n");
    }
    prompt
}

/// Whole-text rewrite returning plain text.
pub fn plain_text_prompt(wc_tol: u32) -> String {
    format!(
        r#"You are an expert editor.
Edit the text so it reads naturally for a native speaker while preserving its meaning, structure and tone.
Use the SAME language as the input. Do NOT translate.

Requirements:
- Word count: stay within ±{wc_tol}% of the original. Append the final count as [Words: N].
- Keep paragraph breaks, headings, list order and numbering, and section order.
- Keep punctuation, quotation marks, inline formatting, emojis, citation markers and references.
- Do not add, remove or alter facts. Keep names, numbers, dates, URLs and titles unchanged.
- Leave code, formulas and tables unchanged.
- Return ONLY the edited text, with no explanations.
"#
    )
}

/// Whole-text rewrite returning semantic HTML.
pub fn plain_to_html_prompt(wc_tol: u32) -> String {
    format!(
        r#"You are an expert editor and HTML formatter.
Edit the text so it reads naturally (same language, no translation), then output clean semantic HTML.

Requirements:
- Word count: stay within ±{wc_tol}% of the original. Append the final count as a last paragraph: <p>[Words: N]</p>.
- Preserve paragraph breaks, headings, list order and numbering, and section order, converted to HTML.
- Convert inline emphasis, links and code to <strong>, <em>, <a> and <code>.
- Do not alter facts, names, numbers, dates, URLs or titles.
- If the output contains a <table>, put one <style> block at the very top:
  <style>
  table {{ border-collapse: collapse; }}
  table, th, td {{ border: 1px solid #000; }}
  </style>
- Allowed tags: style, p, h1-h4, ul, ol, li, blockquote, pre, code, a, strong, em, table, thead, tbody, tr, th, td, img, span.
- Return ONLY the HTML markup: no markdown, no comments, no code fences.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_prompt_embeds_tolerance_and_parents() {
        let prompt = html_json_prompt(5, r#"{"t1":"p"}"#, JsonMode::Strict);
        assert!(prompt.contains("±5%"));
        assert!(prompt.contains(r#"{"t1":"p"}"#));
        assert!(prompt.contains("{id: text}"));
        assert!(!prompt.contains("no code fences"));
    }

    #[test]
    fn test_best_effort_prompt_adds_json_only_reminder() {
        let prompt = html_json_prompt(2, "{}", JsonMode::BestEffort);
        assert!(prompt.contains("no code fences"));
    }

    #[test]
    fn test_html_prompt_keeps_literal_css_braces() {
        let prompt = plain_to_html_prompt(2);
        assert!(prompt.contains("table { border-collapse: collapse; }"));
    }
}
