// Humanizer Data Models
// Per-run types shared by the tokenizer, batcher, gateway and reassembler

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::services::config_store::RewriteConfig;

// ============ Text Nodes ============

/// One human-readable text leaf pulled out of an HTML document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNodeRecord {
    pub id: String,
    pub text: String,
    /// Style hint for the model only; reassembly never looks at it.
    pub parent_tag: String,
}

/// Ordered id -> record mapping, in document order.
#[derive(Debug, Clone, Default)]
pub struct TextNodeMap {
    records: Vec<TextNodeRecord>,
    index: HashMap<String, usize>,
}

impl TextNodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TextNodeRecord) {
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn get(&self, id: &str) -> Option<&TextNodeRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextNodeRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    /// Records for the given ids, in the order the ids are listed.
    pub fn select(&self, ids: &[String]) -> Vec<TextNodeRecord> {
        ids.iter().filter_map(|id| self.get(id).cloned()).collect()
    }

    /// The unedited mapping as an id -> text map.
    pub fn original_texts(&self) -> EditedMap {
        self.records
            .iter()
            .map(|r| (r.id.clone(), r.text.clone()))
            .collect()
    }
}

/// Union of all batch results: id -> edited text.
pub type EditedMap = HashMap<String, String>;

// ============ Batches ============

/// Ids sent together in one model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    /// 1-based position in the batch list, used in errors and logs.
    pub index: usize,
    pub ids: Vec<String>,
}

// ============ Run Options ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Plain,
}

/// Generation randomness forwarded on every model call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    #[serde(default)]
    pub seed: Option<i64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_p: 0.95,
            frequency_penalty: 0.2,
            presence_penalty: 0.1,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HumanizeOptions {
    pub model: String,
    /// Allowed word-count drift per value, in percent.
    pub wc_tolerance_pct: u32,
    pub sampling: SamplingParams,
    pub max_batch_chars: usize,
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub max_tokens: u32,
    pub add_words_marker: bool,
    pub output_format: OutputFormat,
}

impl Default for HumanizeOptions {
    fn default() -> Self {
        Self::from(&RewriteConfig::default())
    }
}

impl From<&RewriteConfig> for HumanizeOptions {
    fn from(cfg: &RewriteConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            wc_tolerance_pct: cfg.wc_tolerance_pct,
            sampling: cfg.sampling,
            max_batch_chars: cfg.max_batch_chars,
            max_concurrency: cfg.max_concurrency.max(1),
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            max_tokens: cfg.max_tokens,
            add_words_marker: cfg.add_words_marker,
            output_format: cfg.output_format,
        }
    }
}

// ============ Run Output ============

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanizeOutput {
    pub text: String,
    pub format: OutputFormat,
    pub input_was_html: bool,
    pub text_nodes: usize,
    pub batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, text: &str) -> TextNodeRecord {
        TextNodeRecord {
            id: id.to_string(),
            text: text.to_string(),
            parent_tag: "p".to_string(),
        }
    }

    #[test]
    fn test_text_node_map_keeps_insertion_order() {
        let mut map = TextNodeMap::new();
        map.push(record("t1", "a"));
        map.push(record("t2", "b"));
        map.push(record("t3", "c"));

        let ids: Vec<&str> = map.ids().collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(map.get("t2").map(|r| r.text.as_str()), Some("b"));
        assert!(map.get("t9").is_none());
    }

    #[test]
    fn test_select_follows_requested_order() {
        let mut map = TextNodeMap::new();
        map.push(record("t1", "a"));
        map.push(record("t2", "b"));

        let picked = map.select(&["t2".to_string(), "t1".to_string()]);
        assert_eq!(picked[0].id, "t2");
        assert_eq!(picked[1].id, "t1");
    }

    #[test]
    fn test_options_from_default_config() {
        let opts = HumanizeOptions::default();
        assert_eq!(opts.max_batch_chars, 12000);
        assert_eq!(opts.wc_tolerance_pct, 2);
        assert_eq!(opts.output_format, OutputFormat::Html);
        assert!(!opts.add_words_marker);
    }
}
