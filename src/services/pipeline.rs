// Humanize pipeline
// raw input -> tokenize -> batch -> gateway -> reassemble -> marker -> output

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::batcher::build_batches;
use super::error::HumanizeError;
use super::gateway::rewrite_batches;
use super::html_nodes::{reassemble, tokenize, visible_text_runs};
use super::prompts::{plain_text_prompt, plain_to_html_prompt};
use super::providers::{ChatBackend, ChatRequest, ProviderError};
use super::text_processor::{collapse_blank_lines, is_html};
use super::word_marker::{mark_html, mark_plain, strip_trailing_marker};
use crate::models::{HumanizeOptions, HumanizeOutput, OutputFormat};

/// Rewrite `input` through `backend`, keeping markup, order and structure.
///
/// The document is either fully rewritten or the call fails: any failed batch
/// fails the run, and dropping the future abandons every in-flight call.
pub async fn humanize(
    input: &str,
    options: &HumanizeOptions,
    backend: Arc<dyn ChatBackend>,
) -> Result<HumanizeOutput, HumanizeError> {
    if input.trim().is_empty() {
        return Err(HumanizeError::InputEmpty);
    }

    let run_id = Uuid::new_v4();
    let span = info_span!("humanize", run_id = %run_id, backend = backend.name());

    async move {
        let started = Instant::now();
        let output = if is_html(input) {
            humanize_html(input, options, backend).await?
        } else {
            humanize_plain(input, options, backend).await?
        };
        info!(
            "[PIPELINE] done html={} nodes={} batches={} format={:?} elapsed_ms={}",
            output.input_was_html,
            output.text_nodes,
            output.batches,
            output.format,
            started.elapsed().as_millis()
        );
        Ok::<_, HumanizeError>(output)
    }
    .instrument(span)
    .await
}

async fn humanize_html(
    input: &str,
    options: &HumanizeOptions,
    backend: Arc<dyn ChatBackend>,
) -> Result<HumanizeOutput, HumanizeError> {
    let (skeleton, mapping) = tokenize(input);
    let batches = build_batches(&mapping, options.max_batch_chars);
    info!(
        "[PIPELINE] html input: {} text nodes in {} batches",
        mapping.len(),
        batches.len()
    );

    let edited = if batches.is_empty() {
        mapping.original_texts()
    } else {
        rewrite_batches(backend, &mapping, &batches, options).await?
    };

    let html = reassemble(&skeleton, &edited, &mapping);

    let (text, word_count) = match options.output_format {
        OutputFormat::Html => {
            if options.add_words_marker {
                let (marked, n) = mark_html(&html);
                (marked, Some(n))
            } else {
                (html, None)
            }
        }
        OutputFormat::Plain => {
            let plain = collapse_blank_lines(&visible_text_runs(&html).join("\n"));
            if options.add_words_marker {
                let (marked, n) = mark_plain(&plain);
                (marked, Some(n))
            } else {
                (plain, None)
            }
        }
    };

    Ok(HumanizeOutput {
        text,
        format: options.output_format,
        input_was_html: true,
        text_nodes: mapping.len(),
        batches: batches.len(),
        word_count,
    })
}

async fn humanize_plain(
    input: &str,
    options: &HumanizeOptions,
    backend: Arc<dyn ChatBackend>,
) -> Result<HumanizeOutput, HumanizeError> {
    let system = match options.output_format {
        OutputFormat::Html => plain_to_html_prompt(options.wc_tolerance_pct),
        OutputFormat::Plain => plain_text_prompt(options.wc_tolerance_pct),
    };
    let request = ChatRequest {
        model: options.model.clone(),
        system,
        user: vec![input.to_string()],
        sampling: options.sampling,
        max_tokens: options.max_tokens,
        want_json: false,
    };

    info!("[PIPELINE] plain input: single rewrite call");
    let call = backend.complete(&request);
    let result = match tokio::time::timeout(options.request_timeout, call).await {
        Ok(res) => res.map_err(|source| HumanizeError::ModelCallFailed { batch: 1, source })?,
        Err(_) => {
            return Err(HumanizeError::ModelCallFailed {
                batch: 1,
                source: ProviderError::Timeout {
                    secs: options.request_timeout.as_secs(),
                },
            })
        }
    };
    let content = result.content.trim();

    let (text, word_count) = match (options.output_format, options.add_words_marker) {
        (OutputFormat::Html, true) => {
            let (marked, n) = mark_html(content);
            (marked, Some(n))
        }
        (OutputFormat::Plain, true) => {
            let (marked, n) = mark_plain(content);
            (marked, Some(n))
        }
        (_, false) => (strip_trailing_marker(content), None),
    };

    Ok(HumanizeOutput {
        text,
        format: options.output_format,
        input_was_html: false,
        text_nodes: 0,
        batches: 1,
        word_count,
    })
}
