// Model Gateway
// Sends text-node batches as JSON edit requests and merges the replies.
// - One request per batch, strict JSON contract with brace-extraction recovery
// - Ids the model dropped keep their source text
// - Batches fan out on a bounded JoinSet; results merge by id

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::error::HumanizeError;
use super::prompts::{html_json_prompt, EDITOR_SYSTEM_PROMPT};
use super::providers::{ChatBackend, ChatRequest, ProviderError};
use crate::models::{Batch, EditedMap, HumanizeOptions, TextNodeMap, TextNodeRecord};

/// Build the chat request for one batch.
pub fn build_edit_request(
    backend: &dyn ChatBackend,
    records: &[TextNodeRecord],
    options: &HumanizeOptions,
) -> ChatRequest {
    let payload: Map<String, Value> = records
        .iter()
        .map(|r| (r.id.clone(), Value::String(r.text.clone())))
        .collect();
    let parents: Map<String, Value> = records
        .iter()
        .map(|r| (r.id.clone(), Value::String(r.parent_tag.clone())))
        .collect();

    let instructions = html_json_prompt(
        options.wc_tolerance_pct,
        &Value::Object(parents).to_string(),
        backend.json_mode(),
    );

    ChatRequest {
        model: options.model.clone(),
        system: EDITOR_SYSTEM_PROMPT.to_string(),
        user: vec![instructions, Value::Object(payload).to_string()],
        sampling: options.sampling,
        max_tokens: options.max_tokens,
        want_json: true,
    }
}

/// Parse a model reply into a JSON object, falling back to the first
/// complete `{...}` value when the reply carries extra prose.
pub fn parse_json_object(content: &str, batch: usize) -> Result<Map<String, Value>, HumanizeError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content.trim()) {
        return Ok(map);
    }

    let mut detail = "no JSON object in reply".to_string();
    for (start, _) in content.match_indices('{') {
        // The stream reader stops at the end of the first value, so trailing prose is ignored
        match serde_json::Deserializer::from_str(&content[start..])
            .into_iter::<Value>()
            .next()
        {
            Some(Ok(Value::Object(map))) => {
                debug!("[GATEWAY] batch {} recovered JSON from surrounding text", batch);
                return Ok(map);
            }
            Some(Err(e)) => detail = e.to_string(),
            _ => {}
        }
    }

    Err(HumanizeError::ModelResponseMalformed { batch, detail })
}

fn coerce_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Keep exactly the requested ids; any the model left out (or nulled) keep
/// their source text. Extra keys are ignored.
pub fn fill_edits(
    mut parsed: Map<String, Value>,
    records: &[TextNodeRecord],
    batch: usize,
) -> EditedMap {
    let mut out = EditedMap::with_capacity(records.len());
    let mut missing = 0usize;

    for record in records {
        match parsed.remove(&record.id).and_then(coerce_to_string) {
            Some(text) => {
                out.insert(record.id.clone(), text);
            }
            None => {
                missing += 1;
                out.insert(record.id.clone(), record.text.clone());
            }
        }
    }

    if missing > 0 {
        warn!(
            "[GATEWAY] batch {} reply missed {} of {} ids, kept source text",
            batch,
            missing,
            records.len()
        );
    }
    out
}

/// Run one batch through the model.
pub async fn rewrite_batch(
    backend: &dyn ChatBackend,
    batch: usize,
    records: &[TextNodeRecord],
    options: &HumanizeOptions,
) -> Result<EditedMap, HumanizeError> {
    let request = build_edit_request(backend, records, options);

    let result = backend
        .complete(&request)
        .await
        .map_err(|source| HumanizeError::ModelCallFailed { batch, source })?;

    debug!(
        "[GATEWAY] batch {} via {} ok ids={} latency_ms={}",
        batch,
        backend.name(),
        records.len(),
        result.latency_ms
    );

    let parsed = parse_json_object(&result.content, batch)?;
    Ok(fill_edits(parsed, records, batch))
}

async fn rewrite_batch_with_timeout(
    backend: &dyn ChatBackend,
    batch: usize,
    records: &[TextNodeRecord],
    options: &HumanizeOptions,
) -> Result<EditedMap, HumanizeError> {
    match tokio::time::timeout(
        options.request_timeout,
        rewrite_batch(backend, batch, records, options),
    )
    .await
    {
        Ok(res) => res,
        Err(_) => Err(HumanizeError::ModelCallFailed {
            batch,
            source: ProviderError::Timeout {
                secs: options.request_timeout.as_secs(),
            },
        }),
    }
}

/// Rewrite every batch and merge the results by id.
///
/// At most `options.max_concurrency` calls are in flight. The first failure
/// aborts the remaining calls and fails the whole run; dropping the returned
/// future does the same, so a partial map is never produced.
pub async fn rewrite_batches(
    backend: Arc<dyn ChatBackend>,
    mapping: &TextNodeMap,
    batches: &[Batch],
    options: &HumanizeOptions,
) -> Result<EditedMap, HumanizeError> {
    let started = Instant::now();
    let total = batches.len();
    info!(
        "[GATEWAY] dispatching {} batches via {} (concurrency={})",
        total,
        backend.name(),
        options.max_concurrency
    );

    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let options = Arc::new(options.clone());
    let mut join_set: JoinSet<Result<EditedMap, HumanizeError>> = JoinSet::new();

    for batch in batches {
        let backend = backend.clone();
        let semaphore = semaphore.clone();
        let options = options.clone();
        let records = mapping.select(&batch.ids);
        let index = batch.index;

        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| HumanizeError::TaskFailed("semaphore closed".to_string()))?;
            rewrite_batch_with_timeout(backend.as_ref(), index, &records, &options).await
        });
    }

    let mut edited = EditedMap::with_capacity(mapping.len());
    let mut done = 0usize;

    while let Some(res) = join_set.join_next().await {
        let outcome = match res {
            Ok(outcome) => outcome,
            Err(e) => Err(HumanizeError::TaskFailed(e.to_string())),
        };

        match outcome {
            Ok(part) => edited.extend(part),
            Err(e) => {
                warn!("[GATEWAY] aborting run: {}", e);
                join_set.abort_all();
                return Err(e);
            }
        }

        done += 1;
        if done == total || done % 5 == 0 {
            info!(
                "[GATEWAY] progress: {}/{} (elapsed_ms={})",
                done,
                total,
                started.elapsed().as_millis()
            );
        }
    }

    Ok(edited)
}
