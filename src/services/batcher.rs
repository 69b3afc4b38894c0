// Batcher
// Packs text-node ids into size-bounded model requests, preserving order

use crate::models::{Batch, TextNodeMap, TextNodeRecord};

/// Per-entry JSON framing: quotes, colon, comma and spacing.
pub const ENTRY_OVERHEAD_CHARS: usize = 6;

/// Estimated serialized size of one entry, in Unicode scalars.
pub fn entry_size(record: &TextNodeRecord) -> usize {
    record.id.chars().count() + record.text.chars().count() + ENTRY_OVERHEAD_CHARS
}

/// Split the mapping into batches whose estimated payload stays within
/// `max_chars`. An entry larger than the ceiling on its own gets a batch to
/// itself; nothing is dropped or truncated.
pub fn build_batches(mapping: &TextNodeMap, max_chars: usize) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_chars = 0usize;

    for record in mapping.iter() {
        let size = entry_size(record);

        if current_chars + size > max_chars && !current.is_empty() {
            batches.push(Batch {
                index: batches.len() + 1,
                ids: std::mem::take(&mut current),
            });
            current_chars = 0;
        }

        current.push(record.id.clone());
        current_chars += size;
    }

    if !current.is_empty() {
        batches.push(Batch {
            index: batches.len() + 1,
            ids: current,
        });
    }

    batches
}
