// Run-level errors surfaced to the host

use thiserror::Error;

use super::providers::ProviderError;

#[derive(Error, Debug)]
pub enum HumanizeError {
    #[error("Please paste some text or HTML, or upload a file")]
    InputEmpty,
    #[error("The model returned non-JSON output in batch {batch}: {detail}")]
    ModelResponseMalformed { batch: usize, detail: String },
    #[error("Model call failed in batch {batch}: {source}")]
    ModelCallFailed {
        batch: usize,
        #[source]
        source: ProviderError,
    },
    #[error("Batch worker failed: {0}")]
    TaskFailed(String),
}

impl HumanizeError {
    /// 1-based batch index the error belongs to, when there is one.
    pub fn batch(&self) -> Option<usize> {
        match self {
            Self::ModelResponseMalformed { batch, .. } | Self::ModelCallFailed { batch, .. } => {
                Some(*batch)
            }
            _ => None,
        }
    }
}
