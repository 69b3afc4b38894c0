// Humanizer Core Services
// Text-node pipeline, model gateway and supporting glue

pub mod batcher;
pub mod config_store;
pub mod documents;
pub mod error;
pub mod gateway;
pub mod html_nodes;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod reply;
pub mod text_processor;
pub mod word_marker;

pub use config_store::*;
pub use error::HumanizeError;
pub use providers::*;
pub use text_processor::*;

pub use batcher::build_batches;
pub use documents::{plain_text_to_docx, read_input, reader_for, InputReader, ReaderCapability, ReaderError};
pub use gateway::rewrite_batches;
pub use html_nodes::{reassemble, tokenize, visible_text_runs, MarkupKind, Skeleton};
pub use pipeline::humanize;
pub use reply::{DetectionClient, DetectionScore, ServiceReply};
pub use word_marker::{mark_html, mark_plain, strip_trailing_marker};
