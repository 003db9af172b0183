//! Chunked Translation Engine
//!
//! Splits a document's canonical text into chunks, translates each chunk
//! independently and reassembles them in order. A reassembled document whose
//! skeleton (sections, FAQ entries, keywords) differs from the source is
//! retried once as a single chunk before the translation fails.

mod chunk;
mod engine;

pub use chunk::{restore_whitespace, split_text, ChunkCount};
pub use engine::{
    canonical_with_starts, ChunkOutput, ChunkPlan, ChunkRequest,
    ChunkTranslator, TranslatedDocument, TranslationEngine,
};
