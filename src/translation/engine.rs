//! Chunked translation of an [`ArticleDocument`]

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::chunk::{restore_whitespace, split_text, ChunkCount};
use crate::document::ArticleDocument;
use crate::metrics;
use crate::models::TokenCounts;
use crate::provider::GenerationError;

/// One unit of text submitted for translation
#[derive(Debug, Clone)]
pub struct ChunkRequest<'a> {
    pub index: usize,
    pub total: usize,
    pub text: &'a str,
}

/// Translated chunk text and what it cost
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub text: String,
    pub tokens: TokenCounts,
    pub attempts: u32,
    /// Model that served the chunk
    pub model: String,
}

/// Translates one chunk into a fixed target language
#[async_trait]
pub trait ChunkTranslator: Send + Sync {
    async fn translate_chunk(&self, chunk: ChunkRequest<'_>) -> Result<ChunkOutput, GenerationError>;
}

/// Successful document translation
#[derive(Debug, Clone)]
pub struct TranslatedDocument {
    pub doc: ArticleDocument,
    pub tokens: TokenCounts,
    /// Provider attempts across all chunks, including the fallback pass
    pub attempts: u32,
    /// Chunks used by the pass that succeeded
    pub chunks: usize,
    pub used_fallback: bool,
    /// Model that served the last chunk of the successful pass
    pub model: String,
}

/// Canonical text split into chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub canonical: String,
    pub chunks: Vec<String>,
}

impl ChunkPlan {
    /// Concatenate chunks back into one text
    pub fn reassemble<S: AsRef<str>>(chunks: &[S]) -> String {
        chunks.iter().map(AsRef::as_ref).collect()
    }
}

/// Splits documents, translates chunks and verifies the result's structure
#[derive(Debug, Clone)]
pub struct TranslationEngine {
    max_chunk_chars: usize,
    chunk_concurrency: usize,
}

impl TranslationEngine {
    pub fn new(max_chunk_chars: usize, chunk_concurrency: usize) -> Self {
        Self {
            max_chunk_chars: max_chunk_chars.max(1),
            chunk_concurrency: chunk_concurrency.max(1),
        }
    }

    /// Serialize a document and split it into chunks
    pub fn plan(&self, doc: &ArticleDocument, count: ChunkCount) -> ChunkPlan {
        let (canonical, starts) = canonical_with_starts(doc);
        let chunks = split_text(&canonical, &starts, count, self.max_chunk_chars)
            .into_iter()
            .map(|range| canonical[range].to_string())
            .collect();
        ChunkPlan { canonical, chunks }
    }

    /// Translate `doc` with `count` chunks, falling back once to a single
    /// chunk when the reassembled document's skeleton does not match
    #[instrument(skip_all, fields(chunk_count = %count))]
    pub async fn translate(
        &self,
        doc: &ArticleDocument,
        count: ChunkCount,
        translator: &dyn ChunkTranslator,
    ) -> Result<TranslatedDocument, GenerationError> {
        let expected = doc.skeleton();
        let mut tokens = TokenCounts::default();
        let mut attempts = 0;

        let first = self.plan(doc, count);
        let chunks = first.chunks.len();
        let pass = self.translate_pass(&first, translator).await?;
        tokens += pass.tokens;
        attempts += pass.attempts;

        let actual = match ArticleDocument::parse(&pass.text) {
            Ok(translated) if translated.skeleton() == expected => {
                return Ok(TranslatedDocument {
                    doc: translated,
                    tokens,
                    attempts,
                    chunks,
                    used_fallback: false,
                    model: pass.model,
                });
            }
            Ok(translated) => Some(translated.skeleton()),
            Err(e) => {
                debug!(error = %e, "Translated document did not parse");
                None
            }
        };

        warn!(
            chunks = chunks,
            expected = ?expected,
            actual = ?actual,
            "Structural mismatch after translation, retrying as a single chunk"
        );
        metrics::record_translation_fallback();

        let whole = self.plan(doc, ChunkCount::WHOLE);
        let pass = self.translate_pass(&whole, translator).await?;
        tokens += pass.tokens;
        attempts += pass.attempts;

        match ArticleDocument::parse(&pass.text) {
            Ok(translated) if translated.skeleton() == expected => {
                info!("Single-chunk fallback restored document structure");
                Ok(TranslatedDocument {
                    doc: translated,
                    tokens,
                    attempts,
                    chunks: 1,
                    used_fallback: true,
                    model: pass.model,
                })
            }
            Ok(translated) => Err(GenerationError::StructuralMismatch {
                expected,
                actual: Some(translated.skeleton()),
            }),
            Err(_) => Err(GenerationError::StructuralMismatch {
                expected,
                actual: None,
            }),
        }
    }

    /// Translate every chunk of a plan, preserving order
    async fn translate_pass(
        &self,
        plan: &ChunkPlan,
        translator: &dyn ChunkTranslator,
    ) -> Result<PassOutput, GenerationError> {
        let total = plan.chunks.len();

        let semaphore = Semaphore::new(self.chunk_concurrency.max(1));
        let mut pending = Vec::with_capacity(total);
        for (index, text) in plan.chunks.iter().enumerate() {
            let semaphore = &semaphore;
            pending.push(async move {
                let _permit = semaphore.acquire().await.ok();
                translator
                    .translate_chunk(ChunkRequest {
                        index,
                        total,
                        text: text.as_str(),
                    })
                    .await
            });
        }
        // join_all keeps chunk order
        let results: Vec<Result<ChunkOutput, GenerationError>> = join_all(pending).await;

        let mut output = PassOutput::default();
        let mut translated = Vec::with_capacity(total);
        for (source, result) in plan.chunks.iter().zip(results) {
            let chunk = result?;
            output.tokens += chunk.tokens;
            output.attempts += chunk.attempts;
            output.model = chunk.model;
            translated.push(restore_whitespace(source, &chunk.text));
        }

        output.text = ChunkPlan::reassemble(&translated);
        Ok(output)
    }
}

#[derive(Debug, Default)]
struct PassOutput {
    text: String,
    tokens: TokenCounts,
    attempts: u32,
    model: String,
}

/// Canonical markdown plus the byte offset of every segment
pub fn canonical_with_starts(doc: &ArticleDocument) -> (String, Vec<usize>) {
    let segments = doc.segments();
    let mut text = String::new();
    let mut starts = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            text.push_str("\n\n");
        }
        starts.push(text.len());
        text.push_str(segment);
    }
    text.push('\n');

    (text, starts)
}
