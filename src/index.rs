//! Corpus indexing: chunk documents, embed chunk text in bounded
//! batches, and build the lexical and semantic indexes searched at query
//! time.
//!
//! Embedding requests are split into `batch_size`-sized calls so a large
//! corpus never reaches the provider as one oversized request.

use crate::config::{ChunkingConfig, RetrievalConfig};
use crate::corpus::{self, CorpusDocument};
use crate::error::RetrievalError;
use crate::lexical::{IndexDocument, LexicalIndex};
use crate::models::{Chunk, ChunkMetadata};
use crate::semantic::{EmbeddingProvider, InMemorySemanticIndex};

/// Both indexes over one corpus snapshot.
pub struct CorpusIndex {
    pub lexical: LexicalIndex,
    pub semantic: InMemorySemanticIndex,
    pub chunk_count: usize,
}

/// Chunk every document and build both indexes over the result.
pub async fn index_corpus(
    documents: &[CorpusDocument],
    embedder: &dyn EmbeddingProvider,
    chunking: &ChunkingConfig,
    retrieval: &RetrievalConfig,
    batch_size: usize,
) -> Result<CorpusIndex, RetrievalError> {
    let mut chunks: Vec<(Chunk, ChunkMetadata)> = Vec::new();
    for document in documents {
        for chunk in corpus::chunk_document(&document.id, &document.body, chunking.max_tokens) {
            chunks.push((chunk, document.metadata.clone()));
        }
    }

    let texts: Vec<String> = chunks.iter().map(|(c, _)| c.text.clone()).collect();
    let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        embeddings.extend(embedder.embed_batch(batch).await?);
    }
    if embeddings.len() != chunks.len() {
        return Err(RetrievalError::EmbeddingFailed(format!(
            "expected {} embeddings, provider returned {}",
            chunks.len(),
            embeddings.len()
        )));
    }

    let index_docs: Vec<IndexDocument> = chunks
        .iter()
        .map(|(c, _)| IndexDocument {
            id: c.id.clone(),
            content: c.text.clone(),
        })
        .collect();
    let mut lexical = LexicalIndex::new(retrieval.bm25_k1, retrieval.bm25_b);
    lexical.build(&index_docs);

    let mut semantic = InMemorySemanticIndex::new();
    for ((chunk, metadata), embedding) in chunks.into_iter().zip(embeddings) {
        semantic.insert(chunk, metadata, embedding);
    }

    Ok(CorpusIndex {
        lexical,
        semantic,
        chunk_count: index_docs.len(),
    })
}
