//! BM25 keyword index over corpus chunks.
//!
//! A from-scratch lexical ranking function, independent of any embedding
//! model. Build once per corpus snapshot; rebuilding replaces all prior
//! state. Search is a pure, deterministic function of the indexed corpus
//! and the query text — no randomness, no I/O.
//!
//! Scoring follows the standard BM25 formulation:
//!
//! ```text
//! idf(term) = ln((N - df + 0.5) / (df + 0.5) + 1)
//! score    += idf * tf*(k1+1) / (tf + k1*(1 - b + b*docLen/avgDocLen))
//! ```
//!
//! with `k1` governing term-frequency saturation (default 1.5) and `b`
//! governing length normalization (default 0.75).

use std::collections::HashMap;

/// Default term-frequency saturation constant.
pub const DEFAULT_K1: f64 = 1.5;
/// Default length-normalization constant.
pub const DEFAULT_B: f64 = 0.75;

/// A document handed to [`LexicalIndex::build`].
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub id: String,
    pub content: String,
}

/// One ranked entry returned by [`LexicalIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub doc_id: String,
    /// Raw BM25 score; query-relative and unbounded.
    pub score: f64,
}

/// Per-document state captured at build time.
#[derive(Debug, Clone)]
struct DocEntry {
    id: String,
    term_freqs: HashMap<String, usize>,
    token_count: usize,
}

/// BM25 keyword index. Safe to share across threads for concurrent
/// searches; rebuilds must be done on a fresh instance swapped in by the
/// caller.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    k1: f64,
    b: f64,
    docs: Vec<DocEntry>,
    /// Number of documents containing each term.
    doc_freqs: HashMap<String, usize>,
    avg_doc_len: f64,
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl LexicalIndex {
    pub fn new(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            docs: Vec::new(),
            doc_freqs: HashMap::new(),
            avg_doc_len: 0.0,
        }
    }

    /// Build the index over a corpus snapshot, replacing any prior state.
    pub fn build(&mut self, documents: &[IndexDocument]) {
        self.docs.clear();
        self.doc_freqs.clear();
        self.avg_doc_len = 0.0;

        let mut total_tokens: usize = 0;

        for doc in documents {
            let tokens = tokenize(&doc.content);
            total_tokens += tokens.len();

            let mut term_freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }

            for term in term_freqs.keys() {
                *self.doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }

            self.docs.push(DocEntry {
                id: doc.id.clone(),
                term_freqs,
                token_count: tokens.len(),
            });
        }

        if !self.docs.is_empty() {
            self.avg_doc_len = total_tokens as f64 / self.docs.len() as f64;
        }
    }

    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    /// Rank indexed documents against the query.
    ///
    /// Documents sharing no term with the query are excluded. Results are
    /// sorted by descending score; ties keep original document order.
    /// Empty query or un-built index yields an empty list.
    pub fn search(&self, query: &str, n_results: usize) -> Vec<LexicalHit> {
        if self.docs.is_empty() {
            return Vec::new();
        }

        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f64;
        let mut hits: Vec<LexicalHit> = Vec::new();

        for doc in &self.docs {
            let mut score = 0.0;
            for term in &query_terms {
                let tf = match doc.term_freqs.get(term) {
                    Some(&tf) => tf as f64,
                    None => continue,
                };
                let df = *self.doc_freqs.get(term).unwrap_or(&0) as f64;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

                let len_norm = if self.avg_doc_len > 0.0 {
                    1.0 - self.b + self.b * doc.token_count as f64 / self.avg_doc_len
                } else {
                    1.0
                };
                score += idf * (tf * (self.k1 + 1.0)) / (tf + self.k1 * len_norm);
            }

            if score > 0.0 {
                hits.push(LexicalHit {
                    doc_id: doc.id.clone(),
                    score,
                });
            }
        }

        // Stable sort keeps insertion (= original document) order on ties.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n_results);
        hits
    }
}

/// Lowercase alphanumeric tokenization shared by build and search.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
