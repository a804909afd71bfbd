//! # Draftsmith
//!
//! Corpus-grounded drafting: retrieve relevant passages from a personal
//! writing corpus (hybrid BM25 + semantic ranking with recency/quality
//! fusion) and generate new long-form content, retrying with
//! progressively stricter prompts until a quality bar is met.
//!
//! ## Architecture
//!
//! ```text
//! query ──▶ CorpusSearcher ──▶ ranked chunks ──▶ prompts ──▶ Generator
//!            │        │                                        │
//!       LexicalIndex  SemanticIndex                        draft
//!       (BM25)        (nearest neighbor)                      │
//!                                                     QualityAssessor
//!                                                              │
//!                                       RetryOrchestrator: accept /
//!                                       retry (stricter variant) / give up
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed retrieval/generation errors |
//! | [`corpus`] | Filesystem corpus loading and chunking |
//! | [`index`] | Corpus indexing (chunk, embed, build both indexes) |
//! | [`lexical`] | BM25 keyword index |
//! | [`scoring`] | Recency/quality/similarity score fusion |
//! | [`semantic`] | Semantic index and embedding providers |
//! | [`searcher`] | Hybrid search entry point |
//! | [`assess`] | Rubric-based draft assessment |
//! | [`generate`] | Text-generation backends |
//! | [`prompts`] | Prompt variants and assembly |
//! | [`orchestrator`] | Quality-gated retry loop |

pub mod assess;
pub mod config;
pub mod corpus;
pub mod error;
pub mod generate;
pub mod index;
pub mod lexical;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod scoring;
pub mod searcher;
pub mod semantic;
