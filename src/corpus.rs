//! Corpus loading and chunking.
//!
//! Scans the configured corpus root for writing samples (glob
//! include/exclude), derives per-document metadata from the filesystem,
//! and splits each document into retrievable [`Chunk`]s on paragraph
//! boundaries.
//!
//! Metadata conventions: the top-level directory a file sits in becomes a
//! tag; a directory (or file stem) suffix like `.preferred` or
//! `.deprecated` sets the quality rating; the file's modification time
//! becomes the creation date used for recency scoring.

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::models::{Chunk, ChunkMetadata, QualityRating};

/// Approximate chars-per-token ratio used for chunk sizing.
const CHARS_PER_TOKEN: usize = 4;

/// A document loaded from the corpus, before chunking.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub id: String,
    pub title: String,
    pub body: String,
    pub metadata: ChunkMetadata,
}

/// Scan the corpus root and load every matching file.
///
/// Results are sorted by relative path for deterministic ordering.
pub fn load_corpus(config: &CorpusConfig) -> Result<Vec<CorpusDocument>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        documents.push(file_to_document(path, &rel_str)?);
    }

    documents.sort_by(|a, b| a.metadata.source.cmp(&b.metadata.source));

    Ok(documents)
}

fn file_to_document(path: &Path, relative_path: &str) -> Result<CorpusDocument> {
    let fs_meta = std::fs::metadata(path)?;
    let modified = fs_meta
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let modified_secs = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let created_at: Option<DateTime<Utc>> = Utc.timestamp_opt(modified_secs, 0).single();

    let body = std::fs::read_to_string(path).unwrap_or_default();

    let title = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("md") | Some("markdown") => "markdown",
        _ => "text",
    }
    .to_string();

    let tags = path_tags(relative_path);
    let quality = path_quality(relative_path);

    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, relative_path.as_bytes()).to_string();

    Ok(CorpusDocument {
        id,
        title,
        body,
        metadata: ChunkMetadata {
            quality,
            created_at,
            format,
            tags,
            source: relative_path.to_string(),
        },
    })
}

/// The top-level directory of the relative path, as a lowercase tag.
fn path_tags(relative_path: &str) -> Vec<String> {
    let mut parts = relative_path.split(['/', '\\']);
    let first = parts.next().unwrap_or("");
    // A bare filename at the root gets no tag.
    if parts.next().is_none() {
        return Vec::new();
    }
    let tag = first
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .to_lowercase();
    let tag = match tag.split_once('.') {
        Some((base, _)) => base.to_string(),
        None => tag,
    };
    if tag.is_empty() {
        Vec::new()
    } else {
        vec![tag]
    }
}

/// Quality rating from a `.rating` suffix on any path component or the
/// file stem, e.g. `essays.preferred/` or `old-notes.deprecated.md`.
fn path_quality(relative_path: &str) -> Option<QualityRating> {
    for component in relative_path.split(['/', '\\']) {
        let stem = component.trim_end_matches(".md").trim_end_matches(".txt");
        if let Some((_, suffix)) = stem.rsplit_once('.') {
            if let Some(rating) = QualityRating::parse(suffix) {
                return Some(rating);
            }
        }
    }
    None
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

// ============ Chunking ============

/// Split a document body into chunks on paragraph boundaries, respecting
/// `max_tokens`. Chunk indices are contiguous from 0; offsets point into
/// the original body; markdown headings carry into the chunks beneath
/// them.
pub fn chunk_document(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    if text.trim().is_empty() {
        return Vec::new();
    }

    // Paragraphs with their byte offsets into the body.
    let mut paragraphs: Vec<(usize, &str)> = Vec::new();
    let mut offset = 0usize;
    for para in text.split("\n\n") {
        paragraphs.push((offset, para));
        offset += para.len() + 2;
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut current_heading: Option<String> = None;

    // Buffered paragraphs for the chunk under construction.
    let mut buf = String::new();
    let mut buf_start = 0usize;
    let mut buf_end = 0usize;
    let mut buf_heading: Option<String> = None;

    let flush = |buf: &mut String,
                     buf_start: usize,
                     buf_end: usize,
                     heading: &Option<String>,
                     chunk_index: &mut i64,
                     chunks: &mut Vec<Chunk>| {
        if buf.is_empty() {
            return;
        }
        chunks.push(make_chunk(
            document_id,
            *chunk_index,
            buf,
            buf_start,
            buf_end,
            heading.clone(),
        ));
        *chunk_index += 1;
        buf.clear();
    };

    for (para_start, para) in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(heading) = markdown_heading(trimmed) {
            current_heading = Some(heading);
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            flush(&mut buf, buf_start, buf_end, &buf_heading, &mut chunk_index, &mut chunks);
        }

        // A single oversized paragraph is hard-split at max_chars
        // boundaries (on char limits, not mid-codepoint).
        if trimmed.len() > max_chars {
            flush(&mut buf, buf_start, buf_end, &buf_heading, &mut chunk_index, &mut chunks);
            let mut piece_start = para_start + (para.len() - para.trim_start().len());
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let take = floor_char_boundary(remaining, max_chars.min(remaining.len()));
                let (piece, rest) = remaining.split_at(take);
                chunks.push(make_chunk(
                    document_id,
                    chunk_index,
                    piece,
                    piece_start,
                    piece_start + piece.len(),
                    current_heading.clone(),
                ));
                chunk_index += 1;
                piece_start += piece.len();
                remaining = rest;
            }
            continue;
        }

        if buf.is_empty() {
            buf_start = para_start + (para.len() - para.trim_start().len());
            buf_heading = current_heading.clone();
        } else {
            buf.push_str("\n\n");
        }
        buf.push_str(trimmed);
        buf_end = para_start + (para.len() - para.trim_start().len()) + trimmed.len();
    }

    flush(&mut buf, buf_start, buf_end, &buf_heading, &mut chunk_index, &mut chunks);

    chunks
}

fn make_chunk(
    document_id: &str,
    index: i64,
    text: &str,
    start: usize,
    end: usize,
    heading: Option<String>,
) -> Chunk {
    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{document_id}:{index}").as_bytes(),
    )
    .to_string();

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id,
        document_id: document_id.to_string(),
        text: text.to_string(),
        chunk_index: index,
        heading,
        start_offset: start,
        end_offset: end,
        hash,
    }
}

fn markdown_heading(paragraph: &str) -> Option<String> {
    let first_line = paragraph.lines().next()?;
    let stripped = first_line.trim_start_matches('#');
    if stripped.len() < first_line.len() && !stripped.is_empty() {
        Some(stripped.trim().to_string())
    } else {
        None
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index.max(1)
}
