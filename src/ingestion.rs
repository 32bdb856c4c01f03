//! Ingestion pipeline (C4): PDF → page-attributed text → recursive
//! token-bounded chunking → batched embedding → persisted vector index.

use std::path::Path;

use tracing::info;

use crate::embedder::{Embedder, INGESTION_BATCH_SIZE};
use crate::error::{CoreError, Result};
use crate::sanitize::sanitize_pdf_text;
use crate::tokenizer::{count_tokens, get_last_n_tokens};
use crate::vector_store::{NewChunk, VectorStore};

pub const CHUNK_SIZE_TOKENS: usize = 512;
pub const CHUNK_OVERLAP_TOKENS: usize = 64;
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

fn page_break_marker(page_number: usize) -> String {
    format!("[PAGE_BREAK:{page_number}]")
}

/// Extract text page-by-page from a PDF, sanitize each page, and join with
/// `[PAGE_BREAK:N]` markers. Returns an error if no extractable text remains.
fn extract_text_with_page_markers(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).map_err(|e| CoreError::PdfExtraction(format!("cannot read file: {e}")))?;

    let doc = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| CoreError::PdfExtraction(e.to_string()))?;

    // pdf-extract concatenates pages with form-feed characters; split on that
    // boundary to recover per-page text for attribution.
    let pages: Vec<&str> = doc.split('\x0c').collect();

    let mut annotated = String::new();
    for (i, page_text) in pages.iter().enumerate() {
        let page_number = i + 1;
        let sanitized = sanitize_pdf_text(page_text);
        annotated.push_str(&sanitized);
        annotated.push_str(&page_break_marker(page_number));
    }

    let stripped = strip_page_markers(&annotated);
    if stripped.trim().is_empty() {
        return Err(CoreError::NoExtractableText);
    }

    Ok(annotated)
}

fn page_marker_regex() -> regex::Regex {
    regex::Regex::new(r"\[PAGE_BREAK:(\d+)\]").unwrap()
}

fn strip_page_markers(text: &str) -> String {
    page_marker_regex().replace_all(text, "").to_string()
}

/// An ordered list of `(marker_char_offset, page_number)` in the annotated
/// (marker-containing) text, used to attribute clean-text offsets back to
/// page numbers.
struct PageMap {
    entries: Vec<(usize, usize)>,
}

fn build_page_map(annotated_text: &str) -> PageMap {
    let re = page_marker_regex();
    let entries = re
        .captures_iter(annotated_text)
        .filter_map(|cap| {
            let m = cap.get(0)?;
            let page: usize = cap.get(1)?.as_str().parse().ok()?;
            Some((m.start(), page))
        })
        .collect();
    PageMap { entries }
}

impl PageMap {
    /// Look up the page number for the last marker at or before `offset`,
    /// defaulting to page 1.
    fn lookup(&self, offset: usize) -> usize {
        self.entries
            .iter()
            .filter(|(marker_offset, _)| *marker_offset <= offset)
            .last()
            .map(|(_, page)| *page)
            .unwrap_or(1)
    }
}

/// Recursively split `text` into chunks targeting `chunk_size` tokens with
/// `overlap` tokens of carried context, walking the separator hierarchy.
fn recursive_split(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    if count_tokens(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((&separator, rest_separators)) = separators.split_first() else {
        return fallback_split_by_words(text);
    };

    if separator.is_empty() || !text.contains(separator) {
        return recursive_split(text, rest_separators, chunk_size, overlap);
    }

    let segments: Vec<&str> = text.split(separator).collect();
    let mut chunks = Vec::new();
    let mut buffer = String::new();

    for segment in segments {
        let candidate = if buffer.is_empty() {
            segment.to_string()
        } else {
            format!("{buffer}{separator}{segment}")
        };

        if count_tokens(&candidate) > chunk_size {
            if !buffer.is_empty() {
                chunks.push(buffer.clone());
                let overlap_seed = get_last_n_tokens(&buffer, overlap);
                buffer = if overlap_seed.is_empty() {
                    segment.to_string()
                } else {
                    format!("{overlap_seed}{separator}{segment}")
                };
            } else {
                // The lone segment already exceeds chunk_size; recurse into it.
                let sub_chunks = recursive_split(segment, rest_separators, chunk_size, overlap);
                if let Some((last, init)) = sub_chunks.split_last() {
                    chunks.extend(init.iter().cloned());
                    buffer = last.clone();
                } else {
                    buffer = String::new();
                }
            }
        } else {
            buffer = candidate;
        }
    }

    if !buffer.trim().is_empty() {
        chunks.push(buffer);
    }

    chunks
}

fn fallback_split_by_words(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 {
        return vec![text.to_string()];
    }
    let mid = words.len() / 2;
    vec![words[..mid].join(" "), words[mid..].join(" ")]
}

/// Locate a chunk's approximate offset into `full_text` (the marker-annotated
/// text) given its start position within `clean_text`, by proportional remap
/// — an intentional approximation preserved from the reference design.
fn approximate_full_text_offset(clean_idx: usize, clean_len: usize, full_len: usize) -> usize {
    if clean_len == 0 {
        return 0;
    }
    ((clean_idx as f64 / clean_len as f64) * full_len as f64) as usize
}

pub struct ChunkText {
    pub text: String,
    pub page_number: usize,
    pub chunk_index: usize,
}

/// Split an already-extracted, marker-annotated PDF text into page-attributed
/// chunks.
fn chunk_text(annotated_text: &str) -> Result<Vec<ChunkText>> {
    let page_map = build_page_map(annotated_text);
    let clean_text = strip_page_markers(annotated_text);

    let raw_chunks = recursive_split(&clean_text, SEPARATORS, CHUNK_SIZE_TOKENS, CHUNK_OVERLAP_TOKENS);
    if raw_chunks.is_empty() {
        return Err(CoreError::Validation("no chunks produced from document".into()));
    }

    let mut cursor = 0usize;
    let mut chunks = Vec::with_capacity(raw_chunks.len());

    for (i, text) in raw_chunks.into_iter().enumerate() {
        let clean_idx = clean_text[cursor..]
            .find(text.as_str())
            .map(|pos| cursor + pos)
            .or_else(|| clean_text.find(text.as_str()))
            .unwrap_or(cursor);
        cursor = clean_idx + text.len();

        let approx_full_offset =
            approximate_full_text_offset(clean_idx, clean_text.len(), annotated_text.len());
        let page_number = page_map.lookup(approx_full_offset);

        chunks.push(ChunkText {
            text,
            page_number,
            chunk_index: i,
        });
    }

    Ok(chunks)
}

/// Full ingestion pipeline: extract, chunk, embed, and persist. `path` is
/// assumed to have already passed transport-level validation (MIME, size,
/// magic bytes, filename sanitization).
pub async fn ingest_pdf(embedder: &Embedder, store: &VectorStore, path: &Path) -> Result<Vec<String>> {
    let source_file = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let annotated = extract_text_with_page_markers(path)?;
    let chunks = chunk_text(&annotated)?;

    info!(source = %source_file, chunks = chunks.len(), "ingesting document");

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(INGESTION_BATCH_SIZE) {
        let batch_embeddings = embedder.encode_batch(batch, INGESTION_BATCH_SIZE)?;
        embeddings.extend(batch_embeddings);
    }

    let records: Vec<NewChunk> = chunks
        .into_iter()
        .zip(embeddings.into_iter())
        .map(|(chunk, embedding)| {
            NewChunk::new(chunk.text, source_file.clone(), chunk.page_number, chunk.chunk_index, embedding)
        })
        .collect();

    let ids = store.add(records).await?;
    store.persist().await?;

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_page_markers_removes_all_markers() {
        let text = "hello[PAGE_BREAK:1]world[PAGE_BREAK:2]";
        assert_eq!(strip_page_markers(text), "helloworld");
    }

    #[test]
    fn page_map_defaults_to_page_one_before_first_marker() {
        let annotated = "intro[PAGE_BREAK:1]body[PAGE_BREAK:2]";
        let map = build_page_map(annotated);
        assert_eq!(map.lookup(0), 1);
    }

    #[test]
    fn page_map_finds_correct_page_after_marker() {
        let annotated = "intro[PAGE_BREAK:1]body[PAGE_BREAK:2]tail";
        let map = build_page_map(annotated);
        let second_marker_offset = annotated.find("[PAGE_BREAK:2]").unwrap();
        assert_eq!(map.lookup(second_marker_offset + 1), 2);
    }

    #[test]
    fn short_text_returns_single_chunk() {
        let chunks = recursive_split("short text", SEPARATORS, 512, 64);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "short text");
    }

    #[test]
    fn oversized_lone_segment_is_recursively_split_not_carried_whole() {
        // A single paragraph (no "\n\n" or "\n" inside it) far exceeding chunk_size
        // must be split via the next separator, never pushed whole.
        let long_sentence = (0..200)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = recursive_split(&long_sentence, SEPARATORS, 50, 10);
        assert!(chunks.len() > 1, "expected multiple chunks, got {}", chunks.len());
        for chunk in &chunks {
            assert!(count_tokens(chunk) <= 50, "chunk exceeded chunk_size: {chunk:?}");
        }
    }

    #[test]
    fn fallback_split_halves_by_word_count() {
        let text = "one two three four";
        let chunks = fallback_split_by_words(text);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn chunk_text_attributes_pages_and_sequential_index() {
        let annotated = "Para one.[PAGE_BREAK:1]\n\nPara two.[PAGE_BREAK:2]";
        let chunks = chunk_text(annotated).unwrap();
        assert!(!chunks.is_empty());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert!(c.page_number >= 1);
        }
    }

    #[test]
    fn approximate_offset_handles_zero_length_clean_text() {
        assert_eq!(approximate_full_text_offset(0, 0, 100), 0);
    }
}
