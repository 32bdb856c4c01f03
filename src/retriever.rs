//! Retriever (C6): kNN search, threshold filtering, filename-keyword
//! re-ranking, and Jaccard-based near-duplicate elimination.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::embedder::Embedder;
use crate::error::Result;
use crate::vector_store::VectorStore;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_THRESHOLD: f32 = 0.35;
const RERANK_BOOST: f32 = 0.05;
const DEDUP_JACCARD_THRESHOLD: f64 = 0.80;

static FILENAME_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_\-.\s]+").unwrap());

/// A transient projection of a Chunk returned to callers of `retrieve`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub source_file: String,
    pub page_number: usize,
    pub score: f32,
}

fn filename_keywords(source_file: &str) -> Vec<String> {
    let stripped = source_file
        .strip_suffix(".pdf")
        .or_else(|| source_file.strip_suffix(".PDF"))
        .unwrap_or(source_file);

    FILENAME_SPLIT_RE
        .split(stripped)
        .filter(|tok| tok.len() >= 3)
        .map(|tok| tok.to_lowercase())
        .collect()
}

fn apply_reranking_boost(chunks: &mut [RetrievedChunk], query_lower: &str) {
    for chunk in chunks.iter_mut() {
        for keyword in filename_keywords(&chunk.source_file) {
            if query_lower.contains(&keyword) {
                chunk.score += RERANK_BOOST;
                break;
            }
        }
    }
    chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

fn char_set(text: &str) -> HashSet<char> {
    text.chars().collect()
}

fn jaccard_similarity(a: &HashSet<char>, b: &HashSet<char>) -> f64 {
    let union: HashSet<&char> = a.union(b).collect();
    if union.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union.len() as f64
}

fn deduplicate(chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut accepted: Vec<RetrievedChunk> = Vec::new();
    let mut accepted_sets: Vec<HashSet<char>> = Vec::new();

    for candidate in chunks {
        let candidate_set = char_set(&candidate.text);
        let mut is_duplicate = false;

        for (i, accepted_set) in accepted_sets.iter().enumerate() {
            if jaccard_similarity(&candidate_set, accepted_set) > DEDUP_JACCARD_THRESHOLD {
                is_duplicate = true;
                if candidate.score > accepted[i].score {
                    accepted[i] = candidate.clone();
                    accepted_sets[i] = candidate_set.clone();
                }
                break;
            }
        }

        if !is_duplicate {
            accepted_sets.push(candidate_set);
            accepted.push(candidate);
        }
    }

    accepted
}

/// Embed `query`, search the vector store, filter by threshold, re-rank by
/// filename keyword match, then deduplicate near-identical chunks.
pub async fn retrieve(
    embedder: &Embedder,
    store: &VectorStore,
    query: &str,
    k: usize,
    threshold: f32,
) -> Result<Vec<RetrievedChunk>> {
    let query_vec = embedder.encode_one(query)?;
    let hits = store.search(&query_vec, k).await?;

    let mut candidates: Vec<RetrievedChunk> = hits
        .into_iter()
        .filter(|hit| hit.score >= threshold)
        .map(|hit| RetrievedChunk {
            text: hit.text,
            source_file: hit.source_file,
            page_number: hit.page_number,
            score: hit.score,
        })
        .collect();

    let query_lower = query.to_lowercase();
    apply_reranking_boost(&mut candidates, &query_lower);

    Ok(deduplicate(candidates))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, source: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            source_file: source.to_string(),
            page_number: 1,
            score,
        }
    }

    #[test]
    fn filename_keywords_strip_extension_and_short_tokens() {
        let kws = filename_keywords("pricing_guide.pdf");
        assert!(kws.contains(&"pricing".to_string()));
        assert!(kws.contains(&"guide".to_string()));
    }

    #[test]
    fn rerank_boosts_matching_filename_and_resorts() {
        let mut chunks = vec![
            chunk("faq content", "faq.pdf", 0.42),
            chunk("pricing content", "pricing_guide.pdf", 0.40),
        ];
        apply_reranking_boost(&mut chunks, "what is the pricing?");
        assert_eq!(chunks[0].source_file, "pricing_guide.pdf");
        assert!((chunks[0].score - 0.45).abs() < 1e-6);
    }

    #[test]
    fn jaccard_of_empty_sets_is_zero() {
        let a: HashSet<char> = HashSet::new();
        let b: HashSet<char> = HashSet::new();
        assert_eq!(jaccard_similarity(&a, &b), 0.0);
    }

    #[test]
    fn dedup_keeps_higher_scoring_near_duplicate() {
        let chunks = vec![
            chunk("the quick brown fox jumps", "a.pdf", 0.5),
            chunk("the quick brown fox jumps!", "b.pdf", 0.9),
        ];
        let out = deduplicate(chunks);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_file, "b.pdf");
    }

    #[test]
    fn dedup_keeps_distinct_chunks() {
        let chunks = vec![
            chunk("completely different text one", "a.pdf", 0.5),
            chunk("unrelated other content entirely", "b.pdf", 0.4),
        ];
        let out = deduplicate(chunks);
        assert_eq!(out.len(), 2);
    }
}
