//! Rerank orchestration: bounded candidate sets, sub-batching under the
//! model's input budget, representative-text selection for oversized
//! chunks, and non-fatal failure handling. The reranker itself is an
//! injected capability; a rule-based implementation is provided for
//! setups without a model.

use async_trait::async_trait;
use tracing::warn;

use midlayer_core::config::RerankConfig;
use midlayer_core::traits::Reranker;
use midlayer_core::types::FusionCandidate;

/// Score a bounded candidate prefix against the query.
///
/// Returns one entry per candidate, aligned with the input. A failed or
/// misaligned sub-batch leaves `None` for its candidates: those fall back
/// to fusion-only ranking while the rest keep their rerank scores.
pub async fn score_candidates(
    reranker: &dyn Reranker,
    config: &RerankConfig,
    query: &str,
    candidates: &[FusionCandidate],
) -> Vec<Option<f32>> {
    let terms = query_terms(query);
    let texts: Vec<String> = candidates
        .iter()
        .map(|c| representative_text(&c.chunk.content, &terms, config.max_chunk_chars))
        .collect();

    let mut scores = vec![None; candidates.len()];
    let mut start = 0;
    while start < texts.len() {
        let end = batch_end(&texts, start, config.max_batch_chars);
        let batch = &texts[start..end];
        match reranker.rerank(query, batch).await {
            Ok(batch_scores) if batch_scores.len() == batch.len() => {
                for (i, score) in batch_scores.into_iter().enumerate() {
                    scores[start + i] = Some(score.clamp(0.0, 1.0));
                }
            }
            Ok(batch_scores) => {
                warn!(
                    expected = batch.len(),
                    got = batch_scores.len(),
                    "reranker returned misaligned scores, keeping fusion ranks for this batch"
                );
            }
            Err(e) => {
                warn!(error = %e, "rerank call failed, keeping fusion ranks for this batch");
            }
        }
        start = end;
    }
    scores
}

/// Greedy sub-batch boundary: pack candidates until the character budget
/// is spent. A single oversized candidate still goes out alone.
fn batch_end(texts: &[String], start: usize, max_batch_chars: usize) -> usize {
    let mut end = start;
    let mut used = 0usize;
    while end < texts.len() {
        let len = texts[end].chars().count();
        if end > start && used + len > max_batch_chars {
            break;
        }
        used += len;
        end += 1;
    }
    end
}

pub fn query_terms(query: &str) -> Vec<String> {
    query.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// The text submitted for scoring. Chunks within budget go whole; longer
/// ones are represented by the window containing the most query-term
/// occurrences.
pub fn representative_text(content: &str, terms: &[String], max_chars: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= max_chars {
        return content.to_string();
    }
    let step = (max_chars / 2).max(1);
    let mut best_start = 0;
    let mut best_count = -1i64;
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let lower = window.to_lowercase();
        let count = terms.iter().map(|t| lower.matches(t.as_str()).count()).sum::<usize>() as i64;
        if count > best_count {
            best_count = count;
            best_start = start;
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    let end = (best_start + max_chars).min(chars.len());
    chars[best_start..end].iter().collect()
}

/// Rule-based relevance: the fraction of query terms present in the text,
/// with a penalty for very short or very long candidates. A stand-in for
/// model-backed scoring; deterministic by construction.
pub struct TermDensityReranker;

#[async_trait]
impl Reranker for TermDensityReranker {
    async fn rerank(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>> {
        let terms = query_terms(query);
        let scores = candidates
            .iter()
            .map(|text| {
                if terms.is_empty() {
                    return 0.5;
                }
                let lower = text.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                let mut score = matched as f32 / terms.len() as f32;
                let len = text.chars().count();
                if len < 100 {
                    score -= 0.1;
                } else if len > 2000 {
                    score -= 0.05;
                }
                score.clamp(0.0, 1.0)
            })
            .collect();
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midlayer_core::config::RerankConfig;
    use midlayer_core::types::{Chunk, FusionCandidate};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(doc: &str, content: &str) -> FusionCandidate {
        FusionCandidate {
            chunk: Chunk::new(doc, content, 0, content.len()),
            fused_score: 0.1,
            sources: BTreeSet::new(),
            best_original_rank: Some(1),
        }
    }

    struct CountingReranker {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reranker for CountingReranker {
        async fn rerank(&self, _query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.9; candidates.len()])
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl Reranker for FailingReranker {
        async fn rerank(&self, _query: &str, _candidates: &[String]) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("model unavailable")
        }
    }

    struct MisalignedReranker;

    #[async_trait]
    impl Reranker for MisalignedReranker {
        async fn rerank(&self, _query: &str, _candidates: &[String]) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.5])
        }
    }

    #[tokio::test]
    async fn oversized_sets_split_into_sub_batches() {
        let config = RerankConfig { max_candidates: 30, max_chunk_chars: 100, max_batch_chars: 150 };
        let candidates: Vec<FusionCandidate> =
            (0..4).map(|i| candidate(&format!("doc{i}"), &"x".repeat(90))).collect();
        let reranker = CountingReranker { calls: AtomicUsize::new(0) };

        let scores = score_candidates(&reranker, &config, "query", &candidates).await;
        assert_eq!(scores.len(), 4);
        assert!(scores.iter().all(|s| s == &Some(0.9)));
        // 90 chars each, 150 budget: one candidate per batch after the first fills
        assert!(reranker.calls.load(Ordering::SeqCst) >= 2, "input budget forces sub-batching");
    }

    #[tokio::test]
    async fn failure_degrades_to_none_for_affected_candidates() {
        let config = RerankConfig::default();
        let candidates = vec![candidate("a", "alpha text"), candidate("b", "bravo text")];
        let scores = score_candidates(&FailingReranker, &config, "query", &candidates).await;
        assert_eq!(scores, vec![None, None]);
    }

    #[tokio::test]
    async fn misaligned_response_is_discarded_not_misapplied() {
        let config = RerankConfig::default();
        let candidates = vec![candidate("a", "alpha text"), candidate("b", "bravo text")];
        let scores = score_candidates(&MisalignedReranker, &config, "query", &candidates).await;
        assert_eq!(scores, vec![None, None]);
    }

    #[test]
    fn representative_text_picks_the_densest_window() {
        let padding = "lorem ipsum dolor sit amet ".repeat(20);
        let content = format!("{padding}ferro rod ferro rod ferro rod{padding}");
        let terms = query_terms("ferro rod");
        let text = representative_text(&content, &terms, 120);
        assert!(text.chars().count() <= 120);
        assert!(text.contains("ferro rod"), "selected window holds the query terms");
    }

    #[test]
    fn short_content_is_passed_through_whole() {
        let terms = query_terms("anything");
        assert_eq!(representative_text("short text", &terms, 100), "short text");
    }

    #[tokio::test]
    async fn term_density_scores_are_bounded_and_ordered() {
        let long_match = format!("a bowline knot secures a loop. {}", "filler words here ".repeat(10));
        let candidates =
            vec![long_match.clone(), "nothing relevant at all in this one".to_string()];
        let scores = TermDensityReranker.rerank("bowline knot", &candidates).await.expect("rerank");
        assert_eq!(scores.len(), 2);
        assert!(scores[0] > scores[1]);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}
