//! The retrieval pipeline: probe → strong-signal check → expansion →
//! per-variant fan-out → fusion → rerank → blend.
//!
//! Sub-searches are independent and run concurrently under per-source
//! deadlines; a late or failing source simply contributes nothing. The only
//! fatal condition is every source failing at once.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use midlayer_core::config::RetrievalConfig;
use midlayer_core::error::{Error, Result};
use midlayer_core::traits::{KeywordIndex, QueryExpander, Reranker, VectorIndex};
use midlayer_core::types::{
    ExpandedQuery, QueryOrigin, RankedResult, RetrievalOutcome, RetrievalProvenance, SearchHit,
    SourceKind,
};

use crate::blend::{blend, normalize_scores};
use crate::fusion::{RankedList, RrfFusion};
use crate::rerank;
use crate::signal::detect_strong_signal;

/// Hybrid retrieval over injected index handles. Holds no index state of
/// its own; keyword and vector implementations are swappable behind their
/// traits.
pub struct HybridPipeline {
    keyword: Arc<dyn KeywordIndex>,
    vector: Arc<dyn VectorIndex>,
    expander: Option<Arc<dyn QueryExpander>>,
    reranker: Option<Arc<dyn Reranker>>,
    fusion: RrfFusion,
    config: RetrievalConfig,
}

impl HybridPipeline {
    /// Fails fast on contract-violating configuration.
    pub fn new(
        keyword: Arc<dyn KeywordIndex>,
        vector: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        let fusion = RrfFusion::from_config(&config);
        Ok(Self { keyword, vector, expander: None, reranker: None, fusion, config })
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalOutcome> {
        assert!(top_k >= 1, "top_k must be at least 1");
        // deeper per-source lists give fusion overlap to work with
        let fetch_k = top_k * 2;
        let deadline = Duration::from_millis(self.config.source_timeout_ms);

        // keyword probe on the user's own query; it doubles as the original
        // keyword list during fusion, so nothing is searched twice
        let mut attempted = 1usize;
        let mut failed = 0usize;
        let probe = match timeout(deadline, self.keyword.search(query, fetch_k)).await {
            Ok(Ok(hits)) => Some(hits),
            Ok(Err(e)) => {
                warn!(error = %e, "keyword probe failed");
                None
            }
            Err(_) => {
                warn!("keyword probe timed out");
                None
            }
        };
        if probe.is_none() {
            failed += 1;
        }

        if self.config.strong_signal.enabled {
            if let Some(hits) = &probe {
                let signal = detect_strong_signal(hits, &self.config.strong_signal);
                if signal.is_strong {
                    info!(
                        top_score = signal.top_score,
                        gap = signal.score_gap,
                        "strong keyword signal, skipping expansion and fusion"
                    );
                    return Ok(strong_signal_outcome(hits.clone(), top_k));
                }
            }
        }

        let expanded = self.expand_query(query).await;

        // one task per (variant, engine). Vector tasks serialize their query
        // embedding inside the index; keyword tasks run fully in parallel.
        let mut plans: Vec<(SourceKind, QueryOrigin, String, String)> = Vec::new();
        for (i, variant) in expanded.lex_variants.iter().enumerate() {
            plans.push((SourceKind::Keyword, QueryOrigin::Expanded, format!("lex-{}", i + 1), variant.clone()));
        }
        plans.push((SourceKind::Vector, QueryOrigin::Original, "original".to_string(), query.to_string()));
        for (i, variant) in expanded.vec_variants.iter().enumerate() {
            plans.push((SourceKind::Vector, QueryOrigin::Expanded, format!("vec-{}", i + 1), variant.clone()));
        }
        if let Some(hyde) = &expanded.hyde {
            plans.push((SourceKind::Vector, QueryOrigin::Expanded, "hyde".to_string(), hyde.clone()));
        }
        attempted += plans.len();

        let searches = plans.into_iter().map(|(source, origin, variant, text)| {
            let keyword = Arc::clone(&self.keyword);
            let vector = Arc::clone(&self.vector);
            let weight = match origin {
                QueryOrigin::Original => self.config.original_weight,
                QueryOrigin::Expanded => self.config.expansion_weight,
            };
            async move {
                let outcome = match source {
                    SourceKind::Keyword => timeout(deadline, keyword.search(&text, fetch_k)).await,
                    SourceKind::Vector => timeout(deadline, vector.search(&text, fetch_k)).await,
                };
                let hits = match outcome {
                    Ok(Ok(hits)) => Some(hits),
                    Ok(Err(e)) => {
                        warn!(variant = %variant, error = %e, "search source failed");
                        None
                    }
                    Err(_) => {
                        warn!(variant = %variant, "search source timed out");
                        None
                    }
                };
                (source, origin, variant, weight, hits)
            }
        });

        let mut lists: Vec<RankedList> = Vec::new();
        if let Some(hits) = probe {
            lists.push(RankedList::new(
                SourceKind::Keyword,
                QueryOrigin::Original,
                "original",
                self.config.original_weight,
                hits,
            ));
        }
        for (source, origin, variant, weight, hits) in join_all(searches).await {
            match hits {
                Some(hits) => lists.push(RankedList::new(source, origin, variant, weight, hits)),
                None => failed += 1,
            }
        }
        if failed == attempted {
            return Err(Error::RetrievalUnavailable(format!("all {attempted} search sources failed")));
        }
        debug!(lists = lists.len(), failed, "fan-out complete");

        let candidates = self.fusion.fuse(&lists, self.config.fusion_top_n);
        if candidates.is_empty() {
            return Ok(RetrievalOutcome { results: Vec::new(), provenance: RetrievalProvenance::Fused });
        }

        let rerank_scores = match &self.reranker {
            Some(reranker) => {
                let bounded = &candidates[..candidates.len().min(self.config.rerank.max_candidates)];
                let mut scores =
                    rerank::score_candidates(reranker.as_ref(), &self.config.rerank, query, bounded).await;
                scores.resize(candidates.len(), None);
                scores
            }
            None => vec![None; candidates.len()],
        };

        let fused_raw: Vec<f32> = candidates.iter().map(|c| c.fused_score).collect();
        let fused_norm = normalize_scores(&fused_raw);
        let mut results: Vec<RankedResult> = candidates
            .into_iter()
            .zip(fused_norm)
            .zip(rerank_scores)
            .enumerate()
            .map(|(i, ((candidate, norm), rerank_score))| {
                let retrieval_rank = i + 1;
                let final_score = blend(&self.config.blend, retrieval_rank, norm, rerank_score);
                RankedResult {
                    chunk: candidate.chunk,
                    retrieval_rank,
                    fused_score: candidate.fused_score,
                    rerank_score,
                    final_score,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.retrieval_rank.cmp(&b.retrieval_rank))
        });
        results.truncate(top_k);
        info!(results = results.len(), "retrieval complete");
        Ok(RetrievalOutcome { results, provenance: RetrievalProvenance::Fused })
    }

    /// Expansion is best-effort: a missing, disabled, slow, or failing
    /// expander all degrade to the original query only.
    async fn expand_query(&self, query: &str) -> ExpandedQuery {
        let settings = &self.config.expansion;
        let Some(expander) = &self.expander else {
            return ExpandedQuery::unexpanded(query);
        };
        if !settings.enabled {
            return ExpandedQuery::unexpanded(query);
        }
        let mut expanded =
            match timeout(Duration::from_millis(settings.timeout_ms), expander.expand(query)).await {
                Ok(Ok(expanded)) => expanded,
                Ok(Err(e)) => {
                    warn!(error = %e, "query expansion failed, searching with the original query only");
                    return ExpandedQuery::unexpanded(query);
                }
                Err(_) => {
                    warn!("query expansion timed out, searching with the original query only");
                    return ExpandedQuery::unexpanded(query);
                }
            };
        // the expander never rewrites the user's own query
        expanded.original = query.to_string();
        expanded.lex_variants.truncate(settings.max_lex_variants);
        expanded.vec_variants.truncate(settings.max_vec_variants);
        debug!(
            lex = expanded.lex_variants.len(),
            vec = expanded.vec_variants.len(),
            hyde = expanded.hyde.is_some(),
            "query expanded"
        );
        expanded
    }
}

fn strong_signal_outcome(hits: Vec<SearchHit>, top_k: usize) -> RetrievalOutcome {
    let results = hits
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, hit)| RankedResult {
            chunk: hit.chunk,
            retrieval_rank: i + 1,
            fused_score: hit.raw_score,
            rerank_score: None,
            final_score: hit.raw_score,
        })
        .collect();
    RetrievalOutcome { results, provenance: RetrievalProvenance::StrongSignalKeyword }
}
