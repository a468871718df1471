//! Weighted Reciprocal Rank Fusion.
//!
//! Each hit at 1-based rank `r` in a list with weight `w` contributes
//! `w / (k + r)` to its chunk's fused score; contributions from every list
//! accumulate additively. Raw scores never cross index types here — only
//! ranks are mixed, which is what makes keyword and vector lists comparable
//! at all. Normalization happens later, in the blender.

use std::collections::{BTreeSet, HashMap};

use midlayer_core::config::RetrievalConfig;
use midlayer_core::types::{ChunkId, FusionCandidate, QueryOrigin, SearchHit, SourceKind, SourceTag};

/// One index's result list for one query variant, tagged for fusion.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub source: SourceKind,
    pub origin: QueryOrigin,
    pub variant: String,
    pub weight: f32,
    pub hits: Vec<SearchHit>,
}

impl RankedList {
    pub fn new(
        source: SourceKind,
        origin: QueryOrigin,
        variant: impl Into<String>,
        weight: f32,
        hits: Vec<SearchHit>,
    ) -> Self {
        Self { source, origin, variant: variant.into(), weight, hits }
    }
}

pub struct RrfFusion {
    k: f32,
    rank1_bonus: f32,
    rank2_3_bonus: f32,
}

struct Accumulator {
    candidate: FusionCandidate,
    rank1_in_original: bool,
    rank2_3_in_original: bool,
}

impl RrfFusion {
    pub fn new(k: f32, rank1_bonus: f32, rank2_3_bonus: f32) -> Self {
        assert!(k > 0.0, "rrf k must be > 0");
        assert!(rank1_bonus >= 0.0 && rank2_3_bonus >= 0.0, "bonuses must be >= 0");
        Self { k, rank1_bonus, rank2_3_bonus }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.rrf_k, config.rank1_bonus, config.rank2_3_bonus)
    }

    /// Fuse tagged result lists into a single ranking of at most `top_n`
    /// candidates. Deterministic: ties break on the best original-query
    /// rank, then on chunk id.
    pub fn fuse(&self, lists: &[RankedList], top_n: usize) -> Vec<FusionCandidate> {
        assert!(top_n >= 1, "top_n must be at least 1");
        if lists.is_empty() {
            return Vec::new();
        }

        let mut by_id: HashMap<ChunkId, Accumulator> = HashMap::new();
        for list in lists {
            assert!(list.weight > 0.0, "list weight must be > 0");
            for (i, hit) in list.hits.iter().enumerate() {
                let rank = i + 1;
                let acc = by_id.entry(hit.chunk.id.clone()).or_insert_with(|| Accumulator {
                    candidate: FusionCandidate {
                        chunk: hit.chunk.clone(),
                        fused_score: 0.0,
                        sources: BTreeSet::new(),
                        best_original_rank: None,
                    },
                    rank1_in_original: false,
                    rank2_3_in_original: false,
                });
                acc.candidate.fused_score += list.weight / (self.k + rank as f32);
                acc.candidate.sources.insert(SourceTag {
                    source: list.source,
                    origin: list.origin,
                    variant: list.variant.clone(),
                });
                if list.origin == QueryOrigin::Original {
                    acc.candidate.best_original_rank =
                        Some(acc.candidate.best_original_rank.map_or(rank, |best| best.min(rank)));
                    if rank == 1 {
                        acc.rank1_in_original = true;
                    } else if rank <= 3 {
                        acc.rank2_3_in_original = true;
                    }
                }
            }
        }

        let mut candidates: Vec<FusionCandidate> = by_id
            .into_values()
            .map(|acc| {
                let mut candidate = acc.candidate;
                // each bonus tier pays out at most once per chunk, and only
                // for placements earned by the user's own query
                if acc.rank1_in_original {
                    candidate.fused_score += self.rank1_bonus;
                }
                if acc.rank2_3_in_original {
                    candidate.fused_score += self.rank2_3_bonus;
                }
                candidate
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| original_rank_key(a).cmp(&original_rank_key(b)))
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        candidates.truncate(top_n);
        candidates
    }
}

fn original_rank_key(candidate: &FusionCandidate) -> usize {
    candidate.best_original_rank.unwrap_or(usize::MAX)
}
