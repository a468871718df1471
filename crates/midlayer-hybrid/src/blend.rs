//! Position-aware blending of fusion confidence and rerank score.
//!
//! Head-of-list candidates earned their position through exact/near-exact
//! matching, so the fusion stage keeps most of the vote there; the long
//! tail is where the reranker's semantic judgment is trusted more. Fused
//! scores are min-max normalized over the candidate set first — raw RRF
//! sums are not naturally bounded.

use midlayer_core::config::BlendConfig;

/// (fusion_weight, rerank_weight) for a 1-based rank in the fused order.
pub fn blend_weights(config: &BlendConfig, fused_rank: usize) -> (f32, f32) {
    assert!(fused_rank >= 1, "fused_rank is 1-based");
    let fusion_weight = if fused_rank <= config.head_cutoff {
        config.head_fusion_weight
    } else if fused_rank <= config.mid_cutoff {
        config.mid_fusion_weight
    } else {
        config.tail_fusion_weight
    };
    (fusion_weight, 1.0 - fusion_weight)
}

/// Min-max normalize a score set into [0, 1]. A degenerate set where every
/// score is equal normalizes to all-1.0.
pub fn normalize_scores(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max = scores.iter().copied().fold(f32::MIN, f32::max);
    let min = scores.iter().copied().fold(f32::MAX, f32::min);
    let range = max - min;
    if range <= f32::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Blend one candidate's normalized fusion score with its rerank score.
/// Without a rerank score (reranker absent, failed, or short-circuited)
/// the normalized fusion score passes through untouched.
pub fn blend(config: &BlendConfig, fused_rank: usize, fused_norm: f32, rerank_score: Option<f32>) -> f32 {
    match rerank_score {
        Some(rerank) => {
            let (fusion_weight, rerank_weight) = blend_weights(config, fused_rank);
            fusion_weight * fused_norm + rerank_weight * rerank
        }
        None => fused_norm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BlendConfig {
        BlendConfig::default()
    }

    #[test]
    fn head_band_ends_exactly_at_rank_three() {
        assert_eq!(blend_weights(&config(), 3), (0.75, 0.25));
        assert_eq!(blend_weights(&config(), 4), (0.60, 0.40));
    }

    #[test]
    fn mid_band_ends_exactly_at_rank_ten() {
        assert_eq!(blend_weights(&config(), 10), (0.60, 0.40));
        assert_eq!(blend_weights(&config(), 11), (0.40, 0.60));
    }

    #[test]
    fn rank_one_uses_head_weights() {
        assert_eq!(blend_weights(&config(), 1), (0.75, 0.25));
    }

    #[test]
    fn blended_score_mixes_by_band() {
        // rank 2: 0.75 * fused + 0.25 * rerank
        let score = blend(&config(), 2, 0.8, Some(0.4));
        assert!((score - (0.75 * 0.8 + 0.25 * 0.4)).abs() < 1e-6);
        // rank 12: 0.40 * fused + 0.60 * rerank
        let score = blend(&config(), 12, 0.8, Some(0.4));
        assert!((score - (0.40 * 0.8 + 0.60 * 0.4)).abs() < 1e-6);
    }

    #[test]
    fn missing_rerank_score_passes_fusion_through() {
        for rank in [1, 5, 20] {
            assert_eq!(blend(&config(), rank, 0.37, None), 0.37);
        }
    }

    #[test]
    fn normalize_spans_zero_to_one() {
        let normalized = normalize_scores(&[0.2, 0.5, 0.8]);
        assert!((normalized[0] - 0.0).abs() < 1e-6);
        assert!((normalized[1] - 0.5).abs() < 1e-6);
        assert!((normalized[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_degenerate_set_to_ones() {
        assert_eq!(normalize_scores(&[0.4, 0.4, 0.4]), vec![1.0, 1.0, 1.0]);
        assert_eq!(normalize_scores(&[0.9]), vec![1.0]);
        assert!(normalize_scores(&[]).is_empty());
    }
}
