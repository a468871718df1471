//! Strong-signal detection: skip the expensive parts of the pipeline when
//! the top keyword match is already decisive (think: the user typed an
//! exact file name). Heuristic thresholds, tunable via configuration.

use midlayer_core::config::StrongSignalConfig;
use midlayer_core::types::SearchHit;

#[derive(Debug, Clone, Copy)]
pub struct StrongSignal {
    pub is_strong: bool,
    pub top_score: f32,
    pub score_gap: f32,
}

/// A keyword result list carries a strong signal when the top hit clears
/// the absolute threshold AND leads the runner-up by at least the gap
/// threshold. With fewer than two hits the missing second score counts
/// as 0.0. Scores are the keyword index's own normalized relevance.
pub fn detect_strong_signal(hits: &[SearchHit], config: &StrongSignalConfig) -> StrongSignal {
    let Some(top1) = hits.first().map(|h| h.raw_score) else {
        return StrongSignal { is_strong: false, top_score: 0.0, score_gap: 0.0 };
    };
    let top2 = hits.get(1).map_or(0.0, |h| h.raw_score);
    let score_gap = top1 - top2;
    StrongSignal {
        is_strong: top1 >= config.min_top_score && score_gap >= config.min_gap,
        top_score: top1,
        score_gap,
    }
}
