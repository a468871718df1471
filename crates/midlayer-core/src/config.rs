//! Configuration loader and the typed retrieval tunables.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env
//! vars. Every retrieval tunable has a documented default and can be
//! overridden from the `[retrieval]` section or environment.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_"));

        Ok(Self { figment })
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let figment = Figment::new().merge(Toml::file(path)).merge(Env::prefixed("APP_"));
        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[retrieval]` section, falling back to defaults when absent.
    pub fn retrieval(&self) -> RetrievalConfig {
        self.get("retrieval").unwrap_or_default()
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

/// Tunables of the hybrid retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Rank-fusion damping constant. Must be > 0.
    pub rrf_k: f32,
    /// Maximum candidates kept after fusion. Must be >= 1.
    pub fusion_top_n: usize,
    /// Weight for result lists produced by the user's own query.
    pub original_weight: f32,
    /// Weight for result lists produced by machine-generated variants.
    pub expansion_weight: f32,
    /// Flat bonus for a chunk that placed first in any original-query list.
    pub rank1_bonus: f32,
    /// Flat bonus for a chunk that placed second or third in any original-query list.
    pub rank2_3_bonus: f32,
    /// Per-source search deadline, milliseconds. A late source contributes
    /// nothing; fusion runs over whatever arrived in time.
    pub source_timeout_ms: u64,
    pub strong_signal: StrongSignalConfig,
    pub expansion: ExpansionConfig,
    pub rerank: RerankConfig,
    pub blend: BlendConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            fusion_top_n: 30,
            original_weight: 2.0,
            expansion_weight: 1.0,
            rank1_bonus: 0.05,
            rank2_3_bonus: 0.02,
            source_timeout_ms: 2_000,
            strong_signal: StrongSignalConfig::default(),
            expansion: ExpansionConfig::default(),
            rerank: RerankConfig::default(),
            blend: BlendConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Reject contract-violating settings up front. These are programmer
    /// errors, not runtime conditions, and are never silently corrected.
    pub fn validate(&self) -> Result<()> {
        if !(self.rrf_k > 0.0) {
            return Err(Error::InvalidConfig(format!("rrf_k must be > 0, got {}", self.rrf_k)));
        }
        if self.fusion_top_n == 0 {
            return Err(Error::InvalidConfig("fusion_top_n must be >= 1".to_string()));
        }
        if !(self.original_weight > 0.0) || !(self.expansion_weight > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "list weights must be > 0, got original={} expansion={}",
                self.original_weight, self.expansion_weight
            )));
        }
        if self.rank1_bonus < 0.0 || self.rank2_3_bonus < 0.0 {
            return Err(Error::InvalidConfig("top-rank bonuses must be >= 0".to_string()));
        }
        self.strong_signal.validate()?;
        self.expansion.validate()?;
        self.rerank.validate()?;
        self.blend.validate()
    }
}

/// Thresholds for skipping expansion and fusion when the top keyword match
/// is already decisive. Tunable policy, not a law.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrongSignalConfig {
    pub enabled: bool,
    /// Minimum normalized score of the top keyword hit.
    pub min_top_score: f32,
    /// Minimum score gap between the first and second keyword hits.
    pub min_gap: f32,
}

impl Default for StrongSignalConfig {
    fn default() -> Self {
        Self { enabled: true, min_top_score: 0.85, min_gap: 0.15 }
    }
}

impl StrongSignalConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_top_score) || !(0.0..=1.0).contains(&self.min_gap) {
            return Err(Error::InvalidConfig(
                "strong-signal thresholds must lie in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub enabled: bool,
    pub max_lex_variants: usize,
    pub max_vec_variants: usize,
    /// Expansion deadline, milliseconds; a slow expander degrades to the
    /// original query only.
    pub timeout_ms: u64,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self { enabled: true, max_lex_variants: 2, max_vec_variants: 2, timeout_ms: 4_000 }
    }
}

impl ExpansionConfig {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Upper bound on candidates submitted to the reranker.
    pub max_candidates: usize,
    /// Per-candidate text budget, characters. Longer chunks are represented
    /// by their most query-term-dense window.
    pub max_chunk_chars: usize,
    /// Per-call input budget, characters; a larger candidate set is split
    /// into sub-batches that are scored independently and merged.
    pub max_batch_chars: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self { max_candidates: 30, max_chunk_chars: 1_000, max_batch_chars: 8_000 }
    }
}

impl RerankConfig {
    fn validate(&self) -> Result<()> {
        if self.max_candidates == 0 || self.max_chunk_chars == 0 || self.max_batch_chars == 0 {
            return Err(Error::InvalidConfig("rerank bounds must be >= 1".to_string()));
        }
        if self.max_batch_chars < self.max_chunk_chars {
            return Err(Error::InvalidConfig(
                "rerank.max_batch_chars must admit at least one full candidate".to_string(),
            ));
        }
        Ok(())
    }
}

/// Position-dependent mixing of fusion confidence and rerank score.
///
/// Ranks 1..=head_cutoff trust the fusion stage most, ranks up to
/// mid_cutoff balance the two, and the long tail leans on the reranker.
/// The rerank weight of each band is one minus its fusion weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub head_cutoff: usize,
    pub mid_cutoff: usize,
    pub head_fusion_weight: f32,
    pub mid_fusion_weight: f32,
    pub tail_fusion_weight: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            head_cutoff: 3,
            mid_cutoff: 10,
            head_fusion_weight: 0.75,
            mid_fusion_weight: 0.60,
            tail_fusion_weight: 0.40,
        }
    }
}

impl BlendConfig {
    fn validate(&self) -> Result<()> {
        if self.head_cutoff == 0 || self.mid_cutoff <= self.head_cutoff {
            return Err(Error::InvalidConfig(
                "blend cutoffs must satisfy 0 < head_cutoff < mid_cutoff".to_string(),
            ));
        }
        for w in [self.head_fusion_weight, self.mid_fusion_weight, self.tail_fusion_weight] {
            if !(0.0..=1.0).contains(&w) {
                return Err(Error::InvalidConfig(format!(
                    "blend fusion weights must lie in [0, 1], got {w}"
                )));
            }
        }
        Ok(())
    }
}
