use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which feature-extraction strategy drives clustering and refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStrategy {
    /// Context-independent embeddings, cosine-comparable across the
    /// whole corpus (and across runs).
    Semantic,
    /// Corpus-relative TF-IDF. Only meaningful within one fit; any
    /// comparison over a different corpus requires a refit.
    Lexical,
}

/// Which initial clustering strategy partitions the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStrategy {
    /// Hard partition with an externally fixed or searched cluster count.
    KMeans,
    /// Density-based; points in no dense neighborhood stay unassigned
    /// and never reach narrative formation.
    Dbscan,
}

/// All tunable thresholds for one pipeline run.
///
/// Earlier iterations of this pipeline carried mutually
/// inconsistent inline thresholds (0.1-0.4 for similarity, 0.05-0.3
/// for overlap/topic). None of them is "correct"; every value here is
/// configuration, and no stage hard-codes its own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub feature_strategy: FeatureStrategy,
    pub cluster_strategy: ClusterStrategy,

    /// Minimum member count for a cluster to become a narrative.
    pub min_members: usize,
    /// Representative pairwise similarity a cluster must reach at the
    /// filter (0.4 in the final semantic iteration; 0.1 in the TF-IDF era).
    pub subject_similarity_threshold: f64,
    /// Keyword overlap (|common| / |smaller set|) a cluster must reach.
    pub keyword_overlap_threshold: f64,
    /// Inter-cluster mean cosine similarity at or above which two
    /// clusters are merged.
    pub merge_threshold: f64,
    /// Intra-cluster mean cosine similarity below which a cluster is
    /// re-partitioned.
    pub split_threshold: f64,
    /// Minimum cohesion a split-off sub-cluster must keep.
    pub split_floor: f64,
    /// Cosine similarity between topic distributions required by the
    /// optional topic gate.
    pub topic_similarity_threshold: f64,

    /// Fixed cluster count for the hard-partition strategy; `None`
    /// triggers the data-driven search over `k_search_min..=k_search_max`.
    pub cluster_count: Option<usize>,
    pub k_search_min: usize,
    pub k_search_max: usize,

    /// DBSCAN neighborhood radius (cosine-normalized euclidean space).
    pub dbscan_tolerance: f64,
    /// DBSCAN minimum neighborhood size.
    pub dbscan_min_points: usize,

    /// How many top-weighted terms form an article's keyword set.
    pub top_keywords: usize,
    /// How many common tokens to keep as exclusion evidence.
    pub evidence_tokens: usize,
    /// How many terms make up a generated narrative title.
    pub title_terms: usize,

    /// Apply the merge policy during refinement.
    pub merge_enabled: bool,
    /// Apply the split policy during refinement.
    pub split_enabled: bool,

    /// Seed for the hard-partition initializer; fixed seed, fixed output.
    pub rng_seed: u64,

    /// Endpoint of the embedding collaborator (semantic strategy only).
    pub embedding_url: String,
    /// Dimensionality the embedding collaborator promises.
    pub embedding_dimensions: usize,
    /// Per-request timeout for the embedding collaborator, in seconds.
    pub embedding_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feature_strategy: FeatureStrategy::Semantic,
            cluster_strategy: ClusterStrategy::KMeans,
            min_members: 2,
            subject_similarity_threshold: 0.4,
            keyword_overlap_threshold: 0.05,
            merge_threshold: 0.6,
            split_threshold: 0.3,
            split_floor: 0.2,
            topic_similarity_threshold: 0.3,
            cluster_count: None,
            k_search_min: 2,
            k_search_max: 12,
            dbscan_tolerance: 0.7,
            dbscan_min_points: 2,
            top_keywords: 50,
            evidence_tokens: 10,
            title_terms: 2,
            merge_enabled: true,
            split_enabled: false,
            rng_seed: 42,
            embedding_url: "http://localhost:8091/embed".to_string(),
            embedding_dimensions: 384,
            embedding_timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    /// Loads a config from a JSON file; missing fields fall back to
    /// their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_gate() {
        let config = PipelineConfig::default();
        assert_eq!(config.min_members, 2);
        assert!(config.subject_similarity_threshold > 0.0);
        assert!(config.keyword_overlap_threshold > 0.0);
        assert!(config.k_search_min >= 2);
        assert!(config.k_search_max >= config.k_search_min);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"merge_threshold": 0.75}"#).unwrap();
        assert_eq!(config.merge_threshold, 0.75);
        assert_eq!(config.min_members, PipelineConfig::default().min_members);
    }
}
