use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

use crate::article::{ingest, Article};
use crate::clustering::{
    clusters_from_assignment, Cluster, ClusterBuilder, DbscanBuilder, KMeansBuilder, MergePolicy,
    RefinePolicy, SplitPolicy,
};
use crate::config::{ClusterStrategy, PipelineConfig};
use crate::evaluation::{evaluate, EvaluationReport};
use crate::features::{extract, Embedder, Extraction, TopicModel};
use crate::filter::{filter_clusters, generate_title, FilterOutcome};
use crate::normalize::normalize;
use crate::TARGET_PIPELINE;

/// One refined cluster in its persisted form, consumable by a later
/// `filter` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCluster {
    pub articles: Vec<Article>,
    pub generated_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_keywords: Option<Vec<String>>,
}

/// Everything the clustering stages produced for one run: the surviving
/// articles with their features, and the refined cluster set over them.
pub struct ClusterStage {
    pub extraction: Extraction,
    pub clusters: Vec<Cluster>,
}

/// Output of a full run.
pub struct RunOutput {
    pub outcome: FilterOutcome,
    pub report: Option<EvaluationReport>,
}

/// Ingests, normalizes, extracts features, builds the initial partition,
/// and refines it. Each stage consumes the previous stage's snapshot;
/// nothing upstream is mutated afterwards.
pub fn cluster_stage(
    raw: HashMap<String, Vec<Article>>,
    config: &PipelineConfig,
    embedder: Option<&dyn Embedder>,
) -> Result<ClusterStage> {
    let mut articles = ingest(raw)?;
    // The one permitted content rewrite: boilerplate stripping.
    for article in &mut articles {
        article.content = normalize(&article.content);
    }
    info!(target: TARGET_PIPELINE, "Normalized {} articles", articles.len());

    let extraction = extract(articles, config, embedder)?;

    let builder: Box<dyn ClusterBuilder> = match config.cluster_strategy {
        ClusterStrategy::KMeans => Box::new(KMeansBuilder {
            cluster_count: config.cluster_count,
            k_search_min: config.k_search_min,
            k_search_max: config.k_search_max,
            rng_seed: config.rng_seed,
        }),
        ClusterStrategy::Dbscan => Box::new(DbscanBuilder {
            tolerance: config.dbscan_tolerance,
            min_points: config.dbscan_min_points,
        }),
    };
    info!(target: TARGET_PIPELINE, "Building initial clusters with {}", builder.name());
    let assignment = builder.build(&extraction.vectors)?;
    let clusters = clusters_from_assignment(&assignment, &extraction.vectors);
    info!(target: TARGET_PIPELINE, "Initial partition: {} clusters", clusters.len());

    let clusters = refine(clusters, &extraction.vectors, config)?;
    Ok(ClusterStage {
        extraction,
        clusters,
    })
}

/// Applies the configured refinement policies in order: merge, then
/// split. Either can be disabled independently.
pub fn refine(
    clusters: Vec<Cluster>,
    vectors: &[Vec<f32>],
    config: &PipelineConfig,
) -> Result<Vec<Cluster>> {
    let mut policies: Vec<Box<dyn RefinePolicy>> = Vec::new();
    if config.merge_enabled {
        policies.push(Box::new(MergePolicy {
            threshold: config.merge_threshold,
        }));
    }
    if config.split_enabled {
        policies.push(Box::new(SplitPolicy {
            threshold: config.split_threshold,
            floor: config.split_floor,
            rng_seed: config.rng_seed,
        }));
    }

    let mut clusters = clusters;
    for policy in policies {
        clusters = policy.refine(clusters, vectors)?;
        info!(
            target: TARGET_PIPELINE,
            "After {} refinement: {} clusters",
            policy.name(),
            clusters.len()
        );
    }
    Ok(clusters)
}

/// The full batch pipeline: raw articles in, filtered narratives out,
/// plus an evaluation report when ground truth is supplied.
pub fn run(
    raw: HashMap<String, Vec<Article>>,
    ground_truth: Option<&HashMap<String, String>>,
    config: &PipelineConfig,
    embedder: Option<&dyn Embedder>,
    topic_model: Option<&dyn TopicModel>,
) -> Result<RunOutput> {
    let stage = cluster_stage(raw, config, embedder)?;
    let outcome = filter_clusters(&stage.clusters, &stage.extraction, config, topic_model)?;
    let report = match ground_truth {
        Some(ground_truth) => Some(evaluate(
            &outcome,
            ground_truth,
            &vectors_by_key(&stage.extraction),
        )?),
        None => None,
    };
    Ok(RunOutput { outcome, report })
}

/// Serializes the refined cluster set in its persisted shape.
pub fn stored_clusters(
    clusters: &[Cluster],
    extraction: &Extraction,
    config: &PipelineConfig,
) -> BTreeMap<String, StoredCluster> {
    clusters
        .iter()
        .map(|cluster| {
            (
                cluster.id.clone(),
                StoredCluster {
                    articles: cluster
                        .members
                        .iter()
                        .map(|&i| extraction.articles[i].clone())
                        .collect(),
                    generated_title: generate_title(cluster, extraction, config),
                    topic_keywords: None,
                },
            )
        })
        .collect()
}

/// Runs the cohesion filter against a previously persisted cluster set.
/// Features are re-extracted over exactly the stored articles; a lexical
/// fit never crosses this corpus boundary.
pub fn filter_stored(
    stored: BTreeMap<String, StoredCluster>,
    config: &PipelineConfig,
    embedder: Option<&dyn Embedder>,
    topic_model: Option<&dyn TopicModel>,
) -> Result<FilterOutcome> {
    let mut articles: Vec<Article> = Vec::new();
    let mut membership: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for (cluster_id, cluster) in &stored {
        let keys = cluster
            .articles
            .iter()
            .map(|a| (a.title.clone(), a.url.clone()))
            .collect();
        membership.push((cluster_id.clone(), keys));
        articles.extend(cluster.articles.iter().cloned());
    }

    let mut raw = HashMap::new();
    raw.insert("stored".to_string(), articles);
    let mut deduplicated = ingest(raw)?;
    for article in &mut deduplicated {
        article.content = normalize(&article.content);
    }
    let extraction = extract(deduplicated, config, embedder)?;

    let index_by_key: HashMap<(String, String), usize> = extraction
        .articles
        .iter()
        .enumerate()
        .map(|(i, a)| ((a.title.clone(), a.url.clone()), i))
        .collect();
    let clusters: Vec<Cluster> = membership
        .into_iter()
        .map(|(cluster_id, keys)| {
            let members = keys
                .into_iter()
                .filter_map(|key| index_by_key.get(&key).copied())
                .collect();
            Cluster::new(cluster_id, members)
        })
        .collect();

    filter_clusters(&clusters, &extraction, config, topic_model)
}

/// Article identity key (title, url) -> feature vector, for the
/// evaluation engine's intrinsic metrics. Keyed by the full identity
/// because ingestion keeps same-title articles with distinct urls.
pub fn vectors_by_key(extraction: &Extraction) -> HashMap<(String, String), Vec<f32>> {
    extraction
        .articles
        .iter()
        .zip(&extraction.vectors)
        .map(|(article, vector)| {
            (
                (article.title.clone(), article.url.clone()),
                vector.clone(),
            )
        })
        .collect()
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(target: TARGET_PIPELINE, "Wrote {}", path.display());
    Ok(())
}

pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureStrategy;

    fn article(title: &str, content: &str) -> Article {
        Article {
            title: title.to_string(),
            url: format!("http://example.com/{}", title.replace(' ', "-")),
            source: "cnn".to_string(),
            content: content.to_string(),
        }
    }

    fn lexical_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.feature_strategy = FeatureStrategy::Lexical;
        config.subject_similarity_threshold = 0.1;
        config.keyword_overlap_threshold = 0.05;
        config.merge_enabled = false;
        config
    }

    /// A corpus of two near-duplicate articles (two sources, one event)
    /// plus nothing else must yield exactly one valid narrative of size
    /// 2, and the intrinsic sentinels, since only one group forms.
    #[test]
    fn test_near_duplicate_pair_forms_one_narrative() {
        let mut raw = HashMap::new();
        raw.insert(
            "politics".to_string(),
            vec![
                article(
                    "Senate passes budget",
                    "The senate passed the budget resolution after a long tariff debate.",
                ),
                article(
                    "Budget passes senate",
                    "After a long tariff debate the senate passed the budget resolution.",
                ),
            ],
        );
        let mut ground = HashMap::new();
        ground.insert("Senate passes budget".to_string(), "budget".to_string());
        ground.insert("Budget passes senate".to_string(), "budget".to_string());

        let mut config = lexical_config();
        config.cluster_count = Some(1);

        let output = run(raw, Some(&ground), &config, None, None).unwrap();
        assert_eq!(output.outcome.valid.len(), 1);
        let narrative = output.outcome.valid.values().next().unwrap();
        assert_eq!(narrative.articles.len(), 2);

        let report = output.report.unwrap();
        assert_eq!(report.silhouette, 0.0);
        assert!(report.davies_bouldin.is_infinite());
    }

    /// The same near-duplicate pair must survive the data-driven
    /// cluster-count search: either the search keeps the corpus in one
    /// cluster, or it yields singletons the merge policy reunites.
    #[test]
    fn test_near_duplicate_pair_survives_searched_count() {
        let mut raw = HashMap::new();
        raw.insert(
            "politics".to_string(),
            vec![
                article(
                    "Senate passes budget",
                    "The senate passed the budget resolution after a long tariff debate.",
                ),
                article(
                    "Budget passes senate",
                    "After a long tariff debate the senate passed the budget resolution.",
                ),
            ],
        );
        let mut config = lexical_config();
        config.merge_enabled = true;
        assert!(config.cluster_count.is_none());

        let output = run(raw, None, &config, None, None).unwrap();
        assert_eq!(output.outcome.valid.len(), 1);
        let narrative = output.outcome.valid.values().next().unwrap();
        assert_eq!(narrative.articles.len(), 2);
    }

    #[test]
    fn test_same_title_articles_keep_distinct_vectors() {
        let mut raw = HashMap::new();
        raw.insert(
            "politics".to_string(),
            vec![
                Article {
                    title: "Breaking".to_string(),
                    url: "http://a.example/1".to_string(),
                    source: "cnn".to_string(),
                    content: "The senate passed the budget resolution.".to_string(),
                },
                Article {
                    title: "Breaking".to_string(),
                    url: "http://b.example/2".to_string(),
                    source: "fox".to_string(),
                    content: "The midfielder scored a late winning goal.".to_string(),
                },
            ],
        );
        let articles = ingest(raw).unwrap();
        let extraction = extract(articles, &lexical_config(), None).unwrap();
        let vectors = vectors_by_key(&extraction);
        assert_eq!(vectors.len(), 2);
    }

    #[test]
    fn test_run_aborts_on_empty_corpus() {
        let config = lexical_config();
        assert!(run(HashMap::new(), None, &config, None, None).is_err());
    }

    #[test]
    fn test_stored_roundtrip_preserves_membership() {
        let mut raw = HashMap::new();
        raw.insert(
            "politics".to_string(),
            vec![
                article(
                    "Senate passes budget",
                    "The senate passed the budget resolution after a long tariff debate.",
                ),
                article(
                    "Budget passes senate",
                    "After a long tariff debate the senate passed the budget resolution.",
                ),
            ],
        );
        let mut config = lexical_config();
        config.cluster_count = Some(1);

        let stage = cluster_stage(raw, &config, None).unwrap();
        let stored = stored_clusters(&stage.clusters, &stage.extraction, &config);
        assert_eq!(stored.len(), stage.clusters.len());

        let outcome = filter_stored(stored, &config, None, None).unwrap();
        assert_eq!(outcome.valid.len(), 1);
    }
}
