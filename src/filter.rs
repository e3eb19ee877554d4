use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::clustering::types::{Cluster, Narrative};
use crate::config::PipelineConfig;
use crate::features::{Extraction, TfidfFit, TopicModel};
use crate::similarity::cosine_similarity_or_zero;
use crate::TARGET_PIPELINE;

/// Why a cluster was rejected, with enough evidence to reproduce the
/// decision. Threshold rejection is an expected branch, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_tokens: Option<Vec<String>>,
}

/// The filter's complete verdict over one cluster set.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FilterOutcome {
    #[serde(rename = "validNarratives")]
    pub valid: BTreeMap<String, Narrative>,
    #[serde(rename = "excludedNarratives")]
    pub excluded: BTreeMap<String, Exclusion>,
}

/// Re-validates every candidate cluster through sequential gates,
/// short-circuiting at the first failure: member count, representative
/// similarity, keyword overlap, and (when a topic model collaborator is
/// supplied) topic-distribution similarity. Clusters passing every gate
/// become titled narratives.
pub fn filter_clusters(
    clusters: &[Cluster],
    extraction: &Extraction,
    config: &PipelineConfig,
    topic_model: Option<&dyn TopicModel>,
) -> Result<FilterOutcome> {
    let mut outcome = FilterOutcome::default();

    for cluster in clusters {
        debug!(target: TARGET_PIPELINE, "Filtering {} ({} members)", cluster.id, cluster.len());

        // Representative checks below need two members regardless of
        // the configured floor.
        let required = config.min_members.max(2);
        if cluster.len() < required {
            outcome.excluded.insert(
                cluster.id.clone(),
                Exclusion {
                    reason: format!("Fewer than {} articles in the narrative.", required),
                    common_tokens: None,
                },
            );
            continue;
        }

        // Representative members: the first two, in ingestion order.
        let a = cluster.members[0];
        let b = cluster.members[1];
        let common = common_tokens(
            &extraction.keywords[a],
            &extraction.keywords[b],
            config.evidence_tokens,
        );

        let similarity =
            cosine_similarity_or_zero(&extraction.vectors[a], &extraction.vectors[b]);
        debug!(target: TARGET_PIPELINE, "{} similarity {:.2}", cluster.id, similarity);
        if similarity < config.subject_similarity_threshold {
            outcome.excluded.insert(
                cluster.id.clone(),
                Exclusion {
                    reason: format!(
                        "Articles do not share the same general subject (Similarity: {:.2}).",
                        similarity
                    ),
                    common_tokens: Some(common),
                },
            );
            continue;
        }

        let overlap = keyword_overlap(&extraction.keywords[a], &extraction.keywords[b]);
        debug!(target: TARGET_PIPELINE, "{} keyword overlap {:.2}", cluster.id, overlap);
        if overlap < config.keyword_overlap_threshold {
            outcome.excluded.insert(
                cluster.id.clone(),
                Exclusion {
                    reason: format!("Insufficient keyword overlap (Overlap: {:.2}).", overlap),
                    common_tokens: Some(common),
                },
            );
            continue;
        }

        if let Some(topic_model) = topic_model {
            let texts = [
                extraction.articles[a].content.clone(),
                extraction.articles[b].content.clone(),
            ];
            // A broken topic collaborator costs this cluster, not the run.
            let distributions = match topic_model.topic_distributions(&texts) {
                Ok(distributions) => distributions,
                Err(e) => {
                    warn!(
                        target: TARGET_PIPELINE,
                        "Topic model failed for {}: {}", cluster.id, e
                    );
                    outcome.excluded.insert(
                        cluster.id.clone(),
                        Exclusion {
                            reason: format!("Topic distributions unavailable: {}.", e),
                            common_tokens: Some(common),
                        },
                    );
                    continue;
                }
            };
            let topic_similarity =
                cosine_similarity_or_zero(&distributions[0], &distributions[1]);
            if topic_similarity < config.topic_similarity_threshold {
                outcome.excluded.insert(
                    cluster.id.clone(),
                    Exclusion {
                        reason: format!(
                            "Articles do not share a similar dominant topic (Topic similarity: {:.2}).",
                            topic_similarity
                        ),
                        common_tokens: Some(common),
                    },
                );
                continue;
            }
        }

        outcome
            .valid
            .insert(cluster.id.clone(), build_narrative(cluster, extraction, config));
    }

    info!(
        target: TARGET_PIPELINE,
        "Filter kept {} narratives, excluded {}",
        outcome.valid.len(),
        outcome.excluded.len()
    );
    Ok(outcome)
}

/// Keyword overlap normalized by the smaller set. Empty keyword sets
/// overlap by definition 0.
pub fn keyword_overlap(left: &[String], right: &[String]) -> f64 {
    let left_set: HashSet<&str> = left.iter().map(String::as_str).collect();
    let right_set: HashSet<&str> = right.iter().map(String::as_str).collect();
    let smaller = left_set.len().min(right_set.len());
    if smaller == 0 {
        return 0.0;
    }
    let common = left_set.intersection(&right_set).count();
    common as f64 / smaller as f64
}

/// Shared tokens in the first member's keyword order, bounded to the
/// evidence preview count. Deterministic for a fixed keyword order.
fn common_tokens(left: &[String], right: &[String], bound: usize) -> Vec<String> {
    let right_set: HashSet<&str> = right.iter().map(String::as_str).collect();
    left.iter()
        .filter(|token| right_set.contains(token.as_str()))
        .take(bound)
        .cloned()
        .collect()
}

/// Mean-TF-IDF term ranking over one cluster's full text. The fit is
/// scoped to this cluster alone; score ties fall back to vocabulary
/// insertion order.
fn ranked_cluster_terms(cluster: &Cluster, extraction: &Extraction) -> Vec<(String, f64)> {
    let member_tokens: Vec<Vec<String>> = cluster
        .members
        .iter()
        .map(|&i| extraction.tokens[i].clone())
        .collect();
    let (fit, member_vectors) = TfidfFit::fit_transform(&member_tokens);
    fit.ranked_terms(&member_vectors)
}

/// Title generation is an interface concern kept apart from membership
/// decisions: changing it can never alter grouping.
pub fn generate_title(cluster: &Cluster, extraction: &Extraction, config: &PipelineConfig) -> String {
    ranked_cluster_terms(cluster, extraction)
        .iter()
        .take(config.title_terms)
        .map(|(term, _)| term.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_narrative(cluster: &Cluster, extraction: &Extraction, config: &PipelineConfig) -> Narrative {
    let ranked = ranked_cluster_terms(cluster, extraction);

    let generated_title = ranked
        .iter()
        .take(config.title_terms)
        .map(|(term, _)| term.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let topic_keywords: Vec<String> = ranked
        .iter()
        .skip(config.title_terms)
        .take(5)
        .map(|(term, _)| term.clone())
        .collect();

    Narrative {
        articles: cluster
            .members
            .iter()
            .map(|&i| extraction.articles[i].clone())
            .collect(),
        generated_title,
        topic_keywords: if topic_keywords.is_empty() {
            None
        } else {
            Some(topic_keywords)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Article;
    use crate::config::FeatureStrategy;
    use crate::features::extract;

    fn article(title: &str, content: &str) -> Article {
        Article {
            title: title.to_string(),
            url: format!("http://example.com/{}", title),
            source: "cnn".to_string(),
            content: content.to_string(),
        }
    }

    fn lexical_extraction(articles: Vec<Article>) -> Extraction {
        let mut config = PipelineConfig::default();
        config.feature_strategy = FeatureStrategy::Lexical;
        extract(articles, &config, None).unwrap()
    }

    fn relaxed_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.feature_strategy = FeatureStrategy::Lexical;
        config.subject_similarity_threshold = 0.1;
        config.keyword_overlap_threshold = 0.05;
        config
    }

    #[test]
    fn test_single_member_cluster_is_excluded() {
        let extraction = lexical_extraction(vec![article("a", "senate votes on the budget")]);
        let clusters = vec![Cluster::new("cluster_0".to_string(), vec![0])];
        let outcome =
            filter_clusters(&clusters, &extraction, &relaxed_config(), None).unwrap();
        assert!(outcome.valid.is_empty());
        assert!(outcome.excluded["cluster_0"]
            .reason
            .contains("Fewer than 2 articles"));
    }

    #[test]
    fn test_coherent_pair_becomes_a_narrative() {
        let extraction = lexical_extraction(vec![
            article("a", "senate passes budget resolution after tariff debate"),
            article("b", "budget resolution passes senate amid tariff fight"),
        ]);
        let clusters = vec![Cluster::new("cluster_0".to_string(), vec![0, 1])];
        let outcome =
            filter_clusters(&clusters, &extraction, &relaxed_config(), None).unwrap();
        assert_eq!(outcome.valid.len(), 1);
        let narrative = &outcome.valid["cluster_0"];
        assert_eq!(narrative.articles.len(), 2);
        assert!(!narrative.generated_title.is_empty());
    }

    #[test]
    fn test_dissimilar_pair_is_excluded_with_similarity_evidence() {
        let extraction = lexical_extraction(vec![
            article("a", "senate passes budget resolution"),
            article("b", "midfielder scores winning goal in derby"),
        ]);
        let clusters = vec![Cluster::new("cluster_0".to_string(), vec![0, 1])];
        let mut config = relaxed_config();
        config.subject_similarity_threshold = 0.4;
        let outcome = filter_clusters(&clusters, &extraction, &config, None).unwrap();
        let exclusion = &outcome.excluded["cluster_0"];
        assert!(exclusion.reason.contains("general subject"));
        assert!(exclusion.reason.contains("Similarity:"));
    }

    #[test]
    fn test_zero_shared_keywords_always_rejects() {
        // Similarity gate is disabled outright; the overlap gate must
        // reject on its own.
        let extraction = lexical_extraction(vec![
            article("a", "senate passes budget resolution"),
            article("b", "midfielder scores winning goal"),
        ]);
        let clusters = vec![Cluster::new("cluster_0".to_string(), vec![0, 1])];
        let mut config = relaxed_config();
        config.subject_similarity_threshold = -1.0;
        let outcome = filter_clusters(&clusters, &extraction, &config, None).unwrap();
        let exclusion = &outcome.excluded["cluster_0"];
        assert!(exclusion.reason.contains("keyword overlap"));
        assert_eq!(exclusion.common_tokens.as_ref().map(Vec::len), Some(0));
    }

    #[test]
    fn test_filter_is_deterministic() {
        let extraction = lexical_extraction(vec![
            article("a", "senate passes budget resolution after tariff debate"),
            article("b", "budget resolution passes senate amid tariff fight"),
            article("c", "midfielder scores winning goal in derby"),
        ]);
        let clusters = vec![
            Cluster::new("cluster_0".to_string(), vec![0, 1]),
            Cluster::new("cluster_1".to_string(), vec![2]),
        ];
        let config = relaxed_config();
        let first = filter_clusters(&clusters, &extraction, &config, None).unwrap();
        let second = filter_clusters(&clusters, &extraction, &config, None).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_topic_gate_rejects_divergent_distributions() {
        struct DivergentTopics;
        impl TopicModel for DivergentTopics {
            fn topic_distributions(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(texts
                    .iter()
                    .enumerate()
                    .map(|(i, _)| {
                        let mut v = vec![0.0f32; 4];
                        v[i % 4] = 1.0;
                        v
                    })
                    .collect())
            }
        }

        let extraction = lexical_extraction(vec![
            article("a", "senate passes budget resolution after tariff debate"),
            article("b", "budget resolution passes senate amid tariff fight"),
        ]);
        let clusters = vec![Cluster::new("cluster_0".to_string(), vec![0, 1])];
        let outcome =
            filter_clusters(&clusters, &extraction, &relaxed_config(), Some(&DivergentTopics))
                .unwrap();
        assert!(outcome.excluded["cluster_0"].reason.contains("dominant topic"));
    }

    #[test]
    fn test_topic_model_failure_excludes_cluster_without_aborting() {
        struct BrokenTopics;
        impl TopicModel for BrokenTopics {
            fn topic_distributions(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Err(anyhow::anyhow!("service unavailable"))
            }
        }

        let extraction = lexical_extraction(vec![
            article("a", "senate passes budget resolution after tariff debate"),
            article("b", "budget resolution passes senate amid tariff fight"),
        ]);
        let clusters = vec![Cluster::new("cluster_0".to_string(), vec![0, 1])];
        let outcome =
            filter_clusters(&clusters, &extraction, &relaxed_config(), Some(&BrokenTopics))
                .unwrap();
        assert!(outcome.valid.is_empty());
        assert!(outcome.excluded["cluster_0"].reason.contains("unavailable"));
    }

    #[test]
    fn test_no_narrative_under_two_members() {
        let extraction = lexical_extraction(vec![
            article("a", "senate passes budget resolution after tariff debate"),
            article("b", "budget resolution passes senate amid tariff fight"),
        ]);
        let clusters = vec![
            Cluster::new("cluster_0".to_string(), vec![0, 1]),
            Cluster::new("cluster_1".to_string(), vec![0]),
            Cluster::new("cluster_2".to_string(), vec![]),
        ];
        let outcome =
            filter_clusters(&clusters, &extraction, &relaxed_config(), None).unwrap();
        for narrative in outcome.valid.values() {
            assert!(narrative.articles.len() >= 2);
        }
    }
}
