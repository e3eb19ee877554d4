pub mod extrinsic;
pub mod intrinsic;

pub use extrinsic::{adjusted_rand_index, normalized_mutual_information, pairwise_scores};
pub use intrinsic::{davies_bouldin, silhouette_from_distances};

use anyhow::Result;
use chrono::{DateTime, Utc};
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::filter::FilterOutcome;
use crate::similarity::cosine_distance_matrix;
use crate::{TARGET_EVAL, UNCLUSTERED_LABEL};

/// One narrative's best ground-truth match: the most frequent label
/// among its members, first-encountered label winning ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeMapping {
    pub cluster_id: String,
    pub generated_title: String,
    pub dominant_label: String,
    pub member_labels: Vec<String>,
}

/// Aggregate quality metrics for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub ari: f64,
    pub nmi: f64,
    pub silhouette: f64,
    /// +infinity when fewer than 2 narrative groups were realized.
    pub davies_bouldin: f64,
    pub narratives_formed: usize,
    pub ground_truth_narratives: usize,
    pub mappings: Vec<NarrativeMapping>,
    pub generated_at: DateTime<Utc>,
}

/// Compares valid narratives against the ground-truth labeling with
/// both extrinsic (label-agreement) and intrinsic (label-free) metric
/// families. `vectors_by_key` supplies the feature vector for each
/// (title, url) identity still known to the run; articles without one
/// are skipped by the intrinsic metrics.
pub fn evaluate(
    outcome: &FilterOutcome,
    ground_truth: &HashMap<String, String>,
    vectors_by_key: &HashMap<(String, String), Vec<f32>>,
) -> Result<EvaluationReport> {
    // Article title -> predicted cluster id, from the valid set only.
    let mut predicted: HashMap<String, String> = HashMap::new();
    for (cluster_id, narrative) in &outcome.valid {
        for article in &narrative.articles {
            predicted.insert(article.title.clone(), cluster_id.clone());
        }
    }

    let (precision, recall, f1) = pairwise_scores(&predicted, ground_truth);

    // ARI/NMI run over every ground-truth article; the unclustered
    // sentinel forms its own label group, distinct from all real labels.
    let mut titles: Vec<&String> = ground_truth.keys().collect();
    titles.sort();
    let mut label_index: HashMap<String, usize> = HashMap::new();
    let mut predicted_index: HashMap<String, usize> = HashMap::new();
    let mut ground_codes = Vec::with_capacity(titles.len());
    let mut predicted_codes = Vec::with_capacity(titles.len());
    for title in &titles {
        ground_codes.push(encode(&ground_truth[*title], &mut label_index));
        let predicted_label = predicted
            .get(*title)
            .map(String::as_str)
            .unwrap_or(UNCLUSTERED_LABEL);
        predicted_codes.push(encode(predicted_label, &mut predicted_index));
    }
    let ari = adjusted_rand_index(&ground_codes, &predicted_codes);
    let nmi = normalized_mutual_information(&ground_codes, &predicted_codes);

    let (silhouette, davies_bouldin_score) = intrinsic_scores(outcome, vectors_by_key);

    let mappings = narrative_mappings(outcome, ground_truth);
    let ground_truth_narratives = {
        let mut labels: Vec<&String> = ground_truth.values().collect();
        labels.sort();
        labels.dedup();
        labels.len()
    };

    info!(
        target: TARGET_EVAL,
        "Evaluation: P {:.4} R {:.4} F1 {:.4} ARI {:.4} NMI {:.4}",
        precision, recall, f1, ari, nmi
    );

    Ok(EvaluationReport {
        precision,
        recall,
        f1,
        ari,
        nmi,
        silhouette,
        davies_bouldin: davies_bouldin_score,
        narratives_formed: outcome.valid.len(),
        ground_truth_narratives,
        mappings,
        generated_at: Utc::now(),
    })
}

/// Intrinsic metrics over the clustered articles only. Fewer than 2
/// realized groups yields the defined sentinels (0.0, +infinity).
fn intrinsic_scores(
    outcome: &FilterOutcome,
    vectors_by_key: &HashMap<(String, String), Vec<f32>>,
) -> (f64, f64) {
    let mut vectors: Vec<Vec<f32>> = Vec::new();
    let mut labels: Vec<usize> = Vec::new();
    for (group, (_, narrative)) in outcome.valid.iter().enumerate() {
        for article in &narrative.articles {
            if let Some(vector) =
                vectors_by_key.get(&(article.title.clone(), article.url.clone()))
            {
                vectors.push(vector.clone());
                labels.push(group);
            }
        }
    }

    let realized: std::collections::HashSet<usize> = labels.iter().copied().collect();
    if realized.len() < 2 {
        return (0.0, f64::INFINITY);
    }
    let distances = cosine_distance_matrix(&vectors);
    (
        silhouette_from_distances(&distances, &labels),
        davies_bouldin(&vectors, &labels),
    )
}

fn encode(label: &str, index: &mut HashMap<String, usize>) -> usize {
    if let Some(&code) = index.get(label) {
        return code;
    }
    let code = index.len();
    index.insert(label.to_string(), code);
    code
}

fn narrative_mappings(
    outcome: &FilterOutcome,
    ground_truth: &HashMap<String, String>,
) -> Vec<NarrativeMapping> {
    outcome
        .valid
        .iter()
        .map(|(cluster_id, narrative)| {
            let member_labels: Vec<String> = narrative
                .articles
                .iter()
                .map(|article| {
                    ground_truth
                        .get(&article.title)
                        .cloned()
                        .unwrap_or_else(|| UNCLUSTERED_LABEL.to_string())
                })
                .collect();
            let dominant_label = dominant(&member_labels);
            NarrativeMapping {
                cluster_id: cluster_id.clone(),
                generated_title: narrative.generated_title.clone(),
                dominant_label,
                member_labels,
            }
        })
        .collect()
}

/// Most frequent label; ties go to the label encountered first.
fn dominant(labels: &[String]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        *counts.entry(label.as_str()).or_insert(0) += 1;
    }
    let mut best_label = "";
    let mut best_count = 0;
    for label in labels {
        let count = counts[label.as_str()];
        if count > best_count {
            best_count = count;
            best_label = label.as_str();
        }
    }
    best_label.to_string()
}

impl EvaluationReport {
    /// Renders the report and the cluster-to-ground-truth mapping as
    /// printable tables.
    pub fn render(&self) -> String {
        let mut metrics = Table::new();
        metrics.add_row(Row::new(vec![Cell::new("Metric"), Cell::new("Value")]));
        metrics.add_row(Row::new(vec![
            Cell::new("Pairwise precision"),
            Cell::new(&format!("{:.4}", self.precision)),
        ]));
        metrics.add_row(Row::new(vec![
            Cell::new("Pairwise recall"),
            Cell::new(&format!("{:.4}", self.recall)),
        ]));
        metrics.add_row(Row::new(vec![
            Cell::new("Pairwise F1"),
            Cell::new(&format!("{:.4}", self.f1)),
        ]));
        metrics.add_row(Row::new(vec![
            Cell::new("ARI (all articles)"),
            Cell::new(&format!("{:.4}", self.ari)),
        ]));
        metrics.add_row(Row::new(vec![
            Cell::new("NMI (all articles)"),
            Cell::new(&format!("{:.4}", self.nmi)),
        ]));
        metrics.add_row(Row::new(vec![
            Cell::new("Silhouette"),
            Cell::new(&format!("{:.4}", self.silhouette)),
        ]));
        metrics.add_row(Row::new(vec![
            Cell::new("Davies-Bouldin"),
            Cell::new(&format!("{:.4}", self.davies_bouldin)),
        ]));
        metrics.add_row(Row::new(vec![
            Cell::new("Narratives formed"),
            Cell::new(&format!(
                "{}/{}",
                self.narratives_formed, self.ground_truth_narratives
            )),
        ]));

        let mut mapping = Table::new();
        mapping.add_row(Row::new(vec![
            Cell::new("Cluster"),
            Cell::new("Generated title"),
            Cell::new("Dominant label"),
            Cell::new("Member labels"),
        ]));
        for entry in &self.mappings {
            mapping.add_row(Row::new(vec![
                Cell::new(&entry.cluster_id),
                Cell::new(&entry.generated_title),
                Cell::new(&entry.dominant_label),
                Cell::new(&entry.member_labels.join(", ")),
            ]));
        }

        format!("{}\nCluster to Ground Truth Mapping:\n{}", metrics, mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Article;
    use crate::clustering::types::Narrative;

    fn article(title: &str) -> Article {
        Article {
            title: title.to_string(),
            url: format!("http://example.com/{}", title),
            source: "cnn".to_string(),
            content: "body".to_string(),
        }
    }

    fn narrative(titles: &[&str]) -> Narrative {
        Narrative {
            articles: titles.iter().map(|t| article(t)).collect(),
            generated_title: format!("{} narrative", titles[0]),
            topic_keywords: None,
        }
    }

    fn truth(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // Keys mirror the article() helper's (title, url) identity.
    fn keyed_vectors(pairs: &[(&str, Vec<f32>)]) -> HashMap<(String, String), Vec<f32>> {
        pairs
            .iter()
            .map(|(title, vector)| {
                (
                    (title.to_string(), format!("http://example.com/{}", title)),
                    vector.clone(),
                )
            })
            .collect()
    }

    #[test]
    fn test_single_narrative_reports_intrinsic_sentinels() {
        let mut outcome = FilterOutcome::default();
        outcome
            .valid
            .insert("cluster_0".to_string(), narrative(&["a", "b"]));
        let ground = truth(&[("a", "X"), ("b", "X")]);
        let vectors = keyed_vectors(&[("a", vec![1.0, 0.0]), ("b", vec![0.99, 0.05])]);

        let report = evaluate(&outcome, &ground, &vectors).unwrap();
        assert_eq!(report.narratives_formed, 1);
        assert_eq!(report.silhouette, 0.0);
        assert!(report.davies_bouldin.is_infinite());
        assert_eq!(report.precision, 1.0);
        assert_eq!(report.recall, 1.0);
    }

    #[test]
    fn test_two_narratives_compute_real_intrinsics() {
        let mut outcome = FilterOutcome::default();
        outcome
            .valid
            .insert("cluster_0".to_string(), narrative(&["a", "b"]));
        outcome
            .valid
            .insert("cluster_1".to_string(), narrative(&["c", "d"]));
        let ground = truth(&[("a", "X"), ("b", "X"), ("c", "Y"), ("d", "Y")]);
        let vectors = keyed_vectors(&[
            ("a", vec![1.0, 0.0]),
            ("b", vec![0.99, 0.05]),
            ("c", vec![0.0, 1.0]),
            ("d", vec![0.03, 0.98]),
        ]);

        let report = evaluate(&outcome, &ground, &vectors).unwrap();
        assert!(report.silhouette > 0.5);
        assert!(report.davies_bouldin.is_finite());
        assert_eq!(report.ari, 1.0);
        assert!((report.nmi - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dominant_label_ties_go_to_first_encountered() {
        let labels: Vec<String> = ["Y", "X", "X", "Y"].iter().map(|s| s.to_string()).collect();
        assert_eq!(dominant(&labels), "Y");
    }

    #[test]
    fn test_unclustered_articles_count_as_their_own_group() {
        let mut outcome = FilterOutcome::default();
        outcome
            .valid
            .insert("cluster_0".to_string(), narrative(&["a", "b"]));
        let ground = truth(&[("a", "X"), ("b", "X"), ("c", "Y"), ("d", "Z")]);
        let report = evaluate(&outcome, &ground, &HashMap::new()).unwrap();
        // c and d share the sentinel group while their true labels differ,
        // so agreement is imperfect.
        assert!(report.ari < 1.0);
    }

    #[test]
    fn test_report_renders_mapping_rows() {
        let mut outcome = FilterOutcome::default();
        outcome
            .valid
            .insert("cluster_0".to_string(), narrative(&["a", "b"]));
        let ground = truth(&[("a", "X"), ("b", "X")]);
        let report = evaluate(&outcome, &ground, &HashMap::new()).unwrap();
        let rendered = report.render();
        assert!(rendered.contains("cluster_0"));
        assert!(rendered.contains("X"));
        assert!(rendered.contains("Narratives formed"));
    }
}
