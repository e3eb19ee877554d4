use anyhow::{anyhow, Result};
use linfa::dataset::AsTargets;
use linfa::traits::{Fit, Predict, Transformer};
use linfa::DatasetBase;
use linfa_clustering::{Dbscan, KMeans};
use ndarray::Array2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::{debug, info};

use crate::clustering::types::Cluster;
use crate::evaluation::intrinsic::silhouette_from_distances;
use crate::similarity::{cosine_distance_matrix, mean_pairwise_similarity};
use crate::TARGET_PIPELINE;

/// An initial partition: one slot per article, `None` meaning the point
/// landed in no cluster (density noise). Unassigned points never reach
/// narrative formation.
pub type Assignment = Vec<Option<usize>>;

/// A flat clustering strategy over one corpus of feature vectors.
pub trait ClusterBuilder {
    fn build(&self, vectors: &[Vec<f32>]) -> Result<Assignment>;
    fn name(&self) -> &'static str;
}

/// Rows unit-normalized into an ndarray matrix, so euclidean KMeans
/// and DBSCAN distances are monotone in cosine distance.
fn to_unit_matrix(vectors: &[Vec<f32>]) -> Result<Array2<f64>> {
    if vectors.is_empty() {
        return Err(anyhow!("No vectors to cluster"));
    }
    let dimensions = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimensions) {
        return Err(anyhow!("Inconsistent vector dimensions in corpus"));
    }
    let mut data = Array2::zeros((vectors.len(), dimensions));
    for (i, vector) in vectors.iter().enumerate() {
        let norm = vector.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
        let norm = if norm > 0.0 { norm } else { 1.0 };
        for (j, &value) in vector.iter().enumerate() {
            data[[i, j]] = value as f64 / norm;
        }
    }
    Ok(data)
}

/// Hard partition with a fixed cluster count, or a data-driven search
/// when no count is supplied.
pub struct KMeansBuilder {
    pub cluster_count: Option<usize>,
    pub k_search_min: usize,
    pub k_search_max: usize,
    pub rng_seed: u64,
}

impl KMeansBuilder {
    fn fit_once(&self, data: &Array2<f64>, k: usize) -> Result<Vec<usize>> {
        let dataset = DatasetBase::from(data.clone());
        let rng = Xoshiro256Plus::seed_from_u64(self.rng_seed);
        let model = KMeans::params_with_rng(k, rng)
            .max_n_iterations(100)
            .tolerance(1e-4)
            .fit(&dataset)
            .map_err(|e| anyhow!("K-means fit failed: {:?}", e))?;
        let predictions = model.predict(&dataset);
        Ok(predictions.as_targets().iter().copied().collect())
    }

    /// Scans candidate counts ascending, scoring each realized partition
    /// with mean silhouette over cosine distances. Candidates realizing
    /// fewer than 2 clusters have no defined score and are skipped; the
    /// first candidate achieving the maximum wins. `k == n` is a legal
    /// candidate (all singletons score the 0.0 sentinel), and a corpus
    /// where no candidate realizes 2 or more clusters stays in one
    /// cluster rather than failing the run.
    fn search(&self, data: &Array2<f64>, vectors: &[Vec<f32>]) -> Result<Vec<usize>> {
        let n = vectors.len();
        let distances = cosine_distance_matrix(vectors);
        let mut best: Option<(f64, Vec<usize>, usize)> = None;

        let upper = self.k_search_max.min(n);
        for k in self.k_search_min..=upper {
            let labels = self.fit_once(data, k)?;
            let realized = realized_count(&labels);
            if realized < 2 {
                debug!(target: TARGET_PIPELINE, "k={} realized {} clusters, skipping", k, realized);
                continue;
            }
            let score = silhouette_from_distances(&distances, &labels);
            debug!(target: TARGET_PIPELINE, "k={} silhouette {:.4}", k, score);
            let improves = match &best {
                Some((best_score, _, _)) => score > *best_score,
                None => true,
            };
            if improves {
                best = Some((score, labels, k));
            }
        }

        match best {
            Some((score, labels, k)) => {
                info!(
                    target: TARGET_PIPELINE,
                    "Cluster-count search selected k={} (silhouette {:.4})", k, score
                );
                Ok(labels)
            }
            None => {
                info!(
                    target: TARGET_PIPELINE,
                    "Cluster-count search found no multi-cluster candidate; keeping one cluster"
                );
                Ok(vec![0; n])
            }
        }
    }
}

impl ClusterBuilder for KMeansBuilder {
    fn build(&self, vectors: &[Vec<f32>]) -> Result<Assignment> {
        let data = to_unit_matrix(vectors)?;
        let labels = match self.cluster_count {
            Some(k) => {
                let k = k.min(vectors.len()).max(1);
                self.fit_once(&data, k)?
            }
            None => self.search(&data, vectors)?,
        };
        Ok(labels.into_iter().map(Some).collect())
    }

    fn name(&self) -> &'static str {
        "kmeans"
    }
}

/// Density-based partition; points with too few neighbors within the
/// tolerance radius stay unassigned.
pub struct DbscanBuilder {
    pub tolerance: f64,
    pub min_points: usize,
}

impl ClusterBuilder for DbscanBuilder {
    fn build(&self, vectors: &[Vec<f32>]) -> Result<Assignment> {
        let data = to_unit_matrix(vectors)?;
        let dataset = DatasetBase::from(data);
        let result = Dbscan::params(self.min_points)
            .tolerance(self.tolerance)
            .transform(dataset)
            .map_err(|e| anyhow!("DBSCAN failed: {:?}", e))?;
        let assignment: Assignment = result.targets().iter().copied().collect();
        let noise = assignment.iter().filter(|a| a.is_none()).count();
        info!(
            target: TARGET_PIPELINE,
            "DBSCAN assigned {} articles, {} noise points",
            assignment.len() - noise,
            noise
        );
        Ok(assignment)
    }

    fn name(&self) -> &'static str {
        "dbscan"
    }
}

fn realized_count(labels: &[usize]) -> usize {
    let mut seen = std::collections::HashSet::new();
    for &label in labels {
        seen.insert(label);
    }
    seen.len()
}

/// Groups an assignment into clusters, ordered by each cluster's first
/// member so ids are stable for a fixed input order. Noise points are
/// excluded entirely. Each cluster's cohesion is computed up front.
pub fn clusters_from_assignment(assignment: &[Option<usize>], vectors: &[Vec<f32>]) -> Vec<Cluster> {
    let mut order: Vec<usize> = Vec::new();
    let mut members_by_label: std::collections::HashMap<usize, Vec<usize>> =
        std::collections::HashMap::new();
    for (index, label) in assignment.iter().enumerate() {
        if let Some(label) = label {
            let entry = members_by_label.entry(*label).or_default();
            if entry.is_empty() {
                order.push(*label);
            }
            entry.push(index);
        }
    }

    order
        .into_iter()
        .enumerate()
        .map(|(position, label)| {
            let members = members_by_label.remove(&label).unwrap_or_default();
            let member_vectors: Vec<&[f32]> =
                members.iter().map(|&i| vectors[i].as_slice()).collect();
            let mut cluster = Cluster::new(format!("cluster_{}", position), members);
            cluster.cohesion = Some(mean_pairwise_similarity(&member_vectors));
            cluster
        })
        .collect()
}
