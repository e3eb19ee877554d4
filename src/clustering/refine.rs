use anyhow::Result;
use tracing::{debug, info};

use crate::clustering::builder::{ClusterBuilder, KMeansBuilder};
use crate::clustering::types::Cluster;
use crate::similarity::{mean_cross_similarity, mean_pairwise_similarity};
use crate::TARGET_PIPELINE;

/// A cluster-set rewrite applied between initial building and the
/// cohesion filter. Policies are swappable and composable.
pub trait RefinePolicy {
    fn refine(&self, clusters: Vec<Cluster>, vectors: &[Vec<f32>]) -> Result<Vec<Cluster>>;
    fn name(&self) -> &'static str;
}

fn member_vectors<'a>(cluster: &Cluster, vectors: &'a [Vec<f32>]) -> Vec<&'a [f32]> {
    cluster.members.iter().map(|&i| vectors[i].as_slice()).collect()
}

fn recompute_cohesion(cluster: &mut Cluster, vectors: &[Vec<f32>]) {
    let members = member_vectors(cluster, vectors);
    cluster.cohesion = Some(mean_pairwise_similarity(&members));
}

/// Unions cluster pairs whose mean cross-pair cosine similarity meets
/// the threshold. One greedy left-to-right sweep: each cluster is
/// compared against the clusters already kept, in order, and absorbed
/// into the first one that qualifies. An absorbed cluster is never
/// reconsidered as a merge source, so a fixed input order gives a
/// fixed output.
pub struct MergePolicy {
    pub threshold: f64,
}

impl RefinePolicy for MergePolicy {
    fn refine(&self, clusters: Vec<Cluster>, vectors: &[Vec<f32>]) -> Result<Vec<Cluster>> {
        let before = clusters.len();
        let mut kept: Vec<Cluster> = Vec::new();

        for cluster in clusters {
            let incoming = member_vectors(&cluster, vectors);
            let mut absorbed = false;
            for earlier in kept.iter_mut() {
                let existing = member_vectors(earlier, vectors);
                let similarity = mean_cross_similarity(&existing, &incoming);
                if similarity >= self.threshold {
                    debug!(
                        target: TARGET_PIPELINE,
                        "Merging {} into {} (similarity {:.4})", cluster.id, earlier.id, similarity
                    );
                    earlier.members.extend(cluster.members.iter().copied());
                    absorbed = true;
                    break;
                }
            }
            if !absorbed {
                kept.push(cluster);
            }
        }

        for cluster in kept.iter_mut() {
            recompute_cohesion(cluster, vectors);
        }
        info!(
            target: TARGET_PIPELINE,
            "Merge refinement: {} clusters -> {}", before, kept.len()
        );
        Ok(kept)
    }

    fn name(&self) -> &'static str {
        "merge"
    }
}

/// Re-partitions clusters whose intra-cluster cohesion falls below a
/// threshold. Sub-clusters keep their articles only when they hold a
/// floor cohesion and at least 2 members; the rest are discarded and
/// their articles do not advance.
///
/// Clusters below the similarity-computation minimum (2 members) have
/// cohesion defined as maximal and pass through unchanged.
pub struct SplitPolicy {
    pub threshold: f64,
    pub floor: f64,
    pub rng_seed: u64,
}

impl SplitPolicy {
    fn sub_cluster_count(member_count: usize) -> usize {
        (member_count / 3).max(1)
    }
}

impl RefinePolicy for SplitPolicy {
    fn refine(&self, clusters: Vec<Cluster>, vectors: &[Vec<f32>]) -> Result<Vec<Cluster>> {
        let mut kept: Vec<Cluster> = Vec::new();

        for mut cluster in clusters {
            let members = member_vectors(&cluster, vectors);
            let cohesion = mean_pairwise_similarity(&members);
            if cohesion >= self.threshold {
                cluster.cohesion = Some(cohesion);
                kept.push(cluster);
                continue;
            }

            let k = Self::sub_cluster_count(cluster.len()).min(cluster.len());
            debug!(
                target: TARGET_PIPELINE,
                "Splitting {} (cohesion {:.4}) into {} sub-clusters", cluster.id, cohesion, k
            );
            let sub_vectors: Vec<Vec<f32>> = members.iter().map(|m| m.to_vec()).collect();
            let builder = KMeansBuilder {
                cluster_count: Some(k),
                k_search_min: 2,
                k_search_max: 2,
                rng_seed: self.rng_seed,
            };
            let assignment = builder.build(&sub_vectors)?;

            let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
            for (position, label) in assignment.iter().enumerate() {
                if let Some(label) = label {
                    groups[*label % k].push(cluster.members[position]);
                }
            }

            let mut part = 0;
            for group in groups {
                if group.len() < 2 {
                    continue;
                }
                let group_vectors: Vec<&[f32]> =
                    group.iter().map(|&i| vectors[i].as_slice()).collect();
                let group_cohesion = mean_pairwise_similarity(&group_vectors);
                if group_cohesion < self.floor {
                    debug!(
                        target: TARGET_PIPELINE,
                        "Discarding sub-cluster of {} (cohesion {:.4})", cluster.id, group_cohesion
                    );
                    continue;
                }
                let mut sub = Cluster::new(format!("{}_s{}", cluster.id, part), group);
                sub.cohesion = Some(group_cohesion);
                kept.push(sub);
                part += 1;
            }
        }

        Ok(kept)
    }

    fn name(&self) -> &'static str {
        "split"
    }
}
