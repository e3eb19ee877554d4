use std::collections::{HashMap, HashSet};

/// Mean silhouette coefficient over a precomputed distance matrix.
///
/// Fewer than 2 distinct labels leaves the score undefined; the defined
/// sentinel is 0.0. Members of singleton clusters score 0, following
/// the usual convention.
pub fn silhouette_from_distances(distances: &[Vec<f64>], labels: &[usize]) -> f64 {
    let n = labels.len();
    let distinct: HashSet<usize> = labels.iter().copied().collect();
    if n < 2 || distinct.len() < 2 {
        return 0.0;
    }

    let mut cluster_sizes: HashMap<usize, usize> = HashMap::new();
    for &label in labels {
        *cluster_sizes.entry(label).or_insert(0) += 1;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if cluster_sizes[&own] < 2 {
            continue; // contributes exactly 0
        }

        let mut intra_sum = 0.0;
        let mut inter_sums: HashMap<usize, (f64, usize)> = HashMap::new();
        for j in 0..n {
            if i == j {
                continue;
            }
            if labels[j] == own {
                intra_sum += distances[i][j];
            } else {
                let entry = inter_sums.entry(labels[j]).or_insert((0.0, 0));
                entry.0 += distances[i][j];
                entry.1 += 1;
            }
        }

        let a = intra_sum / (cluster_sizes[&own] - 1) as f64;
        let b = inter_sums
            .values()
            .map(|&(sum, count)| sum / count as f64)
            .fold(f64::INFINITY, f64::min);
        let denominator = a.max(b);
        if denominator > 0.0 {
            total += (b - a) / denominator;
        }
    }
    total / n as f64
}

/// Davies-Bouldin index over euclidean distances to cluster centroids.
/// Lower is better. Fewer than 2 realized clusters yields the defined
/// sentinel +infinity.
pub fn davies_bouldin(vectors: &[Vec<f32>], labels: &[usize]) -> f64 {
    let distinct: Vec<usize> = {
        let mut seen = Vec::new();
        for &label in labels {
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
        seen
    };
    if distinct.len() < 2 || vectors.is_empty() {
        return f64::INFINITY;
    }
    let dimensions = vectors[0].len();

    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(distinct.len());
    let mut scatters: Vec<f64> = Vec::with_capacity(distinct.len());
    for &label in &distinct {
        let members: Vec<&Vec<f32>> = labels
            .iter()
            .zip(vectors)
            .filter(|(&l, _)| l == label)
            .map(|(_, v)| v)
            .collect();
        let mut centroid = vec![0.0f64; dimensions];
        for member in &members {
            for (c, &value) in centroid.iter_mut().zip(member.iter()) {
                *c += value as f64;
            }
        }
        for c in &mut centroid {
            *c /= members.len() as f64;
        }
        let scatter = members
            .iter()
            .map(|member| euclidean(member, &centroid))
            .sum::<f64>()
            / members.len() as f64;
        centroids.push(centroid);
        scatters.push(scatter);
    }

    let k = distinct.len();
    let mut total = 0.0;
    for i in 0..k {
        let mut worst: f64 = 0.0;
        for j in 0..k {
            if i == j {
                continue;
            }
            let separation = euclidean_f64(&centroids[i], &centroids[j]);
            if separation > 0.0 {
                worst = worst.max((scatters[i] + scatters[j]) / separation);
            }
        }
        total += worst;
    }
    total / k as f64
}

fn euclidean(a: &[f32], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x as f64 - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn euclidean_f64(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| (x - y).powi(2)).sum::<f64>().sqrt()
}
