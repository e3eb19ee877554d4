use anyhow::{anyhow, Result};
use rayon::prelude::*;

/// Calculate cosine similarity directly between two vectors.
///
/// # Arguments
/// * `vec1` - First vector
/// * `vec2` - Second vector
///
/// # Returns
/// * `Result<f64>` - The cosine similarity or an error
pub fn cosine_similarity(vec1: &[f32], vec2: &[f32]) -> Result<f64> {
    if vec1.len() != vec2.len() {
        return Err(anyhow!(
            "Vector dimensions don't match: {} vs {}",
            vec1.len(),
            vec2.len()
        ));
    }

    let mag1: f64 = vec1.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let mag2: f64 = vec2.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();

    if mag1 < 0.001 || mag2 < 0.001 {
        return Err(anyhow!("Zero magnitude vector detected"));
    }

    let dot_product: f64 = vec1
        .iter()
        .zip(vec2.iter())
        .map(|(a, b)| (*a as f64) * (*b as f64))
        .sum();

    Ok(dot_product / (mag1 * mag2))
}

/// Cosine similarity with a defined fallback for degenerate vectors;
/// used where a zero-magnitude vector should score 0 rather than abort.
pub fn cosine_similarity_or_zero(vec1: &[f32], vec2: &[f32]) -> f64 {
    cosine_similarity(vec1, vec2).unwrap_or(0.0)
}

/// Mean pairwise cosine similarity among the given vectors.
///
/// Fewer than 2 vectors is a degenerate computation, defined as 1.0
/// (maximally cohesive) rather than an error.
pub fn mean_pairwise_similarity(vectors: &[&[f32]]) -> f64 {
    if vectors.len() < 2 {
        return 1.0;
    }
    let pairs: Vec<(usize, usize)> = (0..vectors.len())
        .flat_map(|i| ((i + 1)..vectors.len()).map(move |j| (i, j)))
        .collect();
    let total: f64 = pairs
        .par_iter()
        .map(|&(i, j)| cosine_similarity_or_zero(vectors[i], vectors[j]))
        .sum();
    total / pairs.len() as f64
}

/// Mean cosine similarity between every cross pair of the two groups.
/// Either group being empty is degenerate and scores 0.0.
pub fn mean_cross_similarity(left: &[&[f32]], right: &[&[f32]]) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let total: f64 = left
        .par_iter()
        .map(|a| {
            right
                .iter()
                .map(|b| cosine_similarity_or_zero(a, b))
                .sum::<f64>()
        })
        .sum();
    total / (left.len() * right.len()) as f64
}

/// Full symmetric cosine-distance matrix (1 - similarity). The diagonal
/// is forced to exactly 0 and negative distances are clipped to 0 so
/// the result satisfies distance-metric non-negativity.
pub fn cosine_distance_matrix(vectors: &[Vec<f32>]) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let distance = (1.0 - cosine_similarity_or_zero(&vectors[i], &vectors[j])).max(0.0);
            matrix[i][j] = distance;
            matrix[j][i] = distance;
        }
    }
    matrix
}
