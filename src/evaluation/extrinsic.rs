use std::collections::HashMap;
use tracing::warn;

use crate::TARGET_EVAL;

/// Pairwise precision, recall, and F1.
///
/// Precision and the true-positive count are computed over all pairs of
/// *clustered* articles only. Recall's denominator is the count of
/// same-label pairs over every ground-truth article, clustered or not,
/// so articles the pipeline dropped deliberately pull recall down.
pub fn pairwise_scores(
    predicted: &HashMap<String, String>,
    ground_truth: &HashMap<String, String>,
) -> (f64, f64, f64) {
    let mut clustered: Vec<&String> = predicted
        .keys()
        .filter(|title| {
            let known = ground_truth.contains_key(*title);
            if !known {
                warn!(
                    target: TARGET_EVAL,
                    "Clustered article '{}' missing from ground truth; ignored", title
                );
            }
            known
        })
        .collect();
    clustered.sort();

    let mut true_positives = 0usize;
    let mut false_positives = 0usize;
    for (i, a) in clustered.iter().enumerate() {
        for b in clustered.iter().skip(i + 1) {
            let ground_same = ground_truth[*a] == ground_truth[*b];
            let predicted_same = predicted[*a] == predicted[*b];
            match (ground_same, predicted_same) {
                (true, true) => true_positives += 1,
                (false, true) => false_positives += 1,
                _ => {}
            }
        }
    }

    let mut label_counts: HashMap<&str, usize> = HashMap::new();
    for label in ground_truth.values() {
        *label_counts.entry(label.as_str()).or_insert(0) += 1;
    }
    let total_positive_pairs: usize = label_counts
        .values()
        .map(|&count| count * count.saturating_sub(1) / 2)
        .sum();

    let co_clustered = true_positives + false_positives;
    let precision = if co_clustered > 0 {
        true_positives as f64 / co_clustered as f64
    } else {
        0.0
    };
    let recall = if total_positive_pairs > 0 {
        true_positives as f64 / total_positive_pairs as f64
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

/// Adjusted Rand Index between two labelings of the same items.
/// Invariant under any bijective relabeling of either side. A
/// degenerate contingency (both partitions trivial) scores 1.0.
pub fn adjusted_rand_index(labels_a: &[usize], labels_b: &[usize]) -> f64 {
    let n = labels_a.len();
    debug_assert_eq!(n, labels_b.len());
    if n < 2 {
        return 1.0;
    }

    let (contingency, row_sums, column_sums) = contingency_table(labels_a, labels_b);

    let choose2 = |x: usize| (x * x.saturating_sub(1) / 2) as f64;
    let index: f64 = contingency.values().map(|&c| choose2(c)).sum();
    let row_index: f64 = row_sums.values().map(|&c| choose2(c)).sum();
    let column_index: f64 = column_sums.values().map(|&c| choose2(c)).sum();
    let expected = row_index * column_index / choose2(n);
    let maximum = (row_index + column_index) / 2.0;

    if (maximum - expected).abs() < f64::EPSILON {
        return 1.0;
    }
    (index - expected) / (maximum - expected)
}

/// Normalized Mutual Information with arithmetic-mean normalization.
/// Zero mutual information (including degenerate single-label inputs)
/// scores 0.0.
pub fn normalized_mutual_information(labels_a: &[usize], labels_b: &[usize]) -> f64 {
    let n = labels_a.len();
    debug_assert_eq!(n, labels_b.len());
    if n == 0 {
        return 0.0;
    }

    let (contingency, row_sums, column_sums) = contingency_table(labels_a, labels_b);
    let n = n as f64;

    let mut mutual_information = 0.0;
    for (&(row, column), &count) in &contingency {
        let joint = count as f64 / n;
        let marginal_product =
            (row_sums[&row] as f64 / n) * (column_sums[&column] as f64 / n);
        if joint > 0.0 && marginal_product > 0.0 {
            mutual_information += joint * (joint / marginal_product).ln();
        }
    }
    if mutual_information <= 0.0 {
        return 0.0;
    }

    let entropy = |sums: &HashMap<usize, usize>| -> f64 {
        sums.values()
            .map(|&count| {
                let p = count as f64 / n;
                -p * p.ln()
            })
            .sum()
    };
    let normalizer = (entropy(&row_sums) + entropy(&column_sums)) / 2.0;
    if normalizer <= 0.0 {
        return 0.0;
    }
    (mutual_information / normalizer).clamp(0.0, 1.0)
}

type Contingency = (
    HashMap<(usize, usize), usize>,
    HashMap<usize, usize>,
    HashMap<usize, usize>,
);

fn contingency_table(labels_a: &[usize], labels_b: &[usize]) -> Contingency {
    let mut contingency: HashMap<(usize, usize), usize> = HashMap::new();
    let mut row_sums: HashMap<usize, usize> = HashMap::new();
    let mut column_sums: HashMap<usize, usize> = HashMap::new();
    for (&a, &b) in labels_a.iter().zip(labels_b) {
        *contingency.entry((a, b)).or_insert(0) += 1;
        *row_sums.entry(a).or_insert(0) += 1;
        *column_sums.entry(b).or_insert(0) += 1;
    }
    (contingency, row_sums, column_sums)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_worked_precision_recall_example() {
        // Ground truth {a:X, b:X, c:Y}; predicted clusters {a,b}; c unclustered.
        let ground = labels(&[("a", "X"), ("b", "X"), ("c", "Y")]);
        let predicted = labels(&[("a", "C1"), ("b", "C1")]);
        let (precision, recall, f1) = pairwise_scores(&predicted, &ground);
        assert_eq!(precision, 1.0);
        assert_eq!(recall, 1.0);
        assert_eq!(f1, 1.0);
    }

    #[test]
    fn test_dropped_articles_penalize_recall() {
        let ground = labels(&[("a", "X"), ("b", "X"), ("c", "X")]);
        let predicted = labels(&[("a", "C1"), ("b", "C1")]);
        let (precision, recall, _) = pairwise_scores(&predicted, &ground);
        assert_eq!(precision, 1.0);
        // 1 captured pair of 3 same-label pairs.
        assert!((recall - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_co_clustering_hits_precision() {
        let ground = labels(&[("a", "X"), ("b", "Y")]);
        let predicted = labels(&[("a", "C1"), ("b", "C1")]);
        let (precision, recall, f1) = pairwise_scores(&predicted, &ground);
        assert_eq!(precision, 0.0);
        assert_eq!(recall, 0.0);
        assert_eq!(f1, 0.0);
    }

    #[test]
    fn test_perfect_agreement_scores_one() {
        let a = vec![0, 0, 1, 1, 2];
        assert!((adjusted_rand_index(&a, &a) - 1.0).abs() < 1e-12);
        assert!((normalized_mutual_information(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_relabeling_invariance() {
        let a = vec![0, 0, 1, 1, 2, 2];
        let relabeled = vec![7, 7, 3, 3, 9, 9];
        let other = vec![0, 1, 1, 0, 2, 2];
        assert!(
            (adjusted_rand_index(&a, &other) - adjusted_rand_index(&relabeled, &other)).abs()
                < 1e-12
        );
        assert!(
            (normalized_mutual_information(&a, &other)
                - normalized_mutual_information(&relabeled, &other))
            .abs()
                < 1e-12
        );
    }

    #[test]
    fn test_independent_labelings_score_near_zero() {
        let a = vec![0, 0, 0, 1, 1, 1];
        let b = vec![0, 1, 0, 1, 0, 1];
        assert!(adjusted_rand_index(&a, &b) < 0.2);
    }

    #[test]
    fn test_single_label_nmi_is_zero() {
        let a = vec![0, 0, 0];
        let b = vec![0, 1, 2];
        assert_eq!(normalized_mutual_information(&a, &b), 0.0);
    }
}
