use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Term-to-column mapping for one TF-IDF fit. Insertion order is part
/// of the contract: title generation breaks score ties by it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn term(&self, column: usize) -> Option<&str> {
        self.terms.get(column).map(String::as_str)
    }

    pub fn column(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    fn intern(&mut self, term: &str) -> usize {
        if let Some(&column) = self.index.get(term) {
            return column;
        }
        let column = self.terms.len();
        self.terms.push(term.to_string());
        self.index.insert(term.to_string(), column);
        column
    }
}

/// A TF-IDF vectorizer fit over exactly one corpus.
///
/// The fit is an explicit, owned value: similarities between its
/// output vectors are only meaningful against other vectors from the
/// same fit, so every comparison scope constructs its own instance
/// rather than sharing a mutable one.
#[derive(Debug, Clone)]
pub struct TfidfFit {
    vocabulary: Vocabulary,
    idf: Vec<f64>,
    documents: usize,
}

impl TfidfFit {
    /// Fits over pre-tokenized documents and returns the fit together
    /// with one L2-normalized row vector per document.
    pub fn fit_transform(documents: &[Vec<String>]) -> (Self, Vec<Vec<f32>>) {
        let mut vocabulary = Vocabulary::default();
        let mut document_frequency: Vec<usize> = Vec::new();

        let mut counts: Vec<HashMap<usize, usize>> = Vec::with_capacity(documents.len());
        for tokens in documents {
            let mut row: HashMap<usize, usize> = HashMap::new();
            for token in tokens {
                let column = vocabulary.intern(token);
                if column == document_frequency.len() {
                    document_frequency.push(0);
                }
                *row.entry(column).or_insert(0) += 1;
            }
            for &column in row.keys() {
                document_frequency[column] += 1;
            }
            counts.push(row);
        }

        let n = documents.len();
        // Smoothed idf, so unseen and ubiquitous terms stay finite
        let idf: Vec<f64> = document_frequency
            .iter()
            .map(|&df| (((1 + n) as f64) / ((1 + df) as f64)).ln() + 1.0)
            .collect();

        let fit = Self {
            vocabulary,
            idf,
            documents: n,
        };
        let vectors = counts.iter().map(|row| fit.weigh(row)).collect();
        (fit, vectors)
    }

    fn weigh(&self, row: &HashMap<usize, usize>) -> Vec<f32> {
        let mut vector = vec![0.0f64; self.vocabulary.len()];
        for (&column, &count) in row {
            vector[column] = count as f64 * self.idf[column];
        }
        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector.into_iter().map(|v| v as f32).collect()
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    /// Mean TF-IDF weight per term across the fitted corpus rows,
    /// highest first; ties broken by vocabulary insertion order.
    pub fn ranked_terms(&self, vectors: &[Vec<f32>]) -> Vec<(String, f64)> {
        if vectors.is_empty() || self.vocabulary.is_empty() {
            return Vec::new();
        }
        let mut means = vec![0.0f64; self.vocabulary.len()];
        for vector in vectors {
            for (column, &weight) in vector.iter().enumerate() {
                means[column] += weight as f64;
            }
        }
        for mean in &mut means {
            *mean /= vectors.len() as f64;
        }
        let mut ranked: Vec<(usize, f64)> = means.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .filter_map(|(column, mean)| {
                self.vocabulary.term(column).map(|t| (t.to_string(), mean))
            })
            .collect()
    }
}
