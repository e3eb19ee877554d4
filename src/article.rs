use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::TARGET_PIPELINE;

/// One scraped news article. Immutable after ingestion; `content` is
/// rewritten exactly once, by the boilerplate normalizer, and never
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub source: String,
    pub content: String,
}

impl Article {
    /// Identity key used for duplicate collapse.
    pub fn key(&self) -> (&str, &str) {
        (self.title.as_str(), self.url.as_str())
    }

    /// Returns an error naming the first missing required field.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(anyhow!("Article with url '{}' has an empty title", self.url));
        }
        if self.url.trim().is_empty() {
            return Err(anyhow!("Article '{}' has an empty url", self.title));
        }
        if self.content.trim().is_empty() {
            return Err(anyhow!("Article '{}' has empty content", self.title));
        }
        Ok(())
    }
}

/// Flattens a category -> articles mapping into a deduplicated corpus,
/// preserving first-seen order. Duplicates share the (title, url) key.
///
/// An empty corpus is an input-malformation error: the run aborts
/// before any stage produces partial output.
pub fn ingest(raw: HashMap<String, Vec<Article>>) -> Result<Vec<Article>> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut articles = Vec::new();

    let mut categories: Vec<(String, Vec<Article>)> = raw.into_iter().collect();
    categories.sort_by(|a, b| a.0.cmp(&b.0));

    for (category, members) in categories {
        for article in members {
            article
                .validate()
                .with_context(|| format!("Malformed article in category '{}'", category))?;
            let key = (article.title.clone(), article.url.clone());
            if seen.insert(key) {
                articles.push(article);
            }
        }
    }

    if articles.is_empty() {
        return Err(anyhow!("Empty corpus: no articles to cluster"));
    }

    info!(target: TARGET_PIPELINE, "Ingested {} unique articles", articles.len());
    Ok(articles)
}

/// Loads the raw category -> articles mapping. An empty or unparseable
/// file yields an empty map; the hard empty-corpus failure is left to
/// `ingest`, which sees the whole picture.
pub fn load_raw_narratives(path: &Path) -> Result<HashMap<String, Vec<Article>>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(target: TARGET_PIPELINE, "Could not read {}: {}", path.display(), e);
            return Ok(HashMap::new());
        }
    };
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    match serde_json::from_str(&raw) {
        Ok(map) => Ok(map),
        Err(e) => {
            warn!(target: TARGET_PIPELINE, "Could not parse {}: {}", path.display(), e);
            Ok(HashMap::new())
        }
    }
}

/// Loads the ground-truth mapping from article title to narrative label.
/// Rejects labels colliding with the reserved unclustered sentinel.
pub fn load_ground_truth(path: &Path) -> Result<HashMap<String, String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ground truth file {}", path.display()))?;
    let labels: HashMap<String, String> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse ground truth file {}", path.display()))?;
    if labels.values().any(|l| l == crate::UNCLUSTERED_LABEL) {
        return Err(anyhow!(
            "Ground truth uses the reserved label '{}'",
            crate::UNCLUSTERED_LABEL
        ));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, url: &str) -> Article {
        Article {
            title: title.to_string(),
            url: url.to_string(),
            source: "cnn".to_string(),
            content: "Some article body text.".to_string(),
        }
    }

    #[test]
    fn test_ingest_collapses_duplicates() {
        let mut raw = HashMap::new();
        raw.insert(
            "politics".to_string(),
            vec![article("A", "http://a"), article("B", "http://b")],
        );
        raw.insert("economy".to_string(), vec![article("A", "http://a")]);

        let corpus = ingest(raw).unwrap();
        assert_eq!(corpus.len(), 2);
    }

    #[test]
    fn test_ingest_rejects_empty_corpus() {
        let result = ingest(HashMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_ingest_rejects_missing_fields() {
        let mut raw = HashMap::new();
        let mut bad = article("", "http://a");
        bad.title = String::new();
        raw.insert("politics".to_string(), vec![bad]);
        assert!(ingest(raw).is_err());
    }

    #[test]
    fn test_same_title_different_url_is_not_a_duplicate() {
        let mut raw = HashMap::new();
        raw.insert(
            "politics".to_string(),
            vec![article("A", "http://a1"), article("A", "http://a2")],
        );
        assert_eq!(ingest(raw).unwrap().len(), 2);
    }
}
