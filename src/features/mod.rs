pub mod lexical;
pub mod semantic;

pub use lexical::{TfidfFit, Vocabulary};
pub use semantic::{Embedder, HttpEmbedder};

use anyhow::{anyhow, Result};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::article::Article;
use crate::config::{FeatureStrategy, PipelineConfig};
use crate::text::{preprocess, top_terms};
use crate::{TARGET_PIPELINE, TARGET_VECTOR};

/// A topic-model collaborator: one fixed-size topic-probability vector
/// per input text, one weight per discovered topic.
pub trait TopicModel {
    fn topic_distributions(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// One corpus worth of comparable representations. Rows of `vectors`,
/// `keywords`, and `tokens` align with `articles`; articles dropped
/// during extraction (collaborator failures) are already gone.
pub struct Extraction {
    pub articles: Vec<Article>,
    pub vectors: Vec<Vec<f32>>,
    pub keywords: Vec<Vec<String>>,
    pub tokens: Vec<Vec<String>>,
    /// Present for the lexical strategy only; vectors from one fit are
    /// never compared against vectors from another.
    pub fit: Option<TfidfFit>,
}

/// Converts articles into feature vectors, per-article keyword sets,
/// and (for the lexical strategy) the owning TF-IDF fit.
///
/// The text handed to the embedder is the normalized body with the
/// title appended, which keeps headline terms in play for short wires.
pub fn extract(
    articles: Vec<Article>,
    config: &PipelineConfig,
    embedder: Option<&dyn Embedder>,
) -> Result<Extraction> {
    let texts: Vec<String> = articles
        .iter()
        .map(|a| format!("{} {}", a.content, a.title))
        .collect();

    // Per-article preprocessing is embarrassingly parallel; results are
    // reduced by article index, not completion order.
    let tokens: Vec<Vec<String>> = texts.par_iter().map(|t| preprocess(t)).collect();
    let keywords: Vec<Vec<String>> = tokens
        .par_iter()
        .map(|t| top_terms(t, config.top_keywords))
        .collect();

    match config.feature_strategy {
        FeatureStrategy::Lexical => {
            let (fit, vectors) = TfidfFit::fit_transform(&tokens);
            info!(
                target: TARGET_VECTOR,
                "Fitted TF-IDF over {} articles, vocabulary size {}",
                fit.document_count(),
                fit.vocabulary().len()
            );
            Ok(Extraction {
                articles,
                vectors,
                keywords,
                tokens,
                fit: Some(fit),
            })
        }
        FeatureStrategy::Semantic => {
            let embedder =
                embedder.ok_or_else(|| anyhow!("Semantic strategy requires an embedder"))?;
            let (articles, vectors, keywords, tokens) =
                embed_with_drops(articles, &texts, keywords, tokens, embedder)?;
            Ok(Extraction {
                articles,
                vectors,
                keywords,
                tokens,
                fit: None,
            })
        }
    }
}

/// Embeds the corpus, preferring one batch call. If the batch call
/// fails, falls back to per-article calls so a single bad item (or a
/// single timeout) drops that article instead of aborting the run.
fn embed_with_drops(
    articles: Vec<Article>,
    texts: &[String],
    keywords: Vec<Vec<String>>,
    tokens: Vec<Vec<String>>,
    embedder: &dyn Embedder,
) -> Result<(Vec<Article>, Vec<Vec<f32>>, Vec<Vec<String>>, Vec<Vec<String>>)> {
    let expected = embedder.dimensions();

    let per_article: Vec<Option<Vec<f32>>> = match embedder.embed(texts) {
        Ok(vectors) => vectors.into_iter().map(Some).collect(),
        Err(batch_error) => {
            warn!(
                target: TARGET_VECTOR,
                "Batch embedding failed ({}), retrying per article", batch_error
            );
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| match embedder.embed(std::slice::from_ref(text)) {
                    Ok(mut vectors) if vectors.len() == 1 => Some(vectors.remove(0)),
                    Ok(_) => {
                        warn!(
                            target: TARGET_VECTOR,
                            "Dropping article '{}': malformed embedding response",
                            articles[i].title
                        );
                        None
                    }
                    Err(e) => {
                        warn!(
                            target: TARGET_VECTOR,
                            "Dropping article '{}': embedding failed: {}", articles[i].title, e
                        );
                        None
                    }
                })
                .collect()
        }
    };

    let mut kept_articles = Vec::new();
    let mut kept_vectors = Vec::new();
    let mut kept_keywords = Vec::new();
    let mut kept_tokens = Vec::new();
    for (((article, vector), keyword_set), token_set) in articles
        .into_iter()
        .zip(per_article)
        .zip(keywords)
        .zip(tokens)
    {
        match vector {
            Some(v) if v.len() == expected => {
                kept_articles.push(article);
                kept_vectors.push(v);
                kept_keywords.push(keyword_set);
                kept_tokens.push(token_set);
            }
            Some(v) => {
                warn!(
                    target: TARGET_VECTOR,
                    "Dropping article '{}': embedding dimension {} != {}",
                    article.title,
                    v.len(),
                    expected
                );
            }
            None => {}
        }
    }

    if kept_articles.is_empty() {
        return Err(anyhow!("Embedding collaborator produced no usable vectors"));
    }
    info!(
        target: TARGET_PIPELINE,
        "Embedded {} articles ({} dimensions)",
        kept_articles.len(),
        expected
    );
    Ok((kept_articles, kept_vectors, kept_keywords, kept_tokens))
}
