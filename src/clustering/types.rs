use serde::{Deserialize, Serialize};

use crate::article::Article;

/// A working group of articles. Members index into the run's article
/// slice; membership only changes inside the builder and refiner.
/// Cluster ids are opaque tokens scoped to one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub members: Vec<usize>,
    pub cohesion: Option<f64>,
}

impl Cluster {
    pub fn new(id: String, members: Vec<usize>) -> Self {
        Self {
            id,
            members,
            cohesion: None,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A cluster that survived every cohesion gate, in its externally
/// visible form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    pub articles: Vec<Article>,
    pub generated_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_keywords: Option<Vec<String>>,
}
