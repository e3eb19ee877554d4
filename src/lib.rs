pub mod article;
pub mod clustering;
pub mod config;
pub mod evaluation;
pub mod features;
pub mod filter;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod similarity;
pub mod text;

pub const TARGET_PIPELINE: &str = "pipeline";
pub const TARGET_VECTOR: &str = "vector";
pub const TARGET_EVAL: &str = "evaluation";
pub const TARGET_WEB_REQUEST: &str = "web_request";

/// Predicted label assigned to articles that never made it into a valid
/// narrative. Counts as its own label group for ARI/NMI.
pub const UNCLUSTERED_LABEL: &str = "Unclustered";
