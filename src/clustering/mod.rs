pub mod builder;
pub mod refine;
pub mod types;

pub use builder::{clusters_from_assignment, ClusterBuilder, DbscanBuilder, KMeansBuilder};
pub use refine::{MergePolicy, RefinePolicy, SplitPolicy};
pub use types::{Cluster, Narrative};
