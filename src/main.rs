use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::info;

use newsloom::article::{load_ground_truth, load_raw_narratives, Article};
use newsloom::config::{FeatureStrategy, PipelineConfig};
use newsloom::evaluation::evaluate;
use newsloom::features::{extract, Embedder, HttpEmbedder};
use newsloom::filter::FilterOutcome;
use newsloom::logging::configure_logging;
use newsloom::pipeline::{
    self, cluster_stage, filter_stored, read_json, stored_clusters, write_json, StoredCluster,
};
use newsloom::TARGET_PIPELINE;

#[derive(Parser)]
#[clap(name = "newsloom", about = "Group news articles into validated narratives")]
struct Cli {
    /// Pipeline configuration file (JSON); defaults apply when omitted
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster raw articles into refined candidate narratives
    Cluster {
        /// Raw category-to-articles JSON mapping
        #[clap(short, long, default_value = "raw_narratives.json")]
        input: PathBuf,

        /// Where to write the clustered narratives
        #[clap(short, long, default_value = "clustered_narratives.json")]
        output: PathBuf,
    },

    /// Re-validate previously clustered narratives through the cohesion gates
    Filter {
        /// Clustered narratives JSON from a `cluster` run
        #[clap(short, long, default_value = "clustered_narratives.json")]
        input: PathBuf,

        /// Where to write valid and excluded narratives
        #[clap(short, long, default_value = "filtered_narratives.json")]
        output: PathBuf,
    },

    /// Score filtered narratives against a ground-truth labeling
    Evaluate {
        /// Filtered narratives JSON from a `filter` run
        #[clap(short, long, default_value = "filtered_narratives.json")]
        input: PathBuf,

        /// Ground-truth article-title-to-label JSON mapping
        #[clap(short, long, default_value = "ground_truth.json")]
        ground_truth: PathBuf,

        /// Optional path for the report as JSON
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the whole pipeline: cluster, filter, and optionally evaluate
    Run {
        /// Raw category-to-articles JSON mapping
        #[clap(short, long, default_value = "raw_narratives.json")]
        input: PathBuf,

        /// Ground-truth labeling; evaluation is skipped when omitted
        #[clap(short, long)]
        ground_truth: Option<PathBuf>,

        /// Where to write valid and excluded narratives
        #[clap(short, long, default_value = "filtered_narratives.json")]
        output: PathBuf,
    },
}

fn build_embedder(config: &PipelineConfig) -> Result<Option<HttpEmbedder>> {
    match config.feature_strategy {
        FeatureStrategy::Semantic => Ok(Some(HttpEmbedder::new(
            &config.embedding_url,
            config.embedding_dimensions,
            config.embedding_timeout_secs,
        )?)),
        FeatureStrategy::Lexical => Ok(None),
    }
}

fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let embedder = build_embedder(&config)?;
    let embedder_ref = embedder.as_ref().map(|e| e as &dyn Embedder);

    match cli.command {
        Commands::Cluster { input, output } => {
            let raw = load_raw_narratives(&input)?;
            let stage = cluster_stage(raw, &config, embedder_ref)?;
            let stored = stored_clusters(&stage.clusters, &stage.extraction, &config);
            write_json(&output, &stored)?;
            info!(
                target: TARGET_PIPELINE,
                "Collected {} candidate narratives",
                stored.len()
            );
        }

        Commands::Filter { input, output } => {
            let stored: BTreeMap<String, StoredCluster> = read_json(&input)?;
            let outcome = filter_stored(stored, &config, embedder_ref, None)?;
            write_json(&output, &outcome)?;
        }

        Commands::Evaluate {
            input,
            ground_truth,
            output,
        } => {
            let outcome: FilterOutcome = read_json(&input)?;
            let ground_truth = load_ground_truth(&ground_truth)?;

            // Intrinsic metrics need feature vectors; re-extract them
            // over exactly the clustered articles.
            let clustered: Vec<Article> = outcome
                .valid
                .values()
                .flat_map(|narrative| narrative.articles.iter().cloned())
                .collect();
            let vectors = if clustered.is_empty() {
                HashMap::new()
            } else {
                let extraction = extract(clustered, &config, embedder_ref)?;
                pipeline::vectors_by_key(&extraction)
            };

            let report = evaluate(&outcome, &ground_truth, &vectors)?;
            println!("{}", report.render());
            if let Some(path) = output {
                write_json(&path, &report)?;
            }
        }

        Commands::Run {
            input,
            ground_truth,
            output,
        } => {
            let raw = load_raw_narratives(&input)?;
            let ground_truth = match ground_truth {
                Some(path) => Some(load_ground_truth(&path)?),
                None => None,
            };
            let run = pipeline::run(raw, ground_truth.as_ref(), &config, embedder_ref, None)?;
            write_json(&output, &run.outcome)?;
            if let Some(report) = run.report {
                println!("{}", report.render());
            }
        }
    }

    Ok(())
}
