//! ontoclass CLI: constrained taxonomy classification.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use ontoclass::classify::ClassifyRequest;
use ontoclass::classify::pipeline::{ClassificationPipeline, failed_on_oracle};
use ontoclass::config::ServiceConfig;
use ontoclass::error::{OntoResult, TaxonomyError};
use ontoclass::input::load_json;
use ontoclass::oracle::Oracle;
use ontoclass::oracle::openrouter::OpenRouterOracle;
use ontoclass::oracle::scripted::{Recording, ScriptedOracle};
use ontoclass::propose::ProposeRequest;
use ontoclass::taxonomy::TaxonomySnapshot;
use ontoclass::taxonomy::graph::TaxonomyGraph;

#[derive(Parser)]
#[command(name = "ontoclass", version, about = "Constrained taxonomy classification")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify concepts and an event title from a request JSON file.
    Classify {
        /// Path to a ClassifyRequest JSON file.
        #[arg(long)]
        request: PathBuf,

        /// Replay recorded oracle responses instead of calling the HTTP oracle.
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Propose taxonomy additions for competency questions.
    Propose {
        /// Path to a ProposeRequest JSON file.
        #[arg(long)]
        request: PathBuf,

        /// Replay recorded oracle responses instead of calling the HTTP oracle.
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// List the root classes of a snapshot.
    Roots {
        /// Path to a taxonomy snapshot JSON file.
        #[arg(long)]
        snapshot: PathBuf,

        /// Only roots with this facet (case-insensitive).
        #[arg(long)]
        facet: Option<String>,
    },

    /// List the leaves reachable from a root class.
    Leaves {
        /// Path to a taxonomy snapshot JSON file.
        #[arg(long)]
        snapshot: PathBuf,

        /// Root class id.
        #[arg(long)]
        root: String,
    },
}

fn build_oracle(config: &ServiceConfig, replay: Option<&Path>) -> OntoResult<Arc<dyn Oracle>> {
    match replay {
        Some(path) => {
            let recording = Recording::load(path)?;
            tracing::info!(path = %path.display(), "replaying recorded oracle responses");
            Ok(Arc::new(ScriptedOracle::new(recording)))
        }
        None => Ok(Arc::new(OpenRouterOracle::new(config.oracle.clone())?)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { request, replay } => {
            let request: ClassifyRequest = load_json(&request)?;
            request.validate()?;

            let oracle = build_oracle(&config, replay.as_deref())?;
            let pipeline = ClassificationPipeline::new(config, oracle);
            let response = pipeline.classify(&request).await;
            print_json(&response)?;

            if failed_on_oracle(&response) {
                std::process::exit(2);
            }
        }

        Commands::Propose { request, replay } => {
            let request: ProposeRequest = load_json(&request)?;
            request.validate()?;

            let oracle = build_oracle(&config, replay.as_deref())?;
            let pipeline = ClassificationPipeline::new(config, oracle);
            let response = pipeline.propose(&request).await;
            print_json(&response)?;
        }

        Commands::Roots { snapshot, facet } => {
            let snapshot: TaxonomySnapshot = load_json(&snapshot)?;
            let graph = TaxonomyGraph::new(&snapshot);
            let roots = match facet.as_deref() {
                Some(facet) => graph.roots_with_facet(facet),
                None => graph.roots(),
            };
            if roots.is_empty() && facet.is_none() {
                return Err(TaxonomyError::NoRoots.into());
            }
            let views: Vec<_> = roots.iter().map(|c| c.view()).collect();
            print_json(&views)?;
        }

        Commands::Leaves { snapshot, root } => {
            let snapshot: TaxonomySnapshot = load_json(&snapshot)?;
            let graph = TaxonomyGraph::new(&snapshot);
            graph.require_class(&root)?;
            if graph.has_cycle() {
                tracing::warn!("subclass graph contains a cycle; traversal stops at revisits");
            }
            print_json(&graph.leaves_of(&root))?;
        }
    }

    Ok(())
}
