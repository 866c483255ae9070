//! Codegraph Bootstrap operator CLI
//!
//! Inspect a dimension catalog and manage the checkpoints of an interrupted run.
//!
//! # Usage
//!
//! ```bash
//! # Show the tier plan of a catalog
//! codegraph-bootstrap plan --catalog dimensions.yaml
//!
//! # List fresh checkpoints under a run root
//! codegraph-bootstrap checkpoints --run-root .codegraph/bootstrap
//!
//! # Drop every checkpoint so the next run starts from scratch
//! codegraph-bootstrap clear --run-root .codegraph/bootstrap
//!
//! # Print the effective scheduler config
//! codegraph-bootstrap config --path bootstrap.yaml
//! ```

use clap::{Parser, Subcommand};
use codegraph_bootstrap::checkpoint::{CheckpointStore, FsCheckpointStore};
use codegraph_bootstrap::config::{BootstrapConfig, DimensionCatalog};
use codegraph_bootstrap::telemetry::init_tracing;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codegraph-bootstrap")]
#[command(about = "Codegraph Bootstrap - tiered knowledge extraction tooling", long_about = None)]
struct Cli {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a dimension catalog and print its execution plan
    Plan {
        /// Catalog YAML path
        #[arg(short, long)]
        catalog: PathBuf,
    },

    /// List fresh checkpoints
    Checkpoints {
        /// Run root holding .bootstrap-checkpoints/
        #[arg(short, long)]
        run_root: PathBuf,

        /// Scheduler config (for the checkpoint TTL)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Delete all checkpoints
    Clear {
        /// Run root holding .bootstrap-checkpoints/
        #[arg(short, long)]
        run_root: PathBuf,
    },

    /// Validate a scheduler config and print it with defaults filled in
    Config {
        /// Config YAML path (defaults when omitted)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<BootstrapConfig> {
    let config = match path {
        Some(path) => BootstrapConfig::from_yaml(path)?,
        None => BootstrapConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Commands::Plan { catalog } => {
            let catalog = DimensionCatalog::from_yaml(&catalog)?;
            println!(
                "{} dimensions in {} tiers\n",
                catalog.len(),
                catalog.plan().len()
            );
            println!("{}", catalog.plan().execution_plan());
            println!();
            for dim in catalog.iter() {
                println!(
                    "  {:<24} {:<10} {}",
                    dim.id,
                    dim.output_type().as_str(),
                    dim.label
                );
            }
        }

        Commands::Checkpoints { run_root, config } => {
            let config = load_config(config.as_ref())?;
            let store = FsCheckpointStore::new(config.checkpoint_ttl());
            let checkpoints = store.load_all(&run_root).await;

            if checkpoints.is_empty() {
                println!(
                    "No fresh checkpoints under {}",
                    FsCheckpointStore::dir(&run_root).display()
                );
                return Ok(());
            }

            let mut ids: Vec<_> = checkpoints.keys().collect();
            ids.sort();
            for id in ids {
                let cp = &checkpoints[id];
                println!(
                    "  {:<24} {:>4} candidates  {:>6}ms  {}  (session {})",
                    cp.dim_id,
                    cp.result.candidate_count,
                    cp.result.duration_ms,
                    cp.completed_at.to_rfc3339(),
                    cp.session_id
                );
            }
        }

        Commands::Clear { run_root } => {
            FsCheckpointStore::default().clear_all(&run_root).await?;
            println!("Cleared {}", FsCheckpointStore::dir(&run_root).display());
        }

        Commands::Config { path } => {
            let config = load_config(path.as_ref())?;
            print!("{}", config.to_yaml()?);
            println!("# effective concurrency: {}", config.effective_concurrency());
        }
    }

    Ok(())
}
