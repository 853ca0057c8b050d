use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use xwalk_models::{run_models, ModelsPaths};
use xwalk_pipeline::{report_markdown, CrosswalkConfig, CrosswalkPipeline, CROSSWALK_WAGES_CSV};

const DEFAULT_MODELS_CONFIG: &str = "models.yaml";

#[derive(Debug, Parser)]
#[command(name = "xwalk")]
#[command(about = "Usage-to-occupation task crosswalk")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Match usage records to taxonomy tasks and write the crosswalk outputs.
    Build(BuildArgs),
    /// Score occupation exposure and run the economic models.
    Models(ModelsArgs),
    /// Print the most recent build summary.
    Report {
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Args, Default)]
struct BuildArgs {
    #[arg(long)]
    usage: Option<PathBuf>,
    #[arg(long)]
    taxonomy: Option<PathBuf>,
    #[arg(long)]
    wages: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ModelsArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    crosswalk: Option<PathBuf>,
    #[arg(long)]
    task_ratings: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn build_config(args: BuildArgs) -> CrosswalkConfig {
    let mut config = CrosswalkConfig::from_env();
    if let Some(path) = args.usage {
        config.usage_path = path;
    }
    if let Some(path) = args.taxonomy {
        config.taxonomy_path = path;
    }
    if let Some(path) = args.wages {
        config.wages_path = path;
    }
    if let Some(path) = args.output_dir {
        config.output_dir = path;
    }
    config
}

fn models_paths(args: ModelsArgs) -> ModelsPaths {
    let base = CrosswalkConfig::from_env();
    let output_dir = args.output_dir.unwrap_or(base.output_dir);
    let config_path = args
        .config
        .or_else(|| std::env::var("XWALK_MODELS_CONFIG").ok().map(PathBuf::from))
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_MODELS_CONFIG);
            default.exists().then_some(default)
        });
    ModelsPaths {
        crosswalk_path: args
            .crosswalk
            .unwrap_or_else(|| output_dir.join(CROSSWALK_WAGES_CSV)),
        task_ratings_path: args.task_ratings.or(base.task_ratings_path),
        config_path,
        output_dir,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Build(BuildArgs::default())) {
        Commands::Build(args) => {
            let summary = CrosswalkPipeline::new(build_config(args)).run_once().await?;
            println!(
                "build complete: run_id={} matched={} unmatched={} rows={} conservation={} output_dir={}",
                summary.run_id,
                summary.exact_matches + summary.fuzzy_matches,
                summary.unmatched_records,
                summary.crosswalk_rows,
                summary.conservation_status,
                summary.output_dir
            );
        }
        Commands::Models(args) => {
            let paths = models_paths(args);
            info!(crosswalk = %paths.crosswalk_path.display(), "running models");
            let summary = run_models(&paths).await?;
            println!(
                "models complete: occupations={} scenarios={} outputs={}",
                summary.occupations,
                summary.scenarios.join(","),
                summary.outputs.join(",")
            );
        }
        Commands::Report { output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| CrosswalkConfig::from_env().output_dir);
            print!("{}", report_markdown(&output_dir)?);
        }
    }

    Ok(())
}
