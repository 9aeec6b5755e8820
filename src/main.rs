use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use glob::glob;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taxogen::config::{Environment, Settings, SettingsLoader};
use taxogen::llm::{FixtureProvider, SharedProvider};
use taxogen::orchestration::{CHECKPOINT_SUFFIX, TaxonomyOrchestrator};

/// Parse an environment name from the command line.
fn parse_environment(s: &str) -> Result<Environment, String> {
    Environment::parse(s).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "taxogen")]
#[command(
    version,
    about = "Deterministic pipeline building academic-domain taxonomies from institutional evidence"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "config", help = "Directory holding <environment>.yaml files")]
    config_root: PathBuf,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the full pipeline
    Run {
        #[arg(long, value_parser = parse_environment)]
        environment: Option<Environment>,
        #[arg(long, help = "Phase to resume from (fails on unknown phases)")]
        resume_phase: Option<String>,
        #[arg(
            long = "override",
            short = 'o',
            help = "Configuration override as dotted.key=value (repeatable)"
        )]
        overrides: Vec<String>,
        #[arg(long, help = "Explicit run id (defaults to a generated one)")]
        run_id: Option<String>,
    },

    /// Resume an existing run from its checkpoints
    Resume {
        run_id: String,
        #[arg(long, help = "Phase to resume from (defaults to the next pending phase)")]
        phase: Option<String>,
        #[arg(long, value_parser = parse_environment)]
        environment: Option<Environment>,
        #[arg(long = "override", short = 'o')]
        overrides: Vec<String>,
    },

    /// List checkpoints recorded for a run
    Status {
        run_id: String,
        #[arg(long, value_parser = parse_environment)]
        environment: Option<Environment>,
    },

    /// Load settings and policies, then exit
    Validate {
        #[arg(long, value_parser = parse_environment)]
        environment: Option<Environment>,
        #[arg(long = "override", short = 'o')]
        overrides: Vec<String>,
    },
}

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run {
            environment,
            resume_phase,
            overrides,
            run_id,
        } => {
            let settings = load(&cli.config_root, environment, &overrides)?;
            let provider = fixture_provider(&settings);
            let rt = Runtime::new()?;
            let outcome = rt.block_on(
                TaxonomyOrchestrator::from_settings(settings, run_id, provider)?
                    .run(resume_phase.as_deref()),
            )?;
            println!(
                "{} run {} complete, manifest at {}",
                style("✓").green(),
                outcome.run_id,
                outcome.manifest_path.display()
            );
        }
        Commands::Resume {
            run_id,
            phase,
            environment,
            overrides,
        } => {
            let settings = load(&cli.config_root, environment, &overrides)?;
            let provider = fixture_provider(&settings);
            let rt = Runtime::new()?;
            let outcome = rt.block_on(
                TaxonomyOrchestrator::from_settings(settings, Some(run_id), provider)?
                    .run(phase.as_deref()),
            )?;
            println!(
                "{} resumed run {}, {} phases executed",
                style("✓").green(),
                outcome.run_id,
                outcome.phase_results.len()
            );
        }
        Commands::Status { run_id, environment } => {
            let settings = load(&cli.config_root, environment, &[])?;
            status(&settings, &run_id)?;
        }
        Commands::Validate {
            environment,
            overrides,
        } => {
            load(&cli.config_root, environment, &overrides)?;
            println!("{} configuration validated", style("✓").green());
        }
    }
    Ok(())
}

fn load(
    config_root: &PathBuf,
    environment: Option<Environment>,
    overrides: &[String],
) -> anyhow::Result<Settings> {
    let settings = SettingsLoader::new()
        .with_environment(environment)
        .with_config_root(config_root)
        .with_overrides(overrides.iter().map(String::as_str))?
        .load()?;
    Ok(settings)
}

/// The built-in transport replays recorded responses from the cache
/// directory; remote transports plug in through the library API.
fn fixture_provider(settings: &Settings) -> SharedProvider {
    Arc::new(FixtureProvider::new(
        settings.paths.cache_dir.join("llm_fixtures"),
    ))
}

fn status(settings: &Settings, run_id: &str) -> anyhow::Result<()> {
    let run_dir = settings.run_dir(run_id);
    if !run_dir.exists() {
        println!("No checkpoints found for run {run_id}");
        return Ok(());
    }
    let pattern = run_dir.join(format!("*{CHECKPOINT_SUFFIX}")).display().to_string();
    let mut names: Vec<String> = glob(&pattern)?
        .flatten()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();

    println!("Run {run_id}:");
    if names.is_empty() {
        println!("  (no checkpoints)");
    }
    for name in names {
        println!(
            "  {} {}",
            style("✓").green(),
            name.trim_end_matches(CHECKPOINT_SUFFIX)
        );
    }
    Ok(())
}
