use std::process::ExitCode;
use std::time::Instant;

use camino::Utf8PathBuf;
use clap::Parser;

use filesweep::config::{self, Config};
use filesweep::logging::init_logging;
use filesweep::util::{format_duration, human_size, now_ns};
use filesweep::{execute_decisions, plan_decisions, scan, StatIndex};

#[derive(Parser, Debug)]
#[command(name = "filesweep", version, about = "Scan configured directories and reconcile duplicate files")]
struct Cli {
    /// Config file to use instead of the standard search locations
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Log and tally actions without touching the filesystem
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(config_path) = cli.config.clone().or_else(config::find_config_file) else {
        eprintln!(
            "No configuration file found. Add a valid config in one of the following locations:"
        );
        for path in config::config_search_paths() {
            eprintln!(" - {path}");
        }
        eprintln!(
            "Or set the environment variable {} to point to a valid config file.",
            config::CONFIG_ENV_VAR
        );
        return ExitCode::FAILURE;
    };

    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration {config_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let dry_run = cli.dry_run || config.general.dry_run;
    let index = StatIndex::new(config.general.cache_file.clone());

    tracing::info!("Starting filesweep {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded configuration from {config_path}");

    let start = Instant::now();
    match run(&config, &index, dry_run) {
        Ok(saved_space) => {
            if dry_run {
                tracing::info!("Dry run complete. No files were deleted or modified.");
                tracing::info!(
                    "Total space that would be saved: {}",
                    human_size(saved_space)
                );
            } else {
                tracing::info!("Total space saved: {}", human_size(saved_space));
            }
        }
        // Single-file failures are absorbed inside the pipeline; anything
        // surfacing here is structural. Log it and still save the index.
        Err(e) => tracing::error!("Run failed: {e:#}"),
    }

    tracing::info!("Saving index...");
    if let Err(e) = index.save() {
        tracing::error!("Failed to save index: {e}");
    }
    tracing::info!("Program completed in {}.", format_duration(start.elapsed()));

    ExitCode::SUCCESS
}

fn run(config: &Config, index: &StatIndex, dry_run: bool) -> anyhow::Result<u64> {
    index.load()?;
    tracing::info!(
        "Loaded index with {} entries from {:?}",
        index.len(),
        config.general.cache_file
    );
    tracing::debug!("Configured global pattern: {}", config.pattern);
    for dircfg in &config.directories {
        tracing::debug!(
            " - {:3} {} (policy: {})",
            dircfg.priority,
            dircfg.path,
            dircfg.policy
        );
        if let Some(pattern) = &dircfg.pattern {
            tracing::debug!("       Pattern: {pattern}");
        }
    }

    scan(config, index)?;

    let decisions = plan_decisions(config, index, now_ns())?;
    Ok(execute_decisions(decisions, index, dry_run))
}
