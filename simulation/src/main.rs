//! Indras Unread - scenario replayer
//!
//! Replays read-state scenarios through the reconciliation engine and
//! prints the resulting unread counts.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use indras_logging::{FileConfig, LogConfig, RotationStrategy, UnreadSubscriberBuilder};
use indras_unread_sim::{BUILTINS, Replay, ReplayReport, Scenario, builtin};

#[derive(Parser)]
#[command(
    name = "indras-unread-sim",
    about = "Replay read-state scenarios against the reconciliation engine",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSONL logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file
    Replay {
        /// Path to the scenario JSON
        path: PathBuf,
    },

    /// Run a built-in scenario
    Builtin {
        /// Scenario name (see `list`)
        name: String,
    },

    /// Run every built-in scenario
    All,

    /// List built-in scenarios
    List,

    /// Print a built-in scenario as JSON, as a starting point for new files
    Export { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = LogConfig::development();
    if !cli.verbose {
        config.default_level = "info".to_string();
    }
    if let Some(dir) = &cli.log_dir {
        config.file = Some(FileConfig {
            directory: dir.clone(),
            prefix: "indras-unread-sim".to_string(),
            rotation: RotationStrategy::Never,
            max_files: None,
        });
    }
    let _log_guard = UnreadSubscriberBuilder::new().with_config(config).try_init()?;

    match cli.command {
        Commands::Replay { path } => {
            let scenario = Scenario::load(&path)
                .with_context(|| format!("loading scenario {}", path.display()))?;
            let report = Replay::run(&scenario).await?;
            print_report(&report, cli.json)?;
        }
        Commands::Builtin { name } => {
            let scenario = find_builtin(&name)?;
            let report = Replay::run(&scenario).await?;
            print_report(&report, cli.json)?;
        }
        Commands::All => {
            for name in BUILTINS {
                let scenario = find_builtin(name)?;
                let report = Replay::run(&scenario)
                    .await
                    .with_context(|| format!("scenario {name}"))?;
                print_report(&report, cli.json)?;
            }
        }
        Commands::List => {
            for name in BUILTINS {
                println!("{name}");
            }
        }
        Commands::Export { name } => {
            println!("{}", find_builtin(&name)?.to_json()?);
        }
    }

    Ok(())
}

fn find_builtin(name: &str) -> anyhow::Result<Scenario> {
    builtin(name).with_context(|| {
        format!("unknown scenario '{}', expected one of: {}", name, BUILTINS.join(", "))
    })
}

fn print_report(report: &ReplayReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("\n=== {} ===", report.name);
    println!("  Steps applied: {}", report.steps);
    println!("  Unread: {}", report.counts.total);
    println!("  Mentions: {}", report.counts.mentioned_count);
    println!("  Direct messages: {}", report.counts.private_message_count);
    for (stream_id, count) in &report.counts.stream_counts {
        println!("    stream {}: {}", stream_id, count);
    }
    println!(
        "  Requests: {} sent, {} failed",
        report.requests_sent, report.requests_failed
    );
    for request in &report.requests {
        println!("    {} {:?}", request.path(), request);
    }
    println!("  Reloads: {}", report.reloads);
    println!(
        "  Surfaces: {} repaints, {} rerenders, {} banners",
        report.surfaces.repaints, report.surfaces.rerenders, report.surfaces.banners
    );
    Ok(())
}
