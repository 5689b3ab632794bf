//! edco - Elite Dangerous colonisation construction tracker.
//!
//! Replays the game's journal directory into a local site database, tails it
//! for new entries, and serves per-system reports from an interactive prompt.

use clap::{Parser, Subcommand};
use edco_core::aggregate::DataAggregator;
use edco_core::config;
use edco_core::enrichment::{EnrichmentSource, HttpEnrichmentSource};
use edco_core::ingest::watcher::DirectoryWatcher;
use edco_core::ingest::{IngestWorker, run_watch_loop};
use edco_core::{SiteStore, UpdateNotifier};
use edco_types::AppConfig;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), String> {
    init_logging();

    let app_config = config::load().map_err(|e| e.to_string())?;
    let journal_dir = config::journal_directory(&app_config);
    let data_path = config::default_data_path()
        .unwrap_or_else(|| PathBuf::from("edco-sites.db"));

    let store = Arc::new(SiteStore::open(&data_path).map_err(|e| e.to_string())?);
    let notifier = Arc::new(UpdateNotifier::new());
    notifier.subscribe(Box::new(|systems: &BTreeSet<String>| {
        for system in systems {
            tracing::info!(system = %system, "construction data updated");
        }
    }));

    let mut worker = IngestWorker::new(Arc::clone(&store), Arc::clone(&notifier));
    worker.bulk_replay(&journal_dir);

    // Tail the journal directory in the background; the prompt reads the
    // store independently.
    match DirectoryWatcher::new(&journal_dir) {
        Ok(watcher) => {
            tokio::spawn(run_watch_loop(worker, watcher));
        }
        Err(e) => {
            tracing::warn!(error = %e, "live tailing disabled");
        }
    }

    let aggregator = Arc::new(DataAggregator::new(
        Arc::clone(&store),
        build_enrichment(&app_config),
        app_config.enrichment.prefer_local_for_visited,
    ));

    loop {
        let line = readline()?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, &store, &aggregator, &app_config, &journal_dir).await {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                writeln!(std::io::stdout(), "{err}").map_err(|e| e.to_string())?;
                std::io::stdout().flush().map_err(|e| e.to_string())?;
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(version, about = "colonisation construction tracker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every system with known construction sites
    Systems,
    /// Show all construction sites in a system
    Sites {
        system: String,
        #[arg(long)]
        json: bool,
    },
    /// Show commodities still needed across a system, most needed first
    Shopping {
        system: String,
        #[arg(long)]
        json: bool,
    },
    /// Headline completion numbers for a system
    Summary {
        system: String,
        #[arg(long)]
        json: bool,
    },
    /// Database counts
    Stats,
    /// Show configuration and data locations
    Status,
    /// Delete all stored construction data
    Clear,
    Exit,
}

async fn respond(
    line: &str,
    store: &Arc<SiteStore>,
    aggregator: &Arc<DataAggregator>,
    app_config: &AppConfig,
    journal_dir: &std::path::Path,
) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "edco".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::Systems) => {
            let systems = store.all_systems().map_err(|e| e.to_string())?;
            if systems.is_empty() {
                println!("No construction sites recorded yet.");
            }
            for system in systems {
                println!("{system}");
            }
        }
        Some(Commands::Sites { system, json }) => {
            let report = aggregator
                .system_report(system)
                .await
                .map_err(|e| e.to_string())?;
            if *json {
                println!("{}", to_json(&report)?);
            } else {
                println!(
                    "{}: {} site(s), {} complete ({:.0}%)",
                    report.system_name,
                    report.total_sites,
                    report.completed_sites,
                    report.completion_percentage
                );
                for site in &report.sites {
                    let state = if site.construction_failed {
                        "failed"
                    } else if site.construction_complete {
                        "complete"
                    } else {
                        "in progress"
                    };
                    println!(
                        "  {} [{}] {:.1}% {}",
                        site.station_name, site.station_type, site.construction_progress, state
                    );
                }
            }
        }
        Some(Commands::Shopping { system, json }) => {
            let list = aggregator
                .shopping_list(system)
                .await
                .map_err(|e| e.to_string())?;
            if *json {
                println!("{}", to_json(&list)?);
            } else if list.is_empty() {
                println!("Nothing left to deliver in {system}.");
            } else {
                for item in &list {
                    println!(
                        "  {:<30} {:>8} remaining of {:>8} ({} site(s))",
                        item.name_localised,
                        item.total_remaining,
                        item.total_required,
                        item.sites_requiring.len()
                    );
                }
            }
        }
        Some(Commands::Summary { system, json }) => {
            let summary = aggregator
                .system_summary(system)
                .await
                .map_err(|e| e.to_string())?;
            if *json {
                println!("{}", to_json(&summary)?);
            } else {
                println!(
                    "{}: {}/{} sites complete, {} unit(s) of {} commodity kind(s) still needed",
                    summary.system_name,
                    summary.completed_sites,
                    summary.total_sites,
                    summary.total_commodities_needed,
                    summary.unique_commodities
                );
                if let Some(most) = &summary.most_needed {
                    println!("  most needed: {} ({})", most.name, most.amount);
                }
            }
        }
        Some(Commands::Stats) => {
            let stats = store.stats().map_err(|e| e.to_string())?;
            println!(
                "{} system(s), {} site(s): {} in progress, {} complete",
                stats.system_count,
                stats.site_count,
                stats.in_progress_count,
                stats.completed_count
            );
        }
        Some(Commands::Status) => {
            println!("journal directory: {}", journal_dir.display());
            println!(
                "config file: {}",
                config::default_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(unavailable)".to_string())
            );
            println!(
                "enrichment: {}",
                if app_config.enrichment.enabled {
                    app_config.enrichment.base_url.as_str()
                } else {
                    "disabled"
                }
            );
        }
        Some(Commands::Clear) => {
            store.clear_all().map_err(|e| e.to_string())?;
            println!("Cleared all construction data. Restart to replay journals.");
        }
        Some(Commands::Exit) => return Ok(true),
        None => {}
    }
    Ok(false)
}

fn build_enrichment(config: &AppConfig) -> Option<Arc<dyn EnrichmentSource>> {
    if !config.enrichment.enabled || config.enrichment.base_url.is_empty() {
        return None;
    }
    match HttpEnrichmentSource::new(
        config.enrichment.base_url.clone(),
        config.enrichment.api_key.clone(),
        config.enrichment.commander_name.clone(),
        Duration::from_secs(config.enrichment.timeout_secs),
    ) {
        Ok(source) => Some(Arc::new(source)),
        Err(e) => {
            tracing::warn!(error = %e, "enrichment source unavailable");
            None
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

/// Initialize logging, writing to EDCO_LOG_PATH if set, otherwise stderr.
fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Ok(path) = std::env::var("EDCO_LOG_PATH")
        && let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
    {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(false)
            .with_writer(file)
            .init();
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn readline() -> Result<String, String> {
    write!(std::io::stdout(), "edco> ").map_err(|e| e.to_string())?;
    std::io::stdout().flush().map_err(|e| e.to_string())?;
    let mut buffer = String::new();
    let read = std::io::stdin()
        .read_line(&mut buffer)
        .map_err(|e| e.to_string())?;
    if read == 0 {
        // stdin closed; leave the loop instead of spinning on empty reads.
        return Ok("exit".to_string());
    }
    Ok(buffer)
}
