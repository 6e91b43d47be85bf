//! ModSleuth — vehicle mod catalog builder.
//!
//! Thin binary entry point. All logic lives in the `modsleuth-core` crate.

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::{select, unbounded};
use modsleuth_core::config::CONFIG_FILE_NAME;
use modsleuth_core::monitor::{start_scheduler, SchedulerOptions};
use modsleuth_core::pipeline::progress::{PassSummary, PipelineEvent};
use modsleuth_core::{Config, Pipeline};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "modsleuth", version, about = "Vehicle mod catalog builder")]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Data directory; the cache lives in `<data-dir>/cache`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Mods folder to scan (repeatable; replaces the configured roots).
    #[arg(long = "root", global = true)]
    roots: Vec<PathBuf>,

    /// Log at DEBUG instead of INFO.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one pass: index, extract, resolve.
    Scan {
        /// Re-check every archive instead of only new and changed ones.
        #[arg(long)]
        full: bool,
    },
    /// Locate and index archives only; writes zip_structure.txt.
    Index,
    /// Resolve zip_structure.txt against the current cache.
    Resolve,
    /// Run a pass, then keep the catalog in sync until stdin closes.
    Watch,
    /// Print the finalized catalog.
    Catalog {
        /// Only entries whose name contains this text.
        #[arg(long)]
        search: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    tracing::info!("ModSleuth starting");

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        let base = Config::with_data_dir(data_dir);
        config.data_dir = base.data_dir;
        config.cache_dir = base.cache_dir;
        config.reserved_source = base.reserved_source;
    }
    if !cli.roots.is_empty() {
        config.roots = cli.roots;
    }

    let pipeline = Pipeline::new(config)?;
    match cli.command {
        Command::Scan { full } => {
            let summary = pipeline.run_pass(full)?;
            print_summary(&summary);
        }
        Command::Index => {
            let report = pipeline.index()?;
            println!(
                "{} archive(s) indexed, {} prioritized, {} error(s)",
                report.records.len(),
                report.prioritized_count(),
                report.errors.len()
            );
        }
        Command::Resolve => {
            let (resolution, errors) = pipeline.resolve_from_manifest()?;
            println!(
                "{} accepted, {} rejected, {} fallback link(s), {} malformed line(s)",
                resolution.accepted.len(),
                resolution.rejected.len(),
                resolution.fallback_links(),
                errors.len()
            );
        }
        Command::Watch => watch(pipeline)?,
        Command::Catalog { search } => {
            let catalog = pipeline.load_catalog()?;
            let needle = search.unwrap_or_default();
            for entry in catalog.search(&needle) {
                println!(
                    "{:<32} {:<24} {:>10}  {}",
                    entry.display_name,
                    entry.archive_id,
                    entry.info.value,
                    entry.spawn_command()
                );
            }
        }
    }
    Ok(())
}

fn watch(pipeline: Pipeline) -> anyhow::Result<()> {
    let config = pipeline.config();
    let options = SchedulerOptions {
        roots: config.roots.clone(),
        extension: config.extension(),
        debounce: config.debounce(),
        watch_filesystem: true,
        initial_pass: true,
    };
    let handle = start_scheduler(Arc::new(pipeline), options)?;

    let (eof_tx, eof_rx) = unbounded::<()>();
    std::thread::Builder::new()
        .name("modsleuth-stdin".into())
        .spawn(move || {
            let _ = std::io::stdin().read_to_end(&mut Vec::new());
            let _ = eof_tx.send(());
        })?;

    println!("Watching for changes. Close stdin (Ctrl-D) or press Ctrl-C to stop.");
    loop {
        select! {
            recv(handle.events_rx) -> event => match event {
                Ok(PipelineEvent::ScanStarted { root }) => match root {
                    Some(idx) => println!("Change detected in root {idx}; scanning"),
                    None => println!("Scanning"),
                },
                Ok(PipelineEvent::NewArchives(names)) => {
                    println!("New archive(s): {}", names.join(", "));
                }
                Ok(PipelineEvent::ScanComplete(summary)) => print_summary(&summary),
                Ok(PipelineEvent::PassFailed(message)) => eprintln!("Pass failed: {message}"),
                Err(_) => break,
            },
            recv(eof_rx) -> _ => break,
        }
    }
    handle.stop();
    Ok(())
}

fn print_summary(summary: &PassSummary) {
    println!(
        "{} archive(s) ({} prioritized): {} accepted, {} rejected, {} fallback link(s), {} naming conflict(s)",
        summary.archives,
        summary.prioritized,
        summary.accepted,
        summary.rejected,
        summary.fallback_links,
        summary.conflicts
    );
    println!(
        "extracted {}, skipped {}, purged {}, {} error(s) in {:.2?}",
        summary.extracted, summary.skipped, summary.purged, summary.errors, summary.duration
    );
    for (kind, count) in &summary.errors_by_kind {
        println!("  {kind}: {count}");
    }
}
