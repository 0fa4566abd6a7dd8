mod commands;
mod logging;
mod reporter;

use std::io::{self, Write};
use std::path::Path;
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use reporter::CliReporter;
use shelfkeeper::relocation::MoveRequest;
use shelfkeeper::storage::Database;
use shelfkeeper::{AppConfig, LibraryEngine};
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match shelfkeeper::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::AddLibrary {
            name,
            paths,
            pattern,
            unwatched,
        }) => run_add_library(&config, &name, &paths, pattern.as_deref(), !unwatched),
        Some(Commands::Scan { library_id }) => run_scan(&config, library_id),
        Some(Commands::Relocate { book_id }) => run_relocate(&config, book_id),
        Some(Commands::Move { items }) => run_move(&config, &items),
        Some(Commands::RefreshHashes { library_id }) => run_refresh_hashes(&config, library_id),
        Some(Commands::RecoverTemp { library_id }) => run_recover_temp(&config, library_id),
        Some(Commands::Fingerprint { path }) => run_fingerprint(&path),
        Some(Commands::PurgeDeleted { days }) => run_purge_deleted(&config, days),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {}", err);
        process::exit(1);
    }
    Ok(())
}

fn run_add_library(
    config: &AppConfig,
    name: &str,
    paths: &[String],
    pattern: Option<&str>,
    watched: bool,
) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)?;
    let library_id = db.insert_library(name, pattern, watched)?;
    for path in paths {
        let canonical = std::fs::canonicalize(path)?;
        let path_id = db.insert_library_path(library_id, &canonical.to_string_lossy())?;
        info!("Library path {} -> {}", path_id, canonical.display());
    }
    println!("Library {} created with id {}", name.bold(), library_id.to_string().green());
    Ok(())
}

fn run_scan(config: &AppConfig, library_id: i64) -> anyhow::Result<()> {
    let engine = LibraryEngine::open(config.clone())?;
    let reporter = CliReporter::new();
    let summary = engine.reconcile(library_id, &reporter)?;

    println!();
    info!(
        "{} new, {} deleted, {} promoted, {} restored, {} failed",
        format!("{}", summary.new).green(),
        format!("{}", summary.deleted).red(),
        format!("{}", summary.promoted).cyan(),
        format!("{}", summary.restored).cyan(),
        format!("{}", summary.failed).yellow(),
    );
    Ok(())
}

fn run_relocate(config: &AppConfig, book_id: i64) -> anyhow::Result<()> {
    let engine = LibraryEngine::open(config.clone())?;
    let outcome = engine.relocate(book_id)?;
    if outcome.moved {
        println!(
            "Book {} moved to {}/{}",
            book_id,
            outcome.new_sub_path.unwrap_or_default().green(),
            outcome.new_file_name.unwrap_or_default().green()
        );
    } else {
        println!("Book {} is already in place", book_id);
    }
    Ok(())
}

fn run_move(config: &AppConfig, items: &[MoveRequest]) -> anyhow::Result<()> {
    let engine = LibraryEngine::open(config.clone())?;
    let report = engine.relocate_all(items)?;

    for (book_id, err) in &report.failed {
        warn!("Book {} not moved: {}", book_id, err);
    }
    info!(
        "{} moved, {} unchanged, {} failed",
        format!("{}", report.moved()).green(),
        format!("{}", report.outcomes.len() - report.moved()),
        format!("{}", report.failed.len()).red(),
    );
    Ok(())
}

fn run_refresh_hashes(config: &AppConfig, library_id: i64) -> anyhow::Result<()> {
    let engine = LibraryEngine::open(config.clone())?;
    let updated = engine.refresh_fingerprints(library_id)?;
    info!("{} fingerprints updated", format!("{}", updated).green());
    Ok(())
}

fn run_recover_temp(config: &AppConfig, library_id: i64) -> anyhow::Result<()> {
    let engine = LibraryEngine::open(config.clone())?;
    let recovery = engine.recover_orphaned_temps(library_id)?;
    for path in &recovery.restored {
        println!("{} {}", "restored".green(), path.display());
    }
    for path in &recovery.reported {
        println!("{} {}", "needs attention".red(), path.display());
    }
    Ok(())
}

fn run_fingerprint(path: &str) -> anyhow::Result<()> {
    let digest = shelfkeeper::hasher::fingerprint(Path::new(path))?;
    println!("{}  {}", digest, path);
    Ok(())
}

fn run_purge_deleted(config: &AppConfig, days: i64) -> anyhow::Result<()> {
    let prompt = format!(
        "Permanently delete books removed more than {} days ago?",
        days
    );
    if !prompt_confirm(&prompt, Some(false))? {
        return Ok(());
    }
    let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
    let db = Database::open(&config.db_path)?;
    let purged = db.purge_deleted_before(&cutoff.to_rfc3339())?;
    println!("{} books purged", purged);
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
