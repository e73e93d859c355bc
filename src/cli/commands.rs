//! Command handler implementations
//!
//! This module contains the implementation of all CLI commands.

use crate::caf;
use crate::cli::progress::{
    format_bytes, format_duration, print_divider, print_header, print_info, print_success,
    print_warning, StageSpinner,
};
use crate::cli::{Args, Commands};
use crate::core::config::{init_config, Config};
use crate::core::error::IndexError;
use crate::core::observer::{CallbackObserver, CancelFlag};
use crate::duplicate::{find_duplicates_single, DuplicateMatch};
use crate::index::{
    caf_path_for, parse_date, parse_size, read_index_info, scan_catalog, search, BucketedIndex,
    HashAlgorithm, HashMode, SearchCriteria,
};
use crate::worker::{spawn_duplicate_scan, ScanOutcome};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run the appropriate command based on CLI arguments
pub fn run_command(args: &Args, config: &Config, cancel: CancelFlag) -> Result<()> {
    match &args.command {
        Commands::Index {
            folder,
            output,
            hash,
            no_hash,
        } => {
            let mode = resolve_hash_mode(config, *hash, *no_hash);
            index_folder(folder, output.as_deref(), mode, cancel)
        }
        Commands::Scan {
            source,
            destinations,
            hash,
            no_hash,
            no_reuse,
            recreate,
            rebuild,
            json,
        } => {
            let mut options = config.index.compose_options();
            options.hash_mode = resolve_hash_mode(config, *hash, *no_hash);
            options.reuse = options.reuse && !*no_reuse;
            options.recreate = options.recreate || *recreate;
            options.force_rebuild = rebuild.iter().cloned().collect();

            if !source.is_dir() {
                bail!("Source is not a directory: {}", source.display());
            }

            let spinner = if *json {
                StageSpinner::hidden()
            } else {
                StageSpinner::new("Preparing destination index...")
            };
            let handle = spawn_duplicate_scan(
                source.clone(),
                destinations.clone(),
                options,
                cancel,
            );

            match handle.wait_with(|stage, detail| spinner.update(stage, detail)) {
                Ok(outcome) => {
                    spinner.finish(&format!(
                        "Checked {} files against {} indexed files",
                        outcome.stats.files_considered, outcome.destination_files
                    ));
                    report_scan(&outcome, *json)
                }
                Err(IndexError::Cancelled) => {
                    spinner.finish_with_error("Scan cancelled");
                    warn!("Scan cancelled before completion; no results reported");
                    Ok(())
                }
                Err(e) => {
                    spinner.finish_with_error("Scan failed");
                    Err(e.into())
                }
            }
        }
        Commands::Check {
            file,
            index,
            hash,
            no_hash,
        } => {
            let mode = resolve_hash_mode(config, *hash, *no_hash);
            check_file(file, index, mode)
        }
        Commands::Search {
            index,
            name,
            min_size,
            max_size,
            after,
            before,
            json,
        } => {
            let criteria = build_criteria(
                name.as_deref(),
                min_size.as_deref(),
                max_size.as_deref(),
                after.as_deref(),
                before.as_deref(),
            )?;
            search_index(index, &criteria, *json)
        }
        Commands::Catalog { locations, json } => {
            let locations = if locations.is_empty() {
                config.catalog.search_locations.clone()
            } else {
                locations.clone()
            };
            show_catalog(&locations, *json)
        }
        Commands::Info { index } => show_index_info(index),
        Commands::ShowConfig => {
            show_config(config);
            Ok(())
        }
        Commands::GenerateConfig { output } => generate_config_file(output.as_deref()),
    }
}

/// Hash mode from command-line flags, falling back to the config file
fn resolve_hash_mode(config: &Config, hash: Option<HashAlgorithm>, no_hash: bool) -> HashMode {
    if no_hash {
        HashMode::Off
    } else if let Some(algorithm) = hash {
        HashMode::On(algorithm)
    } else {
        config.index.hash_mode()
    }
}

/// Build an index of `folder` and save it
pub fn index_folder(
    folder: &Path,
    output: Option<&Path>,
    mode: HashMode,
    cancel: CancelFlag,
) -> Result<()> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| caf_path_for(folder, mode));

    info!("Indexing {} (hash: {})", folder.display(), mode);
    let spinner = StageSpinner::new("Indexing...");
    let observer = CallbackObserver::new(cancel, |stage: &str, detail: &str| {
        spinner.update(stage, detail)
    });

    let index = match BucketedIndex::build_from_folder(folder, mode, &observer) {
        Ok(index) => index,
        Err(IndexError::Cancelled) => {
            spinner.finish_with_error("Indexing cancelled");
            return Ok(());
        }
        Err(e) => {
            spinner.finish_with_error("Indexing failed");
            return Err(e.into());
        }
    };

    index
        .save(&output)
        .with_context(|| format!("Failed to save index to {}", output.display()))?;

    let stats = index.stats();
    spinner.finish(&format!("Indexed {} files", stats.total_files));
    println!();
    print_success(&format!("Index written to {}", output.display()));
    print_info(&format!(
        "{} files, {} in {} size groups",
        stats.total_files,
        format_bytes(stats.total_bytes),
        stats.size_buckets
    ));
    if stats.errors > 0 {
        print_warning(&format!("{} entries could not be read", stats.errors));
    }
    Ok(())
}

fn report_scan(outcome: &ScanOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    let stats = &outcome.stats;
    print_header(&format!("{} Duplicate(s) Found", outcome.matches.len()));

    for (i, found) in outcome.matches.iter().enumerate() {
        print_match(i + 1, found);
    }

    if !outcome.matches.is_empty() {
        print_divider();
    }
    let reclaimable: u64 = outcome.matches.iter().map(|m| m.size).sum();
    print_info(&format!("Files checked:    {}", stats.files_considered));
    print_info(&format!("Size groups:      {}", stats.size_groups));
    print_info(&format!("Hashes computed:  {}", stats.hashes_computed));
    print_info(&format!(
        "Already archived: {} ({})",
        stats.matched_files,
        format_bytes(reclaimable)
    ));
    print_info(&format!(
        "Elapsed:          {}",
        format_duration(Duration::from_millis(stats.elapsed_ms))
    ));
    println!();
    Ok(())
}

fn print_match(number: usize, found: &DuplicateMatch) {
    println!("{}. {}", number, found.source.display());
    println!("   ├─ Size: {}", format_bytes(found.size));
    if !found.source_hash.is_empty() {
        println!("   ├─ Hash: {}", found.source_hash);
    }
    let last = found.destinations.len().saturating_sub(1);
    for (i, dest) in found.destinations.iter().enumerate() {
        let branch = if i == last { "└─" } else { "├─" };
        println!("   {} {}", branch, dest.path.display());
    }
    println!();
}

/// Look up one file in an existing index
pub fn check_file(file: &Path, index_path: &Path, mode: HashMode) -> Result<()> {
    if !file.is_file() {
        bail!("Not a file: {}", file.display());
    }

    let index = BucketedIndex::load(index_path, mode)
        .with_context(|| format!("Failed to load index {}", index_path.display()))?;

    match find_duplicates_single(file, &index) {
        Some(found) => {
            print_success(&format!(
                "{} already exists in {} place(s)",
                file.display(),
                found.destinations.len()
            ));
            print_match(1, &found);
        }
        None => print_info(&format!(
            "{} is not in {}",
            file.display(),
            index_path.display()
        )),
    }
    Ok(())
}

fn build_criteria(
    name: Option<&str>,
    min_size: Option<&str>,
    max_size: Option<&str>,
    after: Option<&str>,
    before: Option<&str>,
) -> Result<SearchCriteria> {
    let size = |value: Option<&str>| -> Result<Option<u64>> {
        match value {
            Some(text) => parse_size(text).map_err(|e| anyhow!(e)),
            None => Ok(None),
        }
    };
    let date = |value: Option<&str>| -> Result<Option<i64>> {
        match value {
            Some(text) => parse_date(text).map_err(|e| anyhow!(e)),
            None => Ok(None),
        }
    };

    Ok(SearchCriteria {
        name_pattern: name.map(str::to_string),
        size_min: size(min_size)?,
        size_max: size(max_size)?,
        date_min: date(after)?,
        date_max: date(before)?,
    })
}

/// Print the entries of an index matching `criteria`
pub fn search_index(index_path: &Path, criteria: &SearchCriteria, json: bool) -> Result<()> {
    // Hashes play no part in searching
    let index = BucketedIndex::load(index_path, HashMode::Off)
        .with_context(|| format!("Failed to load index {}", index_path.display()))?;
    let results = search(&index, criteria)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for entry in &results {
        println!(
            "{:>12}  {}  {}",
            format_bytes(entry.size),
            format_timestamp(entry.mtime),
            entry.path.display()
        );
    }
    let total: u64 = results.iter().map(|e| e.size).sum();
    println!();
    print_info(&format!(
        "{} of {} files match ({})",
        results.len(),
        index.len(),
        format_bytes(total)
    ));
    Ok(())
}

/// List the index files found in `locations`
pub fn show_catalog(locations: &[PathBuf], json: bool) -> Result<()> {
    if locations.is_empty() {
        bail!("No locations given and catalog.search_locations is empty");
    }

    let infos = scan_catalog(locations);
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if infos.is_empty() {
        println!("No index files found.");
        return Ok(());
    }

    print_header(&format!("Found {} Index File(s)", infos.len()));
    for (i, info) in infos.iter().enumerate() {
        let root = if info.root_path.is_empty() {
            "(not recorded)".to_string()
        } else {
            info.root_path.clone()
        };
        let algorithm = info
            .hash_algorithm
            .map(|a| a.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        println!("{}. {}", i + 1, info.file.display());
        println!("   ├─ Root:     {}", root);
        println!(
            "   ├─ Files:    {} ({})",
            info.file_count,
            format_bytes(info.total_size)
        );
        println!("   ├─ Hash:     {}", algorithm);
        println!("   ├─ Version:  {}", info.format_version);
        println!("   └─ Created:  {}", format_created(info.created));
        println!();
    }
    Ok(())
}

/// Print the full header of one index file
pub fn show_index_info(index_path: &Path) -> Result<()> {
    let file = File::open(index_path)
        .with_context(|| format!("Failed to open {}", index_path.display()))?;
    let preamble = caf::decode_preamble(file)
        .with_context(|| format!("Failed to read {}", index_path.display()))?;
    let header = &preamble.header;
    let summary = read_index_info(index_path);

    println!("Index file:   {}", index_path.display());
    println!("Version:      {}", header.version);
    println!(
        "Created:      {}",
        format_created(DateTime::<Utc>::from_timestamp(i64::from(header.created), 0))
    );
    println!("Root:         {}", header.root_path);
    println!("Volume:       {}", header.volume);
    if !header.alias.is_empty() {
        println!("Alias:        {}", header.alias);
    }
    println!("Serial:       {:08X}", header.serial);
    println!("Comment:      {}", header.comment);
    println!("Directories:  {}", preamble.totals.directories);
    if let Some(count) = preamble.totals.file_count {
        println!("Files:        {}", count);
    }
    if let Some(size) = preamble.totals.total_size {
        println!("Total size:   {}", format_bytes(size.max(0.0) as u64));
    }
    if let Some(algorithm) = summary.and_then(|s| s.hash_algorithm) {
        println!("Hash:         {}", algorithm);
    }
    Ok(())
}

/// Generate a configuration file at `output` or the standard location
pub fn generate_config_file(output: Option<&Path>) -> Result<()> {
    let path = init_config(output)?;
    info!("Configuration file: {}", path.display());
    info!("Edit this file to customize indexing and matching.");
    Ok(())
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    let config_path = Config::get_active_config_path();
    info!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        info!("(Using default settings - no config file found)");
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[index]");
    info!("  use_hash = {}", config.index.use_hash);
    info!("  hash_algorithm = \"{}\"", config.index.hash_algorithm);
    info!("  reuse_indices = {}", config.index.reuse_indices);
    info!("  recreate_indices = {}", config.index.recreate_indices);
    info!("");
    info!("[catalog]");
    if config.catalog.search_locations.is_empty() {
        info!("  search_locations = []");
    } else {
        info!("  search_locations = [");
        for location in &config.catalog.search_locations {
            info!("    \"{}\",", location.display());
        }
        info!("  ]");
    }
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
    info!("  log_file = \"{}\"", config.logging.log_file.display());
}

fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_created(created: Option<DateTime<Utc>>) -> String {
    created
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
