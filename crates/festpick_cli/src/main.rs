//! Operator CLI for FestPick profile sharing.
//!
//! # Responsibility
//! - Inspect, import and export share files against a local profile store.
//! - Manage imported profiles and the active source without the app.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use festpick_core::share::ImportDecision;
use festpick_core::{
    init_logging, AttendanceStatus, CoreConfig, CoreRuntime, MemoryDefaultRecords, PriorityRank,
    ProfileMetadata,
};
use log::info;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "festpick")]
#[command(about = "Inspect, import and export FestPick share files")]
#[command(version)]
struct Cli {
    /// SQLite profile database (defaults to <data-dir>/festpick.sqlite3)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Root of per-profile data files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Where exported share files are written
    #[arg(long, global = true)]
    export_dir: Option<PathBuf>,

    /// Write rolling logs under <data-dir>/logs at this level
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List profiles, Default first
    Profiles,
    /// Validate a share file and show what importing it would do
    Inspect { file: PathBuf },
    /// Import a share file and make it the active source
    Import {
        file: PathBuf,
        /// Label for a new profile (defaults to the sender's name)
        #[arg(long)]
        label: Option<String>,
        /// Confirm updating an existing profile
        #[arg(long)]
        update: bool,
    },
    /// Export records as a share file
    Export {
        /// Share name, also used as the sender name
        name: String,
        /// JSON file with `priorities` and `attendance` objects
        #[arg(long)]
        records: PathBuf,
    },
    /// Switch the active source
    Switch { identity: String },
    /// Rename a profile
    Rename { identity: String, label: String },
    /// Change a profile's color token
    Recolor { identity: String, color: String },
    /// Delete an imported profile and its data files
    Delete { identity: String },
}

/// Default profile records given to `export --records`.
#[derive(Debug, Default, Deserialize)]
struct RecordsFile {
    #[serde(default)]
    priorities: BTreeMap<String, PriorityRank>,
    #[serde(default)]
    attendance: BTreeMap<String, AttendanceStatus>,
}

fn main() -> Result<()> {
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    if let Some(level) = cli.log_level.as_deref() {
        let log_dir = absolute(&config.data_dir.join("logs"))?;
        init_logging(level, &log_dir.to_string_lossy()).map_err(anyhow::Error::msg)?;
    }

    let records = match &cli.command {
        Command::Export { records, .. } => load_records(records)?,
        _ => RecordsFile::default(),
    };
    let default_records = Arc::new(MemoryDefaultRecords::with_records(
        records.priorities,
        records.attendance,
    ));
    let runtime = CoreRuntime::open(config, default_records)
        .context("failed to open the profile store")?;

    match cli.command {
        Command::Profiles => {
            let active = runtime.controller().active_source();
            for row in runtime.profiles().list_profiles()? {
                println!("{}", profile_line(&row, &active));
            }
        }
        Command::Inspect { file } => {
            let importer = runtime.importer();
            let envelope = importer
                .validate_and_parse(&file)
                .with_context(|| format!("invalid share file `{}`", file.display()))?;
            match importer.decide(&envelope)? {
                ImportDecision::Update {
                    identity,
                    existing_label,
                    priority_count,
                    attendance_count,
                    ..
                } => println!(
                    "update {identity} label=\"{existing_label}\" priorities={priority_count} attendance={attendance_count}"
                ),
                ImportDecision::New {
                    identity,
                    suggested_label,
                    priority_count,
                    attendance_count,
                } => println!(
                    "new {identity} suggested_label=\"{suggested_label}\" priorities={priority_count} attendance={attendance_count}"
                ),
            }
        }
        Command::Import {
            file,
            label,
            update,
        } => {
            let importer = runtime.importer();
            let envelope = importer
                .validate_and_parse(&file)
                .with_context(|| format!("invalid share file `{}`", file.display()))?;
            let decision = importer.decide(&envelope)?;
            if decision.is_update() && !update {
                bail!(
                    "profile `{}` already exists; rerun with --update to overwrite its records",
                    decision.identity()
                );
            }
            let outcome = runtime.import_and_activate(&file, label.as_deref().unwrap_or(""), update)?;
            println!(
                "{} {}",
                if outcome.was_update { "updated" } else { "imported" },
                profile_line(&outcome.metadata, &outcome.metadata.identity)
            );
            if !outcome.rejected_attendance_keys.is_empty() {
                println!(
                    "skipped {} malformed attendance key(s)",
                    outcome.rejected_attendance_keys.len()
                );
            }
        }
        Command::Export { name, .. } => {
            let outcome = runtime.exporter().export(&name)?;
            println!(
                "exported {} priorities={} attendance={}",
                outcome.path.display(),
                outcome.priority_count,
                outcome.attendance_count
            );
        }
        Command::Switch { identity } => {
            runtime.controller().set_active_source(&identity)?;
            println!("active source: {identity}");
        }
        Command::Rename { identity, label } => {
            let row = runtime.profiles().rename_profile(&identity, &label)?;
            println!("{}", profile_line(&row, ""));
        }
        Command::Recolor { identity, color } => {
            let row = runtime.profiles().recolor_profile(&identity, &color)?;
            println!("{}", profile_line(&row, ""));
        }
        Command::Delete { identity } => {
            runtime.profiles().delete_profile(&identity)?;
            println!("deleted {identity}");
        }
    }

    info!("event=cli_command module=cli status=ok");
    Ok(())
}

/// Environment config with command-line overrides applied on top.
fn resolve_config(cli: &Cli) -> Result<CoreConfig> {
    let mut config = CoreConfig::from_env().context("invalid FESTPICK_* environment")?;
    if let Some(data_dir) = &cli.data_dir {
        let rebased = CoreConfig::with_base_dir(data_dir);
        config.data_dir = rebased.data_dir;
        config.db_path = rebased.db_path;
        config.export_dir = rebased.export_dir;
    }
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(export_dir) = &cli.export_dir {
        config.export_dir = export_dir.clone();
    }
    Ok(config)
}

fn load_records(path: &Path) -> Result<RecordsFile> {
    let body = std::fs::read(path)
        .with_context(|| format!("failed to read records file `{}`", path.display()))?;
    serde_json::from_slice(&body)
        .with_context(|| format!("invalid records file `{}`", path.display()))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("failed to resolve current directory")?
        .join(path))
}

fn profile_line(row: &ProfileMetadata, active: &str) -> String {
    format!(
        "{marker} {identity}  label=\"{label}\" color={color} priorities={priorities} attendance={attendance}",
        marker = if row.identity == active { "*" } else { " " },
        identity = row.identity,
        label = row.label,
        color = row.color,
        priorities = row.priority_count,
        attendance = row.attendance_count,
    )
}
